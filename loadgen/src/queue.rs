use anyhow::{anyhow, Result};
use common::WorkerId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::op::Operation;

/// Operations a single worker may have pending before its producer is suspended
pub const WORKER_QUEUE_CAPACITY: usize = 100;

pub type WorkerSender = mpsc::Sender<Operation>;
pub type WorkerReceiver = mpsc::Receiver<Operation>;

/// Consumer side of one worker queue, handed to the task executing its operations
pub struct WorkerQueue {
    pub id: WorkerId,
    pub rx: WorkerReceiver,
    /// Completion tracker shared by every worker of the run
    pub tracker: TaskTracker,
    /// Cancelled when the run fails; queued operations are then discarded
    pub abort: CancellationToken,
}

/// Producer side of the per-worker queues
pub struct WorkerQueues {
    senders: Vec<WorkerSender>,
    tracker: TaskTracker,
    abort: CancellationToken,
}

impl WorkerQueues {
    /// Create `workers` queues with the default capacity
    pub fn new(workers: usize) -> (Self, Vec<WorkerQueue>) {
        Self::with_capacity(workers, WORKER_QUEUE_CAPACITY)
    }

    pub fn with_capacity(workers: usize, capacity: usize) -> (Self, Vec<WorkerQueue>) {
        assert!(workers > 0, "at least one worker queue is required");

        let tracker = TaskTracker::new();
        let abort = CancellationToken::new();
        let mut senders = Vec::with_capacity(workers);
        let mut queues = Vec::with_capacity(workers);

        for i in 0..workers {
            let (tx, rx) = mpsc::channel(capacity);
            senders.push(tx);
            queues.push(WorkerQueue {
                id: WorkerId(i as u32),
                rx,
                tracker: tracker.clone(),
                abort: abort.clone(),
            });
        }

        (Self { senders, tracker, abort }, queues)
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    /// Push an operation onto a worker's queue, waiting while the queue is full
    pub async fn push(&self, worker: WorkerId, op: Operation) -> Result<()> {
        let tx = self
            .senders
            .get(worker.index())
            .ok_or_else(|| anyhow!("worker {} does not exist", worker))?;
        tx.send(op)
            .await
            .map_err(|_| anyhow!("worker {} stopped receiving operations", worker))
    }

    /// Token that aborts the run, shared with every worker queue
    pub fn abort_token(&self) -> CancellationToken {
        self.abort.clone()
    }

    /// Number of free slots left in a worker's queue
    pub fn free_slots(&self, worker: WorkerId) -> Option<usize> {
        self.senders.get(worker.index()).map(|tx| tx.capacity())
    }

    /// Close every queue.
    ///
    /// Workers drain whatever is still queued and then exit. The returned tracker
    /// is already closed, so `wait()` resolves once every worker task has finished.
    pub fn close_all(self) -> TaskTracker {
        drop(self.senders);
        self.tracker.close();
        self.tracker
    }
}
