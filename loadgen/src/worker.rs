use common::WorkerId;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::StorageBackend;
use crate::metrics::Metrics;
use crate::queue::{WorkerQueue, WorkerReceiver};

/// Executes the operations routed to one worker queue
pub struct Worker {
    id: WorkerId,
    rx: WorkerReceiver,
    backend: Arc<dyn StorageBackend>,
    metrics: Arc<Metrics>,
    abort: CancellationToken,
}

impl Worker {
    pub fn new(
        id: WorkerId,
        rx: WorkerReceiver,
        backend: Arc<dyn StorageBackend>,
        metrics: Arc<Metrics>,
        abort: CancellationToken,
    ) -> Self {
        Self {
            id,
            rx,
            backend,
            metrics,
            abort,
        }
    }

    /// Pop operations until the queue is closed and drained, or the run is
    /// aborted. An aborted worker leaves the rest of its queue unexecuted.
    ///
    /// Backend failures are logged and counted; they never stop the worker.
    pub async fn run(mut self) -> u64 {
        let mut executed = 0;

        loop {
            let op = tokio::select! {
                biased;
                _ = self.abort.cancelled() => {
                    warn!(
                        "Worker {}: run aborted, dropping {} queued operations",
                        self.id,
                        self.rx.len()
                    );
                    break;
                }
                op = self.rx.recv() => match op {
                    Some(op) => op,
                    None => break,
                },
            };

            let start = Instant::now();
            match self.backend.execute(&op).await {
                Ok(()) => self.metrics.record_success(op.kind, start.elapsed()),
                Err(e) => {
                    warn!(
                        "Worker {}: {} {}/{} failed: {:#}",
                        self.id, op.kind, op.bucket, op.key, e
                    );
                    self.metrics.record_failure(op.kind);
                }
            }
            executed += 1;
        }

        debug!("Worker {} stopped after {} operations", self.id, executed);
        executed
    }
}

/// Start one worker task per queue on the queues' completion tracker
pub fn spawn_workers(
    queues: Vec<WorkerQueue>,
    backend: Arc<dyn StorageBackend>,
    metrics: Arc<Metrics>,
) {
    for queue in queues {
        let worker = Worker::new(
            queue.id,
            queue.rx,
            backend.clone(),
            metrics.clone(),
            queue.abort,
        );
        queue.tracker.spawn(worker.run());
    }
}
