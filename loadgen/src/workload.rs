use anyhow::Result;
use common::WorkerId;
use rustc_hash::FxHashSet;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::config::Credentials;
use crate::op::{KeyOrder, Operation};
use crate::queue::WorkerQueues;
use crate::router::{HashRouter, RouterStats};

/// State of a single workload run.
///
/// Owned by the task that dispatches operations; the router cache is only ever
/// touched through `&mut self`, so it needs no locking.
pub struct WorkloadParams {
    /// Number of workers operations are spread over
    concurrency: usize,
    /// Composite key to worker assignments
    router: HashRouter,
    /// Buckets known to exist on the backend
    known_buckets: FxHashSet<String>,
    /// Producer side of every worker queue
    queues: WorkerQueues,
    /// Backend credentials for this run
    credentials: Credentials,
    dispatched: u64,
}

impl WorkloadParams {
    pub fn new(queues: WorkerQueues, credentials: Credentials) -> Self {
        let concurrency = queues.len();
        Self {
            concurrency,
            router: HashRouter::new(concurrency),
            known_buckets: FxHashSet::default(),
            queues,
            credentials,
            dispatched: 0,
        }
    }

    /// Use a custom router, mainly to shrink the assignment cache
    pub fn with_router(mut self, router: HashRouter) -> Self {
        assert_eq!(
            router.workers(),
            self.concurrency,
            "router must cover every worker queue"
        );
        self.router = router;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Record that `bucket` exists on the backend
    pub fn mark_bucket_ready(&mut self, bucket: &str) {
        self.known_buckets.insert(bucket.to_string());
    }

    pub fn is_bucket_ready(&self, bucket: &str) -> bool {
        self.known_buckets.contains(bucket)
    }

    /// Route an operation by its composite key and queue it on that worker.
    ///
    /// Waits while the chosen worker's queue is full.
    pub async fn dispatch(&mut self, op: Operation, order: KeyOrder) -> Result<WorkerId> {
        let worker = self.router.route(&op.routing_key(order));
        debug!("Dispatching {} {}/{} to worker {}", op.kind, op.bucket, op.key, worker);
        self.queues.push(worker, op).await?;
        self.dispatched += 1;
        Ok(worker)
    }

    /// Operations queued so far
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Token that stops dispatch and the workers when the run fails
    pub fn abort_token(&self) -> CancellationToken {
        self.queues.abort_token()
    }

    pub fn router_stats(&self) -> RouterStats {
        self.router.stats()
    }

    /// Close every worker queue once all producers are done.
    ///
    /// Returns the completion tracker; awaiting `wait()` on it resolves after
    /// every worker drained its queue.
    pub fn finish(self) -> TaskTracker {
        self.queues.close_all()
    }
}
