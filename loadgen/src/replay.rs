use anyhow::{bail, Result};
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::document::BatchReceiver;
use crate::op::KeyOrder;
use crate::workload::WorkloadParams;

/// Counters of a replay run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub batches: u64,
    pub operations: u64,
}

/// Split every decoded batch into single operations and hand each one to the
/// worker owning its `bucket + key`.
///
/// Runs until the decoder closes the batch channel. Operations of a batch are
/// dispatched in their recorded order. Once `abort` is cancelled nothing more is
/// dispatched, including batches still waiting in the channel and a push that is
/// blocked on a full worker queue.
pub async fn replay(
    batches: BatchReceiver,
    abort: &CancellationToken,
    params: &mut WorkloadParams,
) -> Result<ReplayStats> {
    let mut stats = ReplayStats::default();
    let mut batches = ReceiverStream::new(batches);

    'batches: loop {
        let batch = tokio::select! {
            biased;
            _ = abort.cancelled() => break 'batches,
            batch = batches.next() => match batch {
                Some(batch) => batch,
                None => {
                    info!(
                        "Replay finished: {} batches, {} operations",
                        stats.batches, stats.operations
                    );
                    return Ok(stats);
                }
            },
        };

        debug!("Replaying batch {} with {} operations", stats.batches, batch.len());
        stats.batches += 1;
        for op in batch {
            tokio::select! {
                biased;
                _ = abort.cancelled() => break 'batches,
                dispatched = params.dispatch(op, KeyOrder::BucketFirst) => {
                    dispatched?;
                    stats.operations += 1;
                }
            }
        }
    }

    warn!(
        "Replay aborted after {} batches, {} operations",
        stats.batches, stats.operations
    );
    bail!("Replay aborted before the trace was fully dispatched")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use crate::op::{Operation, OperationKind};
    use crate::queue::WorkerQueues;
    use tokio::sync::mpsc;

    fn batch(n: usize) -> Vec<Operation> {
        (0..n)
            .map(|i| Operation::new(OperationKind::Put, 1, "b", format!("k{}", i)))
            .collect()
    }

    #[tokio::test]
    async fn test_replay_until_stream_closes() {
        let (queues, receivers) = WorkerQueues::new(1);
        let mut params = WorkloadParams::new(queues, Credentials::default());
        let (tx, rx) = mpsc::channel(4);
        tx.send(batch(3)).await.unwrap();
        tx.send(batch(2)).await.unwrap();
        drop(tx);

        let stats = replay(rx, &CancellationToken::new(), &mut params).await.unwrap();
        assert_eq!(stats, ReplayStats { batches: 2, operations: 5 });
        assert_eq!(receivers[0].rx.len(), 5);
    }

    #[tokio::test]
    async fn test_abort_skips_pending_batches() {
        let (queues, mut receivers) = WorkerQueues::new(1);
        let mut params = WorkloadParams::new(queues, Credentials::default());
        let (tx, rx) = mpsc::channel(4);
        tx.send(batch(3)).await.unwrap();
        tx.send(batch(3)).await.unwrap();

        let abort = CancellationToken::new();
        abort.cancel();
        drop(tx);

        assert!(replay(rx, &abort, &mut params).await.is_err());
        assert_eq!(params.dispatched(), 0);
        assert!(receivers[0].rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_abort_releases_blocked_push() {
        // Worker queue of one slot that nobody drains
        let (queues, _receivers) = WorkerQueues::with_capacity(1, 1);
        let mut params = WorkloadParams::new(queues, Credentials::default());
        let (tx, rx) = mpsc::channel(4);
        tx.send(batch(5)).await.unwrap();

        let abort = CancellationToken::new();
        let canceller = {
            let abort = abort.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                abort.cancel();
            })
        };

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            replay(rx, &abort, &mut params),
        )
        .await
        .expect("replay stayed blocked after abort");
        assert!(result.is_err());
        assert_eq!(params.dispatched(), 1);
        canceller.await.unwrap();
        drop(tx);
    }
}
