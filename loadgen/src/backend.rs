use anyhow::{ensure, Result};
use async_trait::async_trait;
use rustc_hash::FxHashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::config::Credentials;
use crate::op::{Operation, OperationKind};

/// A storage service operations are executed against
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Make sure `bucket` exists, creating it if needed. Idempotent.
    async fn ensure_bucket(&self, bucket: &str) -> Result<()>;

    /// Execute a single operation
    async fn execute(&self, op: &Operation) -> Result<()>;
}

/// Mock metadata sent with metadata updates: `size / 2` key bytes, `=`, `size / 2`
/// value bytes
pub fn metadata_value(size: usize) -> String {
    let half = size / 2;
    format!("{}={}", "k".repeat(half), "v".repeat(half))
}

/// Backend that accepts every operation without touching the network.
///
/// Useful to measure the generator and routing on their own, and as the
/// default when no storage client is wired in.
pub struct DryRunBackend {
    endpoint: String,
    region: String,
    buckets: Mutex<FxHashSet<String>>,
    executed: [AtomicU64; OperationKind::ALL.len()],
    bytes: AtomicU64,
}

impl DryRunBackend {
    pub fn new(endpoint: impl Into<String>, region: impl Into<String>, credentials: &Credentials) -> Self {
        let endpoint = endpoint.into();
        let region = region.into();
        info!(
            "Dry run backend for {} ({}), access key '{}'",
            endpoint, region, credentials.access_key
        );
        Self {
            endpoint,
            region,
            buckets: Mutex::new(FxHashSet::default()),
            executed: Default::default(),
            bytes: AtomicU64::new(0),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Operations of `kind` executed so far
    pub fn executed(&self, kind: OperationKind) -> u64 {
        self.executed[kind.index()].load(Ordering::Relaxed)
    }

    /// Request payload bytes that would have been sent
    pub fn bytes_sent(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Whether `ensure_bucket` was called for `bucket`
    pub fn bucket_exists(&self, bucket: &str) -> bool {
        self.buckets
            .lock()
            .map(|buckets| buckets.contains(bucket))
            .unwrap_or(false)
    }
}

#[async_trait]
impl StorageBackend for DryRunBackend {
    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        ensure!(!bucket.is_empty(), "bucket name must not be empty");
        let mut buckets = self
            .buckets
            .lock()
            .map_err(|_| anyhow::anyhow!("bucket registry poisoned"))?;
        if buckets.insert(bucket.to_string()) {
            info!("Created bucket {}", bucket);
        }
        Ok(())
    }

    async fn execute(&self, op: &Operation) -> Result<()> {
        let payload = match op.kind {
            OperationKind::Put => op.size,
            OperationKind::UpdateMetadata => metadata_value(op.size as usize).len() as u64,
            OperationKind::Get | OperationKind::Head | OperationKind::Delete => 0,
        };
        debug!("{} {}/{} ({} bytes)", op.kind, op.bucket, op.key, payload);

        self.executed[op.kind.index()].fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(payload, Ordering::Relaxed);
        Ok(())
    }
}
