use histogram::AtomicHistogram;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

use crate::op::OperationKind;

/// Constants for metrics
const DEFAULT_HISTOGRAM_PRECISION: u8 = 3;
const DEFAULT_HISTOGRAM_MAX_VALUE_BITS: u8 = 32; // 2^32 ns ~= 4.3 seconds

const KINDS: usize = OperationKind::ALL.len();

/// Metrics collector shared by all workers
pub struct Metrics {
    // Operation counters
    total_ops: AtomicU64,
    successful_ops: AtomicU64,

    // Rejected operations per kind
    failed_ops: [AtomicU64; KINDS],

    // Latency histogram per operation kind (in nanoseconds)
    latency: [LatencyHistogram; KINDS],
}

/// Counters and latency percentiles of one operation kind
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct KindLatency {
    pub count: u64,
    pub failed: u64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

/// A snapshot of the metrics at a point in time
pub struct MetricsSnapshot {
    pub total_ops: u64,
    pub successful_ops: u64,
    pub throughput: f64,
    pub success_rate: f64,

    pub per_kind: [KindLatency; KINDS],

    // Overall latency
    pub avg_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
}

/// A histogram for tracking latencies
struct LatencyHistogram {
    hist: AtomicHistogram,
}

impl LatencyHistogram {
    fn new() -> Self {
        Self {
            hist: AtomicHistogram::new(
                DEFAULT_HISTOGRAM_PRECISION,
                DEFAULT_HISTOGRAM_MAX_VALUE_BITS,
            )
            .expect("Failed to create histogram"),
        }
    }

    /// Record a latency value
    fn record(&self, latency: Duration) {
        let nanos = latency.as_nanos() as u64;
        if let Err(e) = self.hist.increment(nanos) {
            // Just log and continue if we can't record the latency
            tracing::warn!("Failed to record latency {}: {}", nanos, e);
        }
    }

    /// Get the percentile in milliseconds
    fn percentile_ms(&self, p: f64) -> f64 {
        if let Ok(bucket) = self.hist.snapshot().percentile(p) {
            let mid = (bucket.start() + bucket.end()) / 2;
            Duration::from_nanos(mid).as_secs_f64() * 1000.0
        } else {
            0.0
        }
    }

    /// Get the count of recorded values
    fn count(&self) -> u64 {
        self.hist.snapshot().into_iter().map(|b| b.count()).sum()
    }

    fn summary(&self) -> KindLatency {
        KindLatency {
            count: self.count(),
            failed: 0,
            p50_ms: self.percentile_ms(50.0),
            p95_ms: self.percentile_ms(95.0),
            p99_ms: self.percentile_ms(99.0),
        }
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            total_ops: AtomicU64::new(0),
            successful_ops: AtomicU64::new(0),
            failed_ops: Default::default(),
            latency: Default::default(),
        }
    }

    /// Record a successful operation
    pub fn record_success(&self, kind: OperationKind, latency: Duration) {
        self.total_ops.fetch_add(1, Ordering::Relaxed);
        self.successful_ops.fetch_add(1, Ordering::Relaxed);
        self.latency[kind.index()].record(latency);
    }

    /// Record an operation the backend rejected
    pub fn record_failure(&self, kind: OperationKind) {
        self.total_ops.fetch_add(1, Ordering::Relaxed);
        self.failed_ops[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Create a snapshot of the current metrics
    pub fn snapshot(&self, elapsed: Duration) -> MetricsSnapshot {
        let total_ops = self.total_ops.load(Ordering::Relaxed);
        let successful_ops = self.successful_ops.load(Ordering::Relaxed);

        let throughput = if elapsed.as_secs_f64() > 0.0 {
            total_ops as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let success_rate = if total_ops > 0 {
            successful_ops as f64 / total_ops as f64 * 100.0
        } else {
            0.0
        };

        let per_kind: [KindLatency; KINDS] = std::array::from_fn(|i| KindLatency {
            failed: self.failed_ops[i].load(Ordering::Relaxed),
            ..self.latency[i].summary()
        });

        // Weighted average of the per-kind medians
        let total_count: u64 = per_kind.iter().map(|k| k.count).sum();
        let avg_latency_ms = if total_count > 0 {
            per_kind
                .iter()
                .map(|k| k.p50_ms * k.count as f64)
                .sum::<f64>()
                / total_count as f64
        } else {
            0.0
        };

        // Simple approximation of p95 and p99 overall
        let p95_latency_ms = per_kind.iter().fold(0.0_f64, |a, k| a.max(k.p95_ms));
        let p99_latency_ms = per_kind.iter().fold(0.0_f64, |a, k| a.max(k.p99_ms));

        MetricsSnapshot {
            total_ops,
            successful_ops,
            throughput,
            success_rate,
            per_kind,
            avg_latency_ms,
            p95_latency_ms,
            p99_latency_ms,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSnapshot {
    /// Check if the run is complete (all operations have been executed)
    pub fn is_complete(&self, total_ops: u64) -> bool {
        self.total_ops >= total_ops
    }

    pub fn kind(&self, kind: OperationKind) -> &KindLatency {
        &self.per_kind[kind.index()]
    }

    /// Format the snapshot as a JSON string
    pub fn to_json(&self) -> String {
        let mut latency = Map::new();
        latency.insert(
            "overall".to_string(),
            json!({
                "avg": self.avg_latency_ms,
                "p95": self.p95_latency_ms,
                "p99": self.p99_latency_ms
            }),
        );
        for kind in OperationKind::ALL {
            let k = self.kind(kind);
            latency.insert(
                kind.as_str().to_string(),
                json!({
                    "count": k.count,
                    "failed": k.failed,
                    "p50": k.p50_ms,
                    "p95": k.p95_ms,
                    "p99": k.p99_ms
                }),
            );
        }

        json!({
            "total_ops": self.total_ops,
            "successful_ops": self.successful_ops,
            "throughput": self.throughput,
            "success_rate": self.success_rate,
            "latency_ms": Value::Object(latency)
        })
        .to_string()
    }

    /// Log the snapshot in a human-readable format
    pub fn show(&self) {
        info!("Workload Results:");
        info!("=================");
        info!("Operations: {}", self.total_ops);
        info!(
            "Successful: {} ({:.2}%)",
            self.successful_ops, self.success_rate
        );
        info!("Throughput: {:.2} ops/sec", self.throughput);
        info!("Latency (ms):");
        info!("-------------");
        info!(
            "Overall: avg={:.2}, p95={:.2}, p99={:.2}",
            self.avg_latency_ms, self.p95_latency_ms, self.p99_latency_ms
        );
        for kind in OperationKind::ALL {
            let k = self.kind(kind);
            if k.count == 0 && k.failed == 0 {
                continue;
            }
            info!(
                "{}: n={}, failed={}, p50={:.2}, p95={:.2}, p99={:.2}",
                kind.as_str().to_uppercase(),
                k.count,
                k.failed,
                k.p50_ms,
                k.p95_ms,
                k.p99_ms
            );
        }
    }
}
