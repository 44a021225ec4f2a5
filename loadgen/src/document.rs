//! Decoding of workload documents.
//!
//! A workload document is a JSON object whose first member selects the mode:
//!
//! ```json
//! {"mixedWorkload": [{"operationType": "put", "ratio": 50}, {"operationType": "get", "ratio": 50}]}
//! {"replay": [[{"op": "put", "size": 1024, "bucket": "b", "key": "k"}], [...]]}
//! ```
//!
//! The mode may also be given explicitly as `{"op": "replay", "batches": [...]}`.
//! Replay payloads are never held in memory as a whole: batches are decoded one
//! at a time and pushed onto a bounded channel as soon as they are complete.
//! A document that turns out to be malformed cancels the run's abort token
//! before the batch channel closes, so no consumer mistakes a failed decode for
//! the end of the trace.

use anyhow::{Context, Result};
use serde::de::{self, DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::Deserializer as _;
use std::io::Read;
use std::{fmt, str};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::mixed::RatioEntry;
use crate::op::Operation;

/// Decoded batches allowed to wait for dispatch before decoding pauses
pub const BATCH_QUEUE_CAPACITY: usize = 1000;

/// Member name that carries the mode explicitly
const MODE_FIELD: &str = "op";

pub type BatchSender = mpsc::Sender<Vec<Operation>>;
pub type BatchReceiver = mpsc::Receiver<Vec<Operation>>;

/// The two kinds of workload a document can describe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadMode {
    Mixed,
    Replay,
}

impl WorkloadMode {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkloadMode::Mixed => "mixedWorkload",
            WorkloadMode::Replay => "replay",
        }
    }
}

impl fmt::Display for WorkloadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl str::FromStr for WorkloadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mixedWorkload" => Ok(WorkloadMode::Mixed),
            "replay" => Ok(WorkloadMode::Replay),
            other => Err(format!(
                "Incorrect workload type '{}' specified, must be one of 'mixedWorkload' or 'replay'",
                other
            )),
        }
    }
}

/// Workload handed to the orchestrator once the mode is known
pub enum Workload {
    /// Ratio specification, read in full
    Mixed(Vec<RatioEntry>),
    /// Stream of replay batches, closed when the document is exhausted
    Replay(BatchReceiver),
}

/// What the decoder consumed from the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeSummary {
    pub mode: WorkloadMode,
    pub batches: u64,
    pub operations: u64,
}

/// Decode a workload document from `reader`.
///
/// The workload is announced on `workload_tx` as soon as the mode is known. For
/// replay documents the call then keeps decoding batches into the announced
/// channel, blocking while `batch_capacity` batches are pending, so it must run
/// on a blocking thread. Any decode failure cancels `abort`.
pub fn decode_document<R: Read>(
    reader: R,
    workload_tx: oneshot::Sender<Workload>,
    batch_capacity: usize,
    abort: &CancellationToken,
) -> Result<DecodeSummary> {
    let (batch_tx, batch_rx) = mpsc::channel(batch_capacity);
    let result = decode_with(reader, workload_tx, &batch_tx, batch_rx);
    if result.is_err() {
        abort.cancel();
    }
    // Only now may the consumer observe the end of the batch stream
    drop(batch_tx);
    result
}

fn decode_with<R: Read>(
    reader: R,
    workload_tx: oneshot::Sender<Workload>,
    batch_tx: &BatchSender,
    batch_rx: BatchReceiver,
) -> Result<DecodeSummary> {
    let mut de = serde_json::Deserializer::from_reader(reader);
    let summary = (&mut de)
        .deserialize_map(DocumentVisitor {
            workload_tx,
            batch_tx,
            batch_rx,
        })
        .context("Failed to decode workload document")?;
    de.end()
        .context("Unexpected trailing content after workload document")?;
    Ok(summary)
}

struct DocumentVisitor<'a> {
    workload_tx: oneshot::Sender<Workload>,
    batch_tx: &'a BatchSender,
    /// Handed out with the announcement of a replay workload
    batch_rx: BatchReceiver,
}

fn announce<E: de::Error>(workload_tx: oneshot::Sender<Workload>, workload: Workload) -> Result<(), E> {
    workload_tx
        .send(workload)
        .map_err(|_| E::custom("workload orchestrator is gone"))
}

impl<'de> Visitor<'de> for DocumentVisitor<'_> {
    type Value = DecodeSummary;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a workload object keyed by 'mixedWorkload' or 'replay'")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let DocumentVisitor {
            workload_tx,
            batch_tx,
            batch_rx,
        } = self;

        let first: String = map
            .next_key()?
            .ok_or_else(|| <A::Error as de::Error>::custom("workload document is empty"))?;

        let mode_name = if first == MODE_FIELD {
            let mode_name: String = map.next_value()?;
            map.next_key::<IgnoredAny>()?.ok_or_else(|| {
                <A::Error as de::Error>::custom("workload document has no payload")
            })?;
            mode_name
        } else {
            first
        };
        let mode: WorkloadMode = mode_name
            .parse()
            .map_err(<A::Error as de::Error>::custom)?;

        let summary = match mode {
            WorkloadMode::Mixed => {
                let ratios: Vec<RatioEntry> = map.next_value()?;
                announce::<A::Error>(workload_tx, Workload::Mixed(ratios))?;
                DecodeSummary {
                    mode,
                    batches: 0,
                    operations: 0,
                }
            }
            WorkloadMode::Replay => {
                announce::<A::Error>(workload_tx, Workload::Replay(batch_rx))?;
                let (batches, operations) = map.next_value_seed(BatchStream { tx: batch_tx })?;
                DecodeSummary {
                    mode,
                    batches,
                    operations,
                }
            }
        };

        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(summary)
    }
}

/// Streams the outer replay array into a batch channel
struct BatchStream<'a> {
    tx: &'a BatchSender,
}

impl<'de> DeserializeSeed<'de> for BatchStream<'_> {
    /// Number of batches and operations decoded
    type Value = (u64, u64);

    fn deserialize<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for BatchStream<'_> {
    type Value = (u64, u64);

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("an array of operation batches")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut batches = 0;
        let mut operations = 0;
        while let Some(batch) = seq.next_element::<Vec<Operation>>()? {
            batches += 1;
            operations += batch.len() as u64;
            self.tx
                .blocking_send(batch)
                .map_err(|_| <A::Error as de::Error>::custom("replay dispatcher stopped"))?;
        }
        Ok((batches, operations))
    }
}
