use serde::{Deserialize, Serialize};
use std::{fmt, str};

/// Storage operation kinds understood by the workload engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperationKind {
    #[serde(rename = "put")]
    Put,
    #[serde(rename = "get")]
    Get,
    #[serde(rename = "head")]
    Head,
    #[serde(rename = "updatemeta", alias = "updateMetadata")]
    UpdateMetadata,
    #[serde(rename = "delete")]
    Delete,
}

impl OperationKind {
    pub const ALL: [OperationKind; 5] = [
        OperationKind::Put,
        OperationKind::Get,
        OperationKind::Head,
        OperationKind::UpdateMetadata,
        OperationKind::Delete,
    ];

    /// Name used in workload documents
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Put => "put",
            OperationKind::Get => "get",
            OperationKind::Head => "head",
            OperationKind::UpdateMetadata => "updatemeta",
            OperationKind::Delete => "delete",
        }
    }

    /// Dense index, used to address per-kind tables
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl str::FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown operation type '{}'", s))
    }
}

/// Order in which bucket and object key are joined into a routing key.
///
/// Replay and mixed workloads join them in opposite orders, so the same logical
/// object is not guaranteed to land on the same worker in both modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOrder {
    /// `bucket + key`, used by replay
    BucketFirst,
    /// `key + bucket`, used by mixed workloads
    KeyFirst,
}

/// A single storage request ready to be handed to a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "op")]
    pub kind: OperationKind,
    pub size: u64,
    pub bucket: String,
    pub key: String,
}

impl Operation {
    pub fn new(
        kind: OperationKind,
        size: u64,
        bucket: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            size,
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Composite key used to pick the worker for this operation
    pub fn routing_key(&self, order: KeyOrder) -> String {
        match order {
            KeyOrder::BucketFirst => format!("{}{}", self.bucket, self.key),
            KeyOrder::KeyFirst => format!("{}{}", self.key, self.bucket),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_from_trace_record() {
        let op: Operation = serde_json::from_str(
            r#"{"op": "updatemeta", "size": 512, "bucket": "photos", "key": "cat.jpg"}"#,
        )
        .unwrap();
        assert_eq!(
            op,
            Operation::new(OperationKind::UpdateMetadata, 512, "photos", "cat.jpg")
        );

        let alias: Operation = serde_json::from_str(
            r#"{"op": "updateMetadata", "size": 1, "bucket": "b", "key": "k"}"#,
        )
        .unwrap();
        assert_eq!(alias.kind, OperationKind::UpdateMetadata);
    }

    #[test]
    fn test_unknown_operation_kind_rejected() {
        let result: Result<Operation, _> =
            serde_json::from_str(r#"{"op": "copy", "size": 1, "bucket": "b", "key": "k"}"#);
        assert!(result.is_err());
        assert!("copy".parse::<OperationKind>().is_err());
        assert_eq!("head".parse::<OperationKind>(), Ok(OperationKind::Head));
    }

    #[test]
    fn test_routing_key_order() {
        let op = Operation::new(OperationKind::Get, 0, "bucket", "obj-1");
        assert_eq!(op.routing_key(KeyOrder::BucketFirst), "bucketobj-1");
        assert_eq!(op.routing_key(KeyOrder::KeyFirst), "obj-1bucket");
    }

    #[test]
    fn test_kind_index_is_dense() {
        for (i, kind) in OperationKind::ALL.into_iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }
}
