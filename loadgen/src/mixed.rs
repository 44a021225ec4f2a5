use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::op::{Operation, OperationKind};

/// Number of generation slots in one full cycle
pub const CYCLE_SLOTS: u64 = 100;

/// One entry of a mixed workload document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatioEntry {
    #[serde(rename = "operationType")]
    pub operation_type: String,
    /// Share of every cycle, in percent
    pub ratio: u32,
}

impl RatioEntry {
    pub fn new(operation_type: impl Into<String>, ratio: u32) -> Self {
        Self {
            operation_type: operation_type.into(),
            ratio,
        }
    }
}

/// Reasons a ratio specification is rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RatioError {
    /// Operation type outside the supported set
    UnknownOperation(String),
    /// Percentages do not add up to exactly 100
    PercentageSum(u64),
}

impl fmt::Display for RatioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RatioError::UnknownOperation(op) => write!(
                f,
                "Mixed workload operation types must be one of {{'put','get','delete','updatemeta','head'}}, but got '{}'",
                op
            ),
            RatioError::PercentageSum(sum) => write!(
                f,
                "Percentage of operations must sum to 100, but sums to {}",
                sum
            ),
        }
    }
}

impl std::error::Error for RatioError {}

/// A validated ratio entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MixRatio {
    pub kind: OperationKind,
    pub ratio: u32,
}

/// Check a ratio specification before anything is generated
pub fn validate_ratios(entries: &[RatioEntry]) -> Result<Vec<MixRatio>, RatioError> {
    let mut ratios = Vec::with_capacity(entries.len());
    let mut total: u64 = 0;

    for entry in entries {
        let kind = entry
            .operation_type
            .parse::<OperationKind>()
            .map_err(|_| RatioError::UnknownOperation(entry.operation_type.clone()))?;
        total += entry.ratio as u64;
        ratios.push(MixRatio {
            kind,
            ratio: entry.ratio,
        });
    }

    if total != 100 {
        return Err(RatioError::PercentageSum(total));
    }

    Ok(ratios)
}

/// How the numeric suffix of generated object keys advances
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum KeyNumbering {
    /// Each kind counts up for the whole run, keys of one kind never repeat
    #[default]
    Continuous,
    /// Each ratio entry restarts at zero every cycle, matching traces recorded by
    /// older tooling. Entries sharing a kind reuse the same keys.
    PerCycle,
}

/// Parameters of the generated operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixedSettings {
    pub total_requests: u64,
    pub object_size: u64,
    pub bucket: String,
    pub key_prefix: String,
    pub key_numbering: KeyNumbering,
}

/// Operations of one kind to generate in a cycle with the given slot budget
fn cycle_quota(ratio: u32, budget: u64) -> u64 {
    ratio as u64 * budget / 100
}

/// Synthesizes operations cycle by cycle according to a ratio mix.
///
/// Each cycle has a budget of `min(100, remaining)` slots and every ratio entry
/// receives `floor(ratio * budget / 100)` of them. The floor is never
/// compensated, so the total can fall short of `total_requests`.
pub struct MixedGenerator {
    ratios: Vec<MixRatio>,
    settings: MixedSettings,
    /// Key counter per operation kind
    counters: [u64; OperationKind::ALL.len()],
    cycles: u64,
    cycle: u64,
    budget: u64,
    /// Ratio entry currently being emitted
    entry: usize,
    /// Operations emitted for the current entry in this cycle
    emitted: u64,
    sent: u64,
}

impl MixedGenerator {
    pub fn new(ratios: Vec<MixRatio>, settings: MixedSettings) -> Self {
        let cycles = settings.total_requests.div_ceil(CYCLE_SLOTS);
        let entry = ratios.len();
        Self {
            counters: [0; OperationKind::ALL.len()],
            ratios,
            settings,
            cycles,
            cycle: 0,
            budget: 0,
            entry,
            emitted: 0,
            sent: 0,
        }
    }

    /// Number of cycles the generator will run
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Operations emitted so far
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Total number of operations the generator will emit.
    ///
    /// Ratios sum to 100, so every full cycle emits exactly `CYCLE_SLOTS`
    /// operations and only the last partial cycle can fall short.
    pub fn planned_operations(&self) -> u64 {
        let total = self.settings.total_requests;
        let quota = |budget: u64| -> u64 {
            self.ratios
                .iter()
                .map(|r| cycle_quota(r.ratio, budget))
                .sum()
        };
        (total / CYCLE_SLOTS) * quota(CYCLE_SLOTS) + quota(total % CYCLE_SLOTS)
    }

    fn start_cycle(&mut self) -> bool {
        if self.cycle >= self.cycles {
            return false;
        }
        self.cycle += 1;
        self.budget = CYCLE_SLOTS.min(self.settings.total_requests.saturating_sub(self.sent));
        self.entry = 0;
        self.emitted = 0;
        true
    }

    fn next_key(&mut self, kind: OperationKind) -> String {
        let n = match self.settings.key_numbering {
            KeyNumbering::Continuous => {
                let counter = &mut self.counters[kind.index()];
                *counter += 1;
                *counter - 1
            }
            // Every ratio entry numbers its keys from zero in each cycle
            KeyNumbering::PerCycle => self.emitted,
        };
        format!("{}-{}", self.settings.key_prefix, n)
    }
}

impl Iterator for MixedGenerator {
    type Item = Operation;

    fn next(&mut self) -> Option<Operation> {
        loop {
            if self.entry >= self.ratios.len() {
                if !self.start_cycle() {
                    return None;
                }
                continue;
            }

            let ratio = self.ratios[self.entry];
            if self.emitted < cycle_quota(ratio.ratio, self.budget) {
                let key = self.next_key(ratio.kind);
                self.emitted += 1;
                self.sent += 1;
                return Some(Operation::new(
                    ratio.kind,
                    self.settings.object_size,
                    self.settings.bucket.clone(),
                    key,
                ));
            }

            self.entry += 1;
            self.emitted = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    fn settings(total_requests: u64) -> MixedSettings {
        MixedSettings {
            total_requests,
            object_size: 4096,
            bucket: "bench".to_string(),
            key_prefix: "obj".to_string(),
            key_numbering: KeyNumbering::Continuous,
        }
    }

    fn ratios(entries: &[(&str, u32)]) -> Vec<MixRatio> {
        let entries: Vec<RatioEntry> = entries
            .iter()
            .map(|(op, ratio)| RatioEntry::new(*op, *ratio))
            .collect();
        validate_ratios(&entries).unwrap()
    }

    /// Collapse consecutive operations of the same kind into (kind, count) runs
    fn runs(ops: &[Operation]) -> Vec<(OperationKind, usize)> {
        let mut runs: Vec<(OperationKind, usize)> = Vec::new();
        for op in ops {
            match runs.last_mut() {
                Some((kind, count)) if *kind == op.kind => *count += 1,
                _ => runs.push((op.kind, 1)),
            }
        }
        runs
    }

    #[test]
    fn test_validate_rejects_bad_sums() {
        let low = vec![RatioEntry::new("put", 49), RatioEntry::new("get", 50)];
        assert_eq!(validate_ratios(&low), Err(RatioError::PercentageSum(99)));

        let high = vec![RatioEntry::new("put", 51), RatioEntry::new("get", 50)];
        assert_eq!(validate_ratios(&high), Err(RatioError::PercentageSum(101)));

        assert_eq!(validate_ratios(&[]), Err(RatioError::PercentageSum(0)));
    }

    #[test]
    fn test_validate_rejects_unknown_kind() {
        let entries = vec![RatioEntry::new("put", 50), RatioEntry::new("copy", 50)];
        let err = validate_ratios(&entries).unwrap_err();
        assert_eq!(err, RatioError::UnknownOperation("copy".to_string()));
        assert!(err.to_string().contains("'copy'"));
    }

    #[test]
    fn test_validate_accepts_all_kinds() {
        let mix = ratios(&[
            ("put", 20),
            ("get", 20),
            ("head", 20),
            ("updatemeta", 20),
            ("delete", 20),
        ]);
        let kinds: Vec<OperationKind> = mix.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, OperationKind::ALL.to_vec());
    }

    #[test]
    fn test_cycles_with_partial_last_cycle() {
        let generator = MixedGenerator::new(ratios(&[("put", 50), ("get", 50)]), settings(250));
        assert_eq!(generator.cycles(), 3);
        assert_eq!(generator.planned_operations(), 250);

        let ops: Vec<Operation> = generator.collect();
        assert_eq!(
            runs(&ops),
            vec![
                (OperationKind::Put, 50),
                (OperationKind::Get, 50),
                (OperationKind::Put, 50),
                (OperationKind::Get, 50),
                (OperationKind::Put, 25),
                (OperationKind::Get, 25),
            ]
        );
    }

    #[test]
    fn test_fractional_ratios_exact_total() {
        let generator = MixedGenerator::new(
            ratios(&[("put", 33), ("get", 33), ("delete", 34)]),
            settings(100),
        );
        let ops: Vec<Operation> = generator.collect();
        assert_eq!(ops.len(), 100);
        assert_eq!(
            runs(&ops),
            vec![
                (OperationKind::Put, 33),
                (OperationKind::Get, 33),
                (OperationKind::Delete, 34),
            ]
        );
    }

    #[test]
    fn test_under_generation_is_not_compensated() {
        let mix = ratios(&[
            ("put", 1),
            ("get", 1),
            ("head", 1),
            ("updatemeta", 1),
            ("delete", 96),
        ]);
        let generator = MixedGenerator::new(mix, settings(3));
        assert_eq!(generator.planned_operations(), 2);

        let ops: Vec<Operation> = generator.collect();
        assert_eq!(ops.len(), 2);
        assert!(ops.iter().all(|op| op.kind == OperationKind::Delete));
    }

    #[test]
    fn test_generated_operation_fields() {
        let mut generator = MixedGenerator::new(ratios(&[("head", 100)]), settings(2));
        let first = generator.next().unwrap();
        assert_eq!(first, Operation::new(OperationKind::Head, 4096, "bench", "obj-0"));
        let second = generator.next().unwrap();
        assert_eq!(second.key, "obj-1");
        assert!(generator.next().is_none());
        assert_eq!(generator.sent(), 2);
    }

    #[test]
    fn test_continuous_keys_unique_per_kind() {
        let generator =
            MixedGenerator::new(ratios(&[("put", 70), ("get", 30)]), settings(1050));
        let mut keys: HashMap<OperationKind, HashSet<String>> = HashMap::new();
        let mut total = 0;
        for op in generator {
            total += 1;
            assert!(
                keys.entry(op.kind).or_default().insert(op.key.clone()),
                "duplicate key {} for {}",
                op.key,
                op.kind
            );
        }
        assert_eq!(total, 1050);
        assert_eq!(keys[&OperationKind::Put].len(), 735);
        assert!(keys[&OperationKind::Put].contains("obj-734"));
        assert_eq!(keys[&OperationKind::Get].len(), 315);
    }

    #[test]
    fn test_per_cycle_numbering_restarts() {
        let mut s = settings(200);
        s.key_numbering = KeyNumbering::PerCycle;
        let ops: Vec<Operation> = MixedGenerator::new(ratios(&[("put", 100)]), s).collect();
        assert_eq!(ops.len(), 200);
        assert_eq!(ops[0].key, "obj-0");
        assert_eq!(ops[99].key, "obj-99");
        assert_eq!(ops[100].key, "obj-0");
    }

    #[test]
    fn test_per_cycle_numbering_is_per_entry() {
        let mut s = settings(100);
        s.key_numbering = KeyNumbering::PerCycle;
        let mix = ratios(&[("put", 50), ("get", 25), ("put", 25)]);
        let ops: Vec<Operation> = MixedGenerator::new(mix, s).collect();

        assert_eq!(ops[0].key, "obj-0");
        assert_eq!(ops[49].key, "obj-49");
        assert_eq!(ops[50], Operation::new(OperationKind::Get, 4096, "bench", "obj-0"));
        // The second put entry starts over and repeats keys of the first one
        assert_eq!(ops[75], Operation::new(OperationKind::Put, 4096, "bench", "obj-0"));
        assert_eq!(ops[99].key, "obj-24");
    }

    #[test]
    fn test_planned_operations_matches_generation() {
        let mixes = [
            ratios(&[("put", 50), ("get", 50)]),
            ratios(&[("put", 33), ("get", 33), ("delete", 34)]),
            ratios(&[("put", 1), ("get", 1), ("head", 1), ("updatemeta", 1), ("delete", 96)]),
            ratios(&[("put", 7), ("head", 13), ("delete", 80)]),
        ];
        for mix in mixes {
            for total in [0, 1, 3, 99, 100, 101, 257, 1000] {
                let generator = MixedGenerator::new(mix.clone(), settings(total));
                let planned = generator.planned_operations();
                assert_eq!(planned, generator.count() as u64, "total {}", total);
            }
        }
    }

    #[test]
    fn test_planned_operations_for_huge_totals() {
        let generator = MixedGenerator::new(
            ratios(&[("put", 33), ("get", 33), ("delete", 34)]),
            settings(1_000_000_000_000_007),
        );
        // 7 leftover slots: floor(2.31) + floor(2.31) + floor(2.38)
        assert_eq!(generator.planned_operations(), 1_000_000_000_000_006);
        assert_eq!(generator.cycles(), 10_000_000_000_001);
    }

    #[test]
    fn test_repeated_kind_shares_counter() {
        let mix = ratios(&[("put", 50), ("get", 25), ("put", 25)]);
        let ops: Vec<Operation> = MixedGenerator::new(mix, settings(100)).collect();
        let puts: HashSet<&str> = ops
            .iter()
            .filter(|op| op.kind == OperationKind::Put)
            .map(|op| op.key.as_str())
            .collect();
        assert_eq!(puts.len(), 75);
    }

    #[test]
    fn test_zero_requests_generates_nothing() {
        let mut generator = MixedGenerator::new(ratios(&[("put", 100)]), settings(0));
        assert_eq!(generator.cycles(), 0);
        assert!(generator.next().is_none());
    }

    #[test]
    fn test_ratio_entry_document_names() {
        let entries: Vec<RatioEntry> =
            serde_json::from_str(r#"[{"operationType": "put", "ratio": 60}, {"operationType": "get", "ratio": 40}]"#)
                .unwrap();
        assert_eq!(
            entries,
            vec![RatioEntry::new("put", 60), RatioEntry::new("get", 40)]
        );
    }
}
