use std::fmt;

use serde_json::{Value as JsonValue, json};

use crate::reconcile::{RenameOutcome, RenamePair};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairResult {
    /// Zero-based position of the pair in both lists.
    pub index: usize,
    pub pair: RenamePair,
    pub outcome: RenameOutcome,
}

impl PairResult {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, RenameOutcome::Failed(_))
    }

    pub fn to_json(&self) -> JsonValue {
        let mut event = json!({
            "line": self.index + 1,
            "original": self.pair.original,
            "desired": self.pair.desired,
            "outcome": self.outcome.label(),
        });
        if let RenameOutcome::Failed(reason) = self.outcome {
            event["reason"] = JsonValue::String(reason.to_string());
        }
        event
    }
}

/// Outcome of every pair of one run, in list order.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationReport {
    results: Vec<PairResult>,
    skipped: usize,
    applied: usize,
    failed: usize,
}

impl ReconciliationReport {
    pub fn new(results: Vec<PairResult>) -> Self {
        let mut report = Self {
            results,
            ..Self::default()
        };
        for result in &report.results {
            match result.outcome {
                RenameOutcome::Skipped => report.skipped += 1,
                RenameOutcome::Applied => report.applied += 1,
                RenameOutcome::Failed(_) => report.failed += 1,
            }
        }
        report
    }

    pub fn results(&self) -> &[PairResult] {
        &self.results
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn applied(&self) -> usize {
        self.applied
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &PairResult> {
        self.results.iter().filter(|result| result.is_failure())
    }

    pub fn to_json(&self) -> JsonValue {
        json!({
            "total": self.total(),
            "applied": self.applied,
            "skipped": self.skipped,
            "failed": self.failed,
            "failures": self.failures().map(PairResult::to_json).collect::<Vec<_>>(),
        })
    }
}

impl fmt::Display for ReconciliationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rename summary: total={}, applied={}, skipped={}, failed={}",
            self.total(),
            self.applied,
            self.skipped,
            self.failed
        )?;
        for result in self.failures() {
            if let RenameOutcome::Failed(reason) = result.outcome {
                write!(
                    f,
                    "\n  line {}: {} -> {}: {reason}",
                    result.index + 1,
                    result.pair.original,
                    result.pair.desired
                )?;
            }
        }
        Ok(())
    }
}
