//! Per-lineage retry bookkeeping.
//!
//! A lineage is one job+run identity tracked across its automated retries.
//! The ledger is an in-memory cache keyed by lineage; durability belongs to
//! the decision log, and a restarted process may rebuild counts from there.

use std::fmt;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::classifier::ErrorCategory;

/// Identity of a single job+run lineage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineageKey {
    pub job_id: String,
    pub run_id: String,
}

impl LineageKey {
    pub fn new(job_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            run_id: run_id.into(),
        }
    }
}

impl fmt::Display for LineageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.job_id, self.run_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryKind {
    SameParams,
    AdjustedParams,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryRecord {
    pub same_param_retries: u32,
    pub adjusted_param_retries: u32,
    pub last_category: Option<ErrorCategory>,
}

impl RetryRecord {
    pub fn count(&self, kind: RetryKind) -> u32 {
        match kind {
            RetryKind::SameParams => self.same_param_retries,
            RetryKind::AdjustedParams => self.adjusted_param_retries,
        }
    }

    fn count_mut(&mut self, kind: RetryKind) -> &mut u32 {
        match kind {
            RetryKind::SameParams => &mut self.same_param_retries,
            RetryKind::AdjustedParams => &mut self.adjusted_param_retries,
        }
    }
}

/// Keyed retry counters with per-lineage serialization.
///
/// Evaluations for different lineages never block each other; the dashmap
/// entry guard serializes updates for one lineage, so the ceiling check and
/// the increment in [`RetryLedger::try_record_attempt`] are one operation.
#[derive(Debug, Default)]
pub struct RetryLedger {
    records: DashMap<LineageKey, RetryRecord>,
}

impl RetryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current record for a lineage, zeroed if none has been seen.
    pub fn get(&self, key: &LineageKey) -> RetryRecord {
        self.records
            .get(key)
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Read-only ceiling check. Racy by itself across concurrent callers;
    /// the engine uses [`RetryLedger::try_record_attempt`] instead.
    pub fn is_under_ceiling(&self, key: &LineageKey, kind: RetryKind, ceiling: u32) -> bool {
        self.get(key).count(kind) < ceiling
    }

    /// Unconditional increment, e.g. when rebuilding from persisted history.
    pub fn record_attempt(&self, key: &LineageKey, kind: RetryKind) {
        let mut entry = self.records.entry(key.clone()).or_default();
        *entry.count_mut(kind) += 1;
    }

    /// Atomic increment-and-check: increments the counter only while it is
    /// strictly below the ceiling and reports whether it did. Two concurrent
    /// failures for the same lineage cannot both pass the last slot.
    pub fn try_record_attempt(&self, key: &LineageKey, kind: RetryKind, ceiling: u32) -> bool {
        let mut entry = self.records.entry(key.clone()).or_default();
        let count = entry.count_mut(kind);
        if *count >= ceiling {
            return false;
        }
        *count += 1;
        true
    }

    pub fn note_category(&self, key: &LineageKey, category: ErrorCategory) {
        let mut entry = self.records.entry(key.clone()).or_default();
        entry.last_category = Some(category);
    }

    /// Drop a lineage once it succeeded or was escalated. Caller's call; the
    /// ledger itself has no eviction policy.
    pub fn forget(&self, key: &LineageKey) {
        self.records.remove(key);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
