//! Append-only decision log.
//!
//! One JSONL record per decision, the sole feed for any later fine-tuning
//! or quality analysis. The ledger can be rebuilt from this file after a
//! restart; the log itself is never read on the decision path.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::analyzer::Severity;
use crate::classifier::ErrorCategory;
use crate::engine::{Decision, DecisionAction};
use crate::error::{Result, TriageError};
use crate::ledger::LineageKey;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub timestamp: DateTime<Utc>,
    pub lineage_key: String,
    pub category: ErrorCategory,
    pub action: DecisionAction,
    pub severity: Severity,
    pub rationale: String,
    pub overridden: bool,
    pub attempt_number: u32,
}

impl DecisionRecord {
    pub fn from_decision(lineage: &LineageKey, decision: &Decision) -> Self {
        Self {
            timestamp: decision.timestamp,
            lineage_key: lineage.to_string(),
            category: decision.category,
            action: decision.action,
            severity: decision.severity,
            rationale: decision.rationale.clone(),
            overridden: decision.overridden,
            attempt_number: decision.attempt_number,
        }
    }
}

pub struct DecisionLog {
    path: PathBuf,
    retention_days: i64,
}

impl DecisionLog {
    pub fn new(path: PathBuf, retention_days: i64) -> Self {
        Self {
            path,
            retention_days,
        }
    }

    async fn ensure_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }

    pub async fn append(&self, record: &DecisionRecord) -> Result<()> {
        self.ensure_dir().await?;

        let line = serde_json::to_string(record)
            .map_err(|e| TriageError::Audit(format!("JSON serialize failed: {e}")))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(format!("{line}\n").as_bytes()).await?;
        file.flush().await?;

        debug!(path = %self.path.display(), "Appended decision record");
        Ok(())
    }

    /// Records within the retention window; unparseable lines are skipped
    /// with a warning.
    pub async fn load(&self) -> Result<Vec<DecisionRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path).await?;
        let cutoff = Utc::now() - Duration::days(self.retention_days);

        let records: Vec<DecisionRecord> = content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<DecisionRecord>(line) {
                Ok(record) if record.timestamp >= cutoff => Some(record),
                Ok(_) => None,
                Err(e) => {
                    warn!(line = %line, error = %e, "Skipping invalid decision record");
                    None
                }
            })
            .collect();

        debug!(count = records.len(), "Loaded decision records");
        Ok(records)
    }

    /// Rewrite the file keeping only records inside the retention window.
    /// Returns how many lines were dropped.
    pub async fn compact(&self) -> Result<usize> {
        if !self.path.exists() {
            return Ok(0);
        }

        let content = fs::read_to_string(&self.path).await?;
        let all_lines: Vec<_> = content.lines().filter(|l| !l.trim().is_empty()).collect();
        let original_count = all_lines.len();

        let cutoff = Utc::now() - Duration::days(self.retention_days);
        let valid: Vec<DecisionRecord> = all_lines
            .into_iter()
            .filter_map(|line| serde_json::from_str::<DecisionRecord>(line).ok())
            .filter(|r| r.timestamp >= cutoff)
            .collect();

        if valid.len() == original_count {
            return Ok(0);
        }

        self.ensure_dir().await?;
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
            .await?;

        for record in &valid {
            let line = serde_json::to_string(record)
                .map_err(|e| TriageError::Audit(format!("JSON serialize failed: {e}")))?;
            file.write_all(format!("{line}\n").as_bytes()).await?;
        }
        file.flush().await?;

        let removed = original_count - valid.len();
        debug!(removed, "Compacted decision log");
        Ok(removed)
    }
}
