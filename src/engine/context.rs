use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TriageError};
use crate::ledger::LineageKey;

/// Identity and platform parameters of the failing unit, owned by the
/// orchestrator for one processing cycle. The decision engine reads it,
/// never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobContext {
    pub job_id: String,
    pub run_id: String,
    /// Starts at 1, incremented by the orchestrator on each retry.
    pub attempt_number: u32,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
}

impl JobContext {
    pub fn new(job_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            run_id: run_id.into(),
            attempt_number: 1,
            parameters: HashMap::new(),
        }
    }

    pub fn with_attempt(mut self, attempt_number: u32) -> Self {
        self.attempt_number = attempt_number;
        self
    }

    pub fn with_parameters(mut self, parameters: HashMap<String, serde_json::Value>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Lineage identity for ceiling tracking. Missing identifiers are a
    /// caller contract violation and fail fast.
    pub fn lineage_key(&self) -> Result<LineageKey> {
        if self.job_id.trim().is_empty() || self.run_id.trim().is_empty() {
            return Err(TriageError::InvalidContext(
                "job_id and run_id must be non-empty".to_string(),
            ));
        }
        Ok(LineageKey::new(self.job_id.clone(), self.run_id.clone()))
    }
}
