use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analyzer::Severity;
use crate::classifier::ErrorCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Retry,
    RetryWithParams,
    Notify,
    Escalate,
    Ignore,
}

impl DecisionAction {
    pub fn is_retry(&self) -> bool {
        matches!(self, Self::Retry | Self::RetryWithParams)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retry => "retry",
            Self::RetryWithParams => "retry_with_params",
            Self::Notify => "notify",
            Self::Escalate => "escalate",
            Self::Ignore => "ignore",
        }
    }
}

impl std::fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final output of one evaluation.
///
/// Invariant: `retry`/`retry_with_params` are only produced while the
/// relevant retry counter is strictly below its ceiling; at or above it the
/// engine always produces `escalate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub action: DecisionAction,
    pub category: ErrorCategory,
    pub severity: Severity,
    /// Validated parameter mapping, present only for `retry_with_params`
    /// when the advisor suggested one.
    pub parameters: Option<HashMap<String, serde_json::Value>>,
    /// Pattern basis, advisory summary and any policy overrides, readable
    /// enough for a human to reconstruct why automation stopped.
    pub rationale: String,
    /// Whether policy overrode the advisor's raw suggestion.
    pub overridden: bool,
    pub override_reason: Option<String>,
    /// The advisory analysis was unavailable and the pattern verdict alone
    /// drove this decision.
    pub degraded_analysis: bool,
    pub attempt_number: u32,
    pub timestamp: DateTime<Utc>,
}
