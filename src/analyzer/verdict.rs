use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::classifier::ErrorCategory;
use crate::error::AnalysisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Retry,
    RetryWithParams,
    Notify,
    Escalate,
    Ignore,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Fallback severity when no advisory verdict is available.
    pub fn default_for(category: ErrorCategory) -> Self {
        match category {
            ErrorCategory::Permission | ErrorCategory::Syntax | ErrorCategory::DataMissing => {
                Self::Critical
            }
            ErrorCategory::ResourceExhaustion | ErrorCategory::Network => Self::High,
            ErrorCategory::Timeout | ErrorCategory::Unknown => Self::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structure the model is asked to produce. The schema derived from this type
/// is embedded in the analysis prompt; anything that fails to deserialize is
/// an [`AnalysisError::Format`], never an ad hoc dictionary walk.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RawVerdict {
    pub error_category: String,
    pub recommendation: RecommendedAction,
    pub severity: Severity,
    #[serde(default)]
    pub root_cause: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub suggested_params: Option<HashMap<String, serde_json::Value>>,
}

/// Parsed, strongly-typed advisory verdict.
#[derive(Debug, Clone)]
pub struct LlmVerdict {
    pub category: ErrorCategory,
    pub recommendation: RecommendedAction,
    pub severity: Severity,
    pub suggested_params: Option<HashMap<String, serde_json::Value>>,
    pub rationale: String,
}

impl LlmVerdict {
    pub fn from_raw(raw: RawVerdict) -> Self {
        let category = parse_category(&raw.error_category);
        let rationale = match (raw.root_cause, raw.reason) {
            (Some(cause), Some(reason)) => format!("{cause}; {reason}"),
            (Some(one), None) | (None, Some(one)) => one,
            (None, None) => "no rationale provided".to_string(),
        };
        Self {
            category,
            recommendation: raw.recommendation,
            severity: raw.severity,
            suggested_params: raw.suggested_params,
            rationale,
        }
    }

    pub fn parse_json(body: &str) -> std::result::Result<Self, AnalysisError> {
        let raw: RawVerdict = serde_json::from_str(body)
            .map_err(|e| AnalysisError::Format(format!("verdict did not parse: {e}")))?;
        Ok(Self::from_raw(raw))
    }
}

/// Lenient mapping of the model's free-form category label. Unrecognized
/// labels become `unknown`, which makes the pattern verdict win.
fn parse_category(label: &str) -> ErrorCategory {
    let label = label.to_lowercase();
    if label.contains("timeout") || label.contains("deadline") {
        ErrorCategory::Timeout
    } else if label.contains("resource") || label.contains("memory") || label.contains("oom") {
        ErrorCategory::ResourceExhaustion
    } else if label.contains("permission") || label.contains("auth") || label.contains("access") {
        ErrorCategory::Permission
    } else if label.contains("syntax") || label.contains("parse") || label.contains("compil") {
        ErrorCategory::Syntax
    } else if label.contains("network") || label.contains("connection") || label.contains("dns") {
        ErrorCategory::Network
    } else if label.contains("data") || label.contains("missing") || label.contains("not_found") {
        ErrorCategory::DataMissing
    } else {
        ErrorCategory::Unknown
    }
}
