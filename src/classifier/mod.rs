//! Deterministic keyword classification of error text.
//!
//! This is the fallback of record: it never fails, and the decision engine
//! relies on it alone whenever the LLM analyzer is unavailable.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Timeout,
    ResourceExhaustion,
    Permission,
    Syntax,
    Network,
    DataMissing,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ResourceExhaustion => "resource_exhaustion",
            Self::Permission => "permission",
            Self::Syntax => "syntax",
            Self::Network => "network",
            Self::DataMissing => "data_missing",
            Self::Unknown => "unknown",
        }
    }

    /// Categories that are never retried automatically. No transient fix
    /// exists without a human or a code change.
    pub fn is_retry_immune(&self) -> bool {
        matches!(self, Self::Permission | Self::Syntax | Self::DataMissing)
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one classification pass. Recomputed on every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierVerdict {
    pub category: ErrorCategory,
    pub matched_keyword: Option<String>,
}

impl ClassifierVerdict {
    fn unknown() -> Self {
        Self {
            category: ErrorCategory::Unknown,
            matched_keyword: None,
        }
    }
}

/// Ordered keyword table. First category with any match wins, so the order
/// here is the tie-break when an error string mentions several plausible
/// causes ("permission denied reading missing file" resolves to permission).
pub struct PatternClassifier {
    table: Vec<(ErrorCategory, Vec<String>)>,
}

impl Default for PatternClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternClassifier {
    pub fn new() -> Self {
        let table = vec![
            (
                ErrorCategory::Permission,
                keywords(&[
                    "permission denied",
                    "access denied",
                    "accessdenied",
                    "lacks permission",
                    "unauthorized",
                    "forbidden",
                ]),
            ),
            (
                ErrorCategory::DataMissing,
                keywords(&[
                    "no such file",
                    "file not found",
                    "not found",
                    "does not exist",
                ]),
            ),
            (
                ErrorCategory::Syntax,
                keywords(&[
                    "syntax error",
                    "parse error",
                    "parseexception",
                    "compilation failed",
                    "invalid syntax",
                ]),
            ),
            (
                ErrorCategory::ResourceExhaustion,
                keywords(&[
                    "out of memory",
                    "outofmemory",
                    "heap space",
                    "disk space",
                    "resource exhausted",
                    "insufficient resources",
                ]),
            ),
            (
                ErrorCategory::Network,
                keywords(&[
                    "connection refused",
                    "connection reset",
                    "network error",
                    "network unreachable",
                    "dns resolution",
                ]),
            ),
            (
                ErrorCategory::Timeout,
                keywords(&["timeout", "timed out", "deadline exceeded"]),
            ),
        ];
        Self { table }
    }

    /// Build a classifier from a custom table. Entries keep the given order.
    pub fn with_table(table: Vec<(ErrorCategory, Vec<String>)>) -> Self {
        Self { table }
    }

    /// Case-insensitive substring match against the ordered table.
    /// Absence of a match is not an error: the verdict is `unknown`.
    pub fn classify(&self, error_text: &str) -> ClassifierVerdict {
        let lowered = error_text.to_lowercase();

        for (category, words) in &self.table {
            if let Some(hit) = words.iter().find(|w| lowered.contains(w.as_str())) {
                return ClassifierVerdict {
                    category: *category,
                    matched_keyword: Some(hit.clone()),
                };
            }
        }

        ClassifierVerdict::unknown()
    }
}

fn keywords(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_classification() {
        let classifier = PatternClassifier::new();
        let verdict = classifier.classify("Connection timeout after 30 seconds");
        assert_eq!(verdict.category, ErrorCategory::Timeout);
        assert_eq!(verdict.matched_keyword.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_resource_exhaustion() {
        let classifier = PatternClassifier::new();
        let verdict = classifier.classify("OutOfMemoryError: Java heap space");
        assert_eq!(verdict.category, ErrorCategory::ResourceExhaustion);
    }

    #[test]
    fn test_permission_beats_data_missing() {
        // Priority order resolves multi-keyword strings deterministically
        let classifier = PatternClassifier::new();
        let verdict = classifier.classify("permission denied reading missing file: not found");
        assert_eq!(verdict.category, ErrorCategory::Permission);
    }

    #[test]
    fn test_data_missing() {
        let classifier = PatternClassifier::new();
        let verdict = classifier.classify("table not found: sales.orders");
        assert_eq!(verdict.category, ErrorCategory::DataMissing);
        assert_eq!(verdict.matched_keyword.as_deref(), Some("not found"));
    }

    #[test]
    fn test_access_denied_exception() {
        let classifier = PatternClassifier::new();
        let verdict = classifier.classify("AccessDeniedException: user lacks permission");
        assert_eq!(verdict.category, ErrorCategory::Permission);
    }

    #[test]
    fn test_no_match_is_unknown() {
        let classifier = PatternClassifier::new();
        let verdict = classifier.classify("something completely unexpected happened");
        assert_eq!(verdict.category, ErrorCategory::Unknown);
        assert!(verdict.matched_keyword.is_none());
    }

    #[test]
    fn test_classification_is_idempotent() {
        let classifier = PatternClassifier::new();
        let text = "deadline exceeded while polling cluster";
        assert_eq!(classifier.classify(text), classifier.classify(text));
    }

    #[test]
    fn test_case_insensitive() {
        let classifier = PatternClassifier::new();
        let verdict = classifier.classify("CONNECTION REFUSED by upstream");
        assert_eq!(verdict.category, ErrorCategory::Network);
    }
}
