use thiserror::Error;

/// Failure of the advisory LLM analysis.
///
/// Kept separate from [`TriageError`] because the decision engine never
/// propagates these: both variants degrade to pattern-only classification.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Network problem or provider timeout. The analysis may succeed later.
    #[error("transient analysis failure: {0}")]
    Transient(String),

    /// The model returned something that does not parse into a verdict.
    #[error("unparseable analysis response: {0}")]
    Format(String),
}

impl AnalysisError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[derive(Debug, Error)]
pub enum TriageError {
    /// Caller contract violation: the job context is missing the identifiers
    /// needed to form a lineage key. Fails fast, no action is attempted.
    #[error("invalid job context: {0}")]
    InvalidContext(String),

    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("platform authentication failed: {0}")]
    PlatformAuth(String),

    #[error("platform request failed: {0}")]
    Platform(String),

    #[error("action execution failed: {0}")]
    Execution(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("decision log error: {0}")]
    Audit(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, TriageError>;
