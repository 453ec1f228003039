//! Compute-platform collaborator: fetch failure details, resubmit runs,
//! cancel runs. The orchestrator is the only consumer.

mod client;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use client::RestPlatformClient;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("run not found: {0}")]
    NotFound(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    /// Network-level failure; the orchestrator retries these with its own
    /// bounded backoff, separate from the decision engine's policy retries.
    #[error("transient platform error: {0}")]
    Transient(String),

    #[error("platform API error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl PlatformError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Failure details for one run, assembled from every error field the
/// platform exposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFailure {
    pub job_id: String,
    pub run_id: String,
    pub error_text: String,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
}

/// A failed run reference produced by the batch scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedRunRef {
    pub job_id: String,
    pub run_id: String,
}

#[async_trait]
pub trait JobPlatform: Send + Sync {
    async fn get_run_failure(
        &self,
        job_id: &str,
        run_id: &str,
    ) -> std::result::Result<RunFailure, PlatformError>;

    /// Submit a new run for the job, returning the new run id.
    async fn submit_run(
        &self,
        job_id: &str,
        parameters: &HashMap<String, serde_json::Value>,
    ) -> std::result::Result<String, PlatformError>;

    async fn cancel_run(&self, run_id: &str) -> std::result::Result<(), PlatformError>;

    /// Failed runs completed within the last `max_age_hours`.
    async fn list_recent_failures(
        &self,
        max_age_hours: u64,
    ) -> std::result::Result<Vec<FailedRunRef>, PlatformError>;
}
