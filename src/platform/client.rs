use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::{FailedRunRef, JobPlatform, PlatformError, RunFailure};
use crate::config::PlatformConfig;

/// REST client for the compute platform's jobs API (bearer token auth).
pub struct RestPlatformClient {
    client: Client,
    base_url: String,
    token: String,
}

impl RestPlatformClient {
    pub fn new(config: &PlatformConfig) -> Self {
        Self::with_base_url(
            config,
            format!("{}/api/2.1", config.workspace_url.trim_end_matches('/')),
        )
    }

    /// Client pointing at a custom base URL (useful for testing).
    pub fn with_base_url(config: &PlatformConfig, base_url: String) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            base_url,
            token: config.token.clone(),
        }
    }

    async fn check(&self, response: Response) -> Result<Response, PlatformError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());

        match status {
            StatusCode::NOT_FOUND => Err(PlatformError::NotFound(message)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(PlatformError::Auth(message)),
            s if s.is_server_error() => Err(PlatformError::Transient(format!("{s}: {message}"))),
            s => Err(PlatformError::Api {
                status: s.as_u16(),
                message,
            }),
        }
    }

    fn transport(e: reqwest::Error) -> PlatformError {
        PlatformError::Transient(e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct RunDetails {
    #[serde(default)]
    state_message: Option<String>,
    #[serde(default)]
    job_parameters: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct RunOutput {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_trace: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    run_id: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RunListResponse {
    #[serde(default)]
    runs: Vec<RunListEntry>,
}

#[derive(Debug, Deserialize)]
struct RunListEntry {
    job_id: serde_json::Value,
    run_id: serde_json::Value,
    #[serde(default)]
    state: Option<RunState>,
}

#[derive(Debug, Deserialize)]
struct RunState {
    #[serde(default)]
    result_state: Option<String>,
}

fn id_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl JobPlatform for RestPlatformClient {
    async fn get_run_failure(
        &self,
        job_id: &str,
        run_id: &str,
    ) -> Result<RunFailure, PlatformError> {
        let details: RunDetails = self
            .check(
                self.client
                    .get(format!("{}/jobs/runs/get", self.base_url))
                    .bearer_auth(&self.token)
                    .query(&[("run_id", run_id)])
                    .send()
                    .await
                    .map_err(Self::transport)?,
            )
            .await?
            .json()
            .await
            .map_err(Self::transport)?;

        let output: RunOutput = self
            .check(
                self.client
                    .get(format!("{}/jobs/runs/get-output", self.base_url))
                    .bearer_auth(&self.token)
                    .query(&[("run_id", run_id)])
                    .send()
                    .await
                    .map_err(Self::transport)?,
            )
            .await?
            .json()
            .await
            .map_err(Self::transport)?;

        // Assemble every error field the platform exposes into one text
        let mut pieces = Vec::new();
        if let Some(m) = details.state_message.filter(|m| !m.is_empty()) {
            pieces.push(m);
        }
        if let Some(e) = output.error.filter(|e| !e.is_empty()) {
            pieces.push(e);
        }
        if let Some(t) = output.error_trace.filter(|t| !t.is_empty()) {
            pieces.push(t);
        }
        let error_text = if pieces.is_empty() {
            "Unknown error".to_string()
        } else {
            pieces.join(" | ")
        };

        debug!(job_id, run_id, "Fetched run failure details");
        Ok(RunFailure {
            job_id: job_id.to_string(),
            run_id: run_id.to_string(),
            error_text,
            parameters: details.job_parameters.unwrap_or_default(),
        })
    }

    async fn submit_run(
        &self,
        job_id: &str,
        parameters: &HashMap<String, serde_json::Value>,
    ) -> Result<String, PlatformError> {
        let mut payload = json!({ "job_id": job_id });
        if !parameters.is_empty() {
            payload["job_parameters"] = json!(parameters);
        }

        let submitted: SubmitResponse = self
            .check(
                self.client
                    .post(format!("{}/jobs/run-now", self.base_url))
                    .bearer_auth(&self.token)
                    .json(&payload)
                    .send()
                    .await
                    .map_err(Self::transport)?,
            )
            .await?
            .json()
            .await
            .map_err(Self::transport)?;

        let new_run_id = id_string(&submitted.run_id);
        info!(job_id, new_run_id, "Run submitted");
        Ok(new_run_id)
    }

    async fn cancel_run(&self, run_id: &str) -> Result<(), PlatformError> {
        self.check(
            self.client
                .post(format!("{}/jobs/runs/cancel", self.base_url))
                .bearer_auth(&self.token)
                .json(&json!({ "run_id": run_id }))
                .send()
                .await
                .map_err(Self::transport)?,
        )
        .await?;
        info!(run_id, "Run cancelled");
        Ok(())
    }

    async fn list_recent_failures(
        &self,
        max_age_hours: u64,
    ) -> Result<Vec<FailedRunRef>, PlatformError> {
        let cutoff_ms = (Utc::now() - chrono::Duration::hours(max_age_hours as i64))
            .timestamp_millis()
            .to_string();

        let listing: RunListResponse = self
            .check(
                self.client
                    .get(format!("{}/jobs/runs/list", self.base_url))
                    .bearer_auth(&self.token)
                    .query(&[
                        ("completed_only", "true"),
                        ("start_time_from", cutoff_ms.as_str()),
                    ])
                    .send()
                    .await
                    .map_err(Self::transport)?,
            )
            .await?
            .json()
            .await
            .map_err(Self::transport)?;

        let failures = listing
            .runs
            .into_iter()
            .filter(|r| {
                r.state
                    .as_ref()
                    .and_then(|s| s.result_state.as_deref())
                    .map(|s| s.eq_ignore_ascii_case("failed"))
                    .unwrap_or(false)
            })
            .map(|r| FailedRunRef {
                job_id: id_string(&r.job_id),
                run_id: id_string(&r.run_id),
            })
            .collect();

        Ok(failures)
    }
}
