use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::verdict::{LlmVerdict, RawVerdict};
use super::ErrorAnalyzer;
use crate::config::AnalyzerConfig;
use crate::engine::JobContext;
use crate::error::AnalysisError;

/// Chat-completions client for the hosted analysis model.
pub struct OpenAiAnalyzer {
    client: Client,
    base_url: String,
    api_key: String,
    config: AnalyzerConfig,
}

impl OpenAiAnalyzer {
    /// `timeout` should match the engine's `llm_timeout_secs` so the HTTP
    /// client gives up no later than the engine does.
    pub fn new(config: AnalyzerConfig, timeout: Duration) -> Self {
        let base_url = config.endpoint.trim_end_matches('/').to_string();
        Self::build(config, base_url, timeout)
    }

    /// Client pointing at a custom base URL (useful for testing).
    pub fn with_base_url(config: AnalyzerConfig, base_url: String, timeout: Duration) -> Self {
        Self::build(config, base_url, timeout)
    }

    fn build(config: AnalyzerConfig, base_url: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");
        let api_key = config.api_key.clone();
        Self {
            client,
            base_url,
            api_key,
            config,
        }
    }

    fn build_prompt(error_text: &str, ctx: &JobContext) -> String {
        let schema = schemars::schema_for!(RawVerdict);
        let schema_json =
            serde_json::to_string_pretty(&schema).unwrap_or_else(|_| "{}".to_string());
        let params_json =
            serde_json::to_string_pretty(&ctx.parameters).unwrap_or_else(|_| "{}".to_string());

        format!(
            r"Analyze this batch job failure and recommend an action.

Error Message:
{error_text}

Job Context:
- Job ID: {job_id}
- Run ID: {run_id}
- Attempt Number: {attempt}
- Job Parameters: {params_json}

Respond with a single JSON object matching this schema:
{schema_json}

Rules:
- recommendation is one of: retry, retry_with_params, notify, escalate, ignore
- suggested_params only when recommending retry_with_params, using the same
  keys as the job parameters
- severity is one of: low, medium, high, critical",
            job_id = ctx.job_id,
            run_id = ctx.run_id,
            attempt = ctx.attempt_number,
        )
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[async_trait]
impl ErrorAnalyzer for OpenAiAnalyzer {
    async fn analyze(
        &self,
        error_text: &str,
        ctx: &JobContext,
    ) -> std::result::Result<LlmVerdict, AnalysisError> {
        let prompt = Self::build_prompt(error_text, ctx);
        let body = json!({
            "model": self.config.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are an expert DevOps engineer analyzing batch job \
                                failures. Respond with structured JSON only."
                },
                { "role": "user", "content": prompt }
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "response_format": { "type": "json_object" }
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalysisError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(AnalysisError::Transient(format!(
                "provider returned {status}: {message}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::Format(format!("response envelope: {e}")))?;

        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| AnalysisError::Format("empty choices in response".to_string()))?;

        let verdict = LlmVerdict::parse_json(content)?;
        debug!(
            category = %verdict.category,
            recommendation = ?verdict.recommendation,
            "LLM analysis completed"
        );
        Ok(verdict)
    }
}
