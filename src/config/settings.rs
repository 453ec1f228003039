use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{Result, TriageError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    pub policy: PolicyConfig,
    pub analyzer: AnalyzerConfig,
    pub platform: PlatformConfig,
    pub notification: NotificationConfig,
    pub audit: AuditConfig,
}

impl TriageConfig {
    /// Load from `config.toml` under `dir` (defaults apply when absent),
    /// then overlay secrets from the environment and validate.
    pub async fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join("config.toml");
        let mut config: Self = if config_path.exists() {
            let content = fs::read_to_string(&config_path).await?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.overlay_env();
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, dir: &Path) -> Result<()> {
        self.validate()?;
        let content =
            toml::to_string_pretty(self).map_err(|e| TriageError::Config(e.to_string()))?;
        fs::write(dir.join("config.toml"), content).await?;
        Ok(())
    }

    /// Secrets and endpoints come from the environment so they never land
    /// in the config file.
    fn overlay_env(&mut self) {
        if let Ok(v) = env::var("TRIAGE_LLM_API_KEY") {
            self.analyzer.api_key = v;
        }
        if let Ok(v) = env::var("TRIAGE_LLM_ENDPOINT") {
            self.analyzer.endpoint = v;
        }
        if let Ok(v) = env::var("TRIAGE_LLM_MODEL") {
            self.analyzer.model = v;
        }
        if let Ok(v) = env::var("TRIAGE_PLATFORM_URL") {
            self.platform.workspace_url = v;
        }
        if let Ok(v) = env::var("TRIAGE_PLATFORM_TOKEN") {
            self.platform.token = v;
        }
        if let Ok(v) = env::var("TRIAGE_WEBHOOK_URL") {
            self.notification.webhook_url = Some(v);
        }
    }

    /// Validate values for consistency and safety, collecting every problem
    /// into one error message.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.policy.max_same_param_retries == 0 {
            errors.push("policy.max_same_param_retries must be greater than 0");
        }
        if self.policy.max_adjusted_param_retries == 0 {
            errors.push("policy.max_adjusted_param_retries must be greater than 0");
        }
        if self.policy.max_param_multiplier < 1.0 {
            errors.push("policy.max_param_multiplier must be at least 1.0");
        }
        if self.policy.llm_timeout_secs == 0 {
            errors.push("policy.llm_timeout_secs must be greater than 0");
        }
        if self.policy.transport_retries == 0 {
            errors.push("policy.transport_retries must be greater than 0");
        }

        if self.analyzer.enabled {
            if self.analyzer.model.is_empty() {
                errors.push("analyzer.model must not be empty when the analyzer is enabled");
            }
            if self.analyzer.endpoint.is_empty() {
                errors.push("analyzer.endpoint must not be empty when the analyzer is enabled");
            }
            if !(0.0..=2.0).contains(&self.analyzer.temperature) {
                errors.push("analyzer.temperature must be between 0.0 and 2.0");
            }
            if self.analyzer.max_tokens == 0 {
                errors.push("analyzer.max_tokens must be greater than 0");
            }
        }

        if self.notification.enabled && self.notification.recipients.is_empty() {
            errors.push("notification.recipients must not be empty when notifications are enabled");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(TriageError::Config(errors.join("; ")))
        }
    }
}

/// Retry policy knobs consumed by the decision engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub max_same_param_retries: u32,
    pub max_adjusted_param_retries: u32,
    pub max_param_multiplier: f64,
    pub llm_timeout_secs: u64,
    /// Transport-layer retries for transient platform errors, separate from
    /// the policy retries above.
    pub transport_retries: u32,
    pub transport_backoff_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_same_param_retries: 3,
            max_adjusted_param_retries: 2,
            max_param_multiplier: 4.0,
            llm_timeout_secs: 8,
            transport_retries: 3,
            transport_backoff_secs: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub enabled: bool,
    pub endpoint: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o".to_string(),
            temperature: 0.2,
            max_tokens: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub workspace_url: String,
    #[serde(skip_serializing)]
    pub token: String,
    pub request_timeout_secs: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            workspace_url: String::new(),
            token: String::new(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub recipients: Vec<String>,
    pub webhook_url: Option<String>,
    /// Shell command invoked per alert with the alert JSON in the
    /// environment; hook failures are logged and swallowed.
    pub hook_command: Option<String>,
    pub alert_log: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            recipients: vec!["devops@example.com".to_string()],
            webhook_url: None,
            hook_command: None,
            alert_log: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub decision_log_path: PathBuf,
    pub retention_days: i64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            decision_log_path: PathBuf::from("decisions.jsonl"),
            retention_days: 90,
        }
    }
}
