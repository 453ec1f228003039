//! Human notification of failures automation cannot resolve.
//!
//! Delivery transport is deliberately thin: an append-only alert log, an
//! optional webhook and an optional shell hook. Delivery failure is logged
//! and reported as `false`, never escalated into another retry loop.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::analyzer::Severity;
use crate::classifier::ErrorCategory;
use crate::config::NotificationConfig;
use crate::engine::JobContext;

/// Everything a human needs to reconstruct why automation stopped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureAlert {
    pub job_id: String,
    pub run_id: String,
    pub attempt_number: u32,
    pub category: ErrorCategory,
    pub severity: Severity,
    pub rationale: String,
    pub error_text: String,
    pub escalation: bool,
    pub recipients: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl FailureAlert {
    pub fn new(
        ctx: &JobContext,
        category: ErrorCategory,
        severity: Severity,
        rationale: impl Into<String>,
        error_text: impl Into<String>,
    ) -> Self {
        Self {
            job_id: ctx.job_id.clone(),
            run_id: ctx.run_id.clone(),
            attempt_number: ctx.attempt_number,
            category,
            severity,
            rationale: rationale.into(),
            error_text: error_text.into(),
            escalation: false,
            recipients: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn escalation(mut self) -> Self {
        self.escalation = true;
        self
    }

    pub fn with_recipients(mut self, recipients: Vec<String>) -> Self {
        self.recipients = recipients;
        self
    }

    pub fn subject(&self) -> String {
        let kind = if self.escalation {
            "Escalation Required"
        } else {
            "Attention Needed"
        };
        format!(
            "[{}] Job Failed - {} - Job ID: {}",
            self.severity.as_str().to_uppercase(),
            kind,
            self.job_id
        )
    }

    pub fn body(&self) -> String {
        format!(
            r"Job Failure {kind}

Severity: {severity}
Job ID: {job_id}
Run ID: {run_id}
Attempt: {attempt}

Error Category: {category}
Analysis: {rationale}

Error Details:
{error}
",
            kind = if self.escalation {
                "Escalation"
            } else {
                "Notification"
            },
            severity = self.severity,
            job_id = self.job_id,
            run_id = self.run_id,
            attempt = self.attempt_number,
            category = self.category,
            rationale = self.rationale,
            error = self.error_text,
        )
    }
}

/// Delivery contract: `true` means the alert reached at least one channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: &FailureAlert) -> bool;
}

pub struct ChannelNotifier {
    config: NotificationConfig,
    alerts_dir: Option<PathBuf>,
    http: reqwest::Client,
}

impl ChannelNotifier {
    pub fn new(config: NotificationConfig, alerts_dir: Option<PathBuf>) -> Self {
        Self {
            config,
            alerts_dir,
            http: reqwest::Client::new(),
        }
    }

    async fn write_alert_log(&self, alert: &FailureAlert) -> bool {
        let Some(dir) = &self.alerts_dir else {
            return false;
        };

        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!(error = %e, "Failed to create alerts directory");
            return false;
        }

        let path = dir.join("alerts.log");
        let line = format!(
            "[{}] {} {}\n",
            alert.created_at.format("%Y-%m-%dT%H:%M:%SZ"),
            alert.subject(),
            alert.rationale
        );

        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await;

        match result {
            Ok(mut file) => match async {
                file.write_all(line.as_bytes()).await?;
                file.flush().await
            }
            .await
            {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "Failed to write alert log");
                    false
                }
            },
            Err(e) => {
                warn!(error = %e, path = %path.display(), "Failed to open alert log");
                false
            }
        }
    }

    async fn post_webhook(&self, url: &str, alert: &FailureAlert) -> bool {
        let result = self.http.post(url).json(alert).send().await;
        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(status = %response.status(), "Webhook rejected alert");
                false
            }
            Err(e) => {
                warn!(error = %e, "Webhook delivery failed");
                false
            }
        }
    }

    async fn run_hook(&self, hook_cmd: &str, alert: &FailureAlert) -> bool {
        let json = match serde_json::to_string(alert) {
            Ok(j) => j,
            Err(_) => return false,
        };

        let result = Command::new("sh")
            .args(["-c", hook_cmd])
            .env("TRIAGE_ALERT_JSON", &json)
            .env("TRIAGE_JOB_ID", &alert.job_id)
            .env("TRIAGE_SEVERITY", alert.severity.as_str())
            .output()
            .await;

        match result {
            Ok(output) if output.status.success() => true,
            Ok(output) => {
                debug!(status = ?output.status, hook = %hook_cmd, "Alert hook exited non-zero");
                false
            }
            Err(e) => {
                debug!(error = %e, hook = %hook_cmd, "Failed to run alert hook");
                false
            }
        }
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, alert: &FailureAlert) -> bool {
        if !self.config.enabled {
            warn!("Notifications are disabled");
            return false;
        }

        let mut delivered = false;

        if self.config.alert_log {
            delivered |= self.write_alert_log(alert).await;
        }
        if let Some(url) = &self.config.webhook_url {
            delivered |= self.post_webhook(url, alert).await;
        }
        if let Some(hook) = &self.config.hook_command {
            delivered |= self.run_hook(hook, alert).await;
        }

        debug!(
            job_id = %alert.job_id,
            severity = %alert.severity,
            delivered,
            "Alert processed"
        );
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn alert() -> FailureAlert {
        let ctx = JobContext::new("job-9", "run-3").with_attempt(2);
        FailureAlert::new(
            &ctx,
            ErrorCategory::Permission,
            Severity::Critical,
            "pattern matched 'access denied' as permission",
            "AccessDeniedException: user lacks permission",
        )
        .escalation()
        .with_recipients(vec!["devops@example.com".into()])
    }

    #[test]
    fn test_subject_carries_severity_and_job() {
        let subject = alert().subject();
        assert!(subject.contains("[CRITICAL]"));
        assert!(subject.contains("Escalation Required"));
        assert!(subject.contains("job-9"));
    }

    #[test]
    fn test_body_is_reconstructable() {
        let body = alert().body();
        assert!(body.contains("Run ID: run-3"));
        assert!(body.contains("Attempt: 2"));
        assert!(body.contains("Error Category: permission"));
        assert!(body.contains("AccessDeniedException"));
    }

    #[tokio::test]
    async fn test_alert_log_delivery() {
        let dir = TempDir::new().unwrap();
        let notifier = ChannelNotifier::new(
            NotificationConfig::default(),
            Some(dir.path().to_path_buf()),
        );

        assert!(notifier.notify(&alert()).await);

        let content = std::fs::read_to_string(dir.path().join("alerts.log")).unwrap();
        assert!(content.contains("[CRITICAL]"));
    }

    #[tokio::test]
    async fn test_disabled_notifier_reports_failure() {
        let config = NotificationConfig {
            enabled: false,
            ..NotificationConfig::default()
        };
        let notifier = ChannelNotifier::new(config, None);
        assert!(!notifier.notify(&alert()).await);
    }
}
