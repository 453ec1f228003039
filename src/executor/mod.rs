//! Translates a [`Decision`] into calls against the compute platform or
//! the notifier.
//!
//! A failed execution of a retry decision is a platform-layer error: it is
//! surfaced to the caller and never reinterpreted as a new job failure.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engine::{Decision, DecisionAction, JobContext};
use crate::error::{Result, TriageError};
use crate::notify::{FailureAlert, Notifier};
use crate::platform::JobPlatform;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionOutcome {
    Resubmitted {
        new_run_id: String,
        parameters_adjusted: bool,
    },
    Notified {
        delivered: bool,
    },
    Escalated {
        delivered: bool,
    },
    Ignored,
}

pub struct ActionExecutor {
    platform: Arc<dyn JobPlatform>,
    notifier: Arc<dyn Notifier>,
    recipients: Vec<String>,
}

impl ActionExecutor {
    pub fn new(
        platform: Arc<dyn JobPlatform>,
        notifier: Arc<dyn Notifier>,
        recipients: Vec<String>,
    ) -> Self {
        Self {
            platform,
            notifier,
            recipients,
        }
    }

    pub async fn execute(
        &self,
        decision: &Decision,
        ctx: &JobContext,
        error_text: &str,
    ) -> Result<ActionOutcome> {
        match decision.action {
            DecisionAction::Retry => self.resubmit(ctx, &ctx.parameters, false).await,
            DecisionAction::RetryWithParams => {
                let merged = merge_parameters(&ctx.parameters, decision.parameters.as_ref());
                self.resubmit(ctx, &merged, true).await
            }
            DecisionAction::Notify => {
                let delivered = self.deliver(decision, ctx, error_text, false).await;
                Ok(ActionOutcome::Notified { delivered })
            }
            DecisionAction::Escalate => {
                let delivered = self.deliver(decision, ctx, error_text, true).await;
                Ok(ActionOutcome::Escalated { delivered })
            }
            DecisionAction::Ignore => {
                info!(job_id = %ctx.job_id, run_id = %ctx.run_id, "Failure suppressed");
                Ok(ActionOutcome::Ignored)
            }
        }
    }

    async fn resubmit(
        &self,
        ctx: &JobContext,
        parameters: &HashMap<String, serde_json::Value>,
        parameters_adjusted: bool,
    ) -> Result<ActionOutcome> {
        // Best-effort cancel of the failed run; a stale run is not fatal
        if let Err(e) = self.platform.cancel_run(&ctx.run_id).await {
            warn!(run_id = %ctx.run_id, error = %e, "Could not cancel previous run");
        }

        let new_run_id = self
            .platform
            .submit_run(&ctx.job_id, parameters)
            .await
            .map_err(|e| TriageError::Execution(format!("resubmit failed: {e}")))?;

        info!(
            job_id = %ctx.job_id,
            new_run_id,
            parameters_adjusted,
            "Retry submitted"
        );
        Ok(ActionOutcome::Resubmitted {
            new_run_id,
            parameters_adjusted,
        })
    }

    async fn deliver(
        &self,
        decision: &Decision,
        ctx: &JobContext,
        error_text: &str,
        escalation: bool,
    ) -> bool {
        let mut alert = FailureAlert::new(
            ctx,
            decision.category,
            decision.severity,
            decision.rationale.clone(),
            error_text,
        )
        .with_recipients(self.recipients.clone());
        if escalation {
            alert = alert.escalation();
        }

        let delivered = self.notifier.notify(&alert).await;
        if !delivered {
            // Logged only: delivery failure never spawns another retry loop
            warn!(job_id = %ctx.job_id, escalation, "Alert delivery failed");
        }
        delivered
    }
}

/// Original parameters overlaid with the validated suggestions. Keys the
/// advisor did not touch keep their original values.
fn merge_parameters(
    original: &HashMap<String, serde_json::Value>,
    suggested: Option<&HashMap<String, serde_json::Value>>,
) -> HashMap<String, serde_json::Value> {
    let mut merged = original.clone();
    if let Some(suggested) = suggested {
        for (key, value) in suggested {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_parameters_overlays() {
        let original = HashMap::from([
            ("memory_gb".to_string(), json!(4)),
            ("workers".to_string(), json!(2)),
        ]);
        let suggested = HashMap::from([("memory_gb".to_string(), json!(16))]);

        let merged = merge_parameters(&original, Some(&suggested));
        assert_eq!(merged.get("memory_gb"), Some(&json!(16)));
        assert_eq!(merged.get("workers"), Some(&json!(2)));
    }

    #[test]
    fn test_merge_without_suggestions_keeps_original() {
        let original = HashMap::from([("workers".to_string(), json!(2))]);
        let merged = merge_parameters(&original, None);
        assert_eq!(merged, original);
    }
}
