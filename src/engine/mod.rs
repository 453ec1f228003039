//! The decision engine: fuses the pattern classifier and the advisory LLM
//! verdict into one action under a bounded-retry policy.
//!
//! Tiered evaluation, cheapest first:
//! - Tier 1: deterministic keyword classification (always runs, never fails)
//! - Tier 2: advisory LLM analysis (bounded by a timeout, degrades to None)
//! - Policy gates: retry-immunity, retry ceilings, parameter bounds
//!
//! The ledger is only mutated after every gate has passed, so an evaluation
//! cancelled while the LLM call is in flight records nothing.

mod context;
mod decision;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::analyzer::{ErrorAnalyzer, LlmVerdict, RecommendedAction, Severity};
use crate::classifier::{ClassifierVerdict, ErrorCategory, PatternClassifier};
use crate::config::PolicyConfig;
use crate::error::Result;
use crate::ledger::{RetryKind, RetryLedger};

pub use context::JobContext;
pub use decision::{Decision, DecisionAction};

pub struct DecisionEngine {
    classifier: PatternClassifier,
    policy: PolicyConfig,
    analyzer: Option<Arc<dyn ErrorAnalyzer>>,
    ledger: Arc<RetryLedger>,
}

impl DecisionEngine {
    pub fn new(
        policy: PolicyConfig,
        analyzer: Option<Arc<dyn ErrorAnalyzer>>,
        ledger: Arc<RetryLedger>,
    ) -> Self {
        Self {
            classifier: PatternClassifier::new(),
            policy,
            analyzer,
            ledger,
        }
    }

    pub fn ledger(&self) -> &Arc<RetryLedger> {
        &self.ledger
    }

    /// Evaluate one failure and produce a [`Decision`].
    ///
    /// Raises no business errors for well-formed input; the only failure mode
    /// is a malformed context (missing lineage identifiers).
    pub async fn decide(&self, error_text: &str, ctx: &JobContext) -> Result<Decision> {
        let lineage = ctx.lineage_key()?;

        // Tier 1: deterministic pattern classification
        let pv = self.classifier.classify(error_text);

        // Tier 2: advisory analysis, degraded to None on any failure
        let (lv, degradation) = self.run_analysis(error_text, ctx).await;
        let degraded_analysis = lv.is_none();

        // Category resolution: the advisor has contextual signal the keyword
        // matcher lacks, but the matcher is the fallback of record
        let category = match &lv {
            Some(v) if v.category != ErrorCategory::Unknown => v.category,
            _ => pv.category,
        };

        let base_action = base_action_for(category);
        let mut rationale = vec![describe_pattern(&pv)];
        let mut overridden = false;
        let mut override_reason = None;

        let mut action = base_action;
        if let Some(v) = &lv {
            rationale.push(format!(
                "advisor: {} (recommended {:?}, severity {})",
                v.rationale, v.recommendation, v.severity
            ));

            let suggested = action_for_recommendation(v.recommendation);
            if suggested != base_action {
                if suggested.is_retry() && category.is_retry_immune() {
                    // Hard safety rule, not a preference
                    overridden = true;
                    override_reason =
                        Some(format!("category {category} is retry-immune by policy"));
                    rationale.push(format!(
                        "policy refused advisor retry for retry-immune category {category}"
                    ));
                } else {
                    action = suggested;
                }
            }
        }
        if let Some(note) = degradation {
            rationale.push(note);
        }

        // Parameter validation, only meaningful for retry_with_params
        let parameters = if action == DecisionAction::RetryWithParams {
            self.validate_parameters(lv.as_ref(), ctx, &mut rationale)
        } else {
            None
        };

        // Ceiling enforcement: the increment and the check are one atomic
        // ledger operation, so concurrent failures for one lineage cannot
        // both claim the last retry slot
        if action.is_retry() {
            let (kind, ceiling, label) = match action {
                DecisionAction::Retry => (
                    RetryKind::SameParams,
                    self.policy.max_same_param_retries,
                    "retry ceiling exceeded",
                ),
                _ => (
                    RetryKind::AdjustedParams,
                    self.policy.max_adjusted_param_retries,
                    "adjusted retry ceiling exceeded",
                ),
            };

            if !self.ledger.try_record_attempt(&lineage, kind, ceiling) {
                warn!(%lineage, %category, "Retry ceiling reached, escalating");
                action = DecisionAction::Escalate;
                overridden = true;
                override_reason = Some(label.to_string());
                rationale.push(format!("{label} (ceiling {ceiling})"));
            }
        }

        self.ledger.note_category(&lineage, category);

        let severity = lv
            .as_ref()
            .map(|v| v.severity)
            .unwrap_or_else(|| Severity::default_for(category));

        let decision = Decision {
            action,
            category,
            severity,
            parameters: if action == DecisionAction::RetryWithParams {
                parameters
            } else {
                None
            },
            rationale: rationale.join("; "),
            overridden,
            override_reason,
            degraded_analysis,
            attempt_number: ctx.attempt_number,
            timestamp: Utc::now(),
        };

        info!(
            %lineage,
            action = %decision.action,
            category = %decision.category,
            overridden = decision.overridden,
            "Decision made"
        );
        Ok(decision)
    }

    async fn run_analysis(
        &self,
        error_text: &str,
        ctx: &JobContext,
    ) -> (Option<LlmVerdict>, Option<String>) {
        let Some(analyzer) = &self.analyzer else {
            return (None, Some("analysis degraded: no analyzer configured".into()));
        };

        let timeout = Duration::from_secs(self.policy.llm_timeout_secs);
        match tokio::time::timeout(timeout, analyzer.analyze(error_text, ctx)).await {
            Ok(Ok(verdict)) => (Some(verdict), None),
            Ok(Err(e)) => {
                debug!(error = %e, "LLM analysis failed, using pattern verdict only");
                (None, Some(format!("analysis degraded: {e}")))
            }
            Err(_) => {
                debug!(
                    timeout_secs = self.policy.llm_timeout_secs,
                    "LLM analysis timed out, using pattern verdict only"
                );
                (
                    None,
                    Some(format!(
                        "analysis degraded: timed out after {}s",
                        self.policy.llm_timeout_secs
                    )),
                )
            }
        }
    }

    /// Sanity-bound the advisor's suggested parameters: numeric values must
    /// be non-negative and within `max_param_multiplier` of the original.
    /// Out-of-bounds values are clamped, not rejected, and every clamp is
    /// noted in the rationale.
    fn validate_parameters(
        &self,
        lv: Option<&LlmVerdict>,
        ctx: &JobContext,
        rationale: &mut Vec<String>,
    ) -> Option<HashMap<String, Value>> {
        let suggested = lv.and_then(|v| v.suggested_params.as_ref())?;
        let multiplier = self.policy.max_param_multiplier;
        let mut validated = HashMap::new();

        for (key, value) in suggested {
            let Some(num) = value.as_f64() else {
                validated.insert(key.clone(), value.clone());
                continue;
            };

            let mut bounded = num;
            if bounded < 0.0 {
                bounded = 0.0;
                rationale.push(format!("clamped {key} from {num} to 0 (negative)"));
            }

            if let Some(original) = ctx.parameters.get(key).and_then(Value::as_f64) {
                let bound = original * multiplier;
                if original > 0.0 && bounded > bound {
                    rationale.push(format!(
                        "clamped {key} from {bounded} to {bound} (max {multiplier}x original)"
                    ));
                    bounded = bound;
                }
            }

            validated.insert(key.clone(), number_value(bounded));
        }

        Some(validated)
    }
}

/// Deterministic base-action policy table, independent of the advisor.
fn base_action_for(category: ErrorCategory) -> DecisionAction {
    match category {
        ErrorCategory::Timeout | ErrorCategory::Network => DecisionAction::Retry,
        ErrorCategory::ResourceExhaustion => DecisionAction::RetryWithParams,
        // Never retried: no transient fix exists without a human or a code
        // change. Unknown gets the conservative default.
        ErrorCategory::Permission
        | ErrorCategory::Syntax
        | ErrorCategory::DataMissing
        | ErrorCategory::Unknown => DecisionAction::Notify,
    }
}

fn action_for_recommendation(rec: RecommendedAction) -> DecisionAction {
    match rec {
        RecommendedAction::Retry => DecisionAction::Retry,
        RecommendedAction::RetryWithParams => DecisionAction::RetryWithParams,
        RecommendedAction::Notify => DecisionAction::Notify,
        RecommendedAction::Escalate => DecisionAction::Escalate,
        RecommendedAction::Ignore => DecisionAction::Ignore,
    }
}

fn describe_pattern(pv: &ClassifierVerdict) -> String {
    match &pv.matched_keyword {
        Some(keyword) => format!("pattern matched '{keyword}' as {}", pv.category),
        None => "no pattern matched (unknown)".to_string(),
    }
}

/// Keep integral results as JSON integers so resubmitted parameters look
/// like the originals.
fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}
