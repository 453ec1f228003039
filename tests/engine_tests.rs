//! End-to-end decision engine behavior with a mocked advisory analyzer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use jobtriage::analyzer::{ErrorAnalyzer, LlmVerdict, RecommendedAction, Severity};
use jobtriage::classifier::ErrorCategory;
use jobtriage::config::PolicyConfig;
use jobtriage::engine::{DecisionAction, DecisionEngine, JobContext};
use jobtriage::error::AnalysisError;
use jobtriage::ledger::RetryLedger;

struct StaticAnalyzer {
    verdict: LlmVerdict,
}

#[async_trait]
impl ErrorAnalyzer for StaticAnalyzer {
    async fn analyze(
        &self,
        _error_text: &str,
        _ctx: &JobContext,
    ) -> Result<LlmVerdict, AnalysisError> {
        Ok(self.verdict.clone())
    }
}

struct FailingAnalyzer;

#[async_trait]
impl ErrorAnalyzer for FailingAnalyzer {
    async fn analyze(
        &self,
        _error_text: &str,
        _ctx: &JobContext,
    ) -> Result<LlmVerdict, AnalysisError> {
        Err(AnalysisError::Transient("model endpoint unreachable".into()))
    }
}

struct SlowAnalyzer;

#[async_trait]
impl ErrorAnalyzer for SlowAnalyzer {
    async fn analyze(
        &self,
        _error_text: &str,
        _ctx: &JobContext,
    ) -> Result<LlmVerdict, AnalysisError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        unreachable!("the engine must time out first")
    }
}

fn verdict(
    category: ErrorCategory,
    recommendation: RecommendedAction,
    severity: Severity,
    suggested_params: Option<HashMap<String, serde_json::Value>>,
) -> LlmVerdict {
    LlmVerdict {
        category,
        recommendation,
        severity,
        suggested_params,
        rationale: "mock analysis".into(),
    }
}

fn engine(analyzer: Option<Arc<dyn ErrorAnalyzer>>) -> DecisionEngine {
    DecisionEngine::new(PolicyConfig::default(), analyzer, Arc::new(RetryLedger::new()))
}

fn ctx() -> JobContext {
    JobContext::new("job-1", "run-1")
}

#[tokio::test]
async fn connection_timeout_is_a_retryable_timeout() {
    // "Connection timeout" must classify as timeout, not network, despite
    // network keywords being checked first
    let engine = engine(None);
    let decision = engine
        .decide("Connection timeout after 30 seconds", &ctx())
        .await
        .unwrap();

    assert_eq!(decision.category, ErrorCategory::Timeout);
    assert_eq!(decision.action, DecisionAction::Retry);
    assert!(decision.degraded_analysis);
    assert!(!decision.overridden);
}

#[tokio::test]
async fn retry_ceiling_forces_escalation() {
    let engine = engine(None);
    let policy = PolicyConfig::default();

    for _ in 0..policy.max_same_param_retries {
        let decision = engine.decide("request timed out", &ctx()).await.unwrap();
        assert_eq!(decision.action, DecisionAction::Retry);
    }

    let decision = engine.decide("request timed out", &ctx()).await.unwrap();
    assert_eq!(decision.action, DecisionAction::Escalate);
    assert!(decision.overridden);
    assert_eq!(
        decision.override_reason.as_deref(),
        Some("retry ceiling exceeded")
    );
}

#[tokio::test]
async fn adjusted_retry_ceiling_is_separate_and_lower() {
    let engine = engine(None);
    let policy = PolicyConfig::default();

    for _ in 0..policy.max_adjusted_param_retries {
        let decision = engine
            .decide("java.lang.OutOfMemoryError: heap space", &ctx())
            .await
            .unwrap();
        assert_eq!(decision.action, DecisionAction::RetryWithParams);
    }

    let decision = engine
        .decide("java.lang.OutOfMemoryError: heap space", &ctx())
        .await
        .unwrap();
    assert_eq!(decision.action, DecisionAction::Escalate);
    assert_eq!(
        decision.override_reason.as_deref(),
        Some("adjusted retry ceiling exceeded")
    );
}

#[tokio::test]
async fn advisor_retry_on_permission_error_is_refused() {
    let analyzer = StaticAnalyzer {
        verdict: verdict(
            ErrorCategory::Permission,
            RecommendedAction::Retry,
            Severity::High,
            None,
        ),
    };
    let engine = engine(Some(Arc::new(analyzer)));

    let decision = engine
        .decide("AccessDeniedException: user lacks permission", &ctx())
        .await
        .unwrap();

    assert_eq!(decision.category, ErrorCategory::Permission);
    assert_eq!(decision.action, DecisionAction::Notify);
    assert!(decision.overridden);
    assert!(
        decision
            .override_reason
            .as_deref()
            .unwrap()
            .contains("retry-immune")
    );
}

#[tokio::test]
async fn advisor_may_soften_to_ignore() {
    // Non-retry recommendations are accepted even for immune categories
    let analyzer = StaticAnalyzer {
        verdict: verdict(
            ErrorCategory::DataMissing,
            RecommendedAction::Ignore,
            Severity::Low,
            None,
        ),
    };
    let engine = engine(Some(Arc::new(analyzer)));

    let decision = engine
        .decide("input file not found: /mnt/data/day.csv", &ctx())
        .await
        .unwrap();

    assert_eq!(decision.action, DecisionAction::Ignore);
    assert!(!decision.overridden);
}

#[tokio::test]
async fn suggested_params_are_clamped_to_multiplier() {
    let analyzer = StaticAnalyzer {
        verdict: verdict(
            ErrorCategory::ResourceExhaustion,
            RecommendedAction::RetryWithParams,
            Severity::High,
            Some(HashMap::from([("memory_gb".to_string(), json!(32))])),
        ),
    };
    let engine = engine(Some(Arc::new(analyzer)));
    let ctx = ctx().with_parameters(HashMap::from([("memory_gb".to_string(), json!(4))]));

    let decision = engine
        .decide("container killed: out of memory", &ctx)
        .await
        .unwrap();

    // 4 * 4.0 multiplier = 16, exactly
    assert_eq!(decision.action, DecisionAction::RetryWithParams);
    let params = decision.parameters.unwrap();
    assert_eq!(params.get("memory_gb"), Some(&json!(16)));
    assert!(decision.rationale.contains("clamped memory_gb"));
}

#[tokio::test]
async fn negative_suggested_params_are_clamped_to_zero() {
    let analyzer = StaticAnalyzer {
        verdict: verdict(
            ErrorCategory::ResourceExhaustion,
            RecommendedAction::RetryWithParams,
            Severity::High,
            Some(HashMap::from([("workers".to_string(), json!(-2))])),
        ),
    };
    let engine = engine(Some(Arc::new(analyzer)));
    let ctx = ctx().with_parameters(HashMap::from([("workers".to_string(), json!(8))]));

    let decision = engine
        .decide("insufficient resources to schedule workers", &ctx)
        .await
        .unwrap();

    let params = decision.parameters.unwrap();
    assert_eq!(params.get("workers"), Some(&json!(0)));
}

#[tokio::test]
async fn analyzer_failure_degrades_to_pattern_verdict() {
    let engine = engine(Some(Arc::new(FailingAnalyzer)));

    let decision = engine
        .decide("Connection refused by host", &ctx())
        .await
        .unwrap();

    assert_eq!(decision.category, ErrorCategory::Network);
    assert_eq!(decision.action, DecisionAction::Retry);
    assert!(decision.degraded_analysis);
    assert!(decision.rationale.contains("analysis degraded"));
}

#[tokio::test]
async fn analyzer_timeout_degrades_to_pattern_verdict() {
    let policy = PolicyConfig {
        llm_timeout_secs: 1,
        ..PolicyConfig::default()
    };
    let engine = DecisionEngine::new(
        policy,
        Some(Arc::new(SlowAnalyzer)),
        Arc::new(RetryLedger::new()),
    );

    tokio::time::pause();
    let decision = engine.decide("deadline exceeded", &ctx()).await.unwrap();

    assert_eq!(decision.category, ErrorCategory::Timeout);
    assert!(decision.degraded_analysis);
    assert!(decision.rationale.contains("timed out after 1s"));
}

#[tokio::test]
async fn cancelled_evaluation_leaves_the_ledger_untouched() {
    // Recording happens after the analyzer await, so a caller deadline that
    // fires while the analysis is in flight must not count an attempt
    let engine = engine(Some(Arc::new(SlowAnalyzer)));

    tokio::time::pause();
    let cancelled = tokio::time::timeout(
        Duration::from_secs(2),
        engine.decide("request timed out", &ctx()),
    )
    .await;

    assert!(cancelled.is_err());
    assert!(engine.ledger().is_empty());
}

#[tokio::test]
async fn missing_table_without_advisor_notifies() {
    let engine = engine(None);

    let decision = engine
        .decide("table not found: sales.orders", &ctx())
        .await
        .unwrap();

    assert_eq!(decision.category, ErrorCategory::DataMissing);
    assert_eq!(decision.action, DecisionAction::Notify);
    assert!(decision.rationale.contains("analysis degraded"));
}

#[tokio::test]
async fn unknown_advisor_category_defers_to_pattern() {
    let analyzer = StaticAnalyzer {
        verdict: verdict(
            ErrorCategory::Unknown,
            RecommendedAction::Notify,
            Severity::Medium,
            None,
        ),
    };
    let engine = engine(Some(Arc::new(analyzer)));

    let decision = engine
        .decide("operation timed out waiting for cluster", &ctx())
        .await
        .unwrap();

    // Pattern verdict is the fallback of record when the advisor punts
    assert_eq!(decision.category, ErrorCategory::Timeout);
}

#[tokio::test]
async fn lineages_have_independent_ceilings() {
    let engine = engine(None);
    let policy = PolicyConfig::default();
    let other = JobContext::new("job-1", "run-2");

    for _ in 0..policy.max_same_param_retries {
        engine.decide("request timed out", &ctx()).await.unwrap();
    }

    // Exhausting one lineage leaves the other untouched
    let decision = engine.decide("request timed out", &other).await.unwrap();
    assert_eq!(decision.action, DecisionAction::Retry);
}

#[tokio::test]
async fn empty_identifiers_are_rejected_before_any_side_effect() {
    let engine = engine(None);
    let bad = JobContext::new("", "run-1");

    let err = engine.decide("timeout", &bad).await.unwrap_err();
    assert!(matches!(err, jobtriage::TriageError::InvalidContext(_)));
    assert!(engine.ledger().is_empty());
}
