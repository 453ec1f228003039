//! Sequences one triage cycle: fetch failure details, decide, execute,
//! record. Exposed as a single-run entry point and a batch scan.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::analyzer::{ErrorAnalyzer, OpenAiAnalyzer, Severity};
use crate::audit::{DecisionLog, DecisionRecord};
use crate::classifier::ErrorCategory;
use crate::config::TriageConfig;
use crate::engine::{Decision, DecisionAction, DecisionEngine, JobContext};
use crate::error::{Result, TriageError};
use crate::executor::{ActionExecutor, ActionOutcome};
use crate::ledger::{LineageKey, RetryKind, RetryLedger};
use crate::notify::{ChannelNotifier, FailureAlert, Notifier};
use crate::platform::{JobPlatform, PlatformError, RestPlatformClient, RunFailure};

/// Result of triaging one failed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageReport {
    /// Correlation id for this triage cycle, shared by every log line.
    pub cycle_id: String,
    pub job_id: String,
    pub run_id: String,
    pub error_text: String,
    pub decision: Decision,
    pub outcome: ActionOutcome,
}

/// Summary of a batch scan. Individual run failures do not abort the scan.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ScanSummary {
    pub runs_checked: usize,
    pub reports: Vec<TriageReport>,
    pub errors: Vec<String>,
}

pub struct TriageOrchestrator {
    config: TriageConfig,
    platform: Arc<dyn JobPlatform>,
    notifier: Arc<dyn Notifier>,
    engine: DecisionEngine,
    executor: ActionExecutor,
    decision_log: DecisionLog,
}

impl TriageOrchestrator {
    pub fn new(
        config: TriageConfig,
        platform: Arc<dyn JobPlatform>,
        analyzer: Option<Arc<dyn ErrorAnalyzer>>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let ledger = Arc::new(RetryLedger::new());
        let engine = DecisionEngine::new(config.policy.clone(), analyzer, ledger);
        let executor = ActionExecutor::new(
            Arc::clone(&platform),
            Arc::clone(&notifier),
            config.notification.recipients.clone(),
        );
        let decision_log = DecisionLog::new(
            config.audit.decision_log_path.clone(),
            config.audit.retention_days,
        );
        Self {
            config,
            platform,
            notifier,
            engine,
            executor,
            decision_log,
        }
    }

    /// Wire up the real collaborators from configuration.
    pub fn from_config(config: TriageConfig, alerts_dir: Option<&Path>) -> Self {
        let platform: Arc<dyn JobPlatform> = Arc::new(RestPlatformClient::new(&config.platform));
        let analyzer: Option<Arc<dyn ErrorAnalyzer>> = if config.analyzer.enabled {
            Some(Arc::new(OpenAiAnalyzer::new(
                config.analyzer.clone(),
                Duration::from_secs(config.policy.llm_timeout_secs),
            )))
        } else {
            None
        };
        let notifier: Arc<dyn Notifier> = Arc::new(ChannelNotifier::new(
            config.notification.clone(),
            alerts_dir.map(Path::to_path_buf),
        ));
        Self::new(config, platform, analyzer, notifier)
    }

    /// Triage one failed run end to end.
    pub async fn process_failed_run(
        &self,
        job_id: &str,
        run_id: &str,
        attempt_number: u32,
    ) -> Result<TriageReport> {
        let cycle_id = format!("tri-{}", &uuid::Uuid::new_v4().to_string()[..8]);
        info!(%cycle_id, job_id, run_id, attempt_number, "Processing failed run");

        let failure = self.fetch_failure(job_id, run_id).await?;
        let ctx = JobContext::new(job_id, run_id)
            .with_attempt(attempt_number)
            .with_parameters(failure.parameters.clone());

        let decision = match self.engine.decide(&failure.error_text, &ctx).await {
            Ok(decision) => decision,
            Err(e @ TriageError::InvalidContext(_)) => {
                // Contract violation: no platform action, escalate by default
                // so the run is never silently dropped
                self.escalate_contract_violation(&ctx, &failure, &e).await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let lineage = ctx.lineage_key()?;
        // Every decision is recorded, whether or not its execution succeeds;
        // restore_ledger counts these records, so the append must precede
        // the platform call
        self.decision_log
            .append(&DecisionRecord::from_decision(&lineage, &decision))
            .await?;

        let outcome = self
            .executor
            .execute(&decision, &ctx, &failure.error_text)
            .await?;

        info!(
            %cycle_id,
            job_id,
            run_id,
            action = %decision.action,
            "Triage cycle completed"
        );
        Ok(TriageReport {
            cycle_id,
            job_id: job_id.to_string(),
            run_id: run_id.to_string(),
            error_text: failure.error_text,
            decision,
            outcome,
        })
    }

    /// Scan recently failed runs and triage each one independently.
    pub async fn scan_recent_failures(&self, max_age_hours: u64) -> Result<ScanSummary> {
        info!(max_age_hours, "Scanning recent failures");

        let refs = self
            .platform
            .list_recent_failures(max_age_hours)
            .await
            .map_err(platform_error)?;

        let mut summary = ScanSummary {
            runs_checked: refs.len(),
            ..ScanSummary::default()
        };

        for run in refs {
            let attempt = self.next_attempt_number(&run.job_id, &run.run_id);
            match self
                .process_failed_run(&run.job_id, &run.run_id, attempt)
                .await
            {
                Ok(report) => summary.reports.push(report),
                Err(e) => {
                    error!(job_id = %run.job_id, run_id = %run.run_id, error = %e, "Triage failed");
                    summary
                        .errors
                        .push(format!("{}/{}: {e}", run.job_id, run.run_id));
                }
            }
        }

        info!(
            runs_checked = summary.runs_checked,
            triaged = summary.reports.len(),
            errors = summary.errors.len(),
            "Scan completed"
        );
        Ok(summary)
    }

    /// Rebuild the in-memory retry ledger from the persisted decision log,
    /// e.g. after a restart.
    pub async fn restore_ledger(&self) -> Result<usize> {
        let records = self.decision_log.load().await?;
        let ledger = self.engine.ledger();
        let mut restored = 0;

        for record in &records {
            let Some((job_id, run_id)) = record.lineage_key.split_once('/') else {
                continue;
            };
            let key = LineageKey::new(job_id, run_id);
            match record.action {
                DecisionAction::Retry => {
                    ledger.record_attempt(&key, RetryKind::SameParams);
                    restored += 1;
                }
                DecisionAction::RetryWithParams => {
                    ledger.record_attempt(&key, RetryKind::AdjustedParams);
                    restored += 1;
                }
                _ => {}
            }
            ledger.note_category(&key, record.category);
        }

        info!(restored, "Ledger restored from decision log");
        Ok(restored)
    }

    /// Attempt number for a re-observed lineage: one more than the retries
    /// already granted to it.
    fn next_attempt_number(&self, job_id: &str, run_id: &str) -> u32 {
        let record = self
            .engine
            .ledger()
            .get(&LineageKey::new(job_id, run_id));
        record.same_param_retries + record.adjusted_param_retries + 1
    }

    /// Fetch failure details, retrying transient platform errors with a
    /// bounded backoff. This is transport-level recovery, distinct from the
    /// engine's policy retries.
    async fn fetch_failure(&self, job_id: &str, run_id: &str) -> Result<RunFailure> {
        let retries = self.config.policy.transport_retries;
        let backoff = Duration::from_secs(self.config.policy.transport_backoff_secs);

        let mut last_err = None;
        for attempt in 1..=retries {
            match self.platform.get_run_failure(job_id, run_id).await {
                Ok(failure) => return Ok(failure),
                Err(e) if e.is_transient() && attempt < retries => {
                    warn!(job_id, run_id, attempt, error = %e, "Transient fetch failure, retrying");
                    tokio::time::sleep(backoff * attempt).await;
                    last_err = Some(e);
                }
                Err(e) => return Err(platform_error(e)),
            }
        }

        Err(platform_error(last_err.unwrap_or_else(|| {
            PlatformError::Transient("exhausted transport retries".to_string())
        })))
    }

    async fn escalate_contract_violation(
        &self,
        ctx: &JobContext,
        failure: &RunFailure,
        err: &TriageError,
    ) {
        error!(error = %err, "Caller contract violation, escalating by default");
        let alert = FailureAlert::new(
            ctx,
            ErrorCategory::Unknown,
            Severity::Critical,
            format!("triage could not run: {err}"),
            failure.error_text.clone(),
        )
        .escalation()
        .with_recipients(self.config.notification.recipients.clone());
        self.notifier.notify(&alert).await;
    }
}

fn platform_error(e: PlatformError) -> TriageError {
    match e {
        PlatformError::NotFound(m) => TriageError::RunNotFound(m),
        PlatformError::Auth(m) => TriageError::PlatformAuth(m),
        other => TriageError::Platform(other.to_string()),
    }
}
