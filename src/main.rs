use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use jobtriage::audit::DecisionLog;
use jobtriage::cli::{Cli, Commands};
use jobtriage::config::TriageConfig;
use jobtriage::error::{Result, TriageError};
use jobtriage::executor::ActionOutcome;
use jobtriage::orchestrator::TriageOrchestrator;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("jobtriage=debug")
    } else {
        EnvFilter::new("jobtriage=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config_dir = cli.config_dir.unwrap_or_else(|| PathBuf::from("."));
    let config = TriageConfig::load(&config_dir).await?;

    match cli.command {
        Commands::Run {
            job_id,
            run_id,
            attempt,
        } => cmd_run(config, &config_dir, &job_id, &run_id, attempt).await,
        Commands::Scan { max_age_hours } => cmd_scan(config, &config_dir, max_age_hours).await,
        Commands::Config => cmd_config(&config),
        Commands::Compact => cmd_compact(&config).await,
    }
}

async fn cmd_run(
    config: TriageConfig,
    config_dir: &std::path::Path,
    job_id: &str,
    run_id: &str,
    attempt: u32,
) -> Result<()> {
    let orchestrator = TriageOrchestrator::from_config(config, Some(config_dir));
    orchestrator.restore_ledger().await?;

    let report = orchestrator
        .process_failed_run(job_id, run_id, attempt)
        .await?;

    println!(
        "{} -> {} ({})",
        report.job_id, report.decision.action, report.decision.category
    );
    println!("  rationale: {}", report.decision.rationale);
    match &report.outcome {
        ActionOutcome::Resubmitted {
            new_run_id,
            parameters_adjusted,
        } => {
            println!("  resubmitted as run {new_run_id} (adjusted: {parameters_adjusted})");
        }
        ActionOutcome::Notified { delivered } => println!("  notified (delivered: {delivered})"),
        ActionOutcome::Escalated { delivered } => println!("  escalated (delivered: {delivered})"),
        ActionOutcome::Ignored => println!("  ignored"),
    }
    Ok(())
}

async fn cmd_scan(
    config: TriageConfig,
    config_dir: &std::path::Path,
    max_age_hours: u64,
) -> Result<()> {
    let orchestrator = TriageOrchestrator::from_config(config, Some(config_dir));
    orchestrator.restore_ledger().await?;

    let summary = orchestrator.scan_recent_failures(max_age_hours).await?;

    println!(
        "checked {} runs, triaged {}, {} errors",
        summary.runs_checked,
        summary.reports.len(),
        summary.errors.len()
    );
    for report in &summary.reports {
        println!(
            "  {}/{} -> {}",
            report.job_id, report.run_id, report.decision.action
        );
    }
    for error in &summary.errors {
        println!("  ! {error}");
    }
    Ok(())
}

fn cmd_config(config: &TriageConfig) -> Result<()> {
    // Token and API key fields skip serialization, so this never prints secrets
    let text = toml::to_string_pretty(config).map_err(|e| TriageError::Config(e.to_string()))?;
    println!("{text}");
    Ok(())
}

async fn cmd_compact(config: &TriageConfig) -> Result<()> {
    let log = DecisionLog::new(
        config.audit.decision_log_path.clone(),
        config.audit.retention_days,
    );
    let removed = log.compact().await?;
    println!("removed {removed} expired decision records");
    Ok(())
}
