pub mod analyzer;
pub mod audit;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod notify;
pub mod orchestrator;
pub mod platform;

pub use analyzer::{ErrorAnalyzer, LlmVerdict, OpenAiAnalyzer, RecommendedAction, Severity};
pub use audit::{DecisionLog, DecisionRecord};
pub use classifier::{ClassifierVerdict, ErrorCategory, PatternClassifier};
pub use config::TriageConfig;
pub use engine::{Decision, DecisionAction, DecisionEngine, JobContext};
pub use error::{Result, TriageError};
pub use executor::{ActionExecutor, ActionOutcome};
pub use ledger::{LineageKey, RetryKind, RetryLedger};
pub use notify::{ChannelNotifier, FailureAlert, Notifier};
pub use orchestrator::{ScanSummary, TriageOrchestrator, TriageReport};
pub use platform::{JobPlatform, PlatformError, RestPlatformClient, RunFailure};
