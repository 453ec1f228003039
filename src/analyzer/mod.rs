//! Advisory LLM analysis of failure text.
//!
//! The analyzer has contextual signal the keyword matcher lacks, but its
//! output is never trusted unconditionally: the decision engine passes every
//! verdict through retry-immunity, ceiling and parameter-bound checks.

mod client;
mod verdict;

use async_trait::async_trait;

use crate::engine::JobContext;
use crate::error::AnalysisError;

pub use client::OpenAiAnalyzer;
pub use verdict::{LlmVerdict, RawVerdict, RecommendedAction, Severity};

/// One synchronous request/response call to a hosted model.
#[async_trait]
pub trait ErrorAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        error_text: &str,
        ctx: &JobContext,
    ) -> std::result::Result<LlmVerdict, AnalysisError>;
}
