//! Configuration types and loading.
//!
//! `TriageConfig` is the top-level structure: nested sections with serde
//! defaults, loaded from `config.toml` with environment overlays for
//! secrets, validated before use.

mod settings;

pub use settings::{
    AnalyzerConfig, AuditConfig, NotificationConfig, PlatformConfig, PolicyConfig, TriageConfig,
};
