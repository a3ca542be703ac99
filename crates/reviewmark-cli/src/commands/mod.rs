//! Subcommand implementations and the pieces they share.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use reviewmark_core::engine::{ReviewEngine, ReviewReporter};
use reviewmark_core::normalize::MarkWarning;
use reviewmark_core::outcome::{MemberOutcome, WriteStatus};
use reviewmark_store::{create_store, load_config_from, ReviewmarkConfig};

pub mod init;
pub mod lateness;
pub mod normalize;
pub mod push_rubric;
pub mod retry;
pub mod roster;
pub mod submit;
pub mod validate;

/// Console progress reporter.
pub struct ConsoleReporter;

impl ReviewReporter for ConsoleReporter {
    fn on_warning(&self, unit: &str, warning: &MarkWarning) {
        eprintln!("  WARNING: {unit}: {warning}");
    }

    fn on_member_complete(&self, program: &str, outcome: &MemberOutcome) {
        let status = |s: &WriteStatus| match s {
            WriteStatus::Written => "ok".to_string(),
            WriteStatus::Failed { message } => format!("FAILED ({message})"),
        };
        eprintln!(
            "  {} @ {program}: detail {}, summary {}",
            outcome.register_number,
            status(&outcome.detail),
            status(&outcome.summary),
        );
    }
}

/// Load configuration and build an engine over the configured store.
pub fn open_engine(config_path: Option<&Path>) -> Result<(ReviewmarkConfig, ReviewEngine)> {
    let config = load_config_from(config_path)?;
    let store = create_store(&config.store)?;
    tracing::debug!(store = store.name(), "store ready");
    Ok((config, ReviewEngine::new(Arc::from(store))))
}

/// Pick the rubric owner: explicit flag, then file header, then config.
pub fn resolve_coordinator(
    flag: Option<String>,
    from_file: Option<String>,
    config: &ReviewmarkConfig,
) -> Result<String> {
    flag.or(from_file)
        .or_else(|| config.coordinator_id.clone())
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "no coordinator given: pass --coordinator or set coordinator_id in reviewmark.toml"
            )
        })
}
