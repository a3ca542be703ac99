//! The `reviewmark retry` command: re-write only the members a previous
//! submission failed to save.

use std::path::PathBuf;

use anyhow::{Context, Result};

use reviewmark_core::outcome::ReviewOutcome;

use super::submit::{print_outcome, EXIT_PARTIAL};
use super::{open_engine, ConsoleReporter};

pub async fn execute(outcome_path: PathBuf, config_path: Option<PathBuf>) -> Result<()> {
    let (_, engine) = open_engine(config_path.as_deref())?;

    let content = std::fs::read_to_string(&outcome_path)
        .with_context(|| format!("failed to read outcome from {}", outcome_path.display()))?;
    let previous: ReviewOutcome =
        serde_json::from_str(&content).context("failed to parse outcome JSON")?;

    if previous.is_fully_saved() {
        println!("Nothing to retry: every member of {} was saved.", previous.unit);
        return Ok(());
    }

    eprintln!(
        "Retrying {} member(s) of {}",
        previous.failed_members().len(),
        previous.unit
    );
    let outcome = engine.retry_failed(&previous, &ConsoleReporter).await;
    print_outcome(&outcome);

    let json = serde_json::to_string_pretty(&outcome).context("failed to serialize outcome")?;
    std::fs::write(&outcome_path, json)
        .with_context(|| format!("failed to write outcome to {}", outcome_path.display()))?;

    if let Some(failure) = outcome.partial_failure() {
        eprintln!("\nStill not fully saved: {failure}");
        std::process::exit(EXIT_PARTIAL);
    }
    Ok(())
}
