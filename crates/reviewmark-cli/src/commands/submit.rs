//! The `reviewmark submit` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use reviewmark_core::model::ReviewUnit;
use reviewmark_core::outcome::{ReviewOutcome, WriteStatus};
use reviewmark_core::parser;

use super::{open_engine, resolve_coordinator, ConsoleReporter};

/// Exit code when the assessment was computed but not every write landed.
pub const EXIT_PARTIAL: i32 = 2;

pub async fn execute(
    marks_path: PathBuf,
    program: Option<String>,
    student: Option<String>,
    group: Option<String>,
    coordinator: Option<String>,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let (config, engine) = open_engine(config_path.as_deref())?;
    let sheet = parser::parse_mark_sheet(&marks_path)?;

    let program = program
        .or(sheet.program.clone())
        .context("no program given: pass --program or set [sheet] program in the mark sheet")?;
    let coordinator = resolve_coordinator(coordinator, sheet.coordinator_id.clone(), &config)?;

    let unit = match (student, group) {
        (Some(register_number), None) => ReviewUnit::student(register_number),
        (None, Some(project)) => ReviewUnit::Group(engine.resolve_group(&project).await?),
        _ => anyhow::bail!("pass exactly one of --student or --group"),
    };

    eprintln!("Submitting {} marks for {unit} in {program}", sheet.marks.len());
    let outcome = engine
        .submit_review(&unit, &program, &coordinator, &sheet.marks, &ConsoleReporter)
        .await?;

    print_outcome(&outcome);

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&outcome).context("failed to serialize outcome")?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write outcome to {}", path.display()))?;
        eprintln!("Outcome saved to: {}", path.display());
    }

    if let Some(failure) = outcome.partial_failure() {
        eprintln!("\nComputed but not fully saved: {failure}");
        eprintln!("Save the outcome with --output and run `reviewmark retry` to re-write failed members.");
        std::process::exit(EXIT_PARTIAL);
    }

    Ok(())
}

pub(crate) fn print_outcome(outcome: &ReviewOutcome) {
    let a = &outcome.assessment;
    println!(
        "Assessment1 {}%  Assessment2 {}%  Assessment3 {}%  Total {}%",
        a.assessment1, a.assessment2, a.assessment3, a.total
    );

    let status = |s: &WriteStatus| match s {
        WriteStatus::Written => Cell::new("saved"),
        WriteStatus::Failed { message } => Cell::new(format!("FAILED: {message}")),
    };

    let mut table = Table::new();
    table.set_header(vec!["Register No.", "Detail", "Summary"]);
    for member in &outcome.members {
        table.add_row(vec![
            Cell::new(&member.register_number),
            status(&member.detail),
            status(&member.summary),
        ]);
    }
    println!("{table}");
}
