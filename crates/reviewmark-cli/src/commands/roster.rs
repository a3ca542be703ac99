//! The `reviewmark roster` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use comfy_table::{Cell, Table};

use reviewmark_core::engine::ReviewEngine;
use reviewmark_core::model::ProjectGroup;
use reviewmark_core::report::ProgramReport;
use reviewmark_core::roster::{spawn_roster_poller, ProgramRoster};

use super::open_engine;

pub async fn execute(
    program: String,
    groups: Option<String>,
    watch: bool,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let (config, engine) = open_engine(config_path.as_deref())?;
    let groups = load_groups(&engine, groups.as_deref()).await?;

    if !watch {
        let roster = ProgramRoster::fetch(engine.store().as_ref(), &program).await?;
        let report = ProgramReport::from_roster(&roster, &groups);
        print_report(&report);
        if let Some(path) = output {
            report.save_json(&path)?;
            eprintln!("Report saved to: {}", path.display());
        }
        return Ok(());
    }

    let (mut rx, handle) = spawn_roster_poller(
        Arc::clone(engine.store()),
        program.clone(),
        config.roster_interval(),
    );
    eprintln!(
        "Watching {program} every {}s (Ctrl-C to stop)",
        config.roster_poll_secs
    );

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = rx.borrow_and_update().clone();
                if let Some(roster) = snapshot {
                    let report = ProgramReport::from_roster(&roster, &groups);
                    print_report(&report);
                    if let Some(path) = &output {
                        report.save_json(path)?;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.abort();
    Ok(())
}

async fn load_groups(engine: &ReviewEngine, names: Option<&str>) -> Result<Vec<ProjectGroup>> {
    let mut groups = Vec::new();
    for name in names.unwrap_or_default().split(',') {
        let name = name.trim();
        if !name.is_empty() {
            groups.push(engine.resolve_group(name).await?);
        }
    }
    Ok(groups)
}

fn print_report(report: &ProgramReport) {
    let mut table = Table::new();
    table.set_header(vec!["Register No.", "A1", "A2", "A3", "Total"]);
    for row in &report.rows {
        let a = &row.assessment;
        table.add_row(vec![
            Cell::new(&row.register_number),
            Cell::new(a.assessment1),
            Cell::new(a.assessment2),
            Cell::new(a.assessment3),
            Cell::new(a.total),
        ]);
    }

    println!("\n{} ({} students)", report.program, report.student_count);
    println!("{table}");

    if let Some(total) = &report.total {
        println!(
            "Total: mean {:.1}, median {:.1}, range {}-{}",
            total.mean, total.median, total.min, total.max
        );
    }
    for d in &report.divergent_groups {
        let missing = if d.missing.is_empty() {
            String::new()
        } else {
            format!(", not yet written: {}", d.missing.join(", "))
        };
        println!(
            "WARNING: group '{}' holds {} different assessments{missing}",
            d.project_name, d.distinct
        );
    }
}
