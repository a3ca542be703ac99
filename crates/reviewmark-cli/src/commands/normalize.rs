//! The `reviewmark normalize` command: offline computation from files.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use reviewmark_core::model::Stage;
use reviewmark_core::normalize::{normalize, Normalization};
use reviewmark_core::parser;

pub fn execute(rubric_path: PathBuf, marks_path: PathBuf, format: String) -> Result<()> {
    let rubric = parser::parse_rubric(&rubric_path)?;
    let sheet = parser::parse_mark_sheet(&marks_path)?;

    if let Some(program) = &sheet.program {
        if program != &rubric.program {
            eprintln!(
                "Warning: mark sheet is for program '{program}' but the rubric is for '{}'",
                rubric.program
            );
        }
    }

    let result = normalize(&rubric, &sheet.marks)?;
    for warning in &result.warnings {
        eprintln!("  WARNING: {warning}");
    }

    match format.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(&result.assessment)
                .context("failed to serialize assessment")?;
            println!("{json}");
        }
        "text" => print_table(&result),
        other => anyhow::bail!("unknown format '{other}' (expected text or json)"),
    }

    Ok(())
}

fn print_table(result: &Normalization) {
    let mut table = Table::new();
    table.set_header(vec!["Stage", "Awarded", "Max", "Assessment"]);
    for stage in Stage::ALL {
        let i = stage.index();
        table.add_row(vec![
            Cell::new(stage),
            Cell::new(format!("{}", result.totals.awarded[i])),
            Cell::new(result.totals.max[i]),
            Cell::new(format!("{}%", result.assessment.get(stage))),
        ]);
    }
    table.add_row(vec![
        Cell::new("Total"),
        Cell::new(""),
        Cell::new(""),
        Cell::new(format!("{}%", result.assessment.total)),
    ]);
    println!("{table}");
}
