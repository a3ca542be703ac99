//! The `reviewmark lateness` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use super::open_engine;

pub async fn execute(student: String, program: String, config_path: Option<PathBuf>) -> Result<()> {
    let (_, engine) = open_engine(config_path.as_deref())?;
    let stages = engine.stage_lateness(&student, &program).await?;

    let mut table = Table::new();
    table.set_header(vec!["Stage", "Deadline", "Uploaded", "Files", "Status"]);
    for s in &stages {
        table.add_row(vec![
            Cell::new(s.stage),
            Cell::new(s.deadline.map(|d| d.to_string()).unwrap_or_else(|| "-".into())),
            Cell::new(
                s.uploaded_at
                    .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                    .unwrap_or_else(|| "-".into()),
            ),
            Cell::new(s.paths.len()),
            Cell::new(s.status),
        ]);
    }

    println!("Lateness for {student} in {program}");
    println!("{table}");
    Ok(())
}
