//! The `reviewmark validate` command.

use std::path::PathBuf;

use anyhow::Result;

use reviewmark_core::model::Stage;
use reviewmark_core::parser;

pub fn execute(rubric_path: PathBuf) -> Result<()> {
    let rubric = parser::parse_rubric(&rubric_path)?;

    println!(
        "Rubric: {} ({} items, max R1/R2/R3 = {}/{}/{})",
        rubric.key(),
        rubric.items.len(),
        rubric.max_total(Stage::R1),
        rubric.max_total(Stage::R2),
        rubric.max_total(Stage::R3),
    );

    let warnings = parser::validate_rubric(&rubric);
    for w in &warnings {
        let prefix = w
            .item_index
            .map(|i| format!("  [item {}]", i + 1))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", w.message);
    }

    if warnings.is_empty() {
        println!("Rubric valid.");
    } else {
        println!("\n{} warning(s) found.", warnings.len());
    }

    Ok(())
}
