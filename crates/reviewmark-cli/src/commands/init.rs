//! The `reviewmark init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    for (path, content) in [
        ("reviewmark.toml", SAMPLE_CONFIG),
        ("rubrics/example.toml", EXAMPLE_RUBRIC),
        ("marks/example.toml", EXAMPLE_MARKS),
    ] {
        let path = Path::new(path);
        if path.exists() {
            println!("{} already exists, skipping.", path.display());
            continue;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        println!("Created {}", path.display());
    }

    println!("\nNext steps:");
    println!("  1. Edit reviewmark.toml to point at your records store");
    println!("  2. Run: reviewmark validate --rubric rubrics/example.toml");
    println!("  3. Run: reviewmark push-rubric --rubric rubrics/example.toml");
    println!("  4. Run: reviewmark submit --marks marks/example.toml --student 21CS001");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# reviewmark configuration

coordinator_id = "coord-01"
autosave_quiet_ms = 1500
roster_poll_secs = 5

[store]
type = "file"
root = "./reviewmark-data"

# [store]
# type = "http"
# base_url = "https://reviews.example.edu/api"
# api_token = "${REVIEWMARK_API_TOKEN}"
# timeout_secs = 30
"#;

const EXAMPLE_RUBRIC: &str = r#"[rubric]
coordinator_id = "coord-01"
program = "BE-CSE"

[[items]]
r1 = { description = "Problem statement", max_mark = 10 }
r2 = { description = "Implementation progress", max_mark = 10 }
r3 = { description = "Final demonstration", max_mark = 10 }

[[items]]
r1 = { description = "Literature survey", max_mark = 10 }
r2 = { description = "Testing", max_mark = 10 }
r3 = { description = "Project report", max_mark = 10 }
"#;

const EXAMPLE_MARKS: &str = r#"[sheet]
program = "BE-CSE"

[[marks]]
description = "Problem statement"
r1 = 8
r2 = 5
r3 = 10

[[marks]]
description = "Literature survey"
r1 = 7
r2 = 5
r3 = 10
"#;
