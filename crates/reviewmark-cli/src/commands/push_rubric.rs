//! The `reviewmark push-rubric` command.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use uuid::Uuid;

use reviewmark_core::debounce::{AutosaveEvent, AutosaveScheduler};
use reviewmark_core::model::Rubric;
use reviewmark_core::parser;

use super::{open_engine, resolve_coordinator};

const WATCH_POLL: Duration = Duration::from_millis(250);

pub async fn execute(
    rubric_path: PathBuf,
    program: Option<String>,
    coordinator: Option<String>,
    watch: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let (config, engine) = open_engine(config_path.as_deref())?;

    let load = |path: &Path| -> Result<Rubric> {
        let mut rubric = parser::parse_rubric(path)?;
        if let Some(program) = &program {
            rubric.program = program.clone();
        }
        rubric.coordinator_id = resolve_coordinator(
            coordinator.clone(),
            Some(rubric.coordinator_id.clone()),
            &config,
        )?;
        for w in parser::validate_rubric(&rubric) {
            eprintln!("  WARNING: {}", w.message);
        }
        Ok(rubric)
    };

    let rubric = load(&rubric_path)?;
    let known: HashSet<Uuid> = engine
        .store()
        .get_rubric(&rubric.coordinator_id, &rubric.program)
        .await?
        .map(|stored| stored.items.iter().filter_map(|item| item.id).collect())
        .unwrap_or_default();
    let saved = engine.save_rubric(rubric).await?;
    let new_ids = saved
        .items
        .iter()
        .filter(|item| item.id.is_some_and(|id| !known.contains(&id)))
        .count();
    println!(
        "Saved rubric {} ({} items) to the {} store",
        saved.key(),
        saved.items.len(),
        engine.store().name()
    );
    if new_ids > 0 {
        println!("Assigned identifiers to {new_ids} new item(s).");
    }

    if !watch {
        return Ok(());
    }

    let (scheduler, mut events) =
        AutosaveScheduler::new(Arc::clone(engine.store()), config.autosave_quiet()).with_events();
    let key = saved.key();
    let mut last_modified = modified(&rubric_path)?;
    let mut ticker = tokio::time::interval(WATCH_POLL);
    eprintln!(
        "Watching {} (autosave after {}ms quiet, Ctrl-C to stop)",
        rubric_path.display(),
        config.autosave_quiet_ms
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // the file can vanish briefly while an editor saves it
                let Some(current) = poll_modified(&rubric_path) else {
                    continue;
                };
                if current != last_modified {
                    last_modified = current;
                    match load(&rubric_path) {
                        Ok(rubric) => scheduler.schedule(rubric),
                        Err(e) => eprintln!("  skipping edit: {e:#}"),
                    }
                }
            }
            Some(event) = events.recv() => match event {
                AutosaveEvent::Saved { key, items } => println!("Autosaved {key} ({items} items)"),
                AutosaveEvent::Failed { key, error } => eprintln!("  autosave of {key} failed: {error}"),
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    if scheduler.flush(&key).await? {
        println!("Saved pending edits for {key}");
    }
    Ok(())
}

fn modified(path: &Path) -> Result<SystemTime> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .with_context(|| format!("failed to stat {}", path.display()))
}

/// Like [`modified`], but a stat failure is logged and skipped so a pending
/// autosave is never dropped mid-watch.
fn poll_modified(path: &Path) -> Option<SystemTime> {
    match modified(path) {
        Ok(time) => Some(time),
        Err(e) => {
            tracing::debug!("{e:#}");
            None
        }
    }
}
