//! Program roster view.
//!
//! The roster is the derived list of every student's assessment in a program.
//! It is refreshed on a fixed interval; refreshes are idempotent, so a reader
//! may briefly see a group whose members are mid-propagation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::StoreError;
use crate::model::{AssessmentEntry, NormalizedAssessment, ProjectGroup};
use crate::traits::ReviewStore;

/// Default roster refresh interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Snapshot of a program's assessment summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramRoster {
    pub program: String,
    pub rows: Vec<AssessmentEntry>,
    pub fetched_at: DateTime<Utc>,
}

/// A group whose members do not all hold the same assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDivergence {
    pub project_name: String,
    /// Number of distinct assessments among members that have one.
    pub distinct: usize,
    /// Members with no assessment in the roster.
    pub missing: Vec<String>,
}

impl ProgramRoster {
    pub async fn fetch(store: &dyn ReviewStore, program: &str) -> Result<Self, StoreError> {
        let mut rows = store.list_assessments(program).await?;
        rows.sort_by(|a, b| a.register_number.cmp(&b.register_number));
        Ok(Self {
            program: program.to_string(),
            rows,
            fetched_at: Utc::now(),
        })
    }

    pub fn get(&self, register_number: &str) -> Option<&NormalizedAssessment> {
        self.rows
            .iter()
            .find(|r| r.register_number == register_number)
            .map(|r| &r.assessment)
    }

    /// Groups whose members currently disagree, or lack a row entirely.
    pub fn divergent_groups(&self, groups: &[ProjectGroup]) -> Vec<GroupDivergence> {
        groups
            .iter()
            .filter_map(|group| {
                let mut seen = HashSet::new();
                let mut missing = Vec::new();
                for member in group.distinct_members() {
                    match self.get(&member) {
                        Some(assessment) => {
                            seen.insert(*assessment);
                        }
                        None => missing.push(member),
                    }
                }
                // A group nobody has been marked for yet is not divergent.
                if seen.is_empty() || (seen.len() == 1 && missing.is_empty()) {
                    return None;
                }
                Some(GroupDivergence {
                    project_name: group.project_name.clone(),
                    distinct: seen.len(),
                    missing,
                })
            })
            .collect()
    }
}

/// Poll the program roster every `interval` and publish changed snapshots.
///
/// The receiver starts at `None` until the first successful fetch. A failed
/// fetch keeps the last snapshot. The task ends once every receiver is gone.
pub fn spawn_roster_poller(
    store: Arc<dyn ReviewStore>,
    program: String,
    interval: Duration,
) -> (watch::Receiver<Option<ProgramRoster>>, JoinHandle<()>) {
    let (tx, rx) = watch::channel::<Option<ProgramRoster>>(None);

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if tx.is_closed() {
                break;
            }

            match ProgramRoster::fetch(store.as_ref(), &program).await {
                Ok(roster) => {
                    let changed = tx.send_if_modified(|current| {
                        let same = current.as_ref().is_some_and(|c| c.rows == roster.rows);
                        if !same {
                            *current = Some(roster);
                        }
                        !same
                    });
                    if changed {
                        tracing::debug!(program = %program, "roster updated");
                    }
                }
                Err(e) => {
                    tracing::warn!(program = %program, "roster refresh failed: {e}");
                }
            }
        }
        tracing::debug!(program = %program, "roster poller stopped");
    });

    (rx, handle)
}
