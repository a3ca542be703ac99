//! Program report with JSON persistence.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{AssessmentEntry, NormalizedAssessment, ProjectGroup, Stage};
use crate::roster::{GroupDivergence, ProgramRoster};

/// Summary statistics for one column of percentages.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub mean: f64,
    pub median: f64,
    pub min: u32,
    pub max: u32,
}

impl ScoreSummary {
    /// `None` for an empty column.
    pub fn from_values(values: &[u32]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_unstable();
        let n = sorted.len();
        let mean = sorted.iter().map(|&v| f64::from(v)).sum::<f64>() / n as f64;
        let median = if n % 2 == 0 {
            (f64::from(sorted[n / 2 - 1]) + f64::from(sorted[n / 2])) / 2.0
        } else {
            f64::from(sorted[n / 2])
        };
        Some(Self {
            mean,
            median,
            min: sorted[0],
            max: sorted[n - 1],
        })
    }
}

/// Aggregate view of one program's assessments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramReport {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub program: String,
    pub student_count: usize,
    /// Assessment1..3, in stage order. Absent when the roster is empty.
    pub stages: Vec<Option<ScoreSummary>>,
    pub total: Option<ScoreSummary>,
    /// Groups whose members disagreed when the roster was read.
    #[serde(default)]
    pub divergent_groups: Vec<GroupDivergence>,
    pub rows: Vec<AssessmentEntry>,
}

impl ProgramReport {
    pub fn from_roster(roster: &ProgramRoster, groups: &[ProjectGroup]) -> Self {
        let column = |pick: fn(&NormalizedAssessment, Stage) -> u32, stage: Stage| {
            let values: Vec<u32> = roster
                .rows
                .iter()
                .map(|r| pick(&r.assessment, stage))
                .collect();
            ScoreSummary::from_values(&values)
        };

        let stages = Stage::ALL
            .iter()
            .map(|&stage| column(NormalizedAssessment::get, stage))
            .collect();
        let total = column(|a, _| a.total, Stage::R1);

        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            program: roster.program.clone(),
            student_count: roster.rows.len(),
            stages,
            total,
            divergent_groups: roster.divergent_groups(groups),
            rows: roster.rows.clone(),
        }
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        serde_json::from_str(&content).context("failed to parse report JSON")
    }
}
