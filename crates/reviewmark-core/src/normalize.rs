//! Mark normalization.
//!
//! Turns a rubric and a set of awarded marks into percentage scores:
//!
//! - `Assessment[n] = round(Σ awarded_n / Σ max_n × 100)`, or 0 when `Σ max_n = 0`
//! - `Total = ceil((Assessment1 + Assessment2 + Assessment3) / 3)`
//!
//! Stages round to nearest while the total rounds up. That asymmetry is the
//! observed behaviour of the marks users already see and is kept as is.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::correlate::correlate;
use crate::error::EngineError;
use crate::model::{AwardedMark, NormalizedAssessment, Rubric, Stage};

/// Something about the supplied marks the entering user should hear about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarkWarning {
    /// A mark was outside `0..=max` (or not a number) and was clamped.
    MarkOutOfRange {
        item_index: usize,
        description: String,
        stage: Stage,
        supplied: f64,
        applied: f64,
        max_mark: u32,
    },
    /// A row matched no rubric item and was left out.
    UnmatchedMark {
        row_index: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item_id: Option<Uuid>,
        description: String,
    },
}

impl fmt::Display for MarkWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkWarning::MarkOutOfRange {
                item_index,
                description,
                stage,
                supplied,
                applied,
                max_mark,
            } => write!(
                f,
                "item {} '{}' {}: mark {} outside 0..={}, using {}",
                item_index + 1,
                description,
                stage,
                supplied,
                max_mark,
                applied
            ),
            MarkWarning::UnmatchedMark {
                row_index,
                description,
                ..
            } => write!(
                f,
                "row {} '{}' matches no rubric item, ignored",
                row_index + 1,
                description
            ),
        }
    }
}

/// Awarded and maximum sums per stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTotals {
    pub awarded: [f64; 3],
    pub max: [u64; 3],
}

impl StageTotals {
    pub fn assessment(&self) -> NormalizedAssessment {
        let [a1, a2, a3] =
            Stage::ALL.map(|s| stage_percentage(self.awarded[s.index()], self.max[s.index()]));
        NormalizedAssessment {
            assessment1: a1,
            assessment2: a2,
            assessment3: a3,
            total: total_of(a1, a2, a3),
        }
    }
}

/// Result of normalizing one set of awarded marks.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalization {
    pub assessment: NormalizedAssessment,
    /// Clamped marks, one row per rubric item, bound to item identifiers.
    pub marks: Vec<AwardedMark>,
    pub totals: StageTotals,
    pub warnings: Vec<MarkWarning>,
}

/// Clamp a supplied mark into `0..=max`. Non-finite values become 0.
pub fn clamp_mark(value: f64, max_mark: u32) -> f64 {
    if !value.is_finite() || value < 0.0 {
        0.0
    } else {
        value.min(f64::from(max_mark))
    }
}

/// Percentage of `awarded` out of `max`, rounded to nearest; 0 when `max` is 0.
pub fn stage_percentage(awarded: f64, max: u64) -> u32 {
    if max == 0 {
        return 0;
    }
    let pct = (awarded / max as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u32
}

/// Mean of the three stage scores, rounded up.
pub fn total_of(a1: u32, a2: u32, a3: u32) -> u32 {
    (a1 + a2 + a3).div_ceil(3)
}

/// Align awarded rows to the rubric and clamp them.
///
/// Returns exactly one row per rubric item; items without a matching row get
/// zero marks. Clamps and unmatched rows come back as warnings.
pub fn resolve_marks(
    rubric: &Rubric,
    awarded: &[AwardedMark],
) -> (Vec<AwardedMark>, Vec<MarkWarning>) {
    let correlation = correlate(rubric, awarded);
    let mut warnings = Vec::new();
    let mut resolved = Vec::with_capacity(rubric.items.len());

    for (item_index, (item, slot)) in rubric.items.iter().zip(&correlation.slots).enumerate() {
        let mut row = AwardedMark::zero_for(item);
        if let Some(supplied) = slot {
            for stage in Stage::ALL {
                let max_mark = item.max_mark(stage);
                let value = supplied.mark(stage);
                let applied = clamp_mark(value, max_mark);
                if applied != value {
                    warnings.push(MarkWarning::MarkOutOfRange {
                        item_index,
                        description: item.description().to_string(),
                        stage,
                        supplied: value,
                        applied,
                        max_mark,
                    });
                }
                row.set_mark(stage, applied);
            }
        }
        resolved.push(row);
    }

    warnings.extend(
        correlation
            .unmatched
            .into_iter()
            .map(|row| MarkWarning::UnmatchedMark {
                row_index: row.row_index,
                item_id: row.item_id,
                description: row.description,
            }),
    );

    (resolved, warnings)
}

/// Normalize awarded marks against a rubric.
///
/// An empty rubric yields [`EngineError::RubricMissing`] rather than a
/// zeroed assessment, so "no rubric yet" stays distinguishable from
/// "all marks are zero".
pub fn normalize(rubric: &Rubric, awarded: &[AwardedMark]) -> Result<Normalization, EngineError> {
    if rubric.is_empty() {
        return Err(EngineError::RubricMissing {
            coordinator_id: rubric.coordinator_id.clone(),
            program: rubric.program.clone(),
        });
    }

    let (marks, warnings) = resolve_marks(rubric, awarded);

    let mut totals = StageTotals::default();
    for (item, row) in rubric.items.iter().zip(&marks) {
        for stage in Stage::ALL {
            totals.awarded[stage.index()] += row.mark(stage);
            totals.max[stage.index()] += u64::from(item.max_mark(stage));
        }
    }

    Ok(Normalization {
        assessment: totals.assessment(),
        marks,
        totals,
        warnings,
    })
}
