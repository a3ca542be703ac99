//! Results of a review submission.
//!
//! A submission computes one assessment and then issues a detail write and a
//! summary write per member. Those writes can fail independently, so the
//! outcome records each of them instead of collapsing to a single result.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{AwardedMark, NormalizedAssessment, ReviewUnit};
use crate::normalize::MarkWarning;

/// The two writes made for every member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteKind {
    /// The student's detailed marks.
    Detail,
    /// The student's assessment summary.
    Summary,
}

impl fmt::Display for WriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteKind::Detail => write!(f, "detail"),
            WriteKind::Summary => write!(f, "summary"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WriteStatus {
    Written,
    Failed { message: String },
}

impl WriteStatus {
    pub fn is_written(&self) -> bool {
        matches!(self, WriteStatus::Written)
    }
}

impl From<Result<(), StoreError>> for WriteStatus {
    fn from(result: Result<(), StoreError>) -> Self {
        match result {
            Ok(()) => WriteStatus::Written,
            Err(e) => WriteStatus::Failed {
                message: e.to_string(),
            },
        }
    }
}

/// Write results for one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberOutcome {
    pub register_number: String,
    pub detail: WriteStatus,
    pub summary: WriteStatus,
}

impl MemberOutcome {
    pub fn is_saved(&self) -> bool {
        self.detail.is_written() && self.summary.is_written()
    }

    pub fn failed_writes(&self) -> Vec<FailedWrite> {
        [(WriteKind::Detail, &self.detail), (WriteKind::Summary, &self.summary)]
            .into_iter()
            .filter_map(|(kind, status)| match status {
                WriteStatus::Written => None,
                WriteStatus::Failed { message } => Some(FailedWrite {
                    kind,
                    message: message.clone(),
                }),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedWrite {
    pub kind: WriteKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberFailure {
    pub register_number: String,
    pub writes: Vec<FailedWrite>,
}

/// One or more members' writes did not land. Retry only the named members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialPropagationFailure {
    pub attempted: usize,
    pub failed: Vec<MemberFailure>,
}

impl PartialPropagationFailure {
    pub fn register_numbers(&self) -> Vec<&str> {
        self.failed
            .iter()
            .map(|f| f.register_number.as_str())
            .collect()
    }
}

impl fmt::Display for PartialPropagationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} member(s) not fully saved:",
            self.failed.len(),
            self.attempted
        )?;
        for member in &self.failed {
            let kinds: Vec<String> = member.writes.iter().map(|w| w.kind.to_string()).collect();
            write!(f, " {} ({})", member.register_number, kinds.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for PartialPropagationFailure {}

/// Everything a caller needs after `submit_review`.
///
/// The assessment is present even when writes failed, so a UI can show
/// "computed but not fully saved".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub unit: ReviewUnit,
    pub program: String,
    pub assessment: NormalizedAssessment,
    /// The detailed marks written for every member.
    pub marks: Vec<AwardedMark>,
    #[serde(default)]
    pub warnings: Vec<MarkWarning>,
    pub members: Vec<MemberOutcome>,
    pub submitted_at: DateTime<Utc>,
}

impl ReviewOutcome {
    pub fn is_fully_saved(&self) -> bool {
        self.members.iter().all(MemberOutcome::is_saved)
    }

    pub fn saved_members(&self) -> Vec<&str> {
        self.members
            .iter()
            .filter(|m| m.is_saved())
            .map(|m| m.register_number.as_str())
            .collect()
    }

    pub fn failed_members(&self) -> Vec<&str> {
        self.members
            .iter()
            .filter(|m| !m.is_saved())
            .map(|m| m.register_number.as_str())
            .collect()
    }

    /// `None` when every write landed.
    pub fn partial_failure(&self) -> Option<PartialPropagationFailure> {
        let failed: Vec<MemberFailure> = self
            .members
            .iter()
            .filter(|m| !m.is_saved())
            .map(|m| MemberFailure {
                register_number: m.register_number.clone(),
                writes: m.failed_writes(),
            })
            .collect();
        if failed.is_empty() {
            None
        } else {
            Some(PartialPropagationFailure {
                attempted: self.members.len(),
                failed,
            })
        }
    }
}
