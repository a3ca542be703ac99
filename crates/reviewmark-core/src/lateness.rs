//! Submission lateness.
//!
//! Lateness is counted in whole calendar days: both the upload time and the
//! deadline are truncated to midnight before they are compared.

use std::fmt;

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ReviewStage;

/// Outcome of comparing an upload against its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LateStatus {
    /// The upload time or the deadline is missing.
    Unknown,
    OnTime,
    Late { days: u32 },
}

impl LateStatus {
    pub fn is_late(&self) -> bool {
        matches!(self, LateStatus::Late { .. })
    }
}

impl fmt::Display for LateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LateStatus::Unknown => write!(f, "unknown"),
            LateStatus::OnTime => write!(f, "on time"),
            LateStatus::Late { days: 1 } => write!(f, "late by 1 day"),
            LateStatus::Late { days } => write!(f, "late by {days} days"),
        }
    }
}

/// Compare two calendar days.
pub fn evaluate_days(uploaded: NaiveDate, deadline: NaiveDate) -> LateStatus {
    if uploaded > deadline {
        let days = (uploaded - deadline).num_days();
        LateStatus::Late {
            days: u32::try_from(days).unwrap_or(u32::MAX),
        }
    } else {
        LateStatus::OnTime
    }
}

/// Evaluate lateness with calendar days taken in `tz`.
pub fn evaluate_lateness_in<Tz: TimeZone>(
    uploaded_at: Option<&DateTime<Utc>>,
    deadline: Option<&DateTime<Utc>>,
    tz: &Tz,
) -> LateStatus {
    match (uploaded_at, deadline) {
        (Some(uploaded), Some(deadline)) => evaluate_days(
            uploaded.with_timezone(tz).date_naive(),
            deadline.with_timezone(tz).date_naive(),
        ),
        _ => LateStatus::Unknown,
    }
}

/// Evaluate lateness with calendar days taken in the local timezone.
pub fn evaluate_lateness(
    uploaded_at: Option<&DateTime<Utc>>,
    deadline: Option<&DateTime<Utc>>,
) -> LateStatus {
    evaluate_lateness_in(uploaded_at, deadline, &Local)
}

/// Evaluate an upload against a deadline that is already a calendar date.
pub fn evaluate_submission(
    uploaded_at: Option<&DateTime<Utc>>,
    deadline: Option<NaiveDate>,
) -> LateStatus {
    match (uploaded_at, deadline) {
        (Some(uploaded), Some(deadline)) => {
            evaluate_days(uploaded.with_timezone(&Local).date_naive(), deadline)
        }
        _ => LateStatus::Unknown,
    }
}

/// Lateness of one student's upload for one review stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageLateness {
    pub stage: ReviewStage,
    pub deadline: Option<NaiveDate>,
    pub uploaded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub paths: Vec<String>,
    pub status: LateStatus,
}
