//! Core data model types for reviewmark.
//!
//! Rubrics, awarded marks, normalized assessments, project groups, deadlines
//! and submission records. Every type here is a plain serde record so any
//! store backend can persist it as JSON.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One of the three marked review checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    R1,
    R2,
    R3,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::R1, Stage::R2, Stage::R3];

    /// Zero-based position of the stage.
    pub fn index(self) -> usize {
        match self {
            Stage::R1 => 0,
            Stage::R2 => 1,
            Stage::R3 => 2,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::R1 => write!(f, "R1"),
            Stage::R2 => write!(f, "R2"),
            Stage::R3 => write!(f, "R3"),
        }
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "r1" | "1" => Ok(Stage::R1),
            "r2" | "2" => Ok(Stage::R2),
            "r3" | "3" => Ok(Stage::R3),
            other => Err(format!("unknown stage: {other}")),
        }
    }
}

/// Review stage a deadline or an upload belongs to.
///
/// Stage zero is the proposal review and carries a deadline but no marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStage {
    Zeroth,
    First,
    Second,
    Third,
}

impl ReviewStage {
    pub const ALL: [ReviewStage; 4] = [
        ReviewStage::Zeroth,
        ReviewStage::First,
        ReviewStage::Second,
        ReviewStage::Third,
    ];
}

impl fmt::Display for ReviewStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewStage::Zeroth => write!(f, "zeroth"),
            ReviewStage::First => write!(f, "first"),
            ReviewStage::Second => write!(f, "second"),
            ReviewStage::Third => write!(f, "third"),
        }
    }
}

impl FromStr for ReviewStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "zeroth" | "0" | "review0" => Ok(ReviewStage::Zeroth),
            "first" | "1" | "review1" => Ok(ReviewStage::First),
            "second" | "2" | "review2" => Ok(ReviewStage::Second),
            "third" | "3" | "review3" => Ok(ReviewStage::Third),
            other => Err(format!("unknown review stage: {other}")),
        }
    }
}

/// Description and maximum mark of one rubric item at one stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCriterion {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub max_mark: u32,
}

impl StageCriterion {
    pub fn new(description: impl Into<String>, max_mark: u32) -> Self {
        Self {
            description: description.into(),
            max_mark,
        }
    }
}

/// One row of a rubric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RubricItem {
    /// Stable identifier, assigned when the item is first created.
    /// Legacy rubrics may lack one until they are saved again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub r1: StageCriterion,
    #[serde(default)]
    pub r2: StageCriterion,
    #[serde(default)]
    pub r3: StageCriterion,
}

impl RubricItem {
    /// Create a new item with a freshly generated identifier.
    pub fn new(r1: StageCriterion, r2: StageCriterion, r3: StageCriterion) -> Self {
        Self {
            id: Some(Uuid::new_v4()),
            r1,
            r2,
            r3,
        }
    }

    pub fn criterion(&self, stage: Stage) -> &StageCriterion {
        match stage {
            Stage::R1 => &self.r1,
            Stage::R2 => &self.r2,
            Stage::R3 => &self.r3,
        }
    }

    pub fn max_mark(&self, stage: Stage) -> u32 {
        self.criterion(stage).max_mark
    }

    /// The stage-1 description, which legacy award rows use as a join key.
    pub fn description(&self) -> &str {
        &self.r1.description
    }
}

/// Identifies the owner of a rubric.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RubricKey {
    pub coordinator_id: String,
    pub program: String,
}

impl RubricKey {
    pub fn new(coordinator_id: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            coordinator_id: coordinator_id.into(),
            program: program.into(),
        }
    }
}

impl fmt::Display for RubricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.coordinator_id, self.program)
    }
}

/// Coordinator-authored grading structure for one program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rubric {
    pub coordinator_id: String,
    pub program: String,
    #[serde(default)]
    pub items: Vec<RubricItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Rubric {
    pub fn new(coordinator_id: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            coordinator_id: coordinator_id.into(),
            program: program.into(),
            items: Vec::new(),
            updated_at: None,
        }
    }

    pub fn with_items(mut self, items: Vec<RubricItem>) -> Self {
        self.items = items;
        self
    }

    pub fn key(&self) -> RubricKey {
        RubricKey::new(self.coordinator_id.clone(), self.program.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of the per-item maxima for a stage.
    pub fn max_total(&self, stage: Stage) -> u64 {
        self.items
            .iter()
            .map(|item| u64::from(item.max_mark(stage)))
            .sum()
    }

    /// Reuse identifiers from the stored version of this rubric for items that
    /// arrive without one. Items match on their R1 description, then by
    /// position when the item count is unchanged. An identifier is never given
    /// to two items. Returns how many were carried over.
    pub fn carry_ids_from(&mut self, stored: &Rubric) -> usize {
        let mut taken: HashSet<Uuid> = self.items.iter().filter_map(|item| item.id).collect();
        let mut carried = 0;

        for item in self.items.iter_mut().filter(|item| item.id.is_none()) {
            let wanted = item.description().trim();
            let found = stored
                .items
                .iter()
                .filter(|s| s.description().trim() == wanted)
                .filter_map(|s| s.id)
                .find(|id| !taken.contains(id));
            if let Some(id) = found {
                taken.insert(id);
                item.id = Some(id);
                carried += 1;
            }
        }

        if self.items.len() == stored.items.len() {
            for (item, s) in self.items.iter_mut().zip(&stored.items) {
                match s.id {
                    Some(id) if item.id.is_none() && !taken.contains(&id) => {
                        taken.insert(id);
                        item.id = Some(id);
                        carried += 1;
                    }
                    _ => {}
                }
            }
        }

        carried
    }

    /// Give every item lacking an identifier a new one. Returns how many were assigned.
    pub fn assign_missing_ids(&mut self) -> usize {
        let mut assigned = 0;
        for item in &mut self.items {
            if item.id.is_none() {
                item.id = Some(Uuid::new_v4());
                assigned += 1;
            }
        }
        assigned
    }
}

/// Marks awarded for one rubric item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwardedMark {
    /// Identifier of the rubric item these marks belong to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<Uuid>,
    /// Stage-1 description of the rubric item.
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub r1: f64,
    #[serde(default)]
    pub r2: f64,
    #[serde(default)]
    pub r3: f64,
}

impl AwardedMark {
    /// A legacy row, correlated by description text only.
    pub fn by_description(description: impl Into<String>, r1: f64, r2: f64, r3: f64) -> Self {
        Self {
            item_id: None,
            description: description.into(),
            r1,
            r2,
            r3,
        }
    }

    /// A row bound to a rubric item.
    pub fn for_item(item: &RubricItem, r1: f64, r2: f64, r3: f64) -> Self {
        Self {
            item_id: item.id,
            description: item.description().to_string(),
            r1,
            r2,
            r3,
        }
    }

    pub fn zero_for(item: &RubricItem) -> Self {
        Self::for_item(item, 0.0, 0.0, 0.0)
    }

    pub fn mark(&self, stage: Stage) -> f64 {
        match stage {
            Stage::R1 => self.r1,
            Stage::R2 => self.r2,
            Stage::R3 => self.r3,
        }
    }

    pub fn set_mark(&mut self, stage: Stage, value: f64) {
        match stage {
            Stage::R1 => self.r1 = value,
            Stage::R2 => self.r2 = value,
            Stage::R3 => self.r3 = value,
        }
    }
}

/// The detailed marks of one student in one program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentReviewRecord {
    pub register_number: String,
    pub program: String,
    #[serde(default)]
    pub marks: Vec<AwardedMark>,
}

impl StudentReviewRecord {
    pub fn new(
        register_number: impl Into<String>,
        program: impl Into<String>,
        marks: Vec<AwardedMark>,
    ) -> Self {
        Self {
            register_number: register_number.into(),
            program: program.into(),
            marks,
        }
    }
}

/// Derived percentage scores. Never edited directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedAssessment {
    #[serde(rename = "Assessment1")]
    pub assessment1: u32,
    #[serde(rename = "Assessment2")]
    pub assessment2: u32,
    #[serde(rename = "Assessment3")]
    pub assessment3: u32,
    #[serde(rename = "Total")]
    pub total: u32,
}

impl NormalizedAssessment {
    pub fn get(&self, stage: Stage) -> u32 {
        match stage {
            Stage::R1 => self.assessment1,
            Stage::R2 => self.assessment2,
            Stage::R3 => self.assessment3,
        }
    }
}

impl fmt::Display for NormalizedAssessment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "A1={} A2={} A3={} Total={}",
            self.assessment1, self.assessment2, self.assessment3, self.total
        )
    }
}

/// A stored assessment summary, as returned when listing a program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentEntry {
    pub register_number: String,
    pub assessment: NormalizedAssessment,
}

/// Students sharing one undergraduate project and one set of marks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectGroup {
    pub project_name: String,
    #[serde(default)]
    pub members: Vec<String>,
}

impl ProjectGroup {
    pub fn new(project_name: impl Into<String>, members: Vec<String>) -> Self {
        Self {
            project_name: project_name.into(),
            members,
        }
    }

    /// Members trimmed, with blanks and repeats removed, in original order.
    pub fn distinct_members(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.members
            .iter()
            .map(|m| m.trim())
            .filter(|m| !m.is_empty() && seen.insert(m.to_string()))
            .map(str::to_string)
            .collect()
    }
}

/// What a review is entered for: one student or a whole project team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ReviewUnit {
    Student { register_number: String },
    Group(ProjectGroup),
}

impl ReviewUnit {
    pub fn student(register_number: impl Into<String>) -> Self {
        ReviewUnit::Student {
            register_number: register_number.into(),
        }
    }

    /// Register numbers whose records this unit writes.
    pub fn members(&self) -> Vec<String> {
        match self {
            ReviewUnit::Student { register_number } => vec![register_number.trim().to_string()],
            ReviewUnit::Group(group) => group.distinct_members(),
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, ReviewUnit::Group(_))
    }
}

impl fmt::Display for ReviewUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewUnit::Student { register_number } => write!(f, "student {register_number}"),
            ReviewUnit::Group(group) => write!(
                f,
                "project '{}' ({} members)",
                group.project_name,
                group.members.len()
            ),
        }
    }
}

/// Per-program review deadlines. A missing date means no deadline for that stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewDeadlineSet {
    pub program: String,
    #[serde(default)]
    pub zeroth: Option<NaiveDate>,
    #[serde(default)]
    pub first: Option<NaiveDate>,
    #[serde(default)]
    pub second: Option<NaiveDate>,
    #[serde(default)]
    pub third: Option<NaiveDate>,
}

impl ReviewDeadlineSet {
    pub fn deadline(&self, stage: ReviewStage) -> Option<NaiveDate> {
        match stage {
            ReviewStage::Zeroth => self.zeroth,
            ReviewStage::First => self.first,
            ReviewStage::Second => self.second,
            ReviewStage::Third => self.third,
        }
    }
}

/// The most recent upload for one student and review stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub register_number: String,
    pub stage: ReviewStage,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub uploaded_at: Option<DateTime<Utc>>,
}
