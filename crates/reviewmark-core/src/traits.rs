//! The record store the engine reads from and writes to.
//!
//! Implemented in-process by [`MemoryStore`](crate::memory::MemoryStore) and by
//! the file and HTTP backends in `reviewmark-store`.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{
    AssessmentEntry, NormalizedAssessment, ProjectGroup, ReviewDeadlineSet, ReviewStage, Rubric,
    StudentReviewRecord, SubmissionRecord,
};

/// Key-value record store with read/write-by-key and list-by-filter.
///
/// Every call is independent; implementations impose their own I/O timeouts.
/// Absent records are `Ok(None)`, never an error.
#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Human-readable backend name (e.g. "http").
    fn name(&self) -> &str;

    async fn get_rubric(
        &self,
        coordinator_id: &str,
        program: &str,
    ) -> Result<Option<Rubric>, StoreError>;

    /// Replace the rubric wholesale. Last write wins.
    async fn put_rubric(
        &self,
        coordinator_id: &str,
        program: &str,
        rubric: &Rubric,
    ) -> Result<(), StoreError>;

    async fn get_student_record(
        &self,
        register_number: &str,
        program: &str,
    ) -> Result<Option<StudentReviewRecord>, StoreError>;

    /// Replace a student's detailed marks wholesale.
    async fn put_student_record(
        &self,
        register_number: &str,
        program: &str,
        record: &StudentReviewRecord,
    ) -> Result<(), StoreError>;

    async fn put_assessment(
        &self,
        register_number: &str,
        program: &str,
        assessment: &NormalizedAssessment,
    ) -> Result<(), StoreError>;

    /// All assessment summaries stored for a program.
    async fn list_assessments(&self, program: &str) -> Result<Vec<AssessmentEntry>, StoreError>;

    async fn get_deadlines(&self, program: &str) -> Result<Option<ReviewDeadlineSet>, StoreError>;

    async fn latest_submission(
        &self,
        register_number: &str,
        stage: ReviewStage,
    ) -> Result<Option<SubmissionRecord>, StoreError>;

    async fn group_membership(
        &self,
        project_name: &str,
    ) -> Result<Option<ProjectGroup>, StoreError>;
}
