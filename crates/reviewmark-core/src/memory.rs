//! In-memory store for tests and embedding.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{
    AssessmentEntry, NormalizedAssessment, ProjectGroup, ReviewDeadlineSet, ReviewStage, Rubric,
    RubricKey, StudentReviewRecord, SubmissionRecord,
};
use crate::outcome::WriteKind;
use crate::traits::ReviewStore;

/// A write the store accepted, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedWrite {
    Rubric(RubricKey),
    Detail { register_number: String, program: String },
    Summary { register_number: String, program: String },
}

#[derive(Debug, Default)]
struct Data {
    rubrics: HashMap<RubricKey, Rubric>,
    records: HashMap<(String, String), StudentReviewRecord>,
    // program -> register number -> assessment, ordered for listing
    assessments: HashMap<String, BTreeMap<String, NormalizedAssessment>>,
    deadlines: HashMap<String, ReviewDeadlineSet>,
    submissions: HashMap<(String, ReviewStage), SubmissionRecord>,
    groups: HashMap<String, ProjectGroup>,
    failing_writes: HashSet<(String, WriteKind)>,
    log: Vec<RecordedWrite>,
}

/// A [`ReviewStore`] held entirely in memory.
///
/// Writes yield to the scheduler before landing so concurrent callers
/// interleave the way they would against a remote store. Failures can be
/// injected per member and write kind, or for the whole store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<Data>,
    unavailable: AtomicBool,
    read_count: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn data(&self) -> MutexGuard<'_, Data> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::Relaxed) {
            Err(StoreError::Unavailable("memory store switched off".into()))
        } else {
            Ok(())
        }
    }

    fn check_write(&self, register_number: &str, kind: WriteKind) -> Result<(), StoreError> {
        self.check_available()?;
        if self
            .data()
            .failing_writes
            .contains(&(register_number.to_string(), kind))
        {
            return Err(StoreError::WriteRejected {
                key: format!("{register_number}/{kind}"),
                message: "injected failure".into(),
            });
        }
        Ok(())
    }

    fn count_read(&self) -> Result<(), StoreError> {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        self.check_available()
    }

    // -- seeding ----------------------------------------------------------

    pub fn insert_rubric(&self, rubric: Rubric) {
        self.data().rubrics.insert(rubric.key(), rubric);
    }

    pub fn insert_group(&self, group: ProjectGroup) {
        self.data()
            .groups
            .insert(group.project_name.clone(), group);
    }

    pub fn insert_deadlines(&self, deadlines: ReviewDeadlineSet) {
        self.data()
            .deadlines
            .insert(deadlines.program.clone(), deadlines);
    }

    pub fn insert_submission(&self, submission: SubmissionRecord) {
        self.data().submissions.insert(
            (submission.register_number.clone(), submission.stage),
            submission,
        );
    }

    pub fn insert_record(&self, record: StudentReviewRecord) {
        self.data().records.insert(
            (record.register_number.clone(), record.program.clone()),
            record,
        );
    }

    // -- failure injection ------------------------------------------------

    /// Make every `kind` write for `register_number` fail until cleared.
    pub fn fail_writes(&self, register_number: &str, kind: WriteKind) {
        self.data()
            .failing_writes
            .insert((register_number.to_string(), kind));
    }

    pub fn clear_failures(&self) {
        self.data().failing_writes.clear();
    }

    /// Make every call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    // -- inspection -------------------------------------------------------

    pub fn rubric(&self, coordinator_id: &str, program: &str) -> Option<Rubric> {
        self.data()
            .rubrics
            .get(&RubricKey::new(coordinator_id, program))
            .cloned()
    }

    pub fn record(&self, register_number: &str, program: &str) -> Option<StudentReviewRecord> {
        self.data()
            .records
            .get(&(register_number.to_string(), program.to_string()))
            .cloned()
    }

    pub fn assessment(&self, register_number: &str, program: &str) -> Option<NormalizedAssessment> {
        self.data()
            .assessments
            .get(program)
            .and_then(|m| m.get(register_number))
            .copied()
    }

    /// Every accepted write, in arrival order.
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.data().log.clone()
    }

    pub fn read_count(&self) -> u32 {
        self.read_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ReviewStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get_rubric(
        &self,
        coordinator_id: &str,
        program: &str,
    ) -> Result<Option<Rubric>, StoreError> {
        self.count_read()?;
        Ok(self.rubric(coordinator_id, program))
    }

    async fn put_rubric(
        &self,
        coordinator_id: &str,
        program: &str,
        rubric: &Rubric,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        tokio::task::yield_now().await;
        let key = RubricKey::new(coordinator_id, program);
        let mut data = self.data();
        data.rubrics.insert(key.clone(), rubric.clone());
        data.log.push(RecordedWrite::Rubric(key));
        Ok(())
    }

    async fn get_student_record(
        &self,
        register_number: &str,
        program: &str,
    ) -> Result<Option<StudentReviewRecord>, StoreError> {
        self.count_read()?;
        Ok(self.record(register_number, program))
    }

    async fn put_student_record(
        &self,
        register_number: &str,
        program: &str,
        record: &StudentReviewRecord,
    ) -> Result<(), StoreError> {
        self.check_write(register_number, WriteKind::Detail)?;
        tokio::task::yield_now().await;
        let mut data = self.data();
        data.records.insert(
            (register_number.to_string(), program.to_string()),
            record.clone(),
        );
        data.log.push(RecordedWrite::Detail {
            register_number: register_number.to_string(),
            program: program.to_string(),
        });
        Ok(())
    }

    async fn put_assessment(
        &self,
        register_number: &str,
        program: &str,
        assessment: &NormalizedAssessment,
    ) -> Result<(), StoreError> {
        self.check_write(register_number, WriteKind::Summary)?;
        tokio::task::yield_now().await;
        let mut data = self.data();
        data.assessments
            .entry(program.to_string())
            .or_default()
            .insert(register_number.to_string(), *assessment);
        data.log.push(RecordedWrite::Summary {
            register_number: register_number.to_string(),
            program: program.to_string(),
        });
        Ok(())
    }

    async fn list_assessments(&self, program: &str) -> Result<Vec<AssessmentEntry>, StoreError> {
        self.count_read()?;
        Ok(self
            .data()
            .assessments
            .get(program)
            .map(|m| {
                m.iter()
                    .map(|(register_number, assessment)| AssessmentEntry {
                        register_number: register_number.clone(),
                        assessment: *assessment,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_deadlines(&self, program: &str) -> Result<Option<ReviewDeadlineSet>, StoreError> {
        self.count_read()?;
        Ok(self.data().deadlines.get(program).cloned())
    }

    async fn latest_submission(
        &self,
        register_number: &str,
        stage: ReviewStage,
    ) -> Result<Option<SubmissionRecord>, StoreError> {
        self.count_read()?;
        Ok(self
            .data()
            .submissions
            .get(&(register_number.to_string(), stage))
            .cloned())
    }

    async fn group_membership(
        &self,
        project_name: &str,
    ) -> Result<Option<ProjectGroup>, StoreError> {
        self.count_read()?;
        Ok(self.data().groups.get(project_name).cloned())
    }
}
