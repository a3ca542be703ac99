//! Review aggregation orchestrator.
//!
//! Loads the rubric, normalizes awarded marks, and issues the detail and
//! summary writes for a student or a whole project group. Write failures are
//! reported per member in the outcome; the engine never retries on its own.

use std::sync::Arc;

use chrono::Utc;
use futures::future::try_join_all;

use crate::error::{EngineError, StoreError};
use crate::lateness::{evaluate_submission, StageLateness};
use crate::locks::{UnitKey, UnitLocks};
use crate::model::{
    AwardedMark, ProjectGroup, ReviewStage, ReviewUnit, Rubric, StudentReviewRecord,
};
use crate::normalize::{normalize, resolve_marks, MarkWarning};
use crate::outcome::{MemberOutcome, ReviewOutcome};
use crate::propagate::{propagate, propagate_to, write_member};
use crate::traits::ReviewStore;

/// Progress reporting trait.
pub trait ReviewReporter: Send + Sync {
    fn on_warning(&self, unit: &str, warning: &MarkWarning);
    fn on_member_complete(&self, program: &str, outcome: &MemberOutcome);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ReviewReporter for NoopReporter {
    fn on_warning(&self, _: &str, _: &MarkWarning) {}
    fn on_member_complete(&self, _: &str, _: &MemberOutcome) {}
}

/// Give a rubric's id-less items their identifiers before it is written:
/// carried over from the stored rubric where the item already existed, new
/// otherwise. Returns how many new identifiers were generated.
pub async fn settle_item_ids(
    store: &dyn ReviewStore,
    rubric: &mut Rubric,
) -> Result<usize, StoreError> {
    if rubric.items.iter().any(|item| item.id.is_none()) {
        let stored = store
            .get_rubric(&rubric.coordinator_id, &rubric.program)
            .await?;
        if let Some(stored) = stored {
            let carried = rubric.carry_ids_from(&stored);
            tracing::debug!(rubric = %rubric.key(), carried, "item identifiers carried over");
        }
    }
    Ok(rubric.assign_missing_ids())
}

/// A student's award sheet, aligned to the current rubric.
#[derive(Debug, Clone, PartialEq)]
pub struct AwardSheet {
    pub record: StudentReviewRecord,
    pub warnings: Vec<MarkWarning>,
    /// The record did not exist before this sheet was opened.
    pub created: bool,
}

/// The review aggregation engine.
pub struct ReviewEngine {
    store: Arc<dyn ReviewStore>,
    locks: UnitLocks,
}

impl ReviewEngine {
    pub fn new(store: Arc<dyn ReviewStore>) -> Self {
        Self {
            store,
            locks: UnitLocks::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ReviewStore> {
        &self.store
    }

    /// Load a rubric, treating an absent or item-less rubric as missing.
    pub async fn load_rubric(
        &self,
        coordinator_id: &str,
        program: &str,
    ) -> Result<Rubric, EngineError> {
        match self.store.get_rubric(coordinator_id, program).await {
            Ok(Some(rubric)) if !rubric.is_empty() => Ok(rubric),
            Ok(_) => Err(EngineError::RubricMissing {
                coordinator_id: coordinator_id.to_string(),
                program: program.to_string(),
            }),
            Err(e) => {
                tracing::error!(coordinator_id, program, "rubric load failed: {e}");
                Err(e.into())
            }
        }
    }

    /// Save a rubric wholesale, giving new items their identifiers first.
    ///
    /// Items that arrive without an identifier keep the one they had in the
    /// stored rubric, so marks recorded against them still correlate.
    pub async fn save_rubric(&self, mut rubric: Rubric) -> Result<Rubric, EngineError> {
        let assigned = settle_item_ids(self.store.as_ref(), &mut rubric).await?;
        rubric.updated_at = Some(Utc::now());
        self.store
            .put_rubric(&rubric.coordinator_id, &rubric.program, &rubric)
            .await?;
        tracing::info!(
            rubric = %rubric.key(),
            items = rubric.items.len(),
            assigned,
            "rubric saved"
        );
        Ok(rubric)
    }

    pub async fn resolve_group(&self, project_name: &str) -> Result<ProjectGroup, EngineError> {
        self.store
            .group_membership(project_name)
            .await?
            .ok_or_else(|| EngineError::UnknownGroup(project_name.to_string()))
    }

    /// Open a student's award sheet.
    ///
    /// Creates the record on first open with zero marks for every rubric item,
    /// binds legacy rows to item identifiers, and adds rows for items added to
    /// the rubric since the last save. The record is written back only when
    /// any of that changed it.
    pub async fn open_award_sheet(
        &self,
        register_number: &str,
        program: &str,
        coordinator_id: &str,
    ) -> Result<AwardSheet, EngineError> {
        let rubric = self.load_rubric(coordinator_id, program).await?;
        let _guard = self
            .locks
            .acquire(vec![UnitKey::student(register_number, program)])
            .await;

        let existing = self
            .store
            .get_student_record(register_number, program)
            .await?;
        let supplied = existing.as_ref().map(|r| r.marks.as_slice()).unwrap_or(&[]);
        let (marks, warnings) = resolve_marks(&rubric, supplied);

        let created = existing.is_none();
        let dropped = warnings
            .iter()
            .any(|w| matches!(w, MarkWarning::UnmatchedMark { .. }));
        let changed = existing.as_ref().map_or(true, |r| r.marks != marks);
        let record = StudentReviewRecord::new(register_number, program, marks);
        if dropped {
            tracing::warn!(
                register_number,
                program,
                "award sheet has rows matching no rubric item; stored record left unchanged"
            );
        } else if changed {
            self.store
                .put_student_record(register_number, program, &record)
                .await?;
            tracing::debug!(register_number, program, created, "award sheet written");
        }

        Ok(AwardSheet {
            record,
            warnings,
            created,
        })
    }

    /// Normalize awarded marks and write them for every member of `unit`.
    pub async fn submit_review(
        &self,
        unit: &ReviewUnit,
        program: &str,
        coordinator_id: &str,
        awarded: &[AwardedMark],
        reporter: &dyn ReviewReporter,
    ) -> Result<ReviewOutcome, EngineError> {
        let members = unit.members();
        if members.is_empty() || members.iter().any(|m| m.is_empty()) {
            return Err(EngineError::InvalidUnit(format!(
                "{unit} has no register numbers to write"
            )));
        }

        let rubric = self.load_rubric(coordinator_id, program).await?;
        let normalization = normalize(&rubric, awarded)?;

        let label = unit.to_string();
        for warning in &normalization.warnings {
            tracing::warn!(unit = %label, program, "{warning}");
            reporter.on_warning(&label, warning);
        }

        let assessment = normalization.assessment;
        let marks = normalization.marks;

        let member_outcomes = {
            let _guard = self.locks.acquire(UnitKey::for_unit(unit, program)).await;
            match unit {
                ReviewUnit::Student { .. } => {
                    let outcome =
                        write_member(self.store.as_ref(), &members[0], program, &assessment, &marks)
                            .await;
                    reporter.on_member_complete(program, &outcome);
                    vec![outcome]
                }
                ReviewUnit::Group(group) => {
                    propagate(
                        self.store.as_ref(),
                        group,
                        program,
                        &assessment,
                        &marks,
                        reporter,
                    )
                    .await
                }
            }
        };

        let outcome = ReviewOutcome {
            unit: unit.clone(),
            program: program.to_string(),
            assessment,
            marks,
            warnings: normalization.warnings,
            members: member_outcomes,
            submitted_at: Utc::now(),
        };

        match outcome.partial_failure() {
            None => tracing::info!(unit = %label, program, %assessment, "review saved"),
            Some(failure) => tracing::warn!(unit = %label, program, %assessment, "{failure}"),
        }

        Ok(outcome)
    }

    /// Re-write only the members whose writes failed in `previous`, reusing
    /// its computed assessment and marks.
    ///
    /// Nothing is recomputed, so a retry cannot make group members diverge.
    pub async fn retry_failed(
        &self,
        previous: &ReviewOutcome,
        reporter: &dyn ReviewReporter,
    ) -> ReviewOutcome {
        let failed: Vec<String> = previous
            .failed_members()
            .into_iter()
            .map(str::to_string)
            .collect();
        if failed.is_empty() {
            return previous.clone();
        }

        let program = previous.program.as_str();
        let retried = {
            let mut keys: Vec<UnitKey> = failed
                .iter()
                .map(|m| UnitKey::student(m, program))
                .collect();
            if let ReviewUnit::Group(group) = &previous.unit {
                keys.push(UnitKey::Project {
                    project_name: group.project_name.clone(),
                    program: program.to_string(),
                });
            }
            let _guard = self.locks.acquire(keys).await;
            propagate_to(
                self.store.as_ref(),
                &failed,
                program,
                &previous.assessment,
                &previous.marks,
                reporter,
            )
            .await
        };

        let mut outcome = previous.clone();
        for fresh in retried {
            if let Some(slot) = outcome
                .members
                .iter_mut()
                .find(|m| m.register_number == fresh.register_number)
            {
                *slot = fresh;
            }
        }
        outcome.submitted_at = Utc::now();

        tracing::info!(
            unit = %outcome.unit,
            program,
            retried = failed.len(),
            still_failing = outcome.failed_members().len(),
            "retried failed members"
        );
        outcome
    }

    /// Lateness of a student's latest upload for every review stage.
    ///
    /// Stages without a deadline, or without an upload, come back `Unknown`.
    pub async fn stage_lateness(
        &self,
        register_number: &str,
        program: &str,
    ) -> Result<Vec<StageLateness>, EngineError> {
        let deadlines = self.store.get_deadlines(program).await?.unwrap_or_default();
        let store = self.store.as_ref();

        let submissions = try_join_all(
            ReviewStage::ALL
                .iter()
                .map(|&stage| store.latest_submission(register_number, stage)),
        )
        .await?;

        Ok(ReviewStage::ALL
            .iter()
            .zip(submissions)
            .map(|(&stage, submission)| {
                let deadline = deadlines.deadline(stage);
                let uploaded_at = submission.as_ref().and_then(|s| s.uploaded_at);
                StageLateness {
                    stage,
                    deadline,
                    uploaded_at,
                    paths: submission.map(|s| s.paths).unwrap_or_default(),
                    status: evaluate_submission(uploaded_at.as_ref(), deadline),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryStore, RecordedWrite};
    use crate::model::{NormalizedAssessment, ReviewDeadlineSet, RubricItem, StageCriterion, SubmissionRecord};
    use crate::outcome::WriteKind;
    use crate::lateness::LateStatus;
    use chrono::{NaiveDate, TimeZone};

    const COORD: &str = "coord-01";
    const PROGRAM: &str = "BE-CSE";

    fn one_item_rubric() -> Rubric {
        Rubric::new(COORD, PROGRAM).with_items(vec![RubricItem::new(
            StageCriterion::new("Presentation", 10),
            StageCriterion::new("Implementation", 10),
            StageCriterion::new("Final demo", 10),
        )])
    }

    fn setup() -> (Arc<MemoryStore>, ReviewEngine, Rubric) {
        let store = Arc::new(MemoryStore::new());
        let rubric = one_item_rubric();
        store.insert_rubric(rubric.clone());
        let engine = ReviewEngine::new(store.clone());
        (store, engine, rubric)
    }

    fn team() -> ReviewUnit {
        ReviewUnit::Group(ProjectGroup::new(
            "Smart irrigation",
            vec!["21CS001".into(), "21CS002".into(), "21CS003".into()],
        ))
    }

    fn expected() -> NormalizedAssessment {
        NormalizedAssessment {
            assessment1: 80,
            assessment2: 50,
            assessment3: 100,
            total: 77,
        }
    }

    #[tokio::test]
    async fn individual_submission_writes_detail_and_summary() {
        let (store, engine, rubric) = setup();
        let marks = vec![AwardedMark::for_item(&rubric.items[0], 8.0, 5.0, 10.0)];

        let outcome = engine
            .submit_review(&ReviewUnit::student("21CS010"), PROGRAM, COORD, &marks, &NoopReporter)
            .await
            .unwrap();

        assert!(outcome.is_fully_saved());
        assert_eq!(outcome.assessment, expected());
        assert_eq!(store.assessment("21CS010", PROGRAM), Some(expected()));
        assert_eq!(store.record("21CS010", PROGRAM).unwrap().marks, outcome.marks);
    }

    #[tokio::test]
    async fn group_members_hold_identical_assessments() {
        let (store, engine, rubric) = setup();
        let marks = vec![AwardedMark::for_item(&rubric.items[0], 8.0, 5.0, 10.0)];

        let outcome = engine
            .submit_review(&team(), PROGRAM, COORD, &marks, &NoopReporter)
            .await
            .unwrap();

        assert!(outcome.is_fully_saved());
        let stored: Vec<_> = team()
            .members()
            .iter()
            .map(|m| serde_json::to_vec(&store.assessment(m, PROGRAM).unwrap()).unwrap())
            .collect();
        assert!(stored.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(store.assessment("21CS003", PROGRAM), Some(expected()));
    }

    #[tokio::test]
    async fn one_failed_member_is_reported_and_retried() {
        let (store, engine, rubric) = setup();
        store.fail_writes("21CS002", WriteKind::Detail);
        let marks = vec![AwardedMark::for_item(&rubric.items[0], 8.0, 5.0, 10.0)];

        let outcome = engine
            .submit_review(&team(), PROGRAM, COORD, &marks, &NoopReporter)
            .await
            .unwrap();

        assert_eq!(outcome.saved_members(), vec!["21CS001", "21CS003"]);
        let failure = outcome.partial_failure().unwrap();
        assert_eq!(failure.register_numbers(), vec!["21CS002"]);
        assert_eq!(failure.failed[0].writes[0].kind, WriteKind::Detail);
        assert_eq!(outcome.assessment, expected());

        store.clear_failures();
        let writes_before = store.writes().len();
        let retried = engine.retry_failed(&outcome, &NoopReporter).await;

        assert!(retried.is_fully_saved());
        assert_eq!(retried.assessment, outcome.assessment);
        // only the failed member was written again
        let new_writes = &store.writes()[writes_before..];
        assert_eq!(new_writes.len(), 2);
        assert!(new_writes.iter().all(|w| matches!(
            w,
            RecordedWrite::Detail { register_number, .. } | RecordedWrite::Summary { register_number, .. }
                if register_number == "21CS002"
        )));
    }

    #[tokio::test]
    async fn missing_or_empty_rubric_fails_fast() {
        let store = Arc::new(MemoryStore::new());
        let engine = ReviewEngine::new(store.clone());
        let err = engine
            .submit_review(&ReviewUnit::student("x"), PROGRAM, COORD, &[], &NoopReporter)
            .await
            .unwrap_err();
        assert!(err.is_rubric_missing());

        store.insert_rubric(Rubric::new(COORD, PROGRAM));
        let err = engine
            .submit_review(&ReviewUnit::student("x"), PROGRAM, COORD, &[], &NoopReporter)
            .await
            .unwrap_err();
        assert!(err.is_rubric_missing());
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn store_outage_surfaces_untransformed() {
        let (store, engine, _) = setup();
        store.set_unavailable(true);
        let err = engine
            .submit_review(&ReviewUnit::student("x"), PROGRAM, COORD, &[], &NoopReporter)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::StoreUnavailable(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn clamped_marks_are_warned_and_saved_clamped() {
        let (store, engine, rubric) = setup();
        let marks = vec![AwardedMark::for_item(&rubric.items[0], 15.0, 5.0, 10.0)];

        let outcome = engine
            .submit_review(&ReviewUnit::student("21CS010"), PROGRAM, COORD, &marks, &NoopReporter)
            .await
            .unwrap();

        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.assessment.assessment1, 100);
        assert_eq!(store.record("21CS010", PROGRAM).unwrap().marks[0].r1, 10.0);
    }

    #[tokio::test]
    async fn empty_group_is_rejected() {
        let (_, engine, _) = setup();
        let unit = ReviewUnit::Group(ProjectGroup::new("Nobody", vec![]));
        let err = engine
            .submit_review(&unit, PROGRAM, COORD, &[], &NoopReporter)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidUnit(_)));
    }

    #[tokio::test]
    async fn concurrent_submissions_do_not_interleave() {
        let (store, engine, rubric) = setup();
        let engine = Arc::new(engine);
        let unit = ReviewUnit::student("21CS010");

        let mut handles = Vec::new();
        for r1 in [2.0, 4.0, 6.0, 8.0] {
            let engine = Arc::clone(&engine);
            let unit = unit.clone();
            let marks = vec![AwardedMark::for_item(&rubric.items[0], r1, 0.0, 0.0)];
            handles.push(tokio::spawn(async move {
                engine
                    .submit_review(&unit, PROGRAM, COORD, &marks, &NoopReporter)
                    .await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().is_fully_saved());
        }

        let writes = store.writes();
        assert_eq!(writes.len(), 8);
        for pair in writes.chunks(2) {
            assert!(matches!(pair[0], RecordedWrite::Detail { .. }));
            assert!(matches!(pair[1], RecordedWrite::Summary { .. }));
        }
        // detail and summary agree with each other after the dust settles
        let record = store.record("21CS010", PROGRAM).unwrap();
        let summary = store.assessment("21CS010", PROGRAM).unwrap();
        assert_eq!(f64::from(summary.assessment1), record.marks[0].r1 * 10.0);
    }

    #[tokio::test]
    async fn award_sheet_is_created_lazily_with_zeros() {
        let (store, engine, rubric) = setup();

        let sheet = engine
            .open_award_sheet("21CS010", PROGRAM, COORD)
            .await
            .unwrap();
        assert!(sheet.created);
        assert_eq!(sheet.record.marks, vec![AwardedMark::zero_for(&rubric.items[0])]);
        assert_eq!(store.writes().len(), 1);

        // reopening an unchanged sheet does not write again
        let again = engine
            .open_award_sheet("21CS010", PROGRAM, COORD)
            .await
            .unwrap();
        assert!(!again.created);
        assert_eq!(store.writes().len(), 1);
    }

    #[tokio::test]
    async fn award_sheet_imports_legacy_rows() {
        let (store, engine, rubric) = setup();
        store.insert_record(StudentReviewRecord::new(
            "21CS010",
            PROGRAM,
            vec![AwardedMark::by_description("Presentation", 6.0, 7.0, 8.0)],
        ));

        let sheet = engine
            .open_award_sheet("21CS010", PROGRAM, COORD)
            .await
            .unwrap();
        assert!(!sheet.created);
        assert_eq!(sheet.record.marks[0].item_id, rubric.items[0].id);
        assert_eq!(sheet.record.marks[0].r2, 7.0);
        assert_eq!(
            store.record("21CS010", PROGRAM).unwrap().marks[0].item_id,
            rubric.items[0].id
        );
    }

    #[tokio::test]
    async fn save_rubric_assigns_ids() {
        let store = Arc::new(MemoryStore::new());
        let engine = ReviewEngine::new(store.clone());
        let mut rubric = one_item_rubric();
        rubric.items[0].id = None;

        let saved = engine.save_rubric(rubric).await.unwrap();
        assert!(saved.items[0].id.is_some());
        assert!(saved.updated_at.is_some());
        assert_eq!(store.rubric(COORD, PROGRAM), Some(saved));
    }

    #[tokio::test]
    async fn resaving_rubric_keeps_ids_and_recorded_marks() {
        let store = Arc::new(MemoryStore::new());
        let engine = ReviewEngine::new(store.clone());
        let without_ids = || {
            let mut rubric = one_item_rubric();
            rubric.items[0].id = None;
            rubric
        };

        let first = engine.save_rubric(without_ids()).await.unwrap();
        let marks = vec![AwardedMark::by_description("Presentation", 8.0, 5.0, 10.0)];
        let outcome = engine
            .submit_review(&ReviewUnit::student("21CS010"), PROGRAM, COORD, &marks, &NoopReporter)
            .await
            .unwrap();
        assert_eq!(outcome.assessment.total, 77);

        let second = engine.save_rubric(without_ids()).await.unwrap();
        assert_eq!(second.items[0].id, first.items[0].id);

        let sheet = engine
            .open_award_sheet("21CS010", PROGRAM, COORD)
            .await
            .unwrap();
        assert!(sheet.warnings.is_empty());
        assert_eq!(sheet.record.marks[0].r1, 8.0);
        assert_eq!(store.record("21CS010", PROGRAM).unwrap().marks[0].r1, 8.0);
    }

    #[tokio::test]
    async fn award_sheet_with_unmatched_rows_is_not_written_back() {
        let (store, engine, _) = setup();
        let stale = AwardedMark {
            item_id: Some(uuid::Uuid::new_v4()),
            ..AwardedMark::by_description("Presentation", 8.0, 5.0, 10.0)
        };
        let record = StudentReviewRecord::new("21CS010", PROGRAM, vec![stale]);
        store.insert_record(record.clone());
        let writes_before = store.writes().len();

        let sheet = engine
            .open_award_sheet("21CS010", PROGRAM, COORD)
            .await
            .unwrap();
        assert!(matches!(
            sheet.warnings.as_slice(),
            [MarkWarning::UnmatchedMark { .. }]
        ));
        assert_eq!(sheet.record.marks[0].r1, 0.0);
        assert_eq!(store.writes().len(), writes_before);
        assert_eq!(store.record("21CS010", PROGRAM), Some(record));
    }

    #[tokio::test]
    async fn resolves_known_groups_only() {
        let (store, engine, _) = setup();
        store.insert_group(ProjectGroup::new("Drone", vec!["A".into()]));
        assert_eq!(engine.resolve_group("Drone").await.unwrap().members, vec!["A"]);
        assert!(matches!(
            engine.resolve_group("Rover").await,
            Err(EngineError::UnknownGroup(_))
        ));
    }

    #[tokio::test]
    async fn lateness_per_stage() {
        let (store, engine, _) = setup();
        let day = |d| NaiveDate::from_ymd_opt(2024, 3, d).unwrap();
        store.insert_deadlines(ReviewDeadlineSet {
            program: PROGRAM.into(),
            zeroth: Some(day(1)),
            first: Some(day(10)),
            second: None,
            third: Some(day(20)),
        });
        // noon UTC keeps the calendar day stable across local timezones within +/-11h
        let noon = |d| Utc.with_ymd_and_hms(2024, 3, d, 12, 0, 0).unwrap();
        store.insert_submission(SubmissionRecord {
            register_number: "21CS010".into(),
            stage: ReviewStage::Zeroth,
            paths: vec!["proposal.pdf".into()],
            uploaded_at: Some(noon(1)),
        });
        store.insert_submission(SubmissionRecord {
            register_number: "21CS010".into(),
            stage: ReviewStage::First,
            paths: vec!["review1.pptx".into()],
            uploaded_at: Some(noon(13)),
        });
        store.insert_submission(SubmissionRecord {
            register_number: "21CS010".into(),
            stage: ReviewStage::Second,
            paths: vec![],
            uploaded_at: Some(noon(15)),
        });

        let stages = engine.stage_lateness("21CS010", PROGRAM).await.unwrap();
        let statuses: Vec<_> = stages.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![
                LateStatus::OnTime,
                LateStatus::Late { days: 3 },
                LateStatus::Unknown,
                LateStatus::Unknown,
            ]
        );
        assert_eq!(stages[1].paths, vec!["review1.pptx"]);
    }
}
