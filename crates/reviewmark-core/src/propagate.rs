//! Group fan-out.
//!
//! One computed assessment and one set of detailed marks are written for every
//! member of a project group. Member write pairs run concurrently; a failing
//! member never stops its siblings, and every failure is kept per member.

use futures::stream::{FuturesUnordered, StreamExt};

use crate::engine::ReviewReporter;
use crate::model::{AwardedMark, NormalizedAssessment, ProjectGroup, StudentReviewRecord};
use crate::outcome::{MemberOutcome, WriteStatus};
use crate::traits::ReviewStore;

/// Write one member's detail record, then their summary.
///
/// The summary is attempted even when the detail write failed.
pub async fn write_member(
    store: &dyn ReviewStore,
    register_number: &str,
    program: &str,
    assessment: &NormalizedAssessment,
    marks: &[AwardedMark],
) -> MemberOutcome {
    let record = StudentReviewRecord::new(register_number, program, marks.to_vec());

    let detail: WriteStatus = store
        .put_student_record(register_number, program, &record)
        .await
        .into();
    let summary: WriteStatus = store
        .put_assessment(register_number, program, assessment)
        .await
        .into();

    for (what, status) in [("detail", &detail), ("summary", &summary)] {
        match status {
            WriteStatus::Written => {
                tracing::debug!(register_number, program, "{what} write landed");
            }
            WriteStatus::Failed { message } => {
                tracing::warn!(register_number, program, "{what} write failed: {message}");
            }
        }
    }

    MemberOutcome {
        register_number: register_number.to_string(),
        detail,
        summary,
    }
}

/// Write the same results for `members`, concurrently. Outcomes come back in
/// member order.
pub async fn propagate_to(
    store: &dyn ReviewStore,
    members: &[String],
    program: &str,
    assessment: &NormalizedAssessment,
    marks: &[AwardedMark],
    reporter: &dyn ReviewReporter,
) -> Vec<MemberOutcome> {
    let mut pending = FuturesUnordered::new();
    for (position, member) in members.iter().enumerate() {
        pending.push(async move {
            let outcome = write_member(store, member, program, assessment, marks).await;
            (position, outcome)
        });
    }

    let mut collected = Vec::with_capacity(members.len());
    while let Some((position, outcome)) = pending.next().await {
        reporter.on_member_complete(program, &outcome);
        collected.push((position, outcome));
    }

    collected.sort_by_key(|(position, _)| *position);
    collected.into_iter().map(|(_, outcome)| outcome).collect()
}

/// Fan one group's results out to every member.
pub async fn propagate(
    store: &dyn ReviewStore,
    group: &ProjectGroup,
    program: &str,
    assessment: &NormalizedAssessment,
    marks: &[AwardedMark],
    reporter: &dyn ReviewReporter,
) -> Vec<MemberOutcome> {
    let members = group.distinct_members();
    tracing::debug!(
        project = %group.project_name,
        members = members.len(),
        "propagating assessment"
    );
    propagate_to(store, &members, program, assessment, marks, reporter).await
}
