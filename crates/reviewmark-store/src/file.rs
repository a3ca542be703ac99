//! JSON-file review store.
//!
//! Each record is one pretty-printed JSON document under a root directory:
//!
//! ```text
//! rubrics/{coordinator}/{program}.json
//! records/{program}/{register}.json
//! assessments/{program}/{register}.json
//! deadlines/{program}.json
//! submissions/{register}/{stage}.json
//! groups/{project}.json
//! ```
//!
//! Key segments are escaped so any string maps to a single safe file name.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use reviewmark_core::error::StoreError;
use reviewmark_core::model::{
    AssessmentEntry, NormalizedAssessment, ProjectGroup, ReviewDeadlineSet, ReviewStage, Rubric,
    StudentReviewRecord, SubmissionRecord,
};
use reviewmark_core::traits::ReviewStore;

/// Escape one key segment into a file name.
///
/// ASCII letters, digits, `-` and `_` are kept; every other byte becomes
/// `%XX`. The empty string becomes `%`, which no other key produces.
pub fn escape_segment(segment: &str) -> String {
    if segment.is_empty() {
        return "%".to_string();
    }
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// A [`ReviewStore`] kept as JSON files on local disk.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, dir: &str, segments: &[&str]) -> PathBuf {
        let mut path = self.root.join(dir);
        if let Some((last, parents)) = segments.split_last() {
            for segment in parents {
                path.push(escape_segment(segment));
            }
            path.push(format!("{}.json", escape_segment(last)));
        }
        path
    }

    async fn read<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, StoreError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Malformed {
                key: path.display().to_string(),
                message: e.to_string(),
            })
    }

    /// Write through a temporary file and rename, so readers never see a
    /// partial document.
    async fn write<T: Serialize + ?Sized>(
        &self,
        path: &Path,
        value: &T,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(value).map_err(|e| StoreError::WriteRejected {
            key: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, json).await?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        tracing::trace!(path = %path.display(), "document written");
        Ok(())
    }

    // Administrative records the engine only reads.

    pub async fn put_deadlines(&self, deadlines: &ReviewDeadlineSet) -> Result<(), StoreError> {
        self.write(&self.path("deadlines", &[deadlines.program.as_str()]), deadlines)
            .await
    }

    pub async fn put_group(&self, group: &ProjectGroup) -> Result<(), StoreError> {
        self.write(&self.path("groups", &[group.project_name.as_str()]), group)
            .await
    }

    pub async fn put_submission(&self, submission: &SubmissionRecord) -> Result<(), StoreError> {
        let stage = submission.stage.to_string();
        let path = self.path(
            "submissions",
            &[submission.register_number.as_str(), stage.as_str()],
        );
        self.write(&path, submission).await
    }
}

#[async_trait]
impl ReviewStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    #[instrument(skip(self))]
    async fn get_rubric(
        &self,
        coordinator_id: &str,
        program: &str,
    ) -> Result<Option<Rubric>, StoreError> {
        self.read(&self.path("rubrics", &[coordinator_id, program]))
            .await
    }

    #[instrument(skip(self, rubric), fields(items = rubric.items.len()))]
    async fn put_rubric(
        &self,
        coordinator_id: &str,
        program: &str,
        rubric: &Rubric,
    ) -> Result<(), StoreError> {
        self.write(&self.path("rubrics", &[coordinator_id, program]), rubric)
            .await
    }

    #[instrument(skip(self))]
    async fn get_student_record(
        &self,
        register_number: &str,
        program: &str,
    ) -> Result<Option<StudentReviewRecord>, StoreError> {
        self.read(&self.path("records", &[program, register_number]))
            .await
    }

    #[instrument(skip(self, record))]
    async fn put_student_record(
        &self,
        register_number: &str,
        program: &str,
        record: &StudentReviewRecord,
    ) -> Result<(), StoreError> {
        self.write(&self.path("records", &[program, register_number]), record)
            .await
    }

    #[instrument(skip(self), fields(total = assessment.total))]
    async fn put_assessment(
        &self,
        register_number: &str,
        program: &str,
        assessment: &NormalizedAssessment,
    ) -> Result<(), StoreError> {
        let entry = AssessmentEntry {
            register_number: register_number.to_string(),
            assessment: *assessment,
        };
        self.write(&self.path("assessments", &[program, register_number]), &entry)
            .await
    }

    #[instrument(skip(self))]
    async fn list_assessments(&self, program: &str) -> Result<Vec<AssessmentEntry>, StoreError> {
        let dir = self.root.join("assessments").join(escape_segment(program));
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut rows = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(row) = self.read::<AssessmentEntry>(&path).await? {
                    rows.push(row);
                }
            }
        }
        rows.sort_by(|a, b| a.register_number.cmp(&b.register_number));
        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn get_deadlines(&self, program: &str) -> Result<Option<ReviewDeadlineSet>, StoreError> {
        self.read(&self.path("deadlines", &[program])).await
    }

    #[instrument(skip(self))]
    async fn latest_submission(
        &self,
        register_number: &str,
        stage: ReviewStage,
    ) -> Result<Option<SubmissionRecord>, StoreError> {
        let stage = stage.to_string();
        self.read(&self.path("submissions", &[register_number, stage.as_str()]))
            .await
    }

    #[instrument(skip(self))]
    async fn group_membership(
        &self,
        project_name: &str,
    ) -> Result<Option<ProjectGroup>, StoreError> {
        self.read(&self.path("groups", &[project_name])).await
    }
}
