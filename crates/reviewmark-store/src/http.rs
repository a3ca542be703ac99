//! HTTP/JSON review store client.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::instrument;

use reviewmark_core::error::StoreError;
use reviewmark_core::model::{
    AssessmentEntry, NormalizedAssessment, ProjectGroup, ReviewDeadlineSet, ReviewStage, Rubric,
    StudentReviewRecord, SubmissionRecord,
};
use reviewmark_core::traits::ReviewStore;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// A [`ReviewStore`] backed by the institution's records API.
pub struct HttpStore {
    base_url: Url,
    api_token: Option<String>,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl HttpStore {
    pub fn new(base_url: &str, api_token: Option<String>, timeout_secs: u64) -> Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("invalid store base_url: {base_url}"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("store base_url cannot hold a path: {base_url}");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            base_url,
            api_token: api_token.filter(|t| !t.is_empty()),
            timeout_secs,
            client,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Unavailable(format!("bad base URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let req = self.client.request(method, url);
        match &self.api_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    fn send_error(&self, e: reqwest::Error) -> StoreError {
        if e.is_timeout() {
            StoreError::Timeout(self.timeout_secs)
        } else {
            StoreError::Unavailable(e.to_string())
        }
    }

    /// GET a JSON document; 404 means absent.
    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
    ) -> Result<Option<T>, StoreError> {
        let url = self.url(segments)?;
        let key = url.path().to_string();
        let response = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        let status = response.status().as_u16();
        if status == 404 {
            return Ok(None);
        }
        if status >= 400 {
            let message = response.text().await.unwrap_or_default();
            return Err(StoreError::Api { status, message });
        }

        let body = response.bytes().await.map_err(|e| self.send_error(e))?;
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| StoreError::Malformed {
                key,
                message: e.to_string(),
            })
    }

    async fn put_json<T: Serialize + ?Sized>(
        &self,
        segments: &[&str],
        body: &T,
    ) -> Result<(), StoreError> {
        let url = self.url(segments)?;
        let key = url.path().to_string();
        let response = self
            .request(Method::PUT, url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        let status = response.status().as_u16();
        match status {
            0..=399 => Ok(()),
            400 | 403 | 409 | 422 => Err(StoreError::WriteRejected {
                key,
                message: response.text().await.unwrap_or_default(),
            }),
            _ => Err(StoreError::Api {
                status,
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[async_trait]
impl ReviewStore for HttpStore {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self))]
    async fn get_rubric(
        &self,
        coordinator_id: &str,
        program: &str,
    ) -> Result<Option<Rubric>, StoreError> {
        self.get_json(&["rubrics", coordinator_id, program]).await
    }

    #[instrument(skip(self, rubric), fields(items = rubric.items.len()))]
    async fn put_rubric(
        &self,
        coordinator_id: &str,
        program: &str,
        rubric: &Rubric,
    ) -> Result<(), StoreError> {
        self.put_json(&["rubrics", coordinator_id, program], rubric)
            .await
    }

    #[instrument(skip(self))]
    async fn get_student_record(
        &self,
        register_number: &str,
        program: &str,
    ) -> Result<Option<StudentReviewRecord>, StoreError> {
        self.get_json(&["students", register_number, "programs", program, "marks"])
            .await
    }

    #[instrument(skip(self, record))]
    async fn put_student_record(
        &self,
        register_number: &str,
        program: &str,
        record: &StudentReviewRecord,
    ) -> Result<(), StoreError> {
        self.put_json(
            &["students", register_number, "programs", program, "marks"],
            record,
        )
        .await
    }

    #[instrument(skip(self), fields(total = assessment.total))]
    async fn put_assessment(
        &self,
        register_number: &str,
        program: &str,
        assessment: &NormalizedAssessment,
    ) -> Result<(), StoreError> {
        self.put_json(
            &["students", register_number, "programs", program, "assessment"],
            assessment,
        )
        .await
    }

    #[instrument(skip(self))]
    async fn list_assessments(&self, program: &str) -> Result<Vec<AssessmentEntry>, StoreError> {
        Ok(self
            .get_json::<Vec<AssessmentEntry>>(&["programs", program, "assessments"])
            .await?
            .unwrap_or_default())
    }

    #[instrument(skip(self))]
    async fn get_deadlines(&self, program: &str) -> Result<Option<ReviewDeadlineSet>, StoreError> {
        self.get_json(&["programs", program, "deadlines"]).await
    }

    #[instrument(skip(self))]
    async fn latest_submission(
        &self,
        register_number: &str,
        stage: ReviewStage,
    ) -> Result<Option<SubmissionRecord>, StoreError> {
        let stage = stage.to_string();
        self.get_json(&[
            "students",
            register_number,
            "submissions",
            stage.as_str(),
            "latest",
        ])
        .await
    }

    #[instrument(skip(self))]
    async fn group_membership(
        &self,
        project_name: &str,
    ) -> Result<Option<ProjectGroup>, StoreError> {
        self.get_json(&["groups", project_name]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reviewmark_core::model::{RubricItem, StageCriterion};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(server: &MockServer) -> HttpStore {
        HttpStore::new(&server.uri(), Some("test-token".into()), 5).unwrap()
    }

    #[tokio::test]
    async fn get_rubric_with_auth() {
        let server = MockServer::start().await;
        let rubric = Rubric::new("coord-01", "BE-CSE").with_items(vec![RubricItem::new(
            StageCriterion::new("Demo", 10),
            StageCriterion::new("Demo", 10),
            StageCriterion::new("Demo", 10),
        )]);

        Mock::given(method("GET"))
            .and(path("/rubrics/coord-01/BE-CSE"))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&rubric))
            .expect(1)
            .mount(&server)
            .await;

        let fetched = store(&server).get_rubric("coord-01", "BE-CSE").await.unwrap();
        assert_eq!(fetched, Some(rubric));
    }

    #[tokio::test]
    async fn not_found_is_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = store(&server);
        assert!(store.get_rubric("c", "p").await.unwrap().is_none());
        assert!(store.list_assessments("p").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn segments_are_percent_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/groups/Smart%20irrigation%2Fv2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "project_name": "Smart irrigation/v2",
                "members": ["21CS001", "21CS002"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let group = store(&server)
            .group_membership("Smart irrigation/v2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(group.members.len(), 2);
    }

    #[tokio::test]
    async fn put_assessment_sends_summary_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/students/21CS001/programs/BE/assessment"))
            .and(body_json(serde_json::json!({
                "Assessment1": 80,
                "Assessment2": 50,
                "Assessment3": 100,
                "Total": 77
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let assessment = NormalizedAssessment {
            assessment1: 80,
            assessment2: 50,
            assessment3: 100,
            total: 77,
        };
        store(&server)
            .put_assessment("21CS001", "BE", &assessment)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn error_statuses_are_classified() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/students/A/programs/BE/marks"))
            .respond_with(ResponseTemplate::new(409).set_body_string("stale"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/programs/BE/deadlines"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let store = store(&server);
        let record = StudentReviewRecord::new("A", "BE", vec![]);
        let err = store.put_student_record("A", "BE", &record).await.unwrap_err();
        assert!(matches!(err, StoreError::WriteRejected { .. }));

        let err = store.get_deadlines("BE").await.unwrap_err();
        assert!(matches!(err, StoreError::Api { status: 503, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/students/A/submissions/first/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = store(&server)
            .latest_submission("A", ReviewStage::First)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Malformed { .. }));
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let store = HttpStore::new(&server.uri(), None, 1).unwrap();
        let err = store.get_rubric("c", "p").await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout(1)));
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let store = HttpStore::new(&format!("http://127.0.0.1:{port}"), None, 5).unwrap();
        let err = store.get_rubric("c", "p").await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[test]
    fn base_path_is_kept() {
        let store = HttpStore::new("https://reviews.example.edu/api/", None, 5).unwrap();
        let url = store.url(&["programs", "BE", "deadlines"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://reviews.example.edu/api/programs/BE/deadlines"
        );
        assert!(HttpStore::new("not a url", None, 5).is_err());
    }
}
