// crates/server/src/client.rs
//! HTTP client for a running `batchwright serve`.
//!
//! [`HttpEndpoint`] implements [`JobEndpoint`], so the same [`Poller`] that
//! drives an in-process engine can drive a remote one. A 429 from the Worker
//! route maps to [`Advance::Busy`].
//!
//! [`Poller`]: batchwright_core::Poller

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use batchwright_core::{Advance, ClearReport, JobEndpoint, JobStatus, JobType, Snapshot};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status}: {error}{}", .details.as_deref().map(|d| format!(" ({d})")).unwrap_or_default())]
    Api {
        status: u16,
        error: String,
        details: Option<String>,
    },

    #[error("Failed to read {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Http(e) => e.status().map(|s| s.as_u16()),
            ClientError::ReadFile { .. } => None,
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    details: Option<String>,
}

/// REST client for the job routes under `/api/jobs`.
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    base_url: String,
    http_client: Client,
}

impl HttpEndpoint {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    /// POST /api/jobs - upload `file` as the artifact of a new import job.
    pub async fn initiate(&self, job_type: JobType, file: &Path) -> Result<JobStatus, ClientError> {
        let body = tokio::fs::read(file)
            .await
            .map_err(|source| ClientError::ReadFile {
                path: file.display().to_string(),
                source,
            })?;
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{job_type}.csv"));

        let resp = self
            .http_client
            .post(self.url("/jobs"))
            .query(&[("type", job_type.as_str()), ("name", name.as_str())])
            .header(reqwest::header::CONTENT_TYPE, "text/csv")
            .body(body)
            .send()
            .await?;
        parse(resp).await
    }

    /// POST /api/jobs/backup - back up a directory on the server's filesystem.
    pub async fn initiate_backup(&self, source_dir: &Path) -> Result<JobStatus, ClientError> {
        let resp = self
            .http_client
            .post(self.url("/jobs/backup"))
            .json(&serde_json::json!({ "sourceDir": source_dir }))
            .send()
            .await?;
        parse(resp).await
    }

    /// GET /api/jobs/status
    pub async fn status(&self) -> Result<Snapshot, ClientError> {
        let resp = self.http_client.get(self.url("/jobs/status")).send().await?;
        parse(resp).await
    }
}

#[async_trait]
impl JobEndpoint for HttpEndpoint {
    type Error = ClientError;

    async fn advance(&self) -> Result<Advance, ClientError> {
        let resp = self
            .http_client
            .post(self.url("/jobs/advance"))
            .send()
            .await?;
        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            return Ok(Advance::Busy);
        }
        Ok(Advance::Snapshot(parse(resp).await?))
    }

    async fn clear(&self) -> Result<ClearReport, ClientError> {
        let resp = self.http_client.delete(self.url("/jobs")).send().await?;
        parse(resp).await
    }
}

async fn parse<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        let (error, details) = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => (body.error, body.details),
            Err(_) => (text, None),
        };
        return Err(ClientError::Api {
            status: status.as_u16(),
            error,
            details,
        });
    }
    Ok(resp.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchwright_core::JobState;
    use wiremock::matchers::{body_string, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn running_json() -> serde_json::Value {
        serde_json::json!({
            "jobId": "job-1",
            "jobType": "customers",
            "state": "running",
            "sourceName": "people.csv",
            "artifact": "job-1.csv",
            "cursor": {"offset": 31, "row": 1},
            "total": 2,
            "processed": 0,
            "success": 0,
            "failed": 0,
            "log": [],
            "startedAt": "2026-01-01T00:00:00Z"
        })
    }

    #[tokio::test]
    async fn test_initiate_uploads_file_with_type_and_name() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/jobs"))
            .and(query_param("type", "customers"))
            .and(query_param("name", "people.csv"))
            .and(body_string("email,first_name,last_name,city\n"))
            .respond_with(ResponseTemplate::new(202).set_body_json(running_json()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("people.csv");
        std::fs::write(&file, "email,first_name,last_name,city\n").unwrap();

        let client = HttpEndpoint::new(&server.uri());
        let status = client.initiate(JobType::Customers, &file).await.unwrap();
        assert_eq!(status.job_id, "job-1");
        assert_eq!(status.state, JobState::Running);
    }

    #[tokio::test]
    async fn test_conflict_is_reported_with_details() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/jobs/backup"))
            .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
                "error": "Job already running",
                "details": "A job is already running (job-1)"
            })))
            .mount(&server)
            .await;

        let client = HttpEndpoint::new(&server.uri());
        let err = client
            .initiate_backup(Path::new("/srv/assets"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(409));
        assert!(err.to_string().contains("Job already running"));
    }

    #[tokio::test]
    async fn test_advance_maps_429_to_busy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/jobs/advance"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
            .mount(&server)
            .await;

        let client = HttpEndpoint::new(&server.uri());
        assert_eq!(client.advance().await.unwrap(), Advance::Busy);
    }

    #[tokio::test]
    async fn test_advance_and_status_parse_snapshots() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/jobs/advance"))
            .respond_with(ResponseTemplate::new(200).set_body_json(running_json()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/jobs/status"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"state": "idle"})),
            )
            .mount(&server)
            .await;

        let client = HttpEndpoint::new(&format!("{}/", server.uri()));
        let Advance::Snapshot(snapshot) = client.advance().await.unwrap() else {
            panic!("expected a snapshot");
        };
        assert_eq!(snapshot.status().unwrap().total, 2);
        assert_eq!(client.status().await.unwrap(), Snapshot::idle());
    }

    #[tokio::test]
    async fn test_server_error_surfaces_as_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/jobs"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = HttpEndpoint::new(&server.uri());
        match client.clear().await.unwrap_err() {
            ClientError::Api { status, error, .. } => {
                assert_eq!(status, 500);
                assert_eq!(error, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
