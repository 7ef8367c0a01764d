// crates/client/src/http.rs
//! [`JobStore`] over the backend's REST resource.
//!
//! | op                 | request                                                   |
//! |--------------------|-----------------------------------------------------------|
//! | create             | `POST /import-jobs`                                       |
//! | get                | `GET /import-jobs/{id}`                                   |
//! | list_active        | `GET /import-jobs/user/{user_id}?status=pending,in_progress` |
//! | update             | `PUT /import-jobs/{id}`                                   |
//! | trigger_processing | `POST /import-jobs/{id}/process`                          |

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use datadict_jobs::{JobStore, StoreError};
use datadict_types::{ImportJob, JobId, JobStatus, JobUpdate, NewImportJob, ProcessRequest};

use crate::config::{ClientConfig, ClientError};

pub struct HttpJobStore {
    config: ClientConfig,
    http: reqwest::Client,
}

impl HttpJobStore {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { config, http })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.config.base_url, path);
        let builder = self
            .http
            .request(method, url)
            .header("Accept", "application/json");
        match &self.config.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, StoreError> {
        let request = builder
            .build()
            .map_err(|e| StoreError::Unavailable(format!("invalid request: {e}")))?;
        let method = request.method().clone();
        let url = request.url().clone();

        let resp = self.http.execute(request).await.map_err(|e| {
            tracing::debug!(%method, %url, error = %e, "job store request failed");
            transport_error(e)
        })?;
        tracing::debug!(%method, %url, status = %resp.status(), "job store response");
        Ok(resp)
    }

    async fn send_json<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, StoreError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut builder = self.request(method, path);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let resp = self.send(builder).await?;
        let resp = ensure_success(resp).await?;
        decode(resp).await
    }
}

#[async_trait]
impl JobStore for HttpJobStore {
    async fn create(&self, job: NewImportJob) -> Result<ImportJob, StoreError> {
        self.send_json(Method::POST, "/import-jobs", Some(&job)).await
    }

    async fn get(&self, id: JobId) -> Result<Option<ImportJob>, StoreError> {
        let resp = self
            .send(self.request(Method::GET, &format!("/import-jobs/{id}")))
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = ensure_success(resp).await?;
        decode(resp).await.map(Some)
    }

    async fn list_active(&self, user_id: &str) -> Result<Vec<ImportJob>, StoreError> {
        let statuses: Vec<&str> = JobStatus::ACTIVE.iter().map(|s| s.as_str()).collect();
        let path = format!(
            "/import-jobs/user/{}?status={}",
            urlencoding::encode(user_id),
            statuses.join(",")
        );
        let mut jobs: Vec<ImportJob> = self.send_json::<(), _>(Method::GET, &path, None).await?;
        // The backend filters, but a stray terminal record must never be resumed.
        jobs.retain(ImportJob::is_active);
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn update(&self, id: JobId, update: JobUpdate) -> Result<ImportJob, StoreError> {
        let resp = self
            .send(
                self.request(Method::PUT, &format!("/import-jobs/{id}"))
                    .json(&update),
            )
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(id));
        }
        let resp = ensure_success(resp).await?;
        decode(resp).await
    }

    async fn trigger_processing(&self, id: JobId, request: ProcessRequest) -> Result<(), StoreError> {
        let resp = self
            .send(
                self.request(Method::POST, &format!("/import-jobs/{id}/process"))
                    .json(&request),
            )
            .await?;
        ensure_success(resp).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}

fn transport_error(e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::Unavailable(format!("request timed out: {e}"))
    } else {
        StoreError::Unavailable(e.to_string())
    }
}

/// Turn a non-2xx response into `Rejected`, using FastAPI's `detail` when
/// the body carries one.
async fn ensure_success(resp: Response) -> Result<Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(StoreError::Rejected {
        status: status.as_u16(),
        message: error_message(status, &body),
    })
}

fn error_message(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("detail").cloned());
    match detail {
        Some(serde_json::Value::String(message)) => message,
        Some(other) => other.to_string(),
        None if !body.trim().is_empty() => body.trim().to_string(),
        None => status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string(),
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, StoreError> {
    let bytes = resp.bytes().await.map_err(transport_error)?;
    serde_json::from_slice(&bytes).map_err(|e| StoreError::Decode(e.to_string()))
}
