//! HTTP client for the criteria API
//!
//! Implements `CriteriaStore`, `ReferenceStore` and `AuditService` over the
//! REST endpoints:
//! - `GET/POST {base}/criteria/{yearGroup}/{program}/{semester}`
//! - `GET/POST {base}/year-groups`
//! - `GET/POST {base}/programs/{yearGroup}`
//! - `POST {base}/audit/run`
//!
//! The bearer token is part of the client's configuration and sent on every
//! request; there is no ambient session state.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::StorageError;
use crate::normalize::{normalize_audit_outcomes, normalize_semester_data};
use crate::schema::{
    AuditOutcome, AuditRequest, ProgramMeta, SemesterData, SemesterKey, YearGroupSummary,
};
use crate::storage_traits::{
    AuditService, CriteriaStore, ReferenceStore, SaveReceipt, StorageResult,
};

/// Default API base when `GRADCHECK_API_BASE` is not set.
pub const DEFAULT_API_BASE: &str = "http://localhost:3000/api";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Criteria API client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// API base URL, e.g. `https://audit.example.edu/api`
    pub base_url: String,
    /// Bearer token (optional for unauthenticated deployments)
    pub token: Option<String>,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            base_url: std::env::var("GRADCHECK_API_BASE")
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
            token: std::env::var("GRADCHECK_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
            timeout_secs: std::env::var("GRADCHECK_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Create config for a specific API base
    pub fn new(base_url: &str) -> Self {
        ClientConfig {
            base_url: base_url.to_string(),
            token: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Set authentication token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// HTTP client for the criteria API
#[derive(Debug, Clone)]
pub struct HttpClient {
    config: ClientConfig,
    base: Url,
    http_client: reqwest::Client,
}

impl HttpClient {
    /// Create a new client
    pub fn new(config: ClientConfig) -> StorageResult<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| StorageError::Config(format!("{}: {}", config.base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(StorageError::Config(format!(
                "{} cannot be used as an API base",
                config.base_url
            )));
        }

        let http_client = reqwest::Client::builder()
            .user_agent(concat!("gradcheck/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(HttpClient {
            config,
            base,
            http_client,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> StorageResult<Self> {
        Self::new(ClientConfig::from_env())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Build `{base}/{segments...}`, percent-encoding each segment.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// URL for one semester key's criteria.
    pub fn criteria_url(&self, key: &SemesterKey) -> Url {
        let year_group = key.year_group.to_string();
        self.endpoint(&[
            "criteria",
            &year_group,
            key.program.trim(),
            key.semester.as_str(),
        ])
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_json(&self, url: Url) -> StorageResult<Value> {
        debug!(url = %url, "GET");
        let response = self.authorized(self.http_client.get(url)).send().await?;
        read_json(response).await
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: Url,
        body: &B,
    ) -> StorageResult<Value> {
        debug!(url = %url, "POST");
        let payload = serde_json::to_vec(body)?;
        let response = self
            .authorized(self.http_client.post(url))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await?;
        read_json(response).await
    }
}

/// Read a response body: the decoded body for 2xx (non-JSON bodies decode
/// as `null`), an error for everything else.
async fn read_json(response: Response) -> StorageResult<Value> {
    let status = response.status();
    let body = response.text().await?;
    interpret_response(status, &body)
}

/// Pure half of `read_json`, split out for testing.
///
/// Only 2xx bodies are data. A 404 is an error like any other status: an
/// unset key answers 2xx with an empty object, so a 404 means a wrong base
/// URL or a missing route.
pub fn interpret_response(status: StatusCode, body: &str) -> StorageResult<Value> {
    if status.is_success() {
        return Ok(serde_json::from_str(body).unwrap_or(Value::Null));
    }
    Err(error_for_status(status, body))
}

/// Map a non-success status to a `StorageError`, preferring the server's
/// own `message` field for the human-readable text.
pub fn error_for_status(status: StatusCode, body: &str) -> StorageError {
    let message = server_message(body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    });
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StorageError::Unauthorized {
            status: status.as_u16(),
            message,
        },
        _ => StorageError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

fn server_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.trim().is_empty())
        .map(str::to_string)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct YearGroupBody {
    year_group: i32,
}

#[async_trait]
impl CriteriaStore for HttpClient {
    #[instrument(skip_all, fields(key = %key))]
    async fn fetch(&self, key: &SemesterKey) -> StorageResult<SemesterData> {
        let body = self.get_json(self.criteria_url(key)).await?;
        Ok(normalize_semester_data(&body))
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn save(&self, key: &SemesterKey, data: &SemesterData) -> StorageResult<SaveReceipt> {
        self.post_json(self.criteria_url(key), data).await?;
        Ok(SaveReceipt::new(key, data))
    }
}

#[async_trait]
impl ReferenceStore for HttpClient {
    async fn list_year_groups(&self) -> StorageResult<Vec<YearGroupSummary>> {
        let body = self.get_json(self.endpoint(&["year-groups"])).await?;
        Ok(decode_list(body))
    }

    async fn upsert_year_group(&self, year_group: i32) -> StorageResult<()> {
        self.post_json(self.endpoint(&["year-groups"]), &YearGroupBody { year_group })
            .await?;
        Ok(())
    }

    async fn list_programs(&self, year_group: i32) -> StorageResult<Vec<ProgramMeta>> {
        let year_group = year_group.to_string();
        let body = self.get_json(self.endpoint(&["programs", &year_group])).await?;
        Ok(decode_list(body))
    }

    async fn upsert_program(&self, year_group: i32, meta: &ProgramMeta) -> StorageResult<()> {
        let year_group = year_group.to_string();
        self.post_json(self.endpoint(&["programs", &year_group]), meta)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AuditService for HttpClient {
    #[instrument(skip_all, fields(year_group = request.year_group, semester = %request.semester, students = request.students.len()))]
    async fn run_audit(&self, request: &AuditRequest) -> StorageResult<Vec<AuditOutcome>> {
        let body = self
            .post_json(self.endpoint(&["audit", "run"]), request)
            .await?;
        Ok(normalize_audit_outcomes(&body))
    }
}

/// Decode a JSON array, dropping entries that do not match `T`.
fn decode_list<T: for<'de> Deserialize<'de>>(body: Value) -> Vec<T> {
    match body {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    }
}
