//! HTTP delivery to the ingestion service.
//!
//! Submits reports as JSON with an `Idempotency-Key` header carrying the item
//! id, and uploads attachments as raw bodies. Response statuses are mapped
//! onto [`ErrorKind`] so the retry policy can tell transient failures from
//! rejections.

use crate::error::SyncResult;
use crate::transport::{Receipt, ReportTransport, SubmitError};
use async_trait::async_trait;
use reportsync_types::{AttachmentRef, ErrorKind, ItemId, ReportPayload};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const MAX_ERROR_BODY: usize = 256;

/// Configuration for [`HttpTransport`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpTransportConfig {
    /// Base URL of the ingestion service (e.g., "https://reports.example.org").
    pub api_base_url: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Serialize)]
struct SubmitRequest<'a> {
    id: &'a ItemId,
    payload: &'a ReportPayload,
}

#[derive(Deserialize)]
struct UploadResponse {
    url: String,
}

/// reqwest-backed [`ReportTransport`].
pub struct HttpTransport {
    client: Client,
    config: HttpTransportConfig,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, SubmitError> {
        let mut url = Url::parse(&self.config.api_base_url)
            .map_err(|e| SubmitError::permanent(format!("invalid api_base_url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| SubmitError::permanent("api_base_url cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl ReportTransport for HttpTransport {
    async fn submit(&self, id: &ItemId, payload: &ReportPayload) -> Result<Receipt, SubmitError> {
        let url = self.endpoint(&["api", "reports"])?;
        let resp = self
            .client
            .post(url)
            .header("Idempotency-Key", id.as_str())
            .json(&SubmitRequest { id, payload })
            .send()
            .await
            .map_err(request_error)?;

        let status = resp.status();
        if status == StatusCode::CONFLICT {
            debug!("report {id} already ingested");
            return Ok(Receipt::default());
        }
        if !status.is_success() {
            return Err(status_error(status, resp).await);
        }

        let body = resp.bytes().await.map_err(request_error)?;
        Ok(serde_json::from_slice(&body).unwrap_or_default())
    }

    async fn upload_attachment(
        &self,
        id: &ItemId,
        attachment: &AttachmentRef,
    ) -> Result<String, SubmitError> {
        let bytes = tokio::fs::read(&attachment.path).await.map_err(|e| {
            SubmitError::new(
                ErrorKind::StoreIo,
                format!("cannot read attachment {}: {e}", attachment.path.display()),
            )
        })?;

        let url = self.endpoint(&["api", "reports", id.as_str(), "attachments"])?;
        let content_type = attachment
            .content_type
            .as_deref()
            .unwrap_or("application/octet-stream");

        let resp = self
            .client
            .post(url)
            .query(&[("name", attachment.name.as_str())])
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(request_error)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(status_error(status, resp).await);
        }

        let uploaded: UploadResponse = resp
            .json()
            .await
            .map_err(|e| SubmitError::transient(format!("bad upload response: {e}")))?;
        Ok(uploaded.url)
    }
}

/// Maps an HTTP status onto the failure taxonomy.
pub fn status_kind(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => ErrorKind::Transient,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ErrorKind::Validation,
        s if s.is_client_error() => ErrorKind::Permanent,
        _ => ErrorKind::Transient,
    }
}

async fn status_error(status: StatusCode, resp: reqwest::Response) -> SubmitError {
    let mut body = resp.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    SubmitError::new(status_kind(status), format!("HTTP {status}: {body}"))
}

fn request_error(e: reqwest::Error) -> SubmitError {
    if e.is_builder() {
        SubmitError::permanent(format!("request could not be built: {e}"))
    } else {
        SubmitError::transient(e.to_string())
    }
}
