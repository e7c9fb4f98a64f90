//! HttpIngestClient - delivers submissions to the central aggregator over HTTP

use std::time::Duration;

use contracts::{
    DeliveryError, IngestAck, IngestClient, IngestReply, MeasurementSubmission, SyncSettings,
};
use reqwest::StatusCode;
use tracing::{debug, instrument};

use crate::error::SyncError;

/// Ingestion path appended to the configured base URL
pub const INGEST_PATH: &str = "/api/v1/measurements";

/// Longest server message kept in a delivery error
const MAX_MESSAGE_LEN: usize = 256;

pub struct HttpIngestClient {
    client: reqwest::Client,
    endpoint: String,
    token: String,
    timeout: Duration,
}

impl HttpIngestClient {
    pub fn new(
        base_url: &str,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SyncError> {
        let base = base_url.trim_end_matches('/');
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(SyncError::InvalidUrl {
                url: base_url.to_string(),
                message: "scheme must be http or https".to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{base}{INGEST_PATH}"),
            token: token.into(),
            timeout,
        })
    }

    /// Build from settings; `None` when no central endpoint is configured
    pub fn from_settings(settings: &SyncSettings) -> Result<Option<Self>, SyncError> {
        let Some(url) = settings.central_url.as_deref() else {
            return Ok(None);
        };
        let token = settings
            .central_token
            .as_deref()
            .ok_or(SyncError::MissingToken)?;

        Self::new(url, token, settings.request_timeout()).map(Some)
    }

    fn transport_error(&self, err: reqwest::Error) -> DeliveryError {
        if err.is_timeout() {
            DeliveryError::Timeout {
                after_ms: self.timeout.as_millis() as u64,
            }
        } else {
            DeliveryError::transport(err.to_string())
        }
    }
}

impl IngestClient for HttpIngestClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[instrument(name = "http_ingest_submit", skip(self, submission), fields(id = %submission.id))]
    async fn submit(&self, submission: &MeasurementSubmission) -> Result<IngestAck, DeliveryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(submission)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        debug!(status = status.as_u16(), "Central responded");

        match status {
            StatusCode::CREATED => Ok(IngestAck::Accepted),
            StatusCode::OK => Ok(IngestAck::Duplicate),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(DeliveryError::Unauthorized {
                status: status.as_u16(),
            }),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                let body = response.text().await.unwrap_or_default();
                Err(DeliveryError::Rejected {
                    status: status.as_u16(),
                    reason: rejection_reason(&body, status),
                })
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(DeliveryError::Server {
                    status: status.as_u16(),
                    message: truncate(&body),
                })
            }
        }
    }
}

/// Human-readable reason from a rejection body
fn rejection_reason(body: &str, status: StatusCode) -> String {
    match serde_json::from_str::<IngestReply>(body) {
        Ok(reply) if !reply.errors.is_empty() => reply
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join("; "),
        Ok(IngestReply {
            message: Some(message),
            ..
        }) => message,
        _ if !body.trim().is_empty() => truncate(body),
        _ => status
            .canonical_reason()
            .unwrap_or("rejected")
            .to_string(),
    }
}

fn truncate(text: &str) -> String {
    let text = text.trim();
    match text.char_indices().nth(MAX_MESSAGE_LEN) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
