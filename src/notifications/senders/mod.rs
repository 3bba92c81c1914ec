use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use super::models::{ChannelConfig, ChannelType, NotificationEvent};
use crate::version::user_agent;

pub mod chat;
pub mod email;
pub mod webhook;

pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
    #[error("Invalid configuration for sender: {0}")]
    InvalidConfiguration(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Templating error: {0}")]
    TemplatingError(String),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Channel-specific wire payload produced by [`NotificationSender::render`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPayload {
    pub content_type: String,
    /// Only meaningful for mail.
    pub subject: Option<String>,
    pub body: String,
}

impl RenderedPayload {
    pub fn json(value: &serde_json::Value) -> Result<Self, SenderError> {
        Ok(Self {
            content_type: "application/json".to_string(),
            subject: None,
            body: serde_json::to_string(value)?,
        })
    }
}

/// Uniform contract implemented by every notification channel.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    fn channel_type(&self) -> ChannelType;

    /// Builds the channel payload for an event.
    fn render(&self, event: &NotificationEvent, config: &ChannelConfig) -> Result<RenderedPayload, SenderError>;

    /// Delivers an already rendered payload to `destination`.
    async fn deliver(&self, destination: &str, payload: &RenderedPayload) -> Result<(), SenderError>;
}

/// Shared HTTP client for the webhook-style senders.
pub(crate) fn delivery_client() -> Client {
    Client::builder()
        .user_agent(user_agent())
        .timeout(DELIVERY_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to build delivery client, using defaults.");
            Client::new()
        })
}

/// Rejects anything that is not an absolute http(s) URL.
pub(crate) fn parse_http_destination(destination: &str) -> Result<Url, SenderError> {
    let url = Url::parse(destination.trim())
        .map_err(|e| SenderError::InvalidConfiguration(format!("Invalid destination URL '{destination}': {e}")))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(SenderError::InvalidConfiguration(format!(
            "Destination must be an http(s) URL, got '{destination}'"
        ))),
    }
}

/// Posts a rendered body and maps non-2xx responses to [`SenderError::SendFailed`],
/// keeping the response body for diagnostics.
pub(crate) async fn post_payload(
    client: &Client,
    url: Url,
    payload: &RenderedPayload,
    channel: &str,
) -> Result<(), SenderError> {
    let response = client
        .post(url)
        .header(reqwest::header::CONTENT_TYPE, payload.content_type.as_str())
        .body(payload.body.clone())
        .send()
        .await?;
    let status = response.status();

    if !status.is_success() {
        let error_body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error body".to_string());
        return Err(SenderError::SendFailed(format!(
            "{channel} returned non-success status: {status}. Body: {error_body}"
        )));
    }

    Ok(())
}
