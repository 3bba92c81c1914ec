//! Single reachability check against a project URL.
//!
//! A probe issues a `HEAD` request first and falls back once to `GET` when the
//! `HEAD` attempt errors out, since plenty of servers reject `HEAD` outright.
//! Any HTTP response counts as reachable, whatever its status code.

use chrono::Utc;
use reqwest::{Client, Method, Url, header};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use super::models::{ProbeOutcome, ProbeResult};
use crate::version::user_agent;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("URL is required")]
    MissingUrl,
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Unsupported URL scheme '{0}', only http and https can be probed")]
    UnsupportedScheme(String),
}

/// Parses and validates a probe target without touching the network.
pub fn parse_target(raw: &str) -> Result<Url, ProbeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ProbeError::MissingUrl);
    }

    let url = Url::parse(trimmed).map_err(|e| ProbeError::InvalidUrl {
        url: trimmed.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(ProbeError::UnsupportedScheme(other.to_string())),
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(ProbeError::InvalidUrl {
            url: trimmed.to_string(),
            reason: "missing host".to_string(),
        });
    }

    Ok(url)
}

/// Failure result for a target that never passed validation.
pub fn rejected(project_id: &str, error: &ProbeError) -> ProbeResult {
    ProbeResult {
        project_id: project_id.to_string(),
        timestamp: Utc::now(),
        outcome: ProbeOutcome::Failure,
        status_code: None,
        latency_ms: None,
        error: Some(error.to_string()),
    }
}

pub struct ProbeExecutor {
    client: Client,
    timeout: Duration,
}

impl Default for ProbeExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

impl ProbeExecutor {
    pub fn new(timeout: Duration) -> Self {
        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(header::CACHE_CONTROL, header::HeaderValue::from_static("no-cache, no-store"));
        default_headers.insert(header::PRAGMA, header::HeaderValue::from_static("no-cache"));

        // Building only fails when the TLS backend cannot be initialised; a
        // plain client keeps probing usable in that case.
        let client = Client::builder()
            .user_agent(user_agent())
            .default_headers(default_headers)
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build probe client, using defaults.");
                Client::new()
            });

        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probes a raw URL string. Validation errors are encoded in the result as
    /// a failure without any network call.
    pub async fn probe(&self, project_id: &str, raw_url: &str) -> ProbeResult {
        match parse_target(raw_url) {
            Ok(url) => self.probe_url(project_id, &url).await,
            Err(e) => rejected(project_id, &e),
        }
    }

    pub async fn probe_url(&self, project_id: &str, url: &Url) -> ProbeResult {
        let timestamp = Utc::now();

        let head_error = match self.attempt(Method::HEAD, url).await {
            Ok((status, latency_ms)) => {
                return reachable(project_id, timestamp, status, latency_ms);
            }
            Err(e) => e,
        };
        debug!(project_id, url = %url, error = %head_error, "HEAD failed, falling back to GET.");

        match self.attempt(Method::GET, url).await {
            Ok((status, latency_ms)) => reachable(project_id, timestamp, status, latency_ms),
            Err(get_error) => ProbeResult {
                project_id: project_id.to_string(),
                timestamp,
                outcome: ProbeOutcome::Failure,
                status_code: None,
                latency_ms: None,
                error: Some(format!("HEAD: {head_error}; GET: {get_error}")),
            },
        }
    }

    async fn attempt(&self, method: Method, url: &Url) -> Result<(u16, u64), String> {
        let started = Instant::now();
        let response = self
            .client
            .request(method, url.clone())
            .send()
            .await
            .map_err(describe_error)?;
        let latency_ms = started.elapsed().as_millis() as u64;
        Ok((response.status().as_u16(), latency_ms))
    }
}

fn reachable(
    project_id: &str,
    timestamp: chrono::DateTime<Utc>,
    status: u16,
    latency_ms: u64,
) -> ProbeResult {
    ProbeResult {
        project_id: project_id.to_string(),
        timestamp,
        outcome: ProbeOutcome::Success,
        status_code: Some(status),
        latency_ms: Some(latency_ms),
        error: None,
    }
}

fn describe_error(e: reqwest::Error) -> String {
    if e.is_timeout() {
        "request timed out".to_string()
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        e.to_string()
    }
}
