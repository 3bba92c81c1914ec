use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::monitor::probe::{ProbeError, parse_target};
use crate::web::{AppError, AppState};

const ADHOC_PROJECT_ID: &str = "adhoc";

#[derive(Debug, Deserialize)]
pub struct ProbeQuery {
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub cached: bool,
}

pub fn create_probe_router() -> Router<Arc<AppState>> {
    Router::new().route("/probe", get(probe_url))
}

async fn probe_url(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<ProbeQuery>,
) -> Result<Json<ProbeResponse>, AppError> {
    let raw = query.url.ok_or(ProbeError::MissingUrl)?;
    let url = parse_target(&raw)?;
    let key = url.as_str().to_string();

    if let Some(result) = app_state.probe_cache.get(&key) {
        debug!(url = %key, "Serving probe result from cache.");
        return Ok(Json(ProbeResponse {
            success: result.is_success(),
            status: result.status_code,
            latency_ms: result.latency_ms,
            message: result.error,
            timestamp: result.timestamp,
            cached: true,
        }));
    }

    let result = app_state.executor.probe_url(ADHOC_PROJECT_ID, &url).await;
    app_state.probe_cache.insert(key, result.clone());

    Ok(Json(ProbeResponse {
        success: result.is_success(),
        status: result.status_code,
        latency_ms: result.latency_ms,
        message: result.error,
        timestamp: result.timestamp,
        cached: false,
    }))
}
