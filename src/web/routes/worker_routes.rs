use axum::{Json, Router, extract::State, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::monitor::models::TransitionEvent;
use crate::monitor::pipeline::ProjectFailure;
use crate::web::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickResponse {
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checked: usize,
    pub transitions: Vec<TransitionEvent>,
    pub failed: Vec<ProjectFailure>,
}

pub fn create_worker_router() -> Router<Arc<AppState>> {
    Router::new().route("/worker/tick", get(run_tick).post(run_tick))
}

// Always 200: schedulers only care that the worker answered.
async fn run_tick(State(app_state): State<Arc<AppState>>) -> Json<TickResponse> {
    match app_state.pipeline.run_tick("http").await {
        Ok(report) => Json(TickResponse {
            success: report.is_clean(),
            timestamp: report.started_at,
            error: None,
            checked: report.checked,
            transitions: report.transitions,
            failed: report.failures,
        }),
        Err(e) => Json(TickResponse {
            success: false,
            timestamp: Utc::now(),
            error: Some(e.to_string()),
            checked: 0,
            transitions: Vec::new(),
            failed: Vec::new(),
        }),
    }
}
