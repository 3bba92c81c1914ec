use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::monitor::models::{ProbeResult, Project, ProjectState};
use crate::web::{AppError, AppState};

const DEFAULT_HISTORY_LIMIT: usize = 50;
const MAX_HISTORY_LIMIT: usize = 1000;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectWithState {
    #[serde(flatten)]
    pub project: Project,
    pub state: ProjectState,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

pub fn create_project_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_projects))
        .route("/{id}/history", get(project_history))
}

async fn list_projects(State(app_state): State<Arc<AppState>>) -> Result<Json<Vec<ProjectWithState>>, AppError> {
    let projects = app_state.store.all_projects().await?;
    let mut response = Vec::with_capacity(projects.len());
    for project in projects {
        let state = app_state
            .store
            .project_state(&project.id)
            .await?
            .unwrap_or_else(|| ProjectState::initial(project.id.clone()));
        response.push(ProjectWithState { project, state });
    }
    Ok(Json(response))
}

async fn project_history(
    State(app_state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ProbeResult>>, AppError> {
    if app_state.store.get_project(&project_id).await?.is_none() {
        return Err(AppError::NotFound(format!("Project '{project_id}' not found")));
    }
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT);
    Ok(Json(app_state.store.recent_probes(&project_id, limit).await?))
}
