use axum::{Router, http::Method, routing::get};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::db::MonitorStore;
use crate::monitor::cache::ProbeCache;
use crate::monitor::pipeline::MonitorPipeline;
use crate::monitor::probe::ProbeExecutor;
use crate::notifications::dispatcher::NotificationDispatcher;
use crate::web::routes::*;

pub mod error;
pub mod routes;

pub use error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MonitorStore>,
    pub pipeline: Arc<MonitorPipeline>,
    pub executor: Arc<ProbeExecutor>,
    pub probe_cache: Arc<ProbeCache>,
    pub dispatcher: Arc<NotificationDispatcher>,
}

async fn health_check_handler() -> &'static str {
    "OK"
}

pub fn create_axum_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check_handler))
        .merge(probe_routes::create_probe_router())
        .merge(worker_routes::create_worker_router())
        .nest("/notifications", notification_routes::create_notification_router())
        .nest("/projects", project_routes::create_project_router())
        .with_state(app_state)
        .layer(cors)
}
