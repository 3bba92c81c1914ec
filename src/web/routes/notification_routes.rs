use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::{get, post},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::notifications::dispatcher::DispatchReport;
use crate::notifications::models::{ChannelType, NotificationSettings};
use crate::web::{AppError, AppState};

pub fn create_notification_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/test", post(test_channel))
        .route("/settings", get(get_settings).put(update_settings))
}

#[derive(Debug, Deserialize)]
pub struct TestNotificationRequest {
    #[serde(rename = "type")]
    pub channel_type: Option<String>,
    /// Falls back to the stored settings when omitted.
    pub settings: Option<NotificationSettings>,
}

async fn load_settings(app_state: &AppState) -> Result<NotificationSettings, AppError> {
    let configs = app_state.store.channel_configs().await?;
    Ok(NotificationSettings::from_channel_configs(&configs))
}

async fn test_channel(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<TestNotificationRequest>, JsonRejection>,
) -> Result<Json<DispatchReport>, AppError> {
    let Json(payload) = payload?;
    let channel_type: ChannelType = payload
        .channel_type
        .ok_or_else(|| AppError::InvalidInput("type is required".to_string()))?
        .parse()
        .map_err(AppError::InvalidInput)?;
    let settings = match payload.settings {
        Some(settings) => settings,
        None => load_settings(&app_state).await?,
    };

    let report = app_state.dispatcher.send_test(channel_type, &settings).await?;
    info!(channel = %channel_type, success = report.success, "Test notification dispatched.");
    Ok(Json(report))
}

async fn get_settings(State(app_state): State<Arc<AppState>>) -> Result<Json<NotificationSettings>, AppError> {
    Ok(Json(load_settings(&app_state).await?))
}

async fn update_settings(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<NotificationSettings>,
) -> Result<Json<NotificationSettings>, AppError> {
    for config in payload.to_channel_configs() {
        app_state.store.upsert_channel_config(&config).await?;
    }
    info!("Notification settings updated.");
    Ok(Json(load_settings(&app_state).await?))
}
