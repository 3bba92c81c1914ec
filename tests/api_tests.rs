//! HTTP-level tests driving the axum router directly.

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use pulsewatch::db::{MemoryStore, MonitorStore};
use pulsewatch::monitor::cache::ProbeCache;
use pulsewatch::monitor::models::Project;
use pulsewatch::monitor::pipeline::MonitorPipeline;
use pulsewatch::monitor::probe::ProbeExecutor;
use pulsewatch::notifications::dispatcher::NotificationDispatcher;
use pulsewatch::notifications::senders::chat::ChatSender;
use pulsewatch::notifications::senders::webhook::WebhookSender;
use pulsewatch::web::{AppState, create_axum_router};

fn build_app(store: Arc<MemoryStore>) -> Router {
    let store: Arc<dyn MonitorStore> = store;
    let executor = Arc::new(ProbeExecutor::new(Duration::from_millis(500)));
    let dispatcher = Arc::new(
        NotificationDispatcher::new()
            .with_sender(Arc::new(WebhookSender::new()))
            .with_sender(Arc::new(ChatSender::new())),
    );
    let pipeline = Arc::new(MonitorPipeline::new(store.clone(), executor.clone(), dispatcher.clone()));
    create_axum_router(Arc::new(AppState {
        store,
        pipeline,
        executor,
        probe_cache: Arc::new(ProbeCache::new(16, Duration::from_secs(30))),
        dispatcher,
    }))
}

async fn send(app: Router, method: Method, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, json)
}

fn refused_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/")
}

#[tokio::test]
async fn health_returns_ok() {
    let (status, body) = send(build_app(Arc::new(MemoryStore::new())), Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn probe_rejects_missing_and_malformed_urls() {
    let app = build_app(Arc::new(MemoryStore::new()));

    let (status, body) = send(app.clone(), Method::GET, "/probe", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = send(app.clone(), Method::GET, "/probe?url=not-a-url", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(app, Method::GET, "/probe?url=ftp%3A%2F%2Fexample.com", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn probe_failure_is_reported_in_a_200() {
    let app = build_app(Arc::new(MemoryStore::new()));
    let uri = format!("/probe?url={}", refused_url());

    let (status, body) = send(app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("HEAD"));
}

#[tokio::test]
async fn probe_success_is_cached() {
    let target = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&target)
        .await;
    let app = build_app(Arc::new(MemoryStore::new()));
    let uri = format!("/probe?url={}/", target.uri());

    let (status, first) = send(app.clone(), Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["success"], true);
    assert_eq!(first["status"], 204);
    assert_eq!(first["cached"], false);

    let (_, second) = send(app, Method::GET, &uri, None).await;
    assert_eq!(second["cached"], true);
    assert_eq!(target.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn tick_reports_counts_for_get_and_post() {
    let target = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&target)
        .await;
    let store = Arc::new(MemoryStore::with_projects(vec![
        Project {
            id: "up".to_string(),
            name: "Up".to_string(),
            url: target.uri(),
            enabled: true,
        },
        Project {
            id: "down".to_string(),
            name: "Down".to_string(),
            url: refused_url(),
            enabled: true,
        },
        Project {
            id: "paused".to_string(),
            name: "Paused".to_string(),
            url: target.uri(),
            enabled: false,
        },
    ]));
    let app = build_app(store.clone());

    let (status, body) = send(app.clone(), Method::GET, "/worker/tick", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["checked"], 2);
    assert_eq!(body["transitions"].as_array().unwrap().len(), 2);

    let (status, body) = send(app, Method::POST, "/worker/tick", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["transitions"].as_array().unwrap().is_empty());
    assert_eq!(store.probe_count("up").await.unwrap(), 2);
    assert_eq!(store.probe_count("paused").await.unwrap(), 0);
}

#[tokio::test]
async fn test_notification_with_disabled_webhook_is_rejected() {
    let receiver = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&receiver)
        .await;
    let app = build_app(Arc::new(MemoryStore::new()));

    let (status, body) = send(
        app,
        Method::POST,
        "/notifications/test",
        Some(serde_json::json!({
            "type": "webhook",
            "settings": { "webhook_enabled": false, "webhook_url": receiver.uri() }
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("not enabled"));
    assert!(receiver.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_notification_rejects_unknown_type() {
    let app = build_app(Arc::new(MemoryStore::new()));
    let (status, body) = send(
        app,
        Method::POST,
        "/notifications/test",
        Some(serde_json::json!({ "type": "pager", "settings": {} })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("pager"));
}

#[tokio::test]
async fn test_notification_without_type_is_a_bad_request() {
    let app = build_app(Arc::new(MemoryStore::new()));
    let (status, body) = send(
        app,
        Method::POST,
        "/notifications/test",
        Some(serde_json::json!({
            "settings": { "webhook_enabled": true, "webhook_url": "https://hooks.example.com" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "type is required");
}

#[tokio::test]
async fn test_notification_with_malformed_body_is_a_bad_request() {
    let app = build_app(Arc::new(MemoryStore::new()));

    let (status, body) = send(
        app.clone(),
        Method::POST,
        "/notifications/test",
        Some(serde_json::json!({ "type": 7 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/notifications/test")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_notification_delivers_through_webhook() {
    let receiver = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&receiver)
        .await;
    let app = build_app(Arc::new(MemoryStore::new()));

    let (status, body) = send(
        app,
        Method::POST,
        "/notifications/test",
        Some(serde_json::json!({
            "type": "webhook",
            "settings": { "webhook_enabled": true, "webhook_url": receiver.uri() }
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["outcomes"]["webhook"]["result"], "delivered");
    assert_eq!(receiver.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn settings_round_trip_through_the_store() {
    let store = Arc::new(MemoryStore::new());
    let app = build_app(store.clone());

    let (status, _) = send(
        app.clone(),
        Method::PUT,
        "/notifications/settings",
        Some(serde_json::json!({
            "discord_enabled": true,
            "discord_webhook_url": "https://chat.example.com/hook",
            "chat_username": "PulseWatch"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(app, Method::GET, "/notifications/settings", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chat_enabled"], true);
    assert_eq!(body["chat_webhook_url"], "https://chat.example.com/hook");
    assert_eq!(body["webhook_enabled"], false);
    assert_eq!(store.channel_configs().await.unwrap().len(), 3);
}

#[tokio::test]
async fn project_history_for_unknown_project_is_404() {
    let app = build_app(Arc::new(MemoryStore::new()));
    let (status, _) = send(app, Method::GET, "/projects/nope/history", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn projects_list_includes_current_state() {
    let store = Arc::new(MemoryStore::with_projects(vec![Project {
        id: "down".to_string(),
        name: "Down".to_string(),
        url: refused_url(),
        enabled: true,
    }]));
    let app = build_app(store);

    let (status, body) = send(app.clone(), Method::GET, "/projects", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["state"]["lastStatus"], "unknown");

    send(app.clone(), Method::GET, "/worker/tick", None).await;

    let (_, body) = send(app.clone(), Method::GET, "/projects", None).await;
    assert_eq!(body[0]["state"]["lastStatus"], "offline");
    assert_eq!(body[0]["state"]["consecutiveFailures"], 1);

    let (status, history) = send(app, Method::GET, "/projects/down/history?limit=5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["outcome"], "failure");
}
