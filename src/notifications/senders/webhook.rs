use async_trait::async_trait;
use reqwest::Client;
use tera::{Context, Tera};

use super::{NotificationSender, RenderedPayload, SenderError, delivery_client, parse_http_destination, post_payload};
use crate::notifications::models::{ChannelConfig, ChannelType, NotificationEvent};

/// A sender for pushing notifications via a custom webhook.
pub struct WebhookSender {
    client: Client,
}

impl Default for WebhookSender {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookSender {
    pub fn new() -> Self {
        Self {
            client: delivery_client(),
        }
    }

    fn template_context(event: &NotificationEvent) -> Context {
        let mut context = Context::new();
        context.insert("project_id", &event.project_id);
        context.insert("project_name", &event.project_name);
        context.insert("project_url", &event.project_url);
        context.insert("previous_status", event.previous_status.as_str());
        context.insert("new_status", event.new_status.as_str());
        context.insert("timestamp", &event.timestamp.to_rfc3339());
        context.insert("latency_ms", &event.latency_ms);
        context.insert("is_test", &event.is_test);
        context.insert("message", &event.headline());
        context
    }
}

#[async_trait]
impl NotificationSender for WebhookSender {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Webhook
    }

    fn render(&self, event: &NotificationEvent, config: &ChannelConfig) -> Result<RenderedPayload, SenderError> {
        let content_type = config
            .content_type
            .clone()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| "application/json".to_string());

        if let Some(template) = config.body_template.as_deref().filter(|t| !t.trim().is_empty()) {
            let body = Tera::one_off(template, &Self::template_context(event), false)
                .map_err(|e| SenderError::TemplatingError(e.to_string()))?;
            return Ok(RenderedPayload {
                content_type,
                subject: None,
                body,
            });
        }

        let value = serde_json::json!({
            "event": if event.is_up() { "project.up" } else { "project.down" },
            "message": event.headline(),
            "project": {
                "id": event.project_id,
                "name": event.project_name,
                "url": event.project_url,
            },
            "previousStatus": event.previous_status,
            "status": event.new_status,
            "latencyMs": event.latency_ms,
            "timestamp": event.timestamp.to_rfc3339(),
            "test": event.is_test,
        });

        Ok(RenderedPayload {
            content_type,
            ..RenderedPayload::json(&value)?
        })
    }

    async fn deliver(&self, destination: &str, payload: &RenderedPayload) -> Result<(), SenderError> {
        let url = parse_http_destination(destination)?;
        post_payload(&self.client, url, payload, "Webhook").await
    }
}
