use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{NotificationSender, RenderedPayload, SenderError, delivery_client, parse_http_destination, post_payload};
use crate::notifications::models::{ChannelConfig, ChannelType, NotificationEvent};

pub const COLOR_UP: u32 = 0x57F287;
pub const COLOR_DOWN: u32 = 0xED4245;

const FOOTER: &str = "PulseWatch Monitor";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

/// Chat-platform embed object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub fields: Vec<EmbedField>,
    pub timestamp: String,
    pub footer: EmbedFooter,
}

#[derive(Serialize)]
struct ChatWebhookMessage<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    embeds: [&'a Embed; 1],
}

/// A sender for chat-platform incoming webhooks that accept embeds.
pub struct ChatSender {
    client: Client,
}

impl Default for ChatSender {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSender {
    pub fn new() -> Self {
        Self {
            client: delivery_client(),
        }
    }

    pub fn build_embed(event: &NotificationEvent) -> Embed {
        let (title, color) = if event.is_up() {
            (format!("🟢 {}", event.headline()), COLOR_UP)
        } else {
            (format!("🔴 {}", event.headline()), COLOR_DOWN)
        };

        let description = if event.is_up() {
            format!("{} is reachable again.", event.project_url)
        } else {
            format!("{} is not responding.", event.project_url)
        };

        let mut fields = vec![
            EmbedField {
                name: "Project".to_string(),
                value: event.project_name.clone(),
                inline: true,
            },
            EmbedField {
                name: "Status".to_string(),
                value: format!("{} → {}", event.previous_status, event.new_status),
                inline: true,
            },
        ];
        if let (true, Some(latency)) = (event.is_up(), event.latency_ms) {
            fields.push(EmbedField {
                name: "Response Time".to_string(),
                value: format!("{latency}ms"),
                inline: true,
            });
        }

        let footer = if event.is_test {
            format!("{FOOTER} · test notification")
        } else {
            FOOTER.to_string()
        };

        Embed {
            title,
            description,
            color,
            fields,
            timestamp: event.timestamp.to_rfc3339(),
            footer: EmbedFooter { text: footer },
        }
    }
}

#[async_trait]
impl NotificationSender for ChatSender {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Chat
    }

    fn render(&self, event: &NotificationEvent, config: &ChannelConfig) -> Result<RenderedPayload, SenderError> {
        let embed = Self::build_embed(event);
        let message = ChatWebhookMessage {
            username: config.display_name.as_deref().filter(|n| !n.trim().is_empty()),
            embeds: [&embed],
        };
        RenderedPayload::json(&serde_json::to_value(message)?)
    }

    async fn deliver(&self, destination: &str, payload: &RenderedPayload) -> Result<(), SenderError> {
        let url = parse_http_destination(destination)?;
        post_payload(&self.client, url, payload, "Chat webhook").await
    }
}
