use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::monitor::models::{Project, ProjectStatus, TransitionEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Webhook,
    Email,
    #[serde(alias = "discord")]
    Chat,
}

impl ChannelType {
    pub const ALL: [ChannelType; 3] = [ChannelType::Webhook, ChannelType::Email, ChannelType::Chat];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Webhook => "webhook",
            ChannelType::Email => "email",
            ChannelType::Chat => "chat",
        }
    }

    /// Human readable name of the destination field, used in error messages.
    pub fn destination_label(&self) -> &'static str {
        match self {
            ChannelType::Webhook => "webhook URL",
            ChannelType::Email => "email address",
            ChannelType::Chat => "chat webhook URL",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "webhook" => Ok(ChannelType::Webhook),
            "email" => Ok(ChannelType::Email),
            "chat" | "discord" => Ok(ChannelType::Chat),
            other => Err(format!("Unsupported channel type: '{other}'")),
        }
    }
}

/// Configuration of one notification channel. Stored as one row per type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelConfig {
    pub channel_type: ChannelType,
    #[serde(default)]
    pub enabled: bool,
    /// Webhook URL, email address or chat webhook URL depending on the type.
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Webhook only: overrides `application/json`.
    #[serde(default)]
    pub content_type: Option<String>,
    /// Webhook only: Tera template for the request body.
    #[serde(default)]
    pub body_template: Option<String>,
}

impl ChannelConfig {
    pub fn new(channel_type: ChannelType, destination: impl Into<String>) -> Self {
        Self {
            channel_type,
            enabled: true,
            destination: destination.into(),
            display_name: None,
            content_type: None,
            body_template: None,
        }
    }

    pub fn disabled(channel_type: ChannelType) -> Self {
        Self {
            enabled: false,
            ..Self::new(channel_type, "")
        }
    }

    pub fn has_destination(&self) -> bool {
        !self.destination.trim().is_empty()
    }
}

/// Flat settings bundle exchanged with the dashboard and the test endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub webhook_enabled: bool,
    pub webhook_url: Option<String>,
    pub webhook_content_type: Option<String>,
    pub webhook_body_template: Option<String>,
    pub email_enabled: bool,
    pub email_address: Option<String>,
    #[serde(alias = "discord_enabled")]
    pub chat_enabled: bool,
    #[serde(alias = "discord_webhook_url")]
    pub chat_webhook_url: Option<String>,
    #[serde(alias = "discord_username")]
    pub chat_username: Option<String>,
}

impl NotificationSettings {
    pub fn channel(&self, channel_type: ChannelType) -> ChannelConfig {
        let destination = |value: &Option<String>| value.as_deref().unwrap_or_default().trim().to_string();
        match channel_type {
            ChannelType::Webhook => ChannelConfig {
                channel_type,
                enabled: self.webhook_enabled,
                destination: destination(&self.webhook_url),
                display_name: None,
                content_type: self.webhook_content_type.clone(),
                body_template: self.webhook_body_template.clone(),
            },
            ChannelType::Email => ChannelConfig {
                channel_type,
                enabled: self.email_enabled,
                destination: destination(&self.email_address),
                display_name: None,
                content_type: None,
                body_template: None,
            },
            ChannelType::Chat => ChannelConfig {
                channel_type,
                enabled: self.chat_enabled,
                destination: destination(&self.chat_webhook_url),
                display_name: self.chat_username.clone(),
                content_type: None,
                body_template: None,
            },
        }
    }

    pub fn to_channel_configs(&self) -> Vec<ChannelConfig> {
        ChannelType::ALL.iter().map(|t| self.channel(*t)).collect()
    }

    pub fn from_channel_configs(configs: &[ChannelConfig]) -> Self {
        let mut settings = Self::default();
        let non_empty = |value: &str| (!value.is_empty()).then(|| value.to_string());
        for config in configs {
            match config.channel_type {
                ChannelType::Webhook => {
                    settings.webhook_enabled = config.enabled;
                    settings.webhook_url = non_empty(&config.destination);
                    settings.webhook_content_type = config.content_type.clone();
                    settings.webhook_body_template = config.body_template.clone();
                }
                ChannelType::Email => {
                    settings.email_enabled = config.enabled;
                    settings.email_address = non_empty(&config.destination);
                }
                ChannelType::Chat => {
                    settings.chat_enabled = config.enabled;
                    settings.chat_webhook_url = non_empty(&config.destination);
                    settings.chat_username = config.display_name.clone();
                }
            }
        }
        settings
    }
}

/// A transition enriched with what the channels need to describe it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub project_id: String,
    pub project_name: String,
    pub project_url: String,
    pub previous_status: ProjectStatus,
    pub new_status: ProjectStatus,
    pub timestamp: DateTime<Utc>,
    pub latency_ms: Option<u64>,
    pub is_test: bool,
}

impl NotificationEvent {
    pub fn from_transition(project: &Project, transition: &TransitionEvent) -> Self {
        Self {
            project_id: transition.project_id.clone(),
            project_name: project.name.clone(),
            project_url: project.url.clone(),
            previous_status: transition.previous_status,
            new_status: transition.new_status,
            timestamp: transition.timestamp,
            latency_ms: transition.latency_ms,
            is_test: false,
        }
    }

    /// Synthetic "up" event used to validate a channel end-to-end.
    pub fn synthetic_test() -> Self {
        Self {
            project_id: format!("test-{}", uuid::Uuid::new_v4()),
            project_name: "Test Project".to_string(),
            project_url: "https://example.com".to_string(),
            previous_status: ProjectStatus::Unknown,
            new_status: ProjectStatus::Online,
            timestamp: Utc::now(),
            latency_ms: Some(123),
            is_test: true,
        }
    }

    pub fn is_up(&self) -> bool {
        self.new_status == ProjectStatus::Online
    }

    pub fn headline(&self) -> String {
        let prefix = if self.is_test { "[TEST] " } else { "" };
        if self.is_up() {
            format!("{prefix}{} is UP", self.project_name)
        } else {
            format!("{prefix}{} is DOWN", self.project_name)
        }
    }
}
