//! Fan-out of one event to every enabled, fully configured channel.

use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use super::models::{ChannelConfig, ChannelType, NotificationEvent, NotificationSettings};
use super::senders::NotificationSender;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Channel '{0}' is not enabled")]
    ChannelDisabled(ChannelType),
    #[error("Channel '{channel}' is missing its {field}")]
    MissingDestination { channel: ChannelType, field: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "detail", rename_all = "camelCase")]
pub enum ChannelOutcome {
    Delivered,
    Failed(String),
    /// Enabled but unusable; the adapter was not called.
    Misconfigured(String),
    /// No adapter registered for the channel type.
    Unsupported,
}

impl ChannelOutcome {
    pub fn was_attempted(&self) -> bool {
        matches!(self, ChannelOutcome::Delivered | ChannelOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    /// Delivery was attempted for every enabled, fully configured channel.
    pub success: bool,
    pub outcomes: BTreeMap<ChannelType, ChannelOutcome>,
}

impl DispatchReport {
    pub fn delivered(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, ChannelOutcome::Delivered))
            .count()
    }
}

/// Registry of channel adapters keyed by channel type.
#[derive(Default)]
pub struct NotificationDispatcher {
    senders: HashMap<ChannelType, Arc<dyn NotificationSender>>,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, sender: Arc<dyn NotificationSender>) -> &mut Self {
        self.senders.insert(sender.channel_type(), sender);
        self
    }

    pub fn with_sender(mut self, sender: Arc<dyn NotificationSender>) -> Self {
        self.register(sender);
        self
    }

    pub fn supports(&self, channel_type: ChannelType) -> bool {
        self.senders.contains_key(&channel_type)
    }

    pub async fn dispatch(&self, event: &NotificationEvent, channels: &[ChannelConfig]) -> DispatchReport {
        let mut outcomes = BTreeMap::new();
        let mut deliveries = Vec::new();

        for config in channels.iter().filter(|c| c.enabled) {
            if !config.has_destination() {
                warn!(
                    channel = %config.channel_type,
                    project_id = %event.project_id,
                    "Channel enabled without a destination, skipping delivery."
                );
                outcomes.insert(
                    config.channel_type,
                    ChannelOutcome::Misconfigured(format!("missing {}", config.channel_type.destination_label())),
                );
                continue;
            }

            let Some(sender) = self.senders.get(&config.channel_type).cloned() else {
                error!(channel = %config.channel_type, "No sender registered for channel.");
                outcomes.insert(config.channel_type, ChannelOutcome::Unsupported);
                continue;
            };

            deliveries.push(async move {
                let outcome = Self::deliver_one(sender.as_ref(), event, config).await;
                (config.channel_type, outcome)
            });
        }

        for (channel_type, outcome) in join_all(deliveries).await {
            outcomes.insert(channel_type, outcome);
        }

        let success = outcomes
            .values()
            .all(|o| o.was_attempted() || matches!(o, ChannelOutcome::Misconfigured(_)));

        DispatchReport { success, outcomes }
    }

    async fn deliver_one(
        sender: &dyn NotificationSender,
        event: &NotificationEvent,
        config: &ChannelConfig,
    ) -> ChannelOutcome {
        let payload = match sender.render(event, config) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(channel = %config.channel_type, project_id = %event.project_id, error = %e, "Failed to build notification payload.");
                return ChannelOutcome::Failed(e.to_string());
            }
        };

        match sender.deliver(&config.destination, &payload).await {
            Ok(()) => {
                info!(channel = %config.channel_type, project_id = %event.project_id, "Notification delivered.");
                ChannelOutcome::Delivered
            }
            Err(e) => {
                warn!(channel = %config.channel_type, project_id = %event.project_id, error = %e, "Notification delivery failed.");
                ChannelOutcome::Failed(e.to_string())
            }
        }
    }

    /// Sends a synthetic `unknown -> online` notification through one channel
    /// using the given settings, bypassing transition detection.
    ///
    /// Disabled or incomplete settings are rejected before any delivery.
    pub async fn send_test(
        &self,
        channel_type: ChannelType,
        settings: &NotificationSettings,
    ) -> Result<DispatchReport, DispatchError> {
        let config = settings.channel(channel_type);
        if !config.enabled {
            return Err(DispatchError::ChannelDisabled(channel_type));
        }
        if !config.has_destination() {
            return Err(DispatchError::MissingDestination {
                channel: channel_type,
                field: channel_type.destination_label(),
            });
        }

        let event = NotificationEvent::synthetic_test();
        Ok(self.dispatch(&event, std::slice::from_ref(&config)).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::senders::{RenderedPayload, SenderError};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FakeSender {
        channel: ChannelType,
        fail: bool,
        delay: Duration,
        calls: Mutex<Vec<String>>,
    }

    impl FakeSender {
        fn new(channel: ChannelType, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                channel,
                fail,
                delay: Duration::ZERO,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationSender for FakeSender {
        fn channel_type(&self) -> ChannelType {
            self.channel
        }

        fn render(&self, event: &NotificationEvent, _config: &ChannelConfig) -> Result<RenderedPayload, SenderError> {
            RenderedPayload::json(&serde_json::json!({ "title": event.headline() }))
        }

        async fn deliver(&self, destination: &str, _payload: &RenderedPayload) -> Result<(), SenderError> {
            tokio::time::sleep(self.delay).await;
            self.calls.lock().unwrap().push(destination.to_string());
            if self.fail {
                Err(SenderError::SendFailed("boom".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn dispatcher(senders: &[Arc<FakeSender>]) -> NotificationDispatcher {
        let mut dispatcher = NotificationDispatcher::new();
        for sender in senders {
            dispatcher.register(sender.clone());
        }
        dispatcher
    }

    #[tokio::test]
    async fn one_failing_channel_does_not_stop_the_others() {
        let webhook = FakeSender::new(ChannelType::Webhook, true);
        let chat = FakeSender::new(ChannelType::Chat, false);
        let dispatcher = dispatcher(&[webhook.clone(), chat.clone()]);

        let channels = vec![
            ChannelConfig::new(ChannelType::Webhook, "https://hooks.example.com"),
            ChannelConfig::new(ChannelType::Chat, "https://chat.example.com"),
        ];
        let report = dispatcher.dispatch(&NotificationEvent::synthetic_test(), &channels).await;

        assert!(report.success);
        assert!(matches!(report.outcomes[&ChannelType::Webhook], ChannelOutcome::Failed(_)));
        assert_eq!(report.outcomes[&ChannelType::Chat], ChannelOutcome::Delivered);
        assert_eq!(report.delivered(), 1);
        assert_eq!(chat.calls(), vec!["https://chat.example.com".to_string()]);
    }

    #[tokio::test]
    async fn enabled_channel_without_destination_is_never_delivered() {
        let webhook = FakeSender::new(ChannelType::Webhook, false);
        let dispatcher = dispatcher(&[webhook.clone()]);

        let channels = vec![ChannelConfig::new(ChannelType::Webhook, "  ")];
        let report = dispatcher.dispatch(&NotificationEvent::synthetic_test(), &channels).await;

        assert!(matches!(
            report.outcomes[&ChannelType::Webhook],
            ChannelOutcome::Misconfigured(_)
        ));
        assert!(webhook.calls().is_empty());
    }

    #[tokio::test]
    async fn disabled_channels_are_ignored() {
        let webhook = FakeSender::new(ChannelType::Webhook, false);
        let dispatcher = dispatcher(&[webhook.clone()]);

        let mut config = ChannelConfig::new(ChannelType::Webhook, "https://hooks.example.com");
        config.enabled = false;
        let report = dispatcher.dispatch(&NotificationEvent::synthetic_test(), &[config]).await;

        assert!(report.success);
        assert!(report.outcomes.is_empty());
        assert!(webhook.calls().is_empty());
    }

    #[tokio::test]
    async fn unregistered_channel_is_reported_unsupported() {
        let dispatcher = NotificationDispatcher::new();
        let channels = vec![ChannelConfig::new(ChannelType::Email, "ops@example.com")];
        let report = dispatcher.dispatch(&NotificationEvent::synthetic_test(), &channels).await;
        assert!(!report.success);
        assert_eq!(report.outcomes[&ChannelType::Email], ChannelOutcome::Unsupported);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_channel_does_not_delay_the_others() {
        let slow = Arc::new(FakeSender {
            channel: ChannelType::Webhook,
            fail: false,
            delay: Duration::from_secs(9),
            calls: Mutex::new(Vec::new()),
        });
        let fast = FakeSender::new(ChannelType::Chat, false);
        let dispatcher = dispatcher(&[slow.clone(), fast.clone()]);
        let channels = vec![
            ChannelConfig::new(ChannelType::Webhook, "https://slow.example.com"),
            ChannelConfig::new(ChannelType::Chat, "https://fast.example.com"),
        ];

        let start = tokio::time::Instant::now();
        let report = dispatcher.dispatch(&NotificationEvent::synthetic_test(), &channels).await;

        // Both ran concurrently: total time is the slowest channel, not the sum.
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(report.delivered(), 2);
    }

    #[tokio::test]
    async fn test_send_rejects_disabled_or_incomplete_settings() {
        let webhook = FakeSender::new(ChannelType::Webhook, false);
        let dispatcher = dispatcher(&[webhook.clone()]);

        let disabled = NotificationSettings {
            webhook_enabled: false,
            webhook_url: Some("https://hooks.example.com".to_string()),
            ..Default::default()
        };
        assert_eq!(
            dispatcher.send_test(ChannelType::Webhook, &disabled).await,
            Err(DispatchError::ChannelDisabled(ChannelType::Webhook))
        );

        let incomplete = NotificationSettings {
            webhook_enabled: true,
            ..Default::default()
        };
        assert!(matches!(
            dispatcher.send_test(ChannelType::Webhook, &incomplete).await,
            Err(DispatchError::MissingDestination { .. })
        ));
        assert!(webhook.calls().is_empty());

        let valid = NotificationSettings {
            webhook_enabled: true,
            webhook_url: Some("https://hooks.example.com".to_string()),
            ..Default::default()
        };
        let report = dispatcher.send_test(ChannelType::Webhook, &valid).await.unwrap();
        assert_eq!(report.outcomes[&ChannelType::Webhook], ChannelOutcome::Delivered);
        assert_eq!(webhook.calls().len(), 1);
    }
}
