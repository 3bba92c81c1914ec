//! Email channel.
//!
//! The sender owns subject and body construction. Actual transport is
//! pluggable through [`MailTransport`]; [`SmtpMailer`] wraps the `lettre`
//! async SMTP transport when SMTP settings are present.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;
use tracing::info;

use super::{DELIVERY_TIMEOUT, NotificationSender, RenderedPayload, SenderError};
use crate::notifications::models::{ChannelConfig, ChannelType, NotificationEvent};
use crate::server::config::SmtpConfig;

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send_mail(&self, to: &str, subject: &str, body: &str) -> Result<(), SenderError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, SenderError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| SenderError::InvalidConfiguration(format!("SMTP relay '{}': {e}", config.host)))?
            .port(config.port)
            .timeout(Some(DELIVERY_TIMEOUT));

        if let (Some(user), Some(pass)) = (&config.user, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send_mail(&self, to: &str, subject: &str, body: &str) -> Result<(), SenderError> {
        let from = self
            .from_address
            .parse()
            .map_err(|e| SenderError::InvalidConfiguration(format!("Invalid sender address: {e}")))?;
        let recipient = to
            .parse()
            .map_err(|e| SenderError::InvalidConfiguration(format!("Invalid recipient address '{to}': {e}")))?;

        let email = Message::builder()
            .from(from)
            .to(recipient)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| SenderError::SendFailed(format!("Failed to build email: {e}")))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| SenderError::SendFailed(format!("SMTP delivery failed: {e}")))?;

        info!(to, "Notification email sent.");
        Ok(())
    }
}

pub struct EmailSender {
    transport: Option<Arc<dyn MailTransport>>,
}

impl EmailSender {
    pub fn new(transport: Option<Arc<dyn MailTransport>>) -> Self {
        Self { transport }
    }

    pub fn subject(event: &NotificationEvent) -> String {
        let prefix = if event.is_test { "[PulseWatch TEST]" } else { "[PulseWatch]" };
        let verb = if event.is_up() { "is back online" } else { "is down" };
        format!("{prefix} {} {verb}", event.project_name)
    }

    pub fn body(event: &NotificationEvent) -> String {
        let mut body = String::new();
        if event.is_test {
            body.push_str("This is a test notification. Your email channel is configured correctly.\n\n");
        }
        body.push_str(&format!("Project: {}\n", event.project_name));
        body.push_str(&format!("URL: {}\n", event.project_url));
        body.push_str(&format!("Status: {} -> {}\n", event.previous_status, event.new_status));
        if let (true, Some(latency)) = (event.is_up(), event.latency_ms) {
            body.push_str(&format!("Response Time: {latency}ms\n"));
        }
        body.push_str(&format!("Time: {}\n", event.timestamp.to_rfc3339()));
        body
    }
}

#[async_trait]
impl NotificationSender for EmailSender {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Email
    }

    fn render(&self, event: &NotificationEvent, _config: &ChannelConfig) -> Result<RenderedPayload, SenderError> {
        Ok(RenderedPayload {
            content_type: "text/plain".to_string(),
            subject: Some(Self::subject(event)),
            body: Self::body(event),
        })
    }

    async fn deliver(&self, destination: &str, payload: &RenderedPayload) -> Result<(), SenderError> {
        if !destination.contains('@') {
            return Err(SenderError::InvalidConfiguration(format!(
                "'{destination}' is not an email address"
            )));
        }
        let transport = self.transport.as_ref().ok_or_else(|| {
            SenderError::InvalidConfiguration("No mail transport configured (set SMTP host)".to_string())
        })?;
        let subject = payload.subject.as_deref().unwrap_or("[PulseWatch] Status change");
        transport.send_mail(destination, subject, &payload.body).await
    }
}
