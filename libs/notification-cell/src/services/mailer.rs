use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error, info};

use shared_config::AppConfig;

use crate::models::{NotificationError, NotificationMessage};

/// Delivery collaborator for domain notifications. Implementations are
/// best-effort: callers never block a committed state change on delivery.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: NotificationMessage) -> Result<(), NotificationError>;
}

/// Mail-relay client posting messages to an external delivery service.
pub struct HttpMailer {
    client: Client,
    relay_url: String,
    from: String,
}

impl HttpMailer {
    pub fn new(config: &AppConfig) -> Result<Self, NotificationError> {
        if !config.is_mail_configured() {
            return Err(NotificationError::NotConfigured);
        }

        Ok(Self {
            client: Client::new(),
            relay_url: config.mail_service_url.clone(),
            from: config.mail_from.clone(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: NotificationMessage) -> Result<(), NotificationError> {
        debug!(
            "Sending '{}' notification to {} via mail relay",
            message.template, message.recipient
        );

        let body = serde_json::json!({
            "from": self.from,
            "to": message.recipient,
            "template": message.template,
            "fields": message.fields,
        });

        let response = self
            .client
            .post(&self.relay_url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!("Mail relay rejected message: {} - {}", status, text);
            return Err(NotificationError::RelayError {
                message: format!("HTTP {}: {}", status, text),
            });
        }

        info!("Notification '{}' accepted by mail relay", message.template);
        Ok(())
    }
}

/// Fallback mailer used when no relay is configured: logs the message and
/// drops it. Keeps local development working without SMTP credentials.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: NotificationMessage) -> Result<(), NotificationError> {
        info!(
            "Mail relay not configured, dropping '{}' notification for {}",
            message.template, message.recipient
        );
        Ok(())
    }
}
