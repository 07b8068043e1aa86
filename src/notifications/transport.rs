// Mail transport seam. Real SMTP delivery lives outside this crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::NotificationError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<(), NotificationError>;
}

/// Writes every message to the log instead of a mail server.
#[derive(Debug, Clone, Default)]
pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
    async fn send(&self, message: &MailMessage) -> Result<(), NotificationError> {
        info!(
            from = %message.from,
            to = %message.to,
            subject = %message.subject,
            body = %message.body,
            "Email sent"
        );
        Ok(())
    }
}
