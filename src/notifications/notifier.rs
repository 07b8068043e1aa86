use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::{Delivery, MailMessage, MailTransport, NotificationError, Notifier, RecipientBook};
use crate::workflow::types::{Principal, RoleKey};

/// Notifier that resolves addresses and hands messages to a mail transport.
pub struct MailNotifier {
    sender: String,
    recipients: RecipientBook,
    transport: Arc<dyn MailTransport>,
}

impl std::fmt::Debug for MailNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailNotifier")
            .field("sender", &self.sender)
            .field("recipients", &self.recipients.entries().len())
            .finish()
    }
}

impl MailNotifier {
    pub fn new(
        sender: impl Into<String>,
        recipients: RecipientBook,
        transport: Arc<dyn MailTransport>,
    ) -> Self {
        Self {
            sender: sender.into(),
            recipients,
            transport,
        }
    }

    pub fn recipients(&self) -> &RecipientBook {
        &self.recipients
    }

    async fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<Delivery, NotificationError> {
        let message = MailMessage {
            from: self.sender.clone(),
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        };
        self.transport.send(&message).await?;
        info!(to = %to, subject = %subject, "Notification delivered");
        Ok(Delivery::Sent {
            address: to.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for MailNotifier {
    async fn notify_role(
        &self,
        key: RoleKey,
        subject: &str,
        body: &str,
    ) -> Result<Delivery, NotificationError> {
        match self.recipients.address_for(key) {
            Some(address) => self.send(&address, subject, body).await,
            None => {
                warn!(
                    key = %key,
                    subject = %subject,
                    "No recipient configured for role, skipping notification"
                );
                Ok(Delivery::Skipped {
                    reason: format!("no recipient configured for {key}"),
                })
            }
        }
    }

    async fn notify_principal(
        &self,
        principal: &Principal,
        subject: &str,
        body: &str,
    ) -> Result<Delivery, NotificationError> {
        match principal.notification_address() {
            Some(address) => self.send(address, subject, body).await,
            None => {
                warn!(
                    principal = %principal.id,
                    username = %principal.username,
                    "Principal has no email address, skipping notification"
                );
                Ok(Delivery::Skipped {
                    reason: format!("{} has no email address", principal.username),
                })
            }
        }
    }
}
