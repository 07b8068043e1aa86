// Notification Module - best-effort delivery of workflow notices
//
// The engine only produces `NotificationIntent`s. The dispatcher hands them to a
// `Notifier` after the transition has committed; nothing here can fail a transition.

pub mod dispatcher;
pub mod notifier;
pub mod recipients;
pub mod templates;
pub mod transport;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::workflow::types::{Principal, RequestId, RoleKey};

pub use dispatcher::{DispatchMetrics, DispatchSettings, DispatchStats, NotificationDispatcher};
pub use notifier::MailNotifier;
pub use recipients::{RecipientBook, RecipientEntry};
pub use transport::{LogTransport, MailMessage, MailTransport};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// Resolved through the recipient book at delivery time
    Role(RoleKey),
    /// Sent straight to the principal's own address
    Principal(Principal),
}

/// A rendered notice waiting to be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationIntent {
    pub request_id: RequestId,
    pub recipient: Recipient,
    pub subject: String,
    pub body: String,
}

/// Outcome of one delivery attempt that did not error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent { address: String },
    Skipped { reason: String },
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("mail transport failed: {0}")]
    Transport(String),

    #[error("invalid recipient address '{0}'")]
    InvalidAddress(String),
}

impl NotificationError {
    /// Transport hiccups are retried; bad configuration is not.
    pub fn is_transient(&self) -> bool {
        matches!(self, NotificationError::Transport(_))
    }
}

/// Delivery side of the workflow. Both calls are best-effort.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_role(
        &self,
        key: RoleKey,
        subject: &str,
        body: &str,
    ) -> Result<Delivery, NotificationError>;

    async fn notify_principal(
        &self,
        principal: &Principal,
        subject: &str,
        body: &str,
    ) -> Result<Delivery, NotificationError>;
}

/// Route an intent to the matching notifier call.
pub async fn deliver(
    notifier: &dyn Notifier,
    intent: &NotificationIntent,
) -> Result<Delivery, NotificationError> {
    match &intent.recipient {
        Recipient::Role(key) => notifier.notify_role(*key, &intent.subject, &intent.body).await,
        Recipient::Principal(principal) => {
            notifier
                .notify_principal(principal, &intent.subject, &intent.body)
                .await
        }
    }
}
