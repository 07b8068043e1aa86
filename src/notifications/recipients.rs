// Role-key -> address book (EmailConfiguration)

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::info;
use validator::ValidateEmail;

use super::NotificationError;
use crate::workflow::types::RoleKey;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientEntry {
    pub key: RoleKey,
    pub email: String,
    #[serde(default)]
    pub description: String,
}

/// Shared, admin-editable recipient mapping. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct RecipientBook {
    entries: Arc<RwLock<BTreeMap<RoleKey, RecipientEntry>>>,
}

impl RecipientBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(
        entries: impl IntoIterator<Item = RecipientEntry>,
    ) -> Result<Self, NotificationError> {
        let book = Self::new();
        for entry in entries {
            book.set(entry.key, &entry.email, &entry.description)?;
        }
        Ok(book)
    }

    pub fn address_for(&self, key: RoleKey) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&key)
            .map(|entry| entry.email.clone())
    }

    /// Add or replace the address for `key`.
    pub fn set(
        &self,
        key: RoleKey,
        email: &str,
        description: &str,
    ) -> Result<(), NotificationError> {
        let email = email.trim().to_string();
        if !email.validate_email() {
            return Err(NotificationError::InvalidAddress(email));
        }
        info!(key = %key, email = %email, "Recipient configured");
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(
                key,
                RecipientEntry {
                    key,
                    email,
                    description: description.to_string(),
                },
            );
        Ok(())
    }

    pub fn remove(&self, key: RoleKey) -> Option<RecipientEntry> {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&key)
    }

    pub fn entries(&self) -> Vec<RecipientEntry> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect()
    }
}
