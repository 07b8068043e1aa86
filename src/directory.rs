// Principal directory - resolves ids handed over by the identity layer

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::info;

#[cfg(test)]
use mockall::automock;

use crate::store::StorageError;
use crate::workflow::types::{Principal, PrincipalId, Role};

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    /// `Ok(None)` when no such principal exists.
    async fn resolve(&self, id: PrincipalId) -> Result<Option<Principal>, StorageError>;

    /// All principals, or only those holding `role`. Sorted by username.
    async fn list(&self, role: Option<Role>) -> Result<Vec<Principal>, StorageError>;
}

#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    principals: RwLock<BTreeMap<PrincipalId, Principal>>,
}

impl InMemoryDirectory {
    pub fn new(principals: impl IntoIterator<Item = Principal>) -> Self {
        let directory = Self::default();
        for principal in principals {
            directory.upsert(principal);
        }
        directory
    }

    /// Add or replace a principal.
    pub fn upsert(&self, principal: Principal) {
        info!(
            principal = %principal.id,
            username = %principal.username,
            role = %principal.role,
            "Principal registered"
        );
        self.principals
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(principal.id, principal);
    }

    pub fn len(&self) -> usize {
        self.principals
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PrincipalDirectory for InMemoryDirectory {
    async fn resolve(&self, id: PrincipalId) -> Result<Option<Principal>, StorageError> {
        Ok(self
            .principals
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&id)
            .cloned())
    }

    async fn list(&self, role: Option<Role>) -> Result<Vec<Principal>, StorageError> {
        let mut principals: Vec<Principal> = self
            .principals
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .filter(|principal| role.is_none_or(|role| principal.role == role))
            .cloned()
            .collect();
        principals.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(principals)
    }
}
