// Store Module - durable record of requests and their history
//
// Every implementation must make `commit_transition` a compare-and-set on the
// request status: the new request state and its history entry are written
// together, or neither is written.

pub mod file;
pub mod memory;
#[cfg(feature = "database")]
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::workflow::types::{
    HistoryEntry, MaintenanceRequest, NewHistoryEntry, RequestDraft, RequestFilter, RequestId,
    RequestStatus,
};

pub use file::JsonFileStore;
pub use memory::MemoryStore;
#[cfg(feature = "database")]
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("request {id} changed concurrently: expected {expected}, found {actual}")]
    Conflict {
        id: RequestId,
        expected: RequestStatus,
        actual: RequestStatus,
    },

    #[error("request {0} not found")]
    NotFound(RequestId),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("stored data is corrupt: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StorageError {
    /// Failures that may go away if the same call is made again.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Unavailable(_) | StorageError::Io(_) => true,
            #[cfg(feature = "database")]
            StorageError::Database(_) => true,
            _ => false,
        }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Assign ids and store a new request together with its CREATED entry.
    async fn insert(
        &self,
        draft: RequestDraft,
        created: NewHistoryEntry,
    ) -> Result<(MaintenanceRequest, HistoryEntry), StorageError>;

    async fn load(&self, id: RequestId) -> Result<MaintenanceRequest, StorageError>;

    /// Replace the stored request and append `entry`, but only while the stored
    /// status still equals `expected_status`. Otherwise `Conflict`.
    async fn commit_transition(
        &self,
        expected_status: RequestStatus,
        request: &MaintenanceRequest,
        entry: NewHistoryEntry,
    ) -> Result<HistoryEntry, StorageError>;

    /// Entries for one request, oldest first.
    async fn history(&self, id: RequestId) -> Result<Vec<HistoryEntry>, StorageError>;

    /// Matching requests, newest first.
    async fn list(&self, filter: &RequestFilter) -> Result<Vec<MaintenanceRequest>, StorageError>;
}

/// Timestamp ascending, id breaking ties.
pub(crate) fn sort_history(entries: &mut [HistoryEntry]) {
    entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
}

pub(crate) fn sort_newest_first(requests: &mut [MaintenanceRequest]) {
    requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}
