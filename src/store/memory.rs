use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::{sort_history, sort_newest_first, RequestStore, StorageError};
use crate::workflow::types::{
    HistoryEntry, MaintenanceRequest, NewHistoryEntry, RequestDraft, RequestFilter, RequestId,
    RequestStatus,
};

#[derive(Debug)]
struct Slot {
    request: MaintenanceRequest,
    history: Vec<HistoryEntry>,
}

/// Process-local store. The map lock is held only for lookup and insert;
/// transitions on one request serialize on that request's slot.
#[derive(Debug)]
pub struct MemoryStore {
    slots: RwLock<HashMap<RequestId, Arc<Mutex<Slot>>>>,
    next_request_id: AtomicU64,
    next_history_id: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            next_request_id: AtomicU64::new(1),
            next_history_id: AtomicU64::new(1),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, id: RequestId) -> Result<Arc<Mutex<Slot>>, StorageError> {
        self.slots
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound(id))
    }

    fn next_history_id(&self) -> u64 {
        self.next_history_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn insert(
        &self,
        draft: RequestDraft,
        created: NewHistoryEntry,
    ) -> Result<(MaintenanceRequest, HistoryEntry), StorageError> {
        let id = RequestId(self.next_request_id.fetch_add(1, Ordering::SeqCst));
        let request = draft.into_request(id);
        let entry = HistoryEntry::from_new(self.next_history_id(), id, created);

        let slot = Slot {
            request: request.clone(),
            history: vec![entry.clone()],
        };
        self.slots.write().await.insert(id, Arc::new(Mutex::new(slot)));
        debug!(request_id = %id, "Stored new request");

        Ok((request, entry))
    }

    async fn load(&self, id: RequestId) -> Result<MaintenanceRequest, StorageError> {
        let slot = self.slot(id).await?;
        let guard = slot.lock().await;
        Ok(guard.request.clone())
    }

    async fn commit_transition(
        &self,
        expected_status: RequestStatus,
        request: &MaintenanceRequest,
        entry: NewHistoryEntry,
    ) -> Result<HistoryEntry, StorageError> {
        let slot = self.slot(request.id).await?;
        let mut guard = slot.lock().await;

        if guard.request.status != expected_status {
            return Err(StorageError::Conflict {
                id: request.id,
                expected: expected_status,
                actual: guard.request.status,
            });
        }

        let entry = HistoryEntry::from_new(self.next_history_id(), request.id, entry);
        guard.request = request.clone();
        guard.history.push(entry.clone());
        Ok(entry)
    }

    async fn history(&self, id: RequestId) -> Result<Vec<HistoryEntry>, StorageError> {
        let slot = self.slot(id).await?;
        let mut entries = slot.lock().await.history.clone();
        sort_history(&mut entries);
        Ok(entries)
    }

    async fn list(&self, filter: &RequestFilter) -> Result<Vec<MaintenanceRequest>, StorageError> {
        let slots: Vec<Arc<Mutex<Slot>>> = self.slots.read().await.values().cloned().collect();

        let mut requests = Vec::with_capacity(slots.len());
        for slot in slots {
            let guard = slot.lock().await;
            if filter.matches(&guard.request) {
                requests.push(guard.request.clone());
            }
        }
        sort_newest_first(&mut requests);
        Ok(requests)
    }
}
