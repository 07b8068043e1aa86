// JSON document store shared between processes.
// Every operation takes an exclusive lock on `<path>.lock`, reads the whole
// document, and for writes replaces it through a temp file and rename.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{sort_history, sort_newest_first, RequestStore, StorageError};
use crate::workflow::types::{
    HistoryEntry, MaintenanceRequest, NewHistoryEntry, RequestDraft, RequestFilter, RequestId,
    RequestStatus,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRequest {
    request: MaintenanceRequest,
    history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreDocument {
    next_request_id: u64,
    next_history_id: u64,
    requests: Vec<StoredRequest>,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            next_request_id: 1,
            next_history_id: 1,
            requests: Vec::new(),
        }
    }
}

impl StoreDocument {
    fn find(&self, id: RequestId) -> Result<&StoredRequest, StorageError> {
        self.requests
            .iter()
            .find(|stored| stored.request.id == id)
            .ok_or(StorageError::NotFound(id))
    }

    fn find_mut(&mut self, id: RequestId) -> Result<&mut StoredRequest, StorageError> {
        self.requests
            .iter_mut()
            .find(|stored| stored.request.id == id)
            .ok_or(StorageError::NotFound(id))
    }

    fn take_history_id(&mut self) -> u64 {
        let id = self.next_history_id;
        self.next_history_id += 1;
        id
    }
}

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonFileStore {
    /// Open (or lazily create) the document at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut lock_name = path.as_os_str().to_owned();
        lock_name.push(".lock");

        info!("Using JSON request store at {}", path.display());
        Ok(Self {
            path,
            lock_path: PathBuf::from(lock_name),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&StoreDocument) -> Result<T, StorageError> + Send + 'static,
    {
        let store = self.clone();
        run_blocking(move || store.with_lock(|document| op(document).map(|value| (value, false))))
            .await
    }

    async fn write<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut StoreDocument) -> Result<T, StorageError> + Send + 'static,
    {
        let store = self.clone();
        run_blocking(move || store.with_lock(|document| op(document).map(|value| (value, true))))
            .await
    }

    /// Run `op` on the current document under the file lock. The document is
    /// written back only when `op` succeeds and asks for it.
    fn with_lock<T>(
        &self,
        op: impl FnOnce(&mut StoreDocument) -> Result<(T, bool), StorageError>,
    ) -> Result<T, StorageError> {
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?;
        let mut lock = RwLock::new(lock_file);
        let _guard = lock.write()?;

        let mut document = self.load_document()?;
        let (value, dirty) = op(&mut document)?;
        if dirty {
            self.save_document(&document)?;
        }
        Ok(value)
    }

    fn load_document(&self) -> Result<StoreDocument, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(StoreDocument::default()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreDocument::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn save_document(&self, document: &StoreDocument) -> Result<(), StorageError> {
        let temp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(document)?;
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;
        debug!("Saved request store to {}", self.path.display());
        Ok(())
    }
}

async fn run_blocking<T, F>(op: F) -> Result<T, StorageError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| StorageError::Unavailable(format!("store task failed: {e}")))?
}

#[async_trait]
impl RequestStore for JsonFileStore {
    async fn insert(
        &self,
        draft: RequestDraft,
        created: NewHistoryEntry,
    ) -> Result<(MaintenanceRequest, HistoryEntry), StorageError> {
        self.write(move |document| {
            let id = RequestId(document.next_request_id);
            document.next_request_id += 1;
            let request = draft.into_request(id);
            let entry = HistoryEntry::from_new(document.take_history_id(), id, created);
            document.requests.push(StoredRequest {
                request: request.clone(),
                history: vec![entry.clone()],
            });
            Ok((request, entry))
        })
        .await
    }

    async fn load(&self, id: RequestId) -> Result<MaintenanceRequest, StorageError> {
        self.read(move |document| Ok(document.find(id)?.request.clone()))
            .await
    }

    async fn commit_transition(
        &self,
        expected_status: RequestStatus,
        request: &MaintenanceRequest,
        entry: NewHistoryEntry,
    ) -> Result<HistoryEntry, StorageError> {
        let request = request.clone();
        self.write(move |document| {
            let history_id = document.next_history_id;
            let stored = document.find_mut(request.id)?;
            if stored.request.status != expected_status {
                return Err(StorageError::Conflict {
                    id: request.id,
                    expected: expected_status,
                    actual: stored.request.status,
                });
            }

            let entry = HistoryEntry::from_new(history_id, request.id, entry);
            stored.request = request;
            stored.history.push(entry.clone());
            document.next_history_id += 1;
            Ok(entry)
        })
        .await
    }

    async fn history(&self, id: RequestId) -> Result<Vec<HistoryEntry>, StorageError> {
        self.read(move |document| {
            let mut entries = document.find(id)?.history.clone();
            sort_history(&mut entries);
            Ok(entries)
        })
        .await
    }

    async fn list(&self, filter: &RequestFilter) -> Result<Vec<MaintenanceRequest>, StorageError> {
        let filter = filter.clone();
        self.read(move |document| {
            let mut requests: Vec<MaintenanceRequest> = document
                .requests
                .iter()
                .filter(|stored| filter.matches(&stored.request))
                .map(|stored| stored.request.clone())
                .collect();
            sort_newest_first(&mut requests);
            Ok(requests)
        })
        .await
    }
}
