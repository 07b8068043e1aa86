// Maintenance Workflow Library - request lifecycle engine
// This exposes the engine and its collaborators for the CLI and for embedding

pub mod config;
pub mod directory;
pub mod notifications;
pub mod store;
pub mod telemetry;
pub mod workflow;

// Re-export key types for easy access
pub use config::{MaintenanceWorkflowConfig, StorageBackend};
pub use directory::{InMemoryDirectory, PrincipalDirectory};
pub use notifications::{
    DispatchSettings, DispatchStats, LogTransport, MailMessage, MailNotifier, MailTransport,
    NotificationDispatcher, NotificationError, NotificationIntent, Notifier, RecipientBook,
};
pub use store::{JsonFileStore, MemoryStore, RequestStore, StorageError};
#[cfg(feature = "database")]
pub use store::SqliteStore;
pub use telemetry::{generate_correlation_id, init_telemetry, transition_span};
pub use workflow::{
    Action, BoardSummary, HistoryAction, HistoryEntry, MaintenanceRequest, NewRequestPayload,
    Principal, PrincipalId, RequestFilter, RequestId, RequestStatus, RequestType, Role, RoleKey,
    TransitionPayload, WorkflowEngine, WorkflowError,
};
