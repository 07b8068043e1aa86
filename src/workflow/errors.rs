use thiserror::Error;

use super::action::Action;
use super::types::{PrincipalId, RequestId, RequestStatus, Role};
use crate::store::StorageError;

/// What a dangling reference was supposed to point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Request,
    Executor,
    Engineer,
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReferenceKind::Request => f.write_str("request"),
            ReferenceKind::Executor => f.write_str("executor"),
            ReferenceKind::Engineer => f.write_str("engineer"),
        }
    }
}

/// Why an authorization check refused the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// The role has no row for the action in the permission table
    Role,
    /// The role may finish work, but only on requests assigned to the caller
    NotAssignee(RequestId),
}

impl std::fmt::Display for Denial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Denial::Role => f.write_str("role not permitted"),
            Denial::NotAssignee(id) => write!(f, "not assigned to request #{id}"),
        }
    }
}

/// Errors surfaced by the workflow engine.
///
/// The first four variants are business-rule failures: they carry no side
/// effects and replaying the same call against the same state fails the same
/// way. `Storage` is infrastructure and may succeed on retry.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("principal {principal} ({role}) may not {action}: {denial}")]
    Unauthorized {
        action: Action,
        role: Role,
        principal: PrincipalId,
        denial: Denial,
    },

    #[error("cannot {action} a request in status {status}")]
    InvalidTransition {
        action: Action,
        status: RequestStatus,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{kind} {id} not found")]
    ReferenceNotFound { kind: ReferenceKind, id: u64 },

    #[error("storage error: {0}")]
    Storage(#[source] StorageError),
}

impl WorkflowError {
    pub fn validation(reason: impl Into<String>) -> Self {
        WorkflowError::Validation(reason.into())
    }

    pub fn request_not_found(id: RequestId) -> Self {
        WorkflowError::ReferenceNotFound {
            kind: ReferenceKind::Request,
            id: id.0,
        }
    }

    pub fn is_business_rule(&self) -> bool {
        !matches!(self, WorkflowError::Storage(_))
    }

    /// Only infrastructure failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkflowError::Storage(err) => err.is_transient(),
            _ => false,
        }
    }
}

impl From<StorageError> for WorkflowError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => WorkflowError::request_not_found(id),
            other => WorkflowError::Storage(other),
        }
    }
}
