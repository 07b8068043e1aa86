// Workflow Module - maintenance request lifecycle
//
// Pure pieces (types, authorization table, state machine) are kept apart from
// the engine, which is the only place that touches the store and dispatcher.

pub mod action;
pub mod authorization;
pub mod engine;
pub mod errors;
pub mod state_machine;
pub mod types;

#[cfg(test)]
pub mod mocks;

#[cfg(test)]
pub mod tests;

pub use action::{Action, NewRequestPayload, TransitionPayload};
pub use engine::WorkflowEngine;
pub use errors::{Denial, ReferenceKind, WorkflowError};
pub use state_machine::{AssigneeRef, TransitionPlan};
pub use types::{
    BoardSummary, GutScores, HistoryAction, HistoryEntry, MaintenanceRequest, Principal,
    PrincipalId, RequestFilter, RequestId, RequestStatus, RequestType, Role, RoleKey,
};
