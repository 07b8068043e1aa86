use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn, Instrument};

use super::action::{Action, NewRequestPayload, TransitionPayload};
use super::authorization::{authorize, authorize_on_request};
use super::errors::WorkflowError;
use super::state_machine::{self, AssigneeRef};
use super::types::{
    BoardSummary, HistoryEntry, MaintenanceRequest, Principal, PrincipalId, RequestFilter,
    RequestId, Role,
};
use crate::directory::PrincipalDirectory;
use crate::notifications::{DispatchSettings, DispatchStats, NotificationDispatcher, Notifier};
use crate::store::{RequestStore, StorageError};
use crate::telemetry::{generate_correlation_id, transition_span};

/// Owns the request lifecycle.
///
/// Every call runs the same pipeline: role check, assignee check, status
/// guard, payload validation, reference resolution, then a compare-and-set
/// commit of the new state together with its history entry. Notices are
/// queued only after the commit succeeded.
pub struct WorkflowEngine {
    store: Arc<dyn RequestStore>,
    directory: Arc<dyn PrincipalDirectory>,
    dispatcher: NotificationDispatcher,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

impl WorkflowEngine {
    /// Must be called inside a tokio runtime; it starts the notification worker.
    pub fn new(
        store: Arc<dyn RequestStore>,
        directory: Arc<dyn PrincipalDirectory>,
        notifier: Arc<dyn Notifier>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            store,
            directory,
            dispatcher: NotificationDispatcher::spawn(notifier, settings),
        }
    }

    pub async fn create_request(
        &self,
        principal: &Principal,
        payload: NewRequestPayload,
    ) -> Result<MaintenanceRequest, WorkflowError> {
        let correlation_id = generate_correlation_id();
        let span = transition_span(Action::Create, principal.id, None, &correlation_id);

        async move {
            authorize(principal, Action::Create)?;
            let (draft, entry) = state_machine::plan_creation(principal, payload, Utc::now())?;
            let (request, _) = self.store.insert(draft, entry).await?;

            info!(
                request_id = %request.id,
                requester = %principal.id,
                priority = request.gut.priority(),
                "Maintenance request created"
            );
            self.dispatcher
                .dispatch(state_machine::creation_notifications(&request));
            Ok(request)
        }
        .instrument(span)
        .await
    }

    pub async fn transition(
        &self,
        principal: &Principal,
        request_id: RequestId,
        action: Action,
        payload: TransitionPayload,
    ) -> Result<MaintenanceRequest, WorkflowError> {
        let correlation_id = generate_correlation_id();
        let span = transition_span(action, principal.id, Some(request_id), &correlation_id);

        async move {
            let result = self.run_transition(principal, request_id, action, &payload).await;
            if let Err(e) = &result {
                if e.is_business_rule() {
                    info!(error = %e, "Transition refused");
                } else {
                    warn!(error = %e, "Transition failed");
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_transition(
        &self,
        principal: &Principal,
        request_id: RequestId,
        action: Action,
        payload: &TransitionPayload,
    ) -> Result<MaintenanceRequest, WorkflowError> {
        authorize(principal, action)?;

        let current = self.store.load(request_id).await?;
        authorize_on_request(principal, action, &current)?;
        state_machine::check_status(&current, action)?;

        let assignee = match state_machine::required_assignee(action, payload)? {
            Some(reference) => Some(self.resolve_assignee(reference).await?),
            None => None,
        };

        let plan = state_machine::apply(
            &current,
            principal,
            action,
            payload,
            assignee.as_ref(),
            Utc::now(),
        )?;

        let entry = self
            .store
            .commit_transition(plan.expected_status, &plan.request, plan.entry)
            .await
            .map_err(|e| match e {
                StorageError::Conflict { actual, .. } => {
                    debug!(actual = %actual, "Lost the race for this request");
                    WorkflowError::InvalidTransition {
                        action,
                        status: actual,
                    }
                }
                other => other.into(),
            })?;

        info!(
            request_id = %plan.request.id,
            from_status = %current.status,
            to_status = %plan.request.status,
            history = %entry.action,
            history_id = entry.id,
            "Request transition committed"
        );
        self.dispatcher.dispatch(plan.notifications);
        Ok(plan.request)
    }

    async fn resolve_assignee(&self, reference: AssigneeRef) -> Result<Principal, WorkflowError> {
        self.directory
            .resolve(reference.id())
            .await?
            .ok_or(WorkflowError::ReferenceNotFound {
                kind: reference.kind(),
                id: reference.id().0,
            })
    }

    /// Audit trail of one request, oldest first.
    pub async fn list_history(
        &self,
        request_id: RequestId,
    ) -> Result<Vec<HistoryEntry>, WorkflowError> {
        Ok(self.store.history(request_id).await?)
    }

    pub async fn get_request(
        &self,
        request_id: RequestId,
    ) -> Result<MaintenanceRequest, WorkflowError> {
        Ok(self.store.load(request_id).await?)
    }

    /// Requests matching `filter`, newest first.
    pub async fn list_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<MaintenanceRequest>, WorkflowError> {
        Ok(self.store.list(filter).await?)
    }

    pub async fn board_summary(&self) -> Result<BoardSummary, WorkflowError> {
        let requests = self.store.list(&RequestFilter::default()).await?;
        Ok(BoardSummary::from_requests(&requests))
    }

    /// Look up a principal handed over by the identity layer.
    pub async fn principal(&self, id: PrincipalId) -> Result<Option<Principal>, WorkflowError> {
        Ok(self.directory.resolve(id).await?)
    }

    /// Principals for assignment pickers, optionally restricted to one role.
    pub async fn list_principals(
        &self,
        role: Option<Role>,
    ) -> Result<Vec<Principal>, WorkflowError> {
        Ok(self.directory.list(role).await?)
    }

    pub fn notification_stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    /// Drain queued notices and stop the worker.
    pub async fn shutdown(&self) -> DispatchStats {
        info!("Shutting down workflow engine");
        self.dispatcher.shutdown().await
    }
}
