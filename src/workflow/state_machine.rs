// Request lifecycle state machine.
// Pure planning only: every function here works on a copy of the request, so a
// rejected call leaves nothing behind. The engine commits the resulting plan.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use validator::Validate;

use super::action::{Action, NewRequestPayload, TransitionPayload};
use super::authorization::can_finish;
use super::errors::{ReferenceKind, WorkflowError};
use super::types::{
    GutScores, HistoryAction, MaintenanceRequest, NewHistoryEntry, Principal, PrincipalId,
    RequestDraft, RequestStatus, RequestType, RoleKey,
};
use crate::notifications::{templates, NotificationIntent};

const PM04_ORDER_MAX_LEN: usize = 50;

/// Principal the payload asks the engine to look up before applying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssigneeRef {
    Executor(PrincipalId),
    Engineer(PrincipalId),
}

impl AssigneeRef {
    pub fn id(&self) -> PrincipalId {
        match self {
            AssigneeRef::Executor(id) | AssigneeRef::Engineer(id) => *id,
        }
    }

    pub fn kind(&self) -> ReferenceKind {
        match self {
            AssigneeRef::Executor(_) => ReferenceKind::Executor,
            AssigneeRef::Engineer(_) => ReferenceKind::Engineer,
        }
    }
}

/// Everything a successful transition writes and emits.
#[derive(Debug, Clone)]
pub struct TransitionPlan {
    /// Status the request must still have when the plan is committed
    pub expected_status: RequestStatus,
    pub request: MaintenanceRequest,
    pub entry: NewHistoryEntry,
    pub notifications: Vec<NotificationIntent>,
}

/// The only status each action may fire from. `Create` has none.
pub fn source_status(action: Action) -> Option<RequestStatus> {
    match action {
        Action::Create => None,
        Action::ApproveProduction | Action::RejectProduction => Some(RequestStatus::Open),
        Action::ApproveMaintenance | Action::RejectMaintenance => Some(RequestStatus::WaitingMaint),
        Action::ApproveManager => Some(RequestStatus::WaitingManager),
        Action::FinishExecution => Some(RequestStatus::InExecution),
    }
}

pub fn check_status(request: &MaintenanceRequest, action: Action) -> Result<(), WorkflowError> {
    match source_status(action) {
        Some(expected) if expected == request.status => Ok(()),
        _ => Err(WorkflowError::InvalidTransition {
            action,
            status: request.status,
        }),
    }
}

/// Parse the demand type of a maintenance approval. Only the exact tags
/// `TECHNICAL` and `ENGINEERING` are accepted.
pub fn parse_request_type(payload: &TransitionPayload) -> Result<RequestType, WorkflowError> {
    match payload.request_type.as_deref() {
        Some("TECHNICAL") => Ok(RequestType::Technical),
        Some("ENGINEERING") => Ok(RequestType::Engineering),
        None | Some("") => Err(WorkflowError::validation(
            "request type is required (TECHNICAL or ENGINEERING)",
        )),
        Some(other) => Err(WorkflowError::validation(format!(
            "invalid request type '{other}' (expected TECHNICAL or ENGINEERING)"
        ))),
    }
}

/// Validate the payload fields an action depends on and name the principal to resolve.
pub fn required_assignee(
    action: Action,
    payload: &TransitionPayload,
) -> Result<Option<AssigneeRef>, WorkflowError> {
    match action {
        Action::ApproveMaintenance => match parse_request_type(payload)? {
            RequestType::Technical => payload
                .executor_id
                .map(|id| Some(AssigneeRef::Executor(id)))
                .ok_or_else(|| {
                    WorkflowError::validation("an executor is required for technical requests")
                }),
            RequestType::Engineering => Ok(None),
        },
        Action::ApproveManager => payload
            .engineer_id
            .map(|id| Some(AssigneeRef::Engineer(id)))
            .ok_or_else(|| WorkflowError::validation("a responsible engineer is required")),
        Action::FinishExecution => {
            if payload
                .pm04_order
                .as_deref()
                .is_some_and(|order| order.trim().chars().count() > PM04_ORDER_MAX_LEN)
            {
                return Err(WorkflowError::validation(format!(
                    "pm04 order must be at most {PM04_ORDER_MAX_LEN} characters"
                )));
            }
            Ok(None)
        }
        _ => Ok(None),
    }
}

/// `updated_at` must move forward even when the clock did not.
pub fn advance_timestamp(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

/// Validate a submission and build the draft plus its CREATED entry.
pub fn plan_creation(
    requester: &Principal,
    payload: NewRequestPayload,
    now: DateTime<Utc>,
) -> Result<(RequestDraft, NewHistoryEntry), WorkflowError> {
    let payload = payload.normalized();
    payload
        .validate()
        .map_err(|errors| WorkflowError::validation(errors.to_string()))?;

    let draft = RequestDraft {
        title: payload.title,
        problem_description: payload.problem_description,
        process: payload.process,
        equipment: payload.equipment,
        gut: GutScores {
            gravity: payload.gravity,
            urgency: payload.urgency,
            tendency: payload.tendency,
        },
        photo: payload.photo,
        requester: requester.id,
        created_at: now,
    };
    let entry = NewHistoryEntry {
        action: HistoryAction::Created,
        actor: Some(requester.id),
        comment: String::new(),
        timestamp: now,
    };
    Ok((draft, entry))
}

/// Notices sent once a new request is stored.
pub fn creation_notifications(request: &MaintenanceRequest) -> Vec<NotificationIntent> {
    vec![templates::role_notice(
        RoleKey::ApproverProd,
        request,
        templates::SUBJECT_CREATED,
    )]
}

/// Apply `action` to a copy of `request`.
///
/// `assignee` must be the principal named by [`required_assignee`], already
/// resolved by the caller.
pub fn apply(
    request: &MaintenanceRequest,
    actor: &Principal,
    action: Action,
    payload: &TransitionPayload,
    assignee: Option<&Principal>,
    now: DateTime<Utc>,
) -> Result<TransitionPlan, WorkflowError> {
    let mut next = request.clone();
    next.updated_at = advance_timestamp(request.updated_at, now);

    let (history_action, comment, notifications) = match (request.status, action) {
        (RequestStatus::Open, Action::ApproveProduction) => {
            next.status = RequestStatus::WaitingMaint;
            let notice = templates::role_notice(
                RoleKey::ApproverMaint,
                &next,
                templates::SUBJECT_APPROVED_PRODUCTION,
            );
            (HistoryAction::ApprovedProd, payload.comment_text(), vec![notice])
        }

        (RequestStatus::Open, Action::RejectProduction) => {
            next.status = RequestStatus::Rejected;
            (HistoryAction::RejectedProd, payload.comment_text(), Vec::new())
        }

        (RequestStatus::WaitingMaint, Action::ApproveMaintenance) => {
            let request_type = parse_request_type(payload)?;
            next.request_type = Some(request_type);
            match request_type {
                RequestType::Technical => {
                    let executor =
                        expect_assignee(assignee, payload.executor_id, ReferenceKind::Executor)?;
                    warn_if_cannot_finish(request, executor);
                    next.assigned_to = Some(executor.id);
                    next.status = RequestStatus::InExecution;
                    let notice = templates::assignment_notice(
                        executor,
                        &next,
                        templates::SUBJECT_TECHNICAL_ASSIGNED,
                    );
                    (
                        HistoryAction::ApprovedMaintTech,
                        format!("Assigned to {}", executor.username),
                        vec![notice],
                    )
                }
                RequestType::Engineering => {
                    next.status = RequestStatus::WaitingManager;
                    let notice = templates::role_notice(
                        RoleKey::ManagerMaint,
                        &next,
                        templates::SUBJECT_ENGINEERING_PENDING,
                    );
                    (
                        HistoryAction::ApprovedMaintEng,
                        "Forwarded to maintenance management".to_string(),
                        vec![notice],
                    )
                }
            }
        }

        (RequestStatus::WaitingMaint, Action::RejectMaintenance) => {
            next.status = RequestStatus::Rejected;
            (HistoryAction::RejectedMaint, payload.comment_text(), Vec::new())
        }

        (RequestStatus::WaitingManager, Action::ApproveManager) => {
            let engineer = expect_assignee(assignee, payload.engineer_id, ReferenceKind::Engineer)?;
            warn_if_cannot_finish(request, engineer);
            next.assigned_to = Some(engineer.id);
            next.status = RequestStatus::InExecution;
            let notice = templates::assignment_notice(
                engineer,
                &next,
                templates::SUBJECT_ENGINEERING_ASSIGNED,
            );
            (
                HistoryAction::ApprovedManager,
                format!("Assigned to {}", engineer.username),
                vec![notice],
            )
        }

        (RequestStatus::InExecution, Action::FinishExecution) => {
            next.status = RequestStatus::Done;
            next.execution_description = Some(
                payload
                    .execution_description
                    .clone()
                    .unwrap_or_default(),
            );
            next.pm04_order = Some(payload.pm04_order.clone().unwrap_or_default());
            if payload.execution_photo.is_some() {
                next.execution_photo = payload.execution_photo.clone();
            }
            (HistoryAction::Finished, payload.comment_text(), Vec::new())
        }

        (status, action) => {
            return Err(WorkflowError::InvalidTransition { action, status });
        }
    };

    info!(
        request_id = %request.id,
        from_status = %request.status,
        to_status = %next.status,
        action = %action,
        history = %history_action,
        actor = %actor.id,
        "Planned request transition"
    );

    Ok(TransitionPlan {
        expected_status: request.status,
        entry: NewHistoryEntry {
            action: history_action,
            actor: Some(actor.id),
            comment,
            timestamp: next.updated_at,
        },
        request: next,
        notifications,
    })
}

fn expect_assignee<'a>(
    assignee: Option<&'a Principal>,
    requested: Option<PrincipalId>,
    kind: ReferenceKind,
) -> Result<&'a Principal, WorkflowError> {
    match (assignee, requested) {
        (Some(principal), Some(id)) if principal.id == id => Ok(principal),
        (_, Some(id)) => Err(WorkflowError::ReferenceNotFound { kind, id: id.0 }),
        (_, None) => Err(WorkflowError::validation(format!("{kind} reference is required"))),
    }
}

fn warn_if_cannot_finish(request: &MaintenanceRequest, assignee: &Principal) {
    if !can_finish(assignee.role) {
        warn!(
            request_id = %request.id,
            assignee = %assignee.id,
            role = %assignee.role,
            "Assigned principal's role cannot finish execution"
        );
    }
}
