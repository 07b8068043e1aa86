// Static permission table: which roles may invoke which action.
// Checked before any status guard; a new action needs one new row here.

use super::action::Action;
use super::errors::{Denial, WorkflowError};
use super::types::{MaintenanceRequest, Principal, Role};

const FINISHERS: &[Role] = &[Role::Executor, Role::EngineerMech, Role::EngineerElec];

const PERMISSIONS: &[(Action, &[Role])] = &[
    (Action::Create, &Role::ALL),
    (Action::ApproveProduction, &[Role::ApproverProd]),
    (Action::RejectProduction, &[Role::ApproverProd]),
    (Action::ApproveMaintenance, &[Role::ApproverMaint]),
    (Action::RejectMaintenance, &[Role::ApproverMaint]),
    (Action::ApproveManager, &[Role::ManagerMaint]),
    (Action::FinishExecution, FINISHERS),
];

/// Roles allowed to invoke `action`. Unlisted actions allow nobody.
pub fn permitted_roles(action: Action) -> &'static [Role] {
    PERMISSIONS
        .iter()
        .find(|(candidate, _)| *candidate == action)
        .map(|(_, roles)| *roles)
        .unwrap_or(&[])
}

pub fn is_permitted(action: Action, role: Role) -> bool {
    permitted_roles(action).contains(&role)
}

/// Whether a principal with this role could ever close out assigned work.
pub fn can_finish(role: Role) -> bool {
    is_permitted(Action::FinishExecution, role)
}

/// Role check from the table.
pub fn authorize(principal: &Principal, action: Action) -> Result<(), WorkflowError> {
    if is_permitted(action, principal.role) {
        Ok(())
    } else {
        Err(WorkflowError::Unauthorized {
            action,
            role: principal.role,
            principal: principal.id,
            denial: Denial::Role,
        })
    }
}

/// Finishing is further restricted to the principal the work was handed to.
pub fn authorize_on_request(
    principal: &Principal,
    action: Action,
    request: &MaintenanceRequest,
) -> Result<(), WorkflowError> {
    authorize(principal, action)?;

    if action == Action::FinishExecution && request.assigned_to != Some(principal.id) {
        return Err(WorkflowError::Unauthorized {
            action,
            role: principal.role,
            principal: principal.id,
            denial: Denial::NotAssignee(request.id),
        });
    }
    Ok(())
}
