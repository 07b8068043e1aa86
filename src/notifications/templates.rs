// Subjects and bodies of workflow notices

use super::{NotificationIntent, Recipient};
use crate::workflow::types::{MaintenanceRequest, Principal, RoleKey};

pub const SUBJECT_CREATED: &str = "New maintenance request created";
pub const SUBJECT_APPROVED_PRODUCTION: &str = "Request approved by production";
pub const SUBJECT_TECHNICAL_ASSIGNED: &str = "New technical request assigned";
pub const SUBJECT_ENGINEERING_PENDING: &str = "New engineering request awaiting approval";
pub const SUBJECT_ENGINEERING_ASSIGNED: &str = "New engineering request assigned";

pub fn role_body(request: &MaintenanceRequest) -> String {
    format!(
        "Request #{} - {}\nStatus: {}",
        request.id,
        request.title,
        request.status.label()
    )
}

pub fn assignment_body(principal: &Principal, request: &MaintenanceRequest) -> String {
    format!(
        "Hello {},\n\nRequest #{} - '{}' has been assigned to you.\n\nStatus: {}\n\nOpen the system for more details.",
        principal.display_name(),
        request.id,
        request.title,
        request.status.label()
    )
}

pub fn role_notice(
    key: RoleKey,
    request: &MaintenanceRequest,
    subject: &str,
) -> NotificationIntent {
    NotificationIntent {
        request_id: request.id,
        recipient: Recipient::Role(key),
        subject: subject.to_string(),
        body: role_body(request),
    }
}

pub fn assignment_notice(
    principal: &Principal,
    request: &MaintenanceRequest,
    subject: &str,
) -> NotificationIntent {
    NotificationIntent {
        request_id: request.id,
        recipient: Recipient::Principal(principal.clone()),
        subject: subject.to_string(),
        body: assignment_body(principal, request),
    }
}
