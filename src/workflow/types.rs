// Core types for the maintenance request lifecycle

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// GUT products above this value are flagged as high priority on the board.
pub const HIGH_PRIORITY_THRESHOLD: u16 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(pub u64);

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct ParseVariantError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseVariantError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Request lifecycle status. `Done` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    /// Issued, awaiting production approval
    Open,
    WaitingMaint,
    WaitingManager,
    InExecution,
    Done,
    Rejected,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 6] = [
        RequestStatus::Open,
        RequestStatus::WaitingMaint,
        RequestStatus::WaitingManager,
        RequestStatus::InExecution,
        RequestStatus::Done,
        RequestStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Open => "OPEN",
            RequestStatus::WaitingMaint => "WAITING_MAINT",
            RequestStatus::WaitingManager => "WAITING_MANAGER",
            RequestStatus::InExecution => "IN_EXECUTION",
            RequestStatus::Done => "DONE",
            RequestStatus::Rejected => "REJECTED",
        }
    }

    /// Human readable label used in notification bodies and search.
    pub fn label(&self) -> &'static str {
        match self {
            RequestStatus::Open => "Issued (awaiting production approval)",
            RequestStatus::WaitingMaint => "Awaiting approval (maintenance)",
            RequestStatus::WaitingManager => "Awaiting manager (engineering)",
            RequestStatus::InExecution => "In execution",
            RequestStatus::Done => "Done",
            RequestStatus::Rejected => "Rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Done | RequestStatus::Rejected)
    }

    /// Still moving through the approval stages.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            RequestStatus::Open | RequestStatus::WaitingMaint | RequestStatus::WaitingManager
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = ParseVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseVariantError::new("status", s))
    }
}

/// Demand type chosen by the maintenance supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    Technical,
    Engineering,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Technical => "TECHNICAL",
            RequestType::Engineering => "ENGINEERING",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestType {
    type Err = ParseVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TECHNICAL" => Ok(RequestType::Technical),
            "ENGINEERING" => Ok(RequestType::Engineering),
            _ => Err(ParseVariantError::new("request type", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Requester,
    ApproverProd,
    ApproverMaint,
    ManagerMaint,
    Executor,
    EngineerMech,
    EngineerElec,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Requester,
        Role::ApproverProd,
        Role::ApproverMaint,
        Role::ManagerMaint,
        Role::Executor,
        Role::EngineerMech,
        Role::EngineerElec,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Requester => "REQUESTER",
            Role::ApproverProd => "APPROVER_PROD",
            Role::ApproverMaint => "APPROVER_MAINT",
            Role::ManagerMaint => "MANAGER_MAINT",
            Role::Executor => "EXECUTOR",
            Role::EngineerMech => "ENGINEER_MECH",
            Role::EngineerElec => "ENGINEER_ELEC",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::Requester => "Requester",
            Role::ApproverProd => "Production supervisor",
            Role::ApproverMaint => "Maintenance supervisor",
            Role::ManagerMaint => "Maintenance manager",
            Role::Executor => "Executor (technician)",
            Role::EngineerMech => "Mechanical engineer",
            Role::EngineerElec => "Electrical engineer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseVariantError::new("role", s))
    }
}

/// Keys of the role-targeted recipient book (EmailConfiguration).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleKey {
    ApproverProd,
    ApproverMaint,
    ManagerMaint,
}

impl RoleKey {
    pub const ALL: [RoleKey; 3] = [
        RoleKey::ApproverProd,
        RoleKey::ApproverMaint,
        RoleKey::ManagerMaint,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleKey::ApproverProd => "APPROVER_PROD",
            RoleKey::ApproverMaint => "APPROVER_MAINT",
            RoleKey::ManagerMaint => "MANAGER_MAINT",
        }
    }
}

impl fmt::Display for RoleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleKey {
    type Err = ParseVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RoleKey::ALL
            .into_iter()
            .find(|key| key.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseVariantError::new("role key", s))
    }
}

/// An authenticated actor. Folds the user account and its profile (badge and role).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Badge number, informational only
    pub hmc: String,
    pub role: Role,
}

impl Principal {
    /// Address to notify, ignoring blank entries.
    pub fn notification_address(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|address| !address.is_empty())
    }

    /// Name used to greet the principal in direct notifications.
    pub fn display_name(&self) -> &str {
        if self.first_name.trim().is_empty() {
            &self.username
        } else {
            &self.first_name
        }
    }
}

/// Gravity / urgency / tendency ratings, each 1 to 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GutScores {
    pub gravity: u8,
    pub urgency: u8,
    pub tendency: u8,
}

impl GutScores {
    pub fn priority(&self) -> u16 {
        u16::from(self.gravity) * u16::from(self.urgency) * u16::from(self.tendency)
    }

    pub fn is_high_priority(&self) -> bool {
        self.priority() > HIGH_PRIORITY_THRESHOLD
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceRequest {
    pub id: RequestId,
    pub title: String,
    pub problem_description: String,
    pub process: String,
    pub equipment: String,
    pub gut: GutScores,
    pub photo: Option<String>,
    pub status: RequestStatus,
    #[serde(rename = "type")]
    pub request_type: Option<RequestType>,
    pub assigned_to: Option<PrincipalId>,
    pub requester: PrincipalId,
    pub execution_description: Option<String>,
    pub execution_photo: Option<String>,
    pub pm04_order: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A request that has passed validation but has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDraft {
    pub title: String,
    pub problem_description: String,
    pub process: String,
    pub equipment: String,
    pub gut: GutScores,
    pub photo: Option<String>,
    pub requester: PrincipalId,
    pub created_at: DateTime<Utc>,
}

impl RequestDraft {
    pub fn into_request(self, id: RequestId) -> MaintenanceRequest {
        MaintenanceRequest {
            id,
            title: self.title,
            problem_description: self.problem_description,
            process: self.process,
            equipment: self.equipment,
            gut: self.gut,
            photo: self.photo,
            status: RequestStatus::Open,
            request_type: None,
            assigned_to: None,
            requester: self.requester,
            execution_description: None,
            execution_photo: None,
            pm04_order: None,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// Tag recorded in the audit trail for each transition that fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryAction {
    Created,
    ApprovedProd,
    RejectedProd,
    ApprovedMaintTech,
    ApprovedMaintEng,
    RejectedMaint,
    ApprovedManager,
    Finished,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Created => "CREATED",
            HistoryAction::ApprovedProd => "APPROVED_PROD",
            HistoryAction::RejectedProd => "REJECTED_PROD",
            HistoryAction::ApprovedMaintTech => "APPROVED_MAINT_TECH",
            HistoryAction::ApprovedMaintEng => "APPROVED_MAINT_ENG",
            HistoryAction::RejectedMaint => "REJECTED_MAINT",
            HistoryAction::ApprovedManager => "APPROVED_MANAGER",
            HistoryAction::Finished => "FINISHED",
        }
    }
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryAction {
    type Err = ParseVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            HistoryAction::Created,
            HistoryAction::ApprovedProd,
            HistoryAction::RejectedProd,
            HistoryAction::ApprovedMaintTech,
            HistoryAction::ApprovedMaintEng,
            HistoryAction::RejectedMaint,
            HistoryAction::ApprovedManager,
            HistoryAction::Finished,
        ]
        .into_iter()
        .find(|action| action.as_str() == s.trim())
        .ok_or_else(|| ParseVariantError::new("history action", s))
    }
}

/// History entry before the store assigns its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistoryEntry {
    pub action: HistoryAction,
    pub actor: Option<PrincipalId>,
    pub comment: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: u64,
    pub request_id: RequestId,
    pub action: HistoryAction,
    pub actor: Option<PrincipalId>,
    pub comment: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn from_new(id: u64, request_id: RequestId, entry: NewHistoryEntry) -> Self {
        Self {
            id,
            request_id,
            action: entry.action,
            actor: entry.actor,
            comment: entry.comment,
            timestamp: entry.timestamp,
        }
    }
}

/// Selection applied by `list_requests`. Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub statuses: Vec<RequestStatus>,
    pub requester: Option<PrincipalId>,
    pub assigned_to: Option<PrincipalId>,
    /// Case-insensitive match over title, equipment, process and status label
    pub search: Option<String>,
}

impl RequestFilter {
    pub fn matches(&self, request: &MaintenanceRequest) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&request.status) {
            return false;
        }
        if self.requester.is_some_and(|id| id != request.requester) {
            return false;
        }
        if self.assigned_to.is_some() && self.assigned_to != request.assigned_to {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => {
                let term = term.to_lowercase();
                [
                    request.title.as_str(),
                    request.equipment.as_str(),
                    request.process.as_str(),
                    request.status.label(),
                ]
                .iter()
                .any(|field| field.to_lowercase().contains(&term))
            }
            _ => true,
        }
    }
}

/// Counts shown on top of the request board.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSummary {
    pub pending: usize,
    pub in_execution: usize,
    pub done: usize,
    pub rejected: usize,
    pub high_priority_open: usize,
}

impl BoardSummary {
    pub fn from_requests<'a>(requests: impl IntoIterator<Item = &'a MaintenanceRequest>) -> Self {
        requests
            .into_iter()
            .fold(BoardSummary::default(), |mut summary, request| {
                match request.status {
                    status if status.is_pending() => summary.pending += 1,
                    RequestStatus::InExecution => summary.in_execution += 1,
                    RequestStatus::Done => summary.done += 1,
                    _ => summary.rejected += 1,
                }
                if !request.status.is_terminal() && request.gut.is_high_priority() {
                    summary.high_priority_open += 1;
                }
                summary
            })
    }
}
