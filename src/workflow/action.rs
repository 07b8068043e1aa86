// Actions and payloads accepted by the workflow engine

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::types::{ParseVariantError, PrincipalId};

/// Operations a principal can invoke on a maintenance request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    ApproveProduction,
    RejectProduction,
    ApproveMaintenance,
    RejectMaintenance,
    ApproveManager,
    FinishExecution,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::Create,
        Action::ApproveProduction,
        Action::RejectProduction,
        Action::ApproveMaintenance,
        Action::RejectMaintenance,
        Action::ApproveManager,
        Action::FinishExecution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::ApproveProduction => "approve_production",
            Action::RejectProduction => "reject_production",
            Action::ApproveMaintenance => "approve_maintenance",
            Action::RejectMaintenance => "reject_maintenance",
            Action::ApproveManager => "approve_manager",
            Action::FinishExecution => "finish_execution",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ParseVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_").to_ascii_lowercase();
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == normalized)
            .ok_or_else(|| ParseVariantError {
                kind: "action",
                value: s.to_string(),
            })
    }
}

/// Body of a request submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct NewRequestPayload {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    /// Free text, may be left empty
    #[serde(default)]
    pub problem_description: String,
    #[validate(length(min = 1, max = 100))]
    pub process: String,
    #[validate(length(min = 1, max = 100))]
    pub equipment: String,
    #[validate(range(min = 1, max = 5))]
    pub gravity: u8,
    #[validate(range(min = 1, max = 5))]
    pub urgency: u8,
    #[validate(range(min = 1, max = 5))]
    pub tendency: u8,
    #[serde(default)]
    #[validate(length(max = 255))]
    pub photo: Option<String>,
}

impl NewRequestPayload {
    /// Trim surrounding whitespace so blank fields fail the length checks.
    pub fn normalized(mut self) -> Self {
        self.title = self.title.trim().to_string();
        self.problem_description = self.problem_description.trim().to_string();
        self.process = self.process.trim().to_string();
        self.equipment = self.equipment.trim().to_string();
        self.photo = self
            .photo
            .map(|photo| photo.trim().to_string())
            .filter(|photo| !photo.is_empty());
        self
    }
}

/// Optional fields carried by a transition. Which ones matter depends on the action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionPayload {
    #[serde(default)]
    pub comment: Option<String>,
    /// Raw demand type, parsed during maintenance approval
    #[serde(default, rename = "type")]
    pub request_type: Option<String>,
    #[serde(default)]
    pub executor_id: Option<PrincipalId>,
    #[serde(default)]
    pub engineer_id: Option<PrincipalId>,
    #[serde(default)]
    pub execution_description: Option<String>,
    #[serde(default)]
    pub execution_photo: Option<String>,
    #[serde(default)]
    pub pm04_order: Option<String>,
}

impl TransitionPayload {
    pub fn with_comment(comment: impl Into<String>) -> Self {
        Self {
            comment: Some(comment.into()),
            ..Default::default()
        }
    }

    pub fn technical(executor: PrincipalId) -> Self {
        Self {
            request_type: Some("TECHNICAL".to_string()),
            executor_id: Some(executor),
            ..Default::default()
        }
    }

    pub fn engineering() -> Self {
        Self {
            request_type: Some("ENGINEERING".to_string()),
            ..Default::default()
        }
    }

    pub fn assign_engineer(engineer: PrincipalId) -> Self {
        Self {
            engineer_id: Some(engineer),
            ..Default::default()
        }
    }

    pub fn finish(description: impl Into<String>, pm04_order: impl Into<String>) -> Self {
        Self {
            execution_description: Some(description.into()),
            pm04_order: Some(pm04_order.into()),
            ..Default::default()
        }
    }

    pub fn comment_text(&self) -> String {
        self.comment.clone().unwrap_or_default()
    }
}
