//! Shared fixtures for workflow integration tests
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use maintenance_workflow::notifications::Delivery;
use maintenance_workflow::{
    Action, DispatchSettings, InMemoryDirectory, MailMessage, MailTransport, MaintenanceRequest,
    NewRequestPayload, NotificationError, Notifier, Principal, PrincipalId, RequestStore, Role,
    RoleKey, TransitionPayload, WorkflowEngine,
};

/// One principal per role plus a second executor.
#[derive(Debug, Clone)]
pub struct Cast {
    pub requester: Principal,
    pub approver_prod: Principal,
    pub approver_maint: Principal,
    pub manager: Principal,
    pub executor: Principal,
    pub engineer_mech: Principal,
    pub engineer_elec: Principal,
    pub other_executor: Principal,
}

pub fn principal(id: u64, username: &str, role: Role) -> Principal {
    Principal {
        id: PrincipalId(id),
        username: username.to_string(),
        first_name: String::new(),
        email: Some(format!("{username}@plant.example")),
        hmc: format!("H{id:04}"),
        role,
    }
}

impl Cast {
    pub fn new() -> Self {
        Self {
            requester: principal(1, "rita", Role::Requester),
            approver_prod: principal(2, "paulo", Role::ApproverProd),
            approver_maint: principal(3, "marta", Role::ApproverMaint),
            manager: principal(4, "gabriel", Role::ManagerMaint),
            executor: principal(5, "tiago", Role::Executor),
            engineer_mech: principal(6, "helena", Role::EngineerMech),
            engineer_elec: principal(7, "eduardo", Role::EngineerElec),
            other_executor: principal(8, "otavio", Role::Executor),
        }
    }

    pub fn all(&self) -> Vec<Principal> {
        vec![
            self.requester.clone(),
            self.approver_prod.clone(),
            self.approver_maint.clone(),
            self.manager.clone(),
            self.executor.clone(),
            self.engineer_mech.clone(),
            self.engineer_elec.clone(),
            self.other_executor.clone(),
        ]
    }
}

/// What the recording notifier was asked to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Role { key: RoleKey, subject: String, body: String },
    Principal { id: PrincipalId, subject: String, body: String },
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_role(
        &self,
        key: RoleKey,
        subject: &str,
        body: &str,
    ) -> Result<Delivery, NotificationError> {
        self.notices.lock().unwrap().push(Notice::Role {
            key,
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(Delivery::Sent {
            address: key.as_str().to_lowercase(),
        })
    }

    async fn notify_principal(
        &self,
        principal: &Principal,
        subject: &str,
        body: &str,
    ) -> Result<Delivery, NotificationError> {
        self.notices.lock().unwrap().push(Notice::Principal {
            id: principal.id,
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(Delivery::Sent {
            address: principal.username.clone(),
        })
    }
}

/// Mail transport whose server is always down.
#[derive(Debug, Default)]
pub struct DownTransport {
    pub attempts: Mutex<u32>,
}

#[async_trait]
impl MailTransport for DownTransport {
    async fn send(&self, _message: &MailMessage) -> Result<(), NotificationError> {
        *self.attempts.lock().unwrap() += 1;
        Err(NotificationError::Transport("connection refused".to_string()))
    }
}

pub fn fast_dispatch() -> DispatchSettings {
    DispatchSettings {
        queue_capacity: 64,
        max_attempts: 2,
        retry_backoff_ms: 1,
        max_retry_delay_ms: 5,
    }
}

pub fn engine_with(
    store: Arc<dyn RequestStore>,
    notifier: Arc<dyn Notifier>,
    cast: &Cast,
) -> WorkflowEngine {
    WorkflowEngine::new(
        store,
        Arc::new(InMemoryDirectory::new(cast.all())),
        notifier,
        fast_dispatch(),
    )
}

pub fn leak_report() -> NewRequestPayload {
    NewRequestPayload {
        title: "Leak".to_string(),
        problem_description: String::new(),
        process: "P1".to_string(),
        equipment: "E1".to_string(),
        gravity: 4,
        urgency: 5,
        tendency: 3,
        photo: None,
    }
}

/// Drive a fresh request to IN_EXECUTION on the technical route.
pub async fn request_in_execution(engine: &WorkflowEngine, cast: &Cast) -> MaintenanceRequest {
    let request = engine
        .create_request(&cast.requester, leak_report())
        .await
        .unwrap();
    engine
        .transition(
            &cast.approver_prod,
            request.id,
            Action::ApproveProduction,
            TransitionPayload::default(),
        )
        .await
        .unwrap();
    engine
        .transition(
            &cast.approver_maint,
            request.id,
            Action::ApproveMaintenance,
            TransitionPayload::technical(cast.executor.id),
        )
        .await
        .unwrap()
}
