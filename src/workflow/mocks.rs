// Test doubles for driving the engine end to end

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::action::NewRequestPayload;
use super::engine::WorkflowEngine;
use super::types::{Principal, PrincipalId, Role, RoleKey};
use crate::directory::InMemoryDirectory;
use crate::notifications::{Delivery, DispatchSettings, NotificationError, Notifier};
use crate::store::{MemoryStore, RequestStore};

/// A delivered notice as seen by the recording notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Role { key: RoleKey, subject: String },
    Principal { id: PrincipalId, subject: String },
}

/// Notifier that only remembers what it was asked to send.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_role(
        &self,
        key: RoleKey,
        subject: &str,
        _body: &str,
    ) -> Result<Delivery, NotificationError> {
        self.sent.lock().unwrap().push(Sent::Role {
            key,
            subject: subject.to_string(),
        });
        Ok(Delivery::Sent {
            address: format!("{}@test", key.as_str().to_lowercase()),
        })
    }

    async fn notify_principal(
        &self,
        principal: &Principal,
        subject: &str,
        _body: &str,
    ) -> Result<Delivery, NotificationError> {
        self.sent.lock().unwrap().push(Sent::Principal {
            id: principal.id,
            subject: subject.to_string(),
        });
        Ok(Delivery::Sent {
            address: principal.notification_address().unwrap_or_default().to_string(),
        })
    }
}

pub fn principal(id: u64, role: Role) -> Principal {
    Principal {
        id: PrincipalId(id),
        username: format!("{}{id}", role.as_str().to_lowercase()),
        first_name: String::new(),
        email: Some(format!("p{id}@plant.example")),
        hmc: format!("H{id:03}"),
        role,
    }
}

/// One principal per role, ids 1..=7 in `Role::ALL` order, plus a second
/// executor with id 8.
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

impl Cast {
    pub fn new() -> Self {
        Self {
            requester: principal(1, Role::Requester),
            approver_prod: principal(2, Role::ApproverProd),
            approver_maint: principal(3, Role::ApproverMaint),
            manager: principal(4, Role::ManagerMaint),
            executor: principal(5, Role::Executor),
            engineer_mech: principal(6, Role::EngineerMech),
            engineer_elec: principal(7, Role::EngineerElec),
            other_executor: principal(8, Role::Executor),
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

pub struct Harness {
    pub engine: WorkflowEngine,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub cast: Cast,
}

impl Harness {
    pub fn new() -> Self {
        let cast = Cast::new();
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = WorkflowEngine::new(
            store.clone() as Arc<dyn RequestStore>,
            Arc::new(InMemoryDirectory::new(cast.all())),
            notifier.clone(),
            DispatchSettings {
                queue_capacity: 64,
                max_attempts: 1,
                retry_backoff_ms: 1,
                max_retry_delay_ms: 1,
            },
        );
        Self {
            engine,
            store,
            notifier,
            cast,
        }
    }

    /// Wait for every queued notice and return what was sent.
    pub async fn drain_notifications(&self) -> Vec<Sent> {
        self.engine.shutdown().await;
        self.notifier.sent()
    }
}

pub fn leak_report() -> NewRequestPayload {
    NewRequestPayload {
        title: "Leak".to_string(),
        problem_description: "Oil dripping from the hydraulic line".to_string(),
        process: "P1".to_string(),
        equipment: "E1".to_string(),
        gravity: 4,
        urgency: 5,
        tendency: 3,
        photo: None,
    }
}
