// Engine tests: full lifecycle paths, refusals and failure isolation

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use chrono::Utc;

    use super::super::action::{Action, TransitionPayload};
    use super::super::engine::WorkflowEngine;
    use super::super::errors::{Denial, ReferenceKind, WorkflowError};
    use super::super::mocks::*;
    use super::super::types::*;
    use crate::directory::{InMemoryDirectory, MockPrincipalDirectory};
    use crate::notifications::{DispatchSettings, MockNotifier};
    use crate::store::{MockRequestStore, RequestStore, StorageError};

    async fn history_actions(harness: &Harness, id: RequestId) -> Vec<HistoryAction> {
        harness
            .engine
            .list_history(id)
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.action)
            .collect()
    }

    async fn created(harness: &Harness) -> MaintenanceRequest {
        harness
            .engine
            .create_request(&harness.cast.requester, leak_report())
            .await
            .unwrap()
    }

    async fn waiting_maint(harness: &Harness) -> MaintenanceRequest {
        let request = created(harness).await;
        harness
            .engine
            .transition(
                &harness.cast.approver_prod,
                request.id,
                Action::ApproveProduction,
                TransitionPayload::default(),
            )
            .await
            .unwrap()
    }

    async fn in_execution(harness: &Harness) -> MaintenanceRequest {
        let request = waiting_maint(harness).await;
        harness
            .engine
            .transition(
                &harness.cast.approver_maint,
                request.id,
                Action::ApproveMaintenance,
                TransitionPayload::technical(harness.cast.executor.id),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_opens_request_with_created_entry() {
        let harness = Harness::new();
        let request = created(&harness).await;

        assert_eq!(request.status, RequestStatus::Open);
        assert_eq!(request.requester, harness.cast.requester.id);
        assert_eq!(request.assigned_to, None);
        assert_eq!(history_actions(&harness, request.id).await, vec![HistoryAction::Created]);

        let sent = harness.drain_notifications().await;
        assert_eq!(
            sent,
            vec![Sent::Role {
                key: RoleKey::ApproverProd,
                subject: "New maintenance request created".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_technical_path_runs_to_done() {
        let harness = Harness::new();
        let request = in_execution(&harness).await;

        assert_eq!(request.status, RequestStatus::InExecution);
        assert_eq!(request.request_type, Some(RequestType::Technical));
        assert_eq!(request.assigned_to, Some(harness.cast.executor.id));

        let done = harness
            .engine
            .transition(
                &harness.cast.executor,
                request.id,
                Action::FinishExecution,
                TransitionPayload::finish("Fixed", "PM-1"),
            )
            .await
            .unwrap();

        assert_eq!(done.status, RequestStatus::Done);
        assert_eq!(done.execution_description.as_deref(), Some("Fixed"));
        assert_eq!(done.pm04_order.as_deref(), Some("PM-1"));
        assert_eq!(harness.engine.get_request(done.id).await.unwrap(), done);
        assert_eq!(
            history_actions(&harness, done.id).await,
            vec![
                HistoryAction::Created,
                HistoryAction::ApprovedProd,
                HistoryAction::ApprovedMaintTech,
                HistoryAction::Finished,
            ]
        );

        let again = harness
            .engine
            .transition(
                &harness.cast.executor,
                done.id,
                Action::FinishExecution,
                TransitionPayload::finish("Fixed", "PM-1"),
            )
            .await
            .unwrap_err();
        assert_matches!(
            again,
            WorkflowError::InvalidTransition {
                status: RequestStatus::Done,
                ..
            }
        );

        let sent = harness.drain_notifications().await;
        assert!(sent.contains(&Sent::Role {
            key: RoleKey::ApproverMaint,
            subject: "Request approved by production".to_string(),
        }));
        assert!(sent.contains(&Sent::Principal {
            id: harness.cast.executor.id,
            subject: "New technical request assigned".to_string(),
        }));
        assert_eq!(sent.len(), 3);
    }

    #[tokio::test]
    async fn test_engineering_path_waits_for_manager_without_assignee() {
        let harness = Harness::new();
        let request = waiting_maint(&harness).await;

        let forwarded = harness
            .engine
            .transition(
                &harness.cast.approver_maint,
                request.id,
                Action::ApproveMaintenance,
                TransitionPayload::engineering(),
            )
            .await
            .unwrap();
        assert_eq!(forwarded.status, RequestStatus::WaitingManager);
        assert_eq!(forwarded.request_type, Some(RequestType::Engineering));
        assert_eq!(forwarded.assigned_to, None);

        let assigned = harness
            .engine
            .transition(
                &harness.cast.manager,
                request.id,
                Action::ApproveManager,
                TransitionPayload::assign_engineer(harness.cast.engineer_mech.id),
            )
            .await
            .unwrap();
        assert_eq!(assigned.status, RequestStatus::InExecution);
        assert_eq!(assigned.assigned_to, Some(harness.cast.engineer_mech.id));

        let history = harness.engine.list_history(request.id).await.unwrap();
        assert_eq!(history[2].action, HistoryAction::ApprovedMaintEng);
        assert_eq!(history[2].comment, "Forwarded to maintenance management");
        assert_eq!(history[3].action, HistoryAction::ApprovedManager);
        assert_eq!(history[3].comment, "Assigned to engineer_mech6");

        let finished = harness
            .engine
            .transition(
                &harness.cast.engineer_mech,
                request.id,
                Action::FinishExecution,
                TransitionPayload::finish("Replaced bearing", "PM-7"),
            )
            .await
            .unwrap();
        assert_eq!(finished.status, RequestStatus::Done);

        let sent = harness.drain_notifications().await;
        assert!(sent.contains(&Sent::Role {
            key: RoleKey::ManagerMaint,
            subject: "New engineering request awaiting approval".to_string(),
        }));
        assert!(sent.contains(&Sent::Principal {
            id: harness.cast.engineer_mech.id,
            subject: "New engineering request assigned".to_string(),
        }));
    }

    #[tokio::test]
    async fn test_missing_type_fails_validation_and_changes_nothing() {
        let harness = Harness::new();
        let request = waiting_maint(&harness).await;

        for _ in 0..2 {
            let err = harness
                .engine
                .transition(
                    &harness.cast.approver_maint,
                    request.id,
                    Action::ApproveMaintenance,
                    TransitionPayload::with_comment("no type"),
                )
                .await
                .unwrap_err();
            assert_matches!(err, WorkflowError::Validation(_));
        }

        assert_eq!(harness.engine.get_request(request.id).await.unwrap(), request);
        assert_eq!(history_actions(&harness, request.id).await.len(), 2);
    }

    #[tokio::test]
    async fn test_loosely_spelled_type_is_refused() {
        let harness = Harness::new();
        let request = waiting_maint(&harness).await;

        for raw in [" engineering ", "technical", "Engineering"] {
            let err = harness
                .engine
                .transition(
                    &harness.cast.approver_maint,
                    request.id,
                    Action::ApproveMaintenance,
                    TransitionPayload {
                        request_type: Some(raw.to_string()),
                        executor_id: Some(harness.cast.executor.id),
                        ..Default::default()
                    },
                )
                .await
                .unwrap_err();
            assert_matches!(err, WorkflowError::Validation(_));
        }

        let stored = harness.engine.get_request(request.id).await.unwrap();
        assert_eq!(stored.status, RequestStatus::WaitingMaint);
        assert_eq!(stored.request_type, None);
        assert_eq!(history_actions(&harness, request.id).await.len(), 2);
    }

    #[tokio::test]
    async fn test_wrong_role_is_unauthorized_before_status_is_checked() {
        let harness = Harness::new();
        let request = created(&harness).await;

        let err = harness
            .engine
            .transition(
                &harness.cast.requester,
                request.id,
                Action::ApproveProduction,
                TransitionPayload::default(),
            )
            .await
            .unwrap_err();
        assert_matches!(
            err,
            WorkflowError::Unauthorized {
                action: Action::ApproveProduction,
                role: Role::Requester,
                denial: Denial::Role,
                ..
            }
        );

        // Maintenance approval on an OPEN request by the production supervisor
        // is refused on role, not on status.
        let err = harness
            .engine
            .transition(
                &harness.cast.approver_prod,
                request.id,
                Action::ApproveMaintenance,
                TransitionPayload::engineering(),
            )
            .await
            .unwrap_err();
        assert_matches!(err, WorkflowError::Unauthorized { .. });
        assert_eq!(harness.engine.get_request(request.id).await.unwrap(), request);
    }

    #[tokio::test]
    async fn test_only_the_assignee_may_finish() {
        let harness = Harness::new();
        let request = in_execution(&harness).await;

        let err = harness
            .engine
            .transition(
                &harness.cast.other_executor,
                request.id,
                Action::FinishExecution,
                TransitionPayload::finish("Fixed", "PM-1"),
            )
            .await
            .unwrap_err();
        assert_matches!(
            err,
            WorkflowError::Unauthorized {
                denial: Denial::NotAssignee(id),
                ..
            } if id == request.id
        );
        assert_eq!(
            harness.engine.get_request(request.id).await.unwrap().status,
            RequestStatus::InExecution
        );
    }

    #[tokio::test]
    async fn test_rejections_are_terminal() {
        let harness = Harness::new();
        let request = created(&harness).await;

        let rejected = harness
            .engine
            .transition(
                &harness.cast.approver_prod,
                request.id,
                Action::RejectProduction,
                TransitionPayload::with_comment("duplicate"),
            )
            .await
            .unwrap();
        assert_eq!(rejected.status, RequestStatus::Rejected);

        for (actor, action) in [
            (&harness.cast.approver_prod, Action::ApproveProduction),
            (&harness.cast.approver_prod, Action::RejectProduction),
            (&harness.cast.approver_maint, Action::RejectMaintenance),
        ] {
            let err = harness
                .engine
                .transition(actor, request.id, action, TransitionPayload::default())
                .await
                .unwrap_err();
            assert_matches!(
                err,
                WorkflowError::InvalidTransition {
                    status: RequestStatus::Rejected,
                    ..
                }
            );
        }

        let history = harness.engine.list_history(request.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].action, HistoryAction::RejectedProd);
        assert_eq!(history[1].comment, "duplicate");
    }

    #[tokio::test]
    async fn test_maintenance_rejection_needs_waiting_maint() {
        let harness = Harness::new();
        let request = created(&harness).await;

        let err = harness
            .engine
            .transition(
                &harness.cast.approver_maint,
                request.id,
                Action::RejectMaintenance,
                TransitionPayload::default(),
            )
            .await
            .unwrap_err();
        assert_matches!(
            err,
            WorkflowError::InvalidTransition {
                status: RequestStatus::Open,
                ..
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_executor_is_reference_not_found() {
        let harness = Harness::new();
        let request = waiting_maint(&harness).await;

        let err = harness
            .engine
            .transition(
                &harness.cast.approver_maint,
                request.id,
                Action::ApproveMaintenance,
                TransitionPayload::technical(PrincipalId(404)),
            )
            .await
            .unwrap_err();
        assert_matches!(
            err,
            WorkflowError::ReferenceNotFound {
                kind: ReferenceKind::Executor,
                id: 404
            }
        );
        assert_eq!(
            harness.engine.get_request(request.id).await.unwrap().status,
            RequestStatus::WaitingMaint
        );
    }

    #[tokio::test]
    async fn test_unknown_request_is_reference_not_found() {
        let harness = Harness::new();

        assert_matches!(
            harness.engine.list_history(RequestId(77)).await,
            Err(WorkflowError::ReferenceNotFound {
                kind: ReferenceKind::Request,
                id: 77
            })
        );
        assert_matches!(
            harness
                .engine
                .transition(
                    &harness.cast.approver_prod,
                    RequestId(77),
                    Action::ApproveProduction,
                    TransitionPayload::default(),
                )
                .await,
            Err(WorkflowError::ReferenceNotFound { .. })
        );
    }

    #[tokio::test]
    async fn test_create_is_not_a_transition() {
        let harness = Harness::new();
        let request = created(&harness).await;

        let err = harness
            .engine
            .transition(
                &harness.cast.requester,
                request.id,
                Action::Create,
                TransitionPayload::default(),
            )
            .await
            .unwrap_err();
        assert_matches!(err, WorkflowError::InvalidTransition { .. });
    }

    #[tokio::test]
    async fn test_invalid_submission_stores_nothing() {
        let harness = Harness::new();
        let mut payload = leak_report();
        payload.title = String::new();

        let err = harness
            .engine
            .create_request(&harness.cast.requester, payload)
            .await
            .unwrap_err();
        assert_matches!(err, WorkflowError::Validation(_));
        assert!(harness
            .engine
            .list_requests(&RequestFilter::default())
            .await
            .unwrap()
            .is_empty());
        assert!(harness.drain_notifications().await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_production_approvals_have_one_winner() {
        let harness = Harness::new();
        let request = created(&harness).await;

        let (first, second) = tokio::join!(
            harness.engine.transition(
                &harness.cast.approver_prod,
                request.id,
                Action::ApproveProduction,
                TransitionPayload::default(),
            ),
            harness.engine.transition(
                &harness.cast.approver_prod,
                request.id,
                Action::ApproveProduction,
                TransitionPayload::default(),
            ),
        );

        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes.iter().any(|r| matches!(
            r,
            Err(WorkflowError::InvalidTransition {
                status: RequestStatus::WaitingMaint,
                ..
            })
        )));
        assert_eq!(history_actions(&harness, request.id).await.len(), 2);
    }

    #[tokio::test]
    async fn test_updated_at_advances_on_every_transition() {
        let harness = Harness::new();
        let opened = created(&harness).await;
        let approved = harness
            .engine
            .transition(
                &harness.cast.approver_prod,
                opened.id,
                Action::ApproveProduction,
                TransitionPayload::default(),
            )
            .await
            .unwrap();

        assert!(approved.updated_at > opened.updated_at);
        let history = harness.engine.list_history(opened.id).await.unwrap();
        assert_eq!(history[1].timestamp, approved.updated_at);
        assert_eq!(history[1].actor, Some(harness.cast.approver_prod.id));
    }

    #[tokio::test]
    async fn test_board_and_listing_follow_status() {
        let harness = Harness::new();
        in_execution(&harness).await;
        let open = created(&harness).await;

        let summary = harness.engine.board_summary().await.unwrap();
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.in_execution, 1);
        assert_eq!(summary.high_priority_open, 0);

        let mine = harness
            .engine
            .list_requests(&RequestFilter {
                assigned_to: Some(harness.cast.executor.id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_ne!(mine[0].id, open.id);

        let executors = harness
            .engine
            .list_principals(Some(Role::Executor))
            .await
            .unwrap();
        assert_eq!(executors.len(), 2);
    }

    #[tokio::test]
    async fn test_storage_failure_surfaces_and_sends_nothing() {
        let cast = Cast::new();
        let approver = cast.approver_prod.clone();
        let request = {
            let store = crate::store::MemoryStore::new();
            let (draft, entry) = super::super::state_machine::plan_creation(
                &cast.requester,
                leak_report(),
                Utc::now(),
            )
            .unwrap();
            store.insert(draft, entry).await.unwrap().0
        };

        let mut store = MockRequestStore::new();
        let loaded = request.clone();
        store
            .expect_load()
            .returning(move |_| Ok(loaded.clone()));
        store
            .expect_commit_transition()
            .times(1)
            .returning(|_, _, _| Err(StorageError::Unavailable("disk full".to_string())));

        let mut notifier = MockNotifier::new();
        notifier.expect_notify_role().never();
        notifier.expect_notify_principal().never();

        let engine = WorkflowEngine::new(
            Arc::new(store),
            Arc::new(InMemoryDirectory::new(cast.all())),
            Arc::new(notifier),
            DispatchSettings::default(),
        );

        let err = engine
            .transition(
                &approver,
                request.id,
                Action::ApproveProduction,
                TransitionPayload::default(),
            )
            .await
            .unwrap_err();
        assert_matches!(err, WorkflowError::Storage(StorageError::Unavailable(_)));
        assert!(err.is_retryable());
        assert!(!err.is_business_rule());

        let stats = engine.shutdown().await;
        assert_eq!(stats.queued, 0);
    }

    #[tokio::test]
    async fn test_directory_is_not_consulted_without_a_reference() {
        let cast = Cast::new();
        let store: Arc<dyn RequestStore> = Arc::new(crate::store::MemoryStore::new());

        let mut directory = MockPrincipalDirectory::new();
        directory.expect_resolve().never();

        let engine = WorkflowEngine::new(
            store,
            Arc::new(directory),
            Arc::new(RecordingNotifier::default()),
            DispatchSettings::default(),
        );

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
        engine.shutdown().await;
    }
}
