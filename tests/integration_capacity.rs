//! Capacity ledger integration tests

#![cfg(feature = "integration_tests")]

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use event_settlement::domain::{DomainError, EventStatus, RejectionReason, SlotReservation};
use event_settlement::gateway::MockGateway;
use event_settlement::handlers::{
    ChangeCapacityCommand, EventManagementHandler, JoinEventCommand, JoinOutcome,
};
use event_settlement::ledger::CapacityLedger;
use event_settlement::AppError;

mod common;

#[tokio::test]
async fn test_concurrent_joins_never_exceed_capacity() {
    let pool = common::setup_test_db().await;
    let event = common::create_event(&pool, 1, Decimal::ZERO).await;
    let coordinator = Arc::new(common::coordinator(&pool, Arc::new(MockGateway::new())));

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let coordinator = coordinator.clone();
        let event_id = event.id;
        tasks.push(tokio::spawn(async move {
            let user_id = Uuid::new_v4();
            coordinator
                .request_join(
                    JoinEventCommand::new(event_id, user_id),
                    &common::user_context(user_id),
                )
                .await
        }));
    }

    let mut admitted = 0;
    let mut full = 0;
    for task in tasks {
        match task.await.unwrap().unwrap() {
            JoinOutcome::JoinedFree { .. } => admitted += 1,
            JoinOutcome::Rejected(RejectionReason::EventFull) => full += 1,
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    assert_eq!(admitted, 1);
    assert_eq!(full, 9);

    let state = CapacityLedger::new(pool.clone()).get(event.id).await.unwrap().unwrap();
    assert_eq!(state.current_participants, 1);
    assert_eq!(state.status, EventStatus::Full);
    assert_eq!(common::active_participants(&pool, event.id).await, 1);
}

#[tokio::test]
async fn test_second_join_by_same_user_is_rejected() {
    let pool = common::setup_test_db().await;
    let event = common::create_event(&pool, 5, Decimal::ZERO).await;
    let coordinator = common::coordinator(&pool, Arc::new(MockGateway::new()));
    let user_id = Uuid::new_v4();
    let context = common::user_context(user_id);

    let first = coordinator
        .request_join(JoinEventCommand::new(event.id, user_id), &context)
        .await
        .unwrap();
    assert!(matches!(first, JoinOutcome::JoinedFree { .. }));

    let second = coordinator
        .request_join(JoinEventCommand::new(event.id, user_id), &context)
        .await
        .unwrap();
    assert!(matches!(second, JoinOutcome::Rejected(RejectionReason::AlreadyJoined)));
    assert_eq!(common::active_participants(&pool, event.id).await, 1);
}

#[tokio::test]
async fn test_leave_reopens_full_event_and_allows_rejoin() {
    let pool = common::setup_test_db().await;
    let event = common::create_event(&pool, 1, Decimal::ZERO).await;
    let coordinator = common::coordinator(&pool, Arc::new(MockGateway::new()));
    let user_id = Uuid::new_v4();
    let context = common::user_context(user_id);

    coordinator
        .request_join(JoinEventCommand::new(event.id, user_id), &context)
        .await
        .unwrap();

    let left = coordinator.leave(event.id, &context).await.unwrap();
    assert_eq!(left.event_status, EventStatus::Open);

    let rejoin = coordinator
        .request_join(JoinEventCommand::new(event.id, user_id), &context)
        .await
        .unwrap();
    assert!(matches!(
        rejoin,
        JoinOutcome::JoinedFree { event_status: EventStatus::Full, .. }
    ));
    assert_eq!(common::active_participants(&pool, event.id).await, 1);
}

#[tokio::test]
async fn test_completed_event_is_terminal() {
    let pool = common::setup_test_db().await;
    let event = common::create_event(&pool, 3, Decimal::ZERO).await;
    let handler = EventManagementHandler::new(pool.clone());
    let coordinator = common::coordinator(&pool, Arc::new(MockGateway::new()));
    let user_id = Uuid::new_v4();
    let context = common::user_context(user_id);

    coordinator
        .request_join(JoinEventCommand::new(event.id, user_id), &context)
        .await
        .unwrap();

    let host = common::host_context(&event);
    let completed = handler.complete(event.id, &host).await.unwrap();
    assert_eq!(completed.status, EventStatus::Completed);

    // No leaving, no joining, no capacity change, no reopening
    let leave = coordinator.leave(event.id, &context).await;
    assert!(matches!(leave, Err(AppError::Domain(DomainError::EventCompleted))));

    let other = Uuid::new_v4();
    let join = coordinator
        .request_join(JoinEventCommand::new(event.id, other), &common::user_context(other))
        .await
        .unwrap();
    assert!(matches!(join, JoinOutcome::Rejected(RejectionReason::EventClosed)));

    let resize = handler
        .change_capacity(
            ChangeCapacityCommand {
                event_id: event.id,
                max_participants: 10,
            },
            &host,
        )
        .await;
    assert!(resize.is_err());
    assert!(handler.cancel(event.id, &host).await.is_err());

    let state = CapacityLedger::new(pool.clone()).get(event.id).await.unwrap().unwrap();
    assert_eq!(state.status, EventStatus::Completed);
    assert_eq!(state.current_participants, 1);
}

#[tokio::test]
async fn test_capacity_change_rules() {
    let pool = common::setup_test_db().await;
    let event = common::create_event(&pool, 2, Decimal::ZERO).await;
    let handler = EventManagementHandler::new(pool.clone());
    let coordinator = common::coordinator(&pool, Arc::new(MockGateway::new()));

    for _ in 0..2 {
        let user_id = Uuid::new_v4();
        coordinator
            .request_join(
                JoinEventCommand::new(event.id, user_id),
                &common::user_context(user_id),
            )
            .await
            .unwrap();
    }

    let host = common::host_context(&event);

    let below = handler
        .change_capacity(
            ChangeCapacityCommand {
                event_id: event.id,
                max_participants: 1,
            },
            &host,
        )
        .await;
    assert!(matches!(
        below,
        Err(AppError::Domain(DomainError::CapacityBelowParticipants { .. }))
    ));

    let stranger = common::user_context(Uuid::new_v4());
    let forbidden = handler
        .change_capacity(
            ChangeCapacityCommand {
                event_id: event.id,
                max_participants: 5,
            },
            &stranger,
        )
        .await;
    assert!(matches!(forbidden, Err(AppError::Domain(DomainError::Unauthorized(_)))));

    let reopened = handler
        .change_capacity(
            ChangeCapacityCommand {
                event_id: event.id,
                max_participants: 5,
            },
            &host,
        )
        .await
        .unwrap();
    assert_eq!(reopened.status, EventStatus::Open);
    assert_eq!(reopened.current_participants, 2);
}

#[tokio::test]
async fn test_rolled_back_reservation_leaves_no_trace() {
    let pool = common::setup_test_db().await;
    let event = common::create_event(&pool, 1, Decimal::ZERO).await;
    let ledger = CapacityLedger::new(pool.clone());

    {
        let mut tx = pool.begin().await.unwrap();
        let reservation = ledger.try_reserve_slot(&mut tx, event.id).await.unwrap();
        assert!(reservation.is_accepted());
        // dropped without commit
    }

    let state = ledger.get(event.id).await.unwrap().unwrap();
    assert_eq!(state.current_participants, 0);
    assert_eq!(state.status, EventStatus::Open);

    let mut tx = pool.begin().await.unwrap();
    let reservation = ledger.try_reserve_slot(&mut tx, event.id).await.unwrap();
    assert!(matches!(reservation, SlotReservation::Accepted { status: EventStatus::Full }));
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn test_removed_event_rejects_joins() {
    let pool = common::setup_test_db().await;
    let event = common::create_event(&pool, 3, Decimal::ZERO).await;
    let handler = EventManagementHandler::new(pool.clone());

    let removed = handler.remove(event.id, &common::host_context(&event)).await.unwrap();
    assert_eq!(removed.status, EventStatus::Cancelled);

    let user_id = Uuid::new_v4();
    let outcome = common::coordinator(&pool, Arc::new(MockGateway::new()))
        .request_join(JoinEventCommand::new(event.id, user_id), &common::user_context(user_id))
        .await
        .unwrap();
    assert!(matches!(outcome, JoinOutcome::Rejected(RejectionReason::EventClosed)));
}
