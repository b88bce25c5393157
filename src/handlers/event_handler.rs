//! Event management handler
//!
//! Host/admin operations on the event itself. Each one locks the event row,
//! applies a state-machine method and writes the row back with an audit
//! entry in the same transaction.

use sqlx::PgPool;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use crate::domain::{DomainError, EventCapacity, EventStatus, JoiningFee, OperationContext};
use crate::error::AppError;
use crate::ledger::{CapacityLedger, EventDetails, NewEvent};

use super::{ChangeCapacityCommand, CreateEventCommand};

/// Handler for event lifecycle operations
pub struct EventManagementHandler {
    pool: PgPool,
    ledger: CapacityLedger,
    audit: AuditLogService,
}

impl EventManagementHandler {
    pub fn new(pool: PgPool) -> Self {
        Self {
            ledger: CapacityLedger::new(pool.clone()),
            audit: AuditLogService::new(pool.clone()),
            pool,
        }
    }

    /// createEvent: the acting user becomes the host
    pub async fn create(
        &self,
        command: CreateEventCommand,
        context: &OperationContext,
    ) -> Result<EventCapacity, AppError> {
        let host_id = context.acting_user()?;

        let title = command.title.trim();
        if title.is_empty() {
            return Err(AppError::InvalidRequest("title must not be empty".to_string()));
        }

        let joining_fee: JoiningFee = command
            .joining_fee
            .parse()
            .map_err(DomainError::InvalidFee)?;

        let event = self
            .ledger
            .create_event(NewEvent {
                host_id,
                title: title.to_string(),
                event_date: command.event_date,
                min_participants: command.min_participants,
                max_participants: command.max_participants,
                joining_fee,
            })
            .await?;

        self.audit
            .log(
                AuditLogBuilder::new(AuditAction::EventCreated)
                    .resource("Event", event.id)
                    .after_state(&event),
                context,
            )
            .await?;

        Ok(event)
    }

    pub async fn get(&self, event_id: Uuid) -> Result<EventDetails, AppError> {
        self.ledger
            .get_details(event_id)
            .await?
            .ok_or(AppError::EventNotFound(event_id))
    }

    /// changeCapacity: may reopen a FULL event; never below the current count
    pub async fn change_capacity(
        &self,
        command: ChangeCapacityCommand,
        context: &OperationContext,
    ) -> Result<EventCapacity, AppError> {
        self.apply(command.event_id, AuditAction::CapacityChanged, context, |event| {
            event.change_capacity(command.max_participants).map(|_| ())
        })
        .await
    }

    /// cancelEvent: OPEN/FULL -> CANCELLED
    pub async fn cancel(
        &self,
        event_id: Uuid,
        context: &OperationContext,
    ) -> Result<EventCapacity, AppError> {
        self.apply(event_id, AuditAction::EventCancelled, context, EventCapacity::cancel)
            .await
    }

    /// completeEvent: terminal
    pub async fn complete(
        &self,
        event_id: Uuid,
        context: &OperationContext,
    ) -> Result<EventCapacity, AppError> {
        self.apply(event_id, AuditAction::EventCompleted, context, EventCapacity::complete)
            .await
    }

    /// removeEvent: soft delete, forces CANCELLED unless completed
    pub async fn remove(
        &self,
        event_id: Uuid,
        context: &OperationContext,
    ) -> Result<EventCapacity, AppError> {
        self.apply(event_id, AuditAction::EventRemoved, context, |event| {
            event.remove();
            Ok(())
        })
        .await
    }

    async fn apply<F>(
        &self,
        event_id: Uuid,
        action: AuditAction,
        context: &OperationContext,
        change: F,
    ) -> Result<EventCapacity, AppError>
    where
        F: FnOnce(&mut EventCapacity) -> Result<(), DomainError>,
    {
        let mut tx = self.pool.begin().await?;

        let (before, after) = self
            .ledger
            .update_with(&mut tx, event_id, |event| {
                context.ensure_can_manage(event.host_id)?;
                change(event)
            })
            .await?;

        self.audit
            .log_in_tx(
                &mut tx,
                AuditLogBuilder::new(action)
                    .resource("Event", event_id)
                    .before_state(&before)
                    .after_state(&after),
                context,
            )
            .await?;

        tx.commit().await?;

        if before.status != after.status {
            log_status_change(event_id, before.status, after.status);
        }
        tracing::info!(event_id = %event_id, action = %action, "Event updated");

        Ok(after)
    }
}

fn log_status_change(event_id: Uuid, from: EventStatus, to: EventStatus) {
    tracing::info!(event_id = %event_id, from = %from, to = %to, "Event status changed");
}
