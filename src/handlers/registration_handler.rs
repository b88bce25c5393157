//! Registration Coordinator
//!
//! Admission for free events and checkout initiation for paid events. All
//! checks run under the event row lock so a duplicate join cannot slip in
//! between check and write.

use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use crate::domain::{
    CorrelationMetadata, DomainError, EventCapacity, EventStatus, OperationContext,
    RejectionReason, SlotReservation,
};
use crate::error::AppError;
use crate::gateway::{CheckoutRequest, PaymentGateway};
use crate::ledger::{CapacityLedger, ParticipantRepository};
use crate::payments::{PaymentRecordStore, PaymentStoreError};

use super::{JoinEventCommand, JoinOutcome, LeaveResult};

/// Handler for join and leave requests
pub struct RegistrationCoordinator {
    pool: PgPool,
    ledger: CapacityLedger,
    participants: ParticipantRepository,
    payments: PaymentRecordStore,
    audit: AuditLogService,
    gateway: Arc<dyn PaymentGateway>,
    currency: String,
}

impl RegistrationCoordinator {
    pub fn new(pool: PgPool, gateway: Arc<dyn PaymentGateway>, currency: impl Into<String>) -> Self {
        Self {
            ledger: CapacityLedger::new(pool.clone()),
            participants: ParticipantRepository::new(pool.clone()),
            payments: PaymentRecordStore::new(pool.clone()),
            audit: AuditLogService::new(pool.clone()),
            gateway,
            currency: currency.into(),
            pool,
        }
    }

    /// requestJoin: admit (free), start checkout (paid) or reject
    pub async fn request_join(
        &self,
        command: JoinEventCommand,
        context: &OperationContext,
    ) -> Result<JoinOutcome, AppError> {
        if context.acting_user()? != command.user_id {
            return Err(AppError::Domain(DomainError::Unauthorized(
                "users may only join on their own behalf".to_string(),
            )));
        }

        let mut tx = self.pool.begin().await?;
        let event = self.ledger.lock(&mut tx, command.event_id).await?;

        if let Err(reason) = self.admission_checks(&mut tx, &event, command.user_id).await? {
            tx.rollback().await?;
            tracing::info!(
                event_id = %command.event_id,
                user_id = %command.user_id,
                reason = reason.code(),
                "Join rejected"
            );
            return Ok(JoinOutcome::Rejected(reason));
        }

        match event.joining_fee.as_amount() {
            None => self.join_free(tx, command, context).await,
            Some(_) => self.start_checkout(tx, &event, command, context).await,
        }
    }

    /// Steps 1-3 of admission, evaluated against the locked snapshot
    async fn admission_checks(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        event: &EventCapacity,
        user_id: Uuid,
    ) -> Result<Result<(), RejectionReason>, AppError> {
        if let Err(reason) = event.admission_check() {
            return Ok(Err(reason));
        }

        if self
            .participants
            .find_active(tx, event.id, user_id)
            .await?
            .is_some()
        {
            return Ok(Err(RejectionReason::AlreadyJoined));
        }

        if self
            .payments
            .find_active_unpaid(tx, event.id, user_id)
            .await?
            .is_some()
        {
            return Ok(Err(RejectionReason::PendingPayment));
        }

        Ok(Ok(()))
    }

    async fn join_free(
        &self,
        mut tx: sqlx::Transaction<'_, sqlx::Postgres>,
        command: JoinEventCommand,
        context: &OperationContext,
    ) -> Result<JoinOutcome, AppError> {
        let event_status = match self.ledger.try_reserve_slot(&mut tx, command.event_id).await? {
            SlotReservation::Accepted { status } => status,
            SlotReservation::Rejected(reason) => {
                tx.rollback().await?;
                return Ok(JoinOutcome::Rejected(reason));
            }
        };

        let participant = self
            .participants
            .upsert_active(&mut tx, command.event_id, command.user_id)
            .await?;

        self.audit
            .log_in_tx(
                &mut tx,
                AuditLogBuilder::new(AuditAction::ParticipantJoined)
                    .resource("Event", command.event_id)
                    .after_state(&participant),
                context,
            )
            .await?;

        tx.commit().await?;

        tracing::info!(
            event_id = %command.event_id,
            user_id = %command.user_id,
            status = %event_status,
            "Participant joined free event"
        );

        Ok(JoinOutcome::JoinedFree {
            participant,
            event_status,
        })
    }

    /// Create the UNPAID record, then ask the gateway for a session outside
    /// the lock. No slot is reserved here.
    async fn start_checkout(
        &self,
        mut tx: sqlx::Transaction<'_, sqlx::Postgres>,
        event: &EventCapacity,
        command: JoinEventCommand,
        context: &OperationContext,
    ) -> Result<JoinOutcome, AppError> {
        let amount = event.joining_fee.as_amount().ok_or_else(|| {
            AppError::Internal(format!("event {} has no joining fee", event.id))
        })?;

        let record = match self
            .payments
            .create(&mut tx, event.id, command.user_id, amount, &self.currency)
            .await
        {
            Ok(record) => record,
            Err(PaymentStoreError::ActiveUnpaidExists) => {
                tx.rollback().await?;
                return Ok(JoinOutcome::Rejected(RejectionReason::PendingPayment));
            }
            Err(e) => return Err(e.into()),
        };

        tx.commit().await?;

        let request = CheckoutRequest {
            payment_record_id: record.id,
            amount,
            currency: record.currency.clone(),
            description: format!("Joining fee for event {}", event.id),
            metadata: CorrelationMetadata {
                event_id: event.id,
                user_id: command.user_id,
                payment_record_id: record.id,
            },
        };

        let session = match self.gateway.create_checkout_session(request).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(
                    payment_record_id = %record.id,
                    event_id = %event.id,
                    "Checkout session creation failed: {}",
                    e
                );
                self.discard_attempt(record.id).await;
                return Err(AppError::Gateway(e));
            }
        };

        if let Err(e) = self
            .payments
            .attach_session(record.id, &session.session_id, &session.checkout_url)
            .await
        {
            tracing::error!(
                payment_record_id = %record.id,
                session_id = %session.session_id,
                "Failed to store checkout session: {}",
                e
            );
            self.discard_attempt(record.id).await;
            return Err(e.into());
        }

        self.audit
            .log(
                AuditLogBuilder::new(AuditAction::PaymentSessionCreated)
                    .resource("PaymentRecord", record.id)
                    .after_state(&serde_json::json!({
                        "event_id": event.id,
                        "user_id": command.user_id,
                        "amount": amount,
                        "session_id": session.session_id,
                    })),
                context,
            )
            .await?;

        tracing::info!(
            event_id = %event.id,
            user_id = %command.user_id,
            payment_record_id = %record.id,
            "Payment session created"
        );

        Ok(JoinOutcome::PaymentSessionCreated {
            payment_record_id: record.id,
            session_id: session.session_id,
            checkout_url: session.checkout_url,
        })
    }

    /// Cancel an attempt that never got a usable session so the user can retry
    async fn discard_attempt(&self, payment_record_id: Uuid) {
        if let Err(e) = self.payments.discard(payment_record_id).await {
            tracing::error!(
                payment_record_id = %payment_record_id,
                "Failed to discard payment record: {}",
                e
            );
        }
    }

    /// leaveEvent: soft-remove the participant and give the slot back
    pub async fn leave(
        &self,
        event_id: Uuid,
        context: &OperationContext,
    ) -> Result<LeaveResult, AppError> {
        let user_id = context.acting_user()?;

        let mut tx = self.pool.begin().await?;
        let event = self.ledger.lock(&mut tx, event_id).await?;

        // Checked before touching the participant row so a completed event
        // keeps its count
        if event.status == EventStatus::Completed {
            return Err(AppError::Domain(DomainError::EventCompleted));
        }

        if !self.participants.remove_active(&mut tx, event_id, user_id).await? {
            return Err(AppError::Domain(DomainError::NoActiveParticipant));
        }

        let event_status = self.ledger.release_slot(&mut tx, event_id).await?;

        self.audit
            .log_in_tx(
                &mut tx,
                AuditLogBuilder::new(AuditAction::ParticipantLeft)
                    .resource("Event", event_id)
                    .after_state(&serde_json::json!({ "user_id": user_id })),
                context,
            )
            .await?;

        tx.commit().await?;

        tracing::info!(event_id = %event_id, user_id = %user_id, status = %event_status, "Participant left");
        if !event.is_free() {
            tracing::warn!(
                event_id = %event_id,
                user_id = %user_id,
                joining_fee = %event.joining_fee,
                "Paid participant left; no automatic refund"
            );
        }

        Ok(LeaveResult {
            event_id,
            user_id,
            event_status,
        })
    }
}
