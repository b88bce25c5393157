//! Gateway Notification Handler
//!
//! At-least-once, unordered webhook deliveries are reconciled against the
//! payment records and the capacity ledger. `mark_paid` decides whether a
//! delivery is the first "paid" observation; only that one reserves a slot
//! and books revenue, and it does so in the same transaction as the PAID
//! mark so a redelivery can never skip half-applied effects.

use sqlx::{PgPool, Postgres, Transaction};

use crate::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use crate::domain::{
    CorrelationMetadata, EventCapacity, OperationContext, PaymentRecord, SlotReservation,
};
use crate::error::AppError;
use crate::gateway::{verify_signature, CheckoutOutcome, GatewayNotification};
use crate::ledger::{CapacityLedger, LedgerError, ParticipantRepository};
use crate::payments::{PaymentRecordStore, PaymentStoreError, UnpaidNotificationEffect};
use crate::revenue::{AnomalyKind, RevenueAccumulator, SettlementAnomalyStore};

use super::NotificationAck;

/// Handler for signed gateway notifications
pub struct NotificationHandler {
    pool: PgPool,
    ledger: CapacityLedger,
    participants: ParticipantRepository,
    payments: PaymentRecordStore,
    revenue: RevenueAccumulator,
    anomalies: SettlementAnomalyStore,
    audit: AuditLogService,
    webhook_secret: String,
    tolerance_secs: i64,
}

impl NotificationHandler {
    pub fn new(pool: PgPool, webhook_secret: impl Into<String>, tolerance_secs: i64) -> Self {
        Self {
            ledger: CapacityLedger::new(pool.clone()),
            participants: ParticipantRepository::new(pool.clone()),
            payments: PaymentRecordStore::new(pool.clone()),
            revenue: RevenueAccumulator::new(pool.clone()),
            anomalies: SettlementAnomalyStore::new(pool.clone()),
            audit: AuditLogService::new(pool.clone()),
            webhook_secret: webhook_secret.into(),
            tolerance_secs,
            pool,
        }
    }

    /// handleNotification: verify, parse, reconcile.
    ///
    /// Signature and payload failures are returned as errors; everything
    /// else is acknowledged.
    pub async fn handle(
        &self,
        payload: &[u8],
        signature: Option<&str>,
        context: &OperationContext,
    ) -> Result<NotificationAck, AppError> {
        if let Err(e) = verify_signature(
            &self.webhook_secret,
            signature,
            payload,
            self.tolerance_secs,
            chrono::Utc::now().timestamp(),
        ) {
            tracing::warn!("Rejected gateway notification: {}", e);
            return Err(AppError::InvalidSignature(e));
        }

        let notification = GatewayNotification::parse(payload)?;
        self.process(notification, context).await
    }

    /// Reconcile an already verified notification
    pub async fn process(
        &self,
        notification: GatewayNotification,
        context: &OperationContext,
    ) -> Result<NotificationAck, AppError> {
        match notification {
            GatewayNotification::CheckoutCompleted {
                notification_id,
                session_id,
                outcome,
                metadata,
                snapshot,
            } => {
                let Some(metadata) = metadata else {
                    tracing::error!(
                        notification_id = %notification_id,
                        session_id = %session_id,
                        "Checkout notification without usable correlation metadata"
                    );
                    return Ok(NotificationAck::Ignored);
                };

                match outcome {
                    CheckoutOutcome::Paid => self.settle(metadata, &snapshot, context).await,
                    CheckoutOutcome::NotPaid(status) => {
                        tracing::info!(
                            payment_record_id = %metadata.payment_record_id,
                            payment_status = %status,
                            "Checkout completed without payment"
                        );
                        self.record_unpaid(metadata, &snapshot).await
                    }
                }
            }
            GatewayNotification::Other {
                notification_id,
                kind,
            } => {
                tracing::debug!(notification_id = %notification_id, kind = %kind, "Ignoring notification type");
                Ok(NotificationAck::Ignored)
            }
        }
    }

    async fn settle(
        &self,
        metadata: CorrelationMetadata,
        snapshot: &serde_json::Value,
        context: &OperationContext,
    ) -> Result<NotificationAck, AppError> {
        let mut tx = self.pool.begin().await?;

        // Event row first, payment row second: same order as every other
        // writer of these two rows
        let event = match self.ledger.lock(&mut tx, metadata.event_id).await {
            Ok(event) => event,
            Err(LedgerError::EventNotFound(id)) => {
                tracing::error!(event_id = %id, "Paid notification for unknown event");
                return Ok(NotificationAck::Ignored);
            }
            Err(e) => return Err(e.into()),
        };

        let outcome = match self
            .payments
            .mark_paid(&mut tx, metadata.payment_record_id, snapshot)
            .await
        {
            Ok(outcome) => outcome,
            Err(PaymentStoreError::NotFound(id)) => {
                tracing::error!(payment_record_id = %id, "Paid notification for unknown payment record");
                return Ok(NotificationAck::Ignored);
            }
            Err(e) => return Err(e.into()),
        };

        let record = outcome.record;
        if record.event_id != metadata.event_id || record.user_id != metadata.user_id {
            tracing::error!(
                payment_record_id = %record.id,
                metadata_event_id = %metadata.event_id,
                record_event_id = %record.event_id,
                "Notification metadata does not match the payment record"
            );
            tx.rollback().await?;
            return Ok(NotificationAck::Ignored);
        }

        if outcome.already_paid {
            // Only the snapshot was refreshed
            tx.commit().await?;
            tracing::info!(payment_record_id = %record.id, "Duplicate paid notification");
            return Ok(NotificationAck::Duplicate);
        }

        if self
            .participants
            .find_active(&mut tx, record.event_id, record.user_id)
            .await?
            .is_some()
        {
            return self
                .flag_anomaly(tx, &record, AnomalyKind::DuplicatePayment, "already_joined", context)
                .await;
        }

        match self.ledger.try_reserve_slot(&mut tx, record.event_id).await? {
            SlotReservation::Accepted { status } => {
                let participant = self
                    .participants
                    .upsert_active(&mut tx, record.event_id, record.user_id)
                    .await?;

                self.book_revenue(&mut tx, &event, &record).await?;

                self.audit
                    .log_in_tx(
                        &mut tx,
                        AuditLogBuilder::new(AuditAction::PaymentSettled)
                            .resource("PaymentRecord", record.id)
                            .after_state(&record),
                        context,
                    )
                    .await?;
                self.audit
                    .log_in_tx(
                        &mut tx,
                        AuditLogBuilder::new(AuditAction::ParticipantJoined)
                            .resource("Event", record.event_id)
                            .after_state(&participant),
                        context,
                    )
                    .await?;

                tx.commit().await?;

                tracing::info!(
                    payment_record_id = %record.id,
                    event_id = %record.event_id,
                    user_id = %record.user_id,
                    status = %status,
                    "Payment settled, participant admitted"
                );

                Ok(NotificationAck::Settled {
                    participant_id: participant.id,
                })
            }
            SlotReservation::Rejected(reason) => {
                self.flag_anomaly(tx, &record, AnomalyKind::CapacityConflict, reason.code(), context)
                    .await
            }
        }
    }

    /// Revenue grows by the event's fee as read under the lock
    async fn book_revenue(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: &EventCapacity,
        record: &PaymentRecord,
    ) -> Result<(), AppError> {
        let Some(fee) = event.joining_fee.as_amount() else {
            tracing::warn!(
                event_id = %event.id,
                payment_record_id = %record.id,
                "Paid notification for a free event, no revenue booked"
            );
            return Ok(());
        };

        if fee.value() != record.amount {
            tracing::warn!(
                event_id = %event.id,
                payment_record_id = %record.id,
                fee = %fee,
                record_amount = %record.amount,
                "Joining fee differs from the paid amount"
            );
        }

        self.revenue.increment(tx, event.host_id, fee).await?;
        Ok(())
    }

    /// Keep the payment PAID without a participant and surface it
    async fn flag_anomaly(
        &self,
        mut tx: Transaction<'_, Postgres>,
        record: &PaymentRecord,
        kind: AnomalyKind,
        detail: &str,
        context: &OperationContext,
    ) -> Result<NotificationAck, AppError> {
        let anomaly = self.anomalies.record(&mut tx, record, kind, detail).await?;

        self.audit
            .log_in_tx(
                &mut tx,
                AuditLogBuilder::new(AuditAction::AnomalyRecorded)
                    .resource("SettlementAnomaly", anomaly.id)
                    .after_state(&anomaly),
                context,
            )
            .await?;

        tx.commit().await?;

        tracing::error!(
            anomaly_id = %anomaly.id,
            payment_record_id = %record.id,
            event_id = %record.event_id,
            user_id = %record.user_id,
            amount = %record.amount,
            kind = kind.as_str(),
            detail = detail,
            "Paid registration could not be admitted; refund required"
        );

        Ok(NotificationAck::Anomaly {
            anomaly_id: anomaly.id,
            kind,
        })
    }

    async fn record_unpaid(
        &self,
        metadata: CorrelationMetadata,
        snapshot: &serde_json::Value,
    ) -> Result<NotificationAck, AppError> {
        match self
            .payments
            .record_unpaid(metadata.payment_record_id, snapshot)
            .await
        {
            Ok(UnpaidNotificationEffect::RecordedUnpaid) => Ok(NotificationAck::MarkedUnpaid),
            Ok(UnpaidNotificationEffect::AlreadyPaid) => {
                tracing::info!(
                    payment_record_id = %metadata.payment_record_id,
                    "Late non-paid notification for a paid record"
                );
                Ok(NotificationAck::Ignored)
            }
            Err(PaymentStoreError::NotFound(id)) => {
                tracing::error!(payment_record_id = %id, "Notification for unknown payment record");
                Ok(NotificationAck::Ignored)
            }
            Err(e) => Err(e.into()),
        }
    }
}
