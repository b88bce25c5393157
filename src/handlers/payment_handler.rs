//! Payment cancel handler

use sqlx::PgPool;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use crate::domain::{OperationContext, PaymentRecord};
use crate::error::AppError;
use crate::payments::PaymentRecordStore;

pub struct PaymentHandler {
    payments: PaymentRecordStore,
    audit: AuditLogService,
}

impl PaymentHandler {
    pub fn new(pool: PgPool) -> Self {
        Self {
            payments: PaymentRecordStore::new(pool.clone()),
            audit: AuditLogService::new(pool),
        }
    }

    /// cancelPayment: owner only, UNPAID only. Capacity is not touched.
    pub async fn cancel(
        &self,
        payment_record_id: Uuid,
        context: &OperationContext,
    ) -> Result<PaymentRecord, AppError> {
        let owner = context.acting_user()?;
        let record = self.payments.cancel(payment_record_id, owner).await?;

        self.audit
            .log(
                AuditLogBuilder::new(AuditAction::PaymentCancelled)
                    .resource("PaymentRecord", record.id)
                    .after_state(&record),
                context,
            )
            .await?;

        tracing::info!(payment_record_id = %record.id, user_id = %owner, "Payment cancelled");
        Ok(record)
    }
}
