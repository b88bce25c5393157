//! Payment Record Repository

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::{
    Amount, DomainError, MarkPaidOutcome, PaymentLifecycle, PaymentRecord, PaymentStatus,
};

/// Partial unique index guarding "one active unpaid attempt per (event, user)"
const ACTIVE_UNPAID_INDEX: &str = "uq_payment_records_active_unpaid";

const RECORD_COLUMNS: &str = r#"
    id, event_id, user_id, amount, currency, external_session_id, checkout_url,
    status, lifecycle, paid_at, gateway_snapshot, created_at
"#;

type RecordRow = (
    Uuid,
    Uuid,
    Uuid,
    Decimal,
    String,
    String,
    Option<String>,
    String,
    String,
    Option<DateTime<Utc>>,
    Option<serde_json::Value>,
    DateTime<Utc>,
);

fn decode_record(row: RecordRow) -> Result<PaymentRecord, PaymentStoreError> {
    let (
        id,
        event_id,
        user_id,
        amount,
        currency,
        external_session_id,
        checkout_url,
        status,
        lifecycle,
        paid_at,
        gateway_snapshot,
        created_at,
    ) = row;
    let corrupt = |e: DomainError| PaymentStoreError::CorruptRow {
        id,
        reason: e.to_string(),
    };

    Ok(PaymentRecord {
        id,
        event_id,
        user_id,
        amount,
        currency,
        external_session_id,
        checkout_url,
        status: status.parse().map_err(corrupt)?,
        lifecycle: lifecycle.parse().map_err(corrupt)?,
        paid_at,
        gateway_snapshot,
        created_at,
    })
}

/// Payment store errors
#[derive(Debug, thiserror::Error)]
pub enum PaymentStoreError {
    #[error("Payment record not found: {0}")]
    NotFound(Uuid),

    /// Lost a race against another checkout for the same (event, user)
    #[error("An unpaid payment already exists for this event and user")]
    ActiveUnpaidExists,

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt payment row {id}: {reason}")]
    CorruptRow { id: Uuid, reason: String },
}

/// What a non-"paid" checkout notification did to the record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnpaidNotificationEffect {
    /// Record is (still) UNPAID; snapshot refreshed
    RecordedUnpaid,
    /// Record was already PAID and was left untouched
    AlreadyPaid,
}

/// Repository for payment records
#[derive(Debug, Clone)]
pub struct PaymentRecordStore {
    pool: PgPool,
}

impl PaymentRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // create / find
    // =========================================================================

    /// Insert a new UNPAID record with a placeholder session id
    pub async fn create(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event_id: Uuid,
        user_id: Uuid,
        amount: Amount,
        currency: &str,
    ) -> Result<PaymentRecord, PaymentStoreError> {
        let id = Uuid::new_v4();
        let placeholder_session = format!("pending_{}", Uuid::new_v4().simple());

        let row: RecordRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO payment_records (
                id, event_id, user_id, amount, currency, external_session_id, status, lifecycle
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'unpaid', 'active')
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(event_id)
        .bind(user_id)
        .bind(amount.value())
        .bind(currency)
        .bind(&placeholder_session)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.constraint() == Some(ACTIVE_UNPAID_INDEX) => {
                PaymentStoreError::ActiveUnpaidExists
            }
            other => PaymentStoreError::Database(other),
        })?;

        decode_record(row)
    }

    /// The live UNPAID attempt for (event, user), if any
    pub async fn find_active_unpaid(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<PaymentRecord>, PaymentStoreError> {
        let row: Option<RecordRow> = sqlx::query_as(&format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM payment_records
            WHERE event_id = $1 AND user_id = $2
              AND status = 'unpaid' AND lifecycle = 'active'
            "#
        ))
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;

        row.map(decode_record).transpose()
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<PaymentRecord>, PaymentStoreError> {
        let row: Option<RecordRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM payment_records WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_record).transpose()
    }

    /// Store the gateway-issued session id and checkout URL
    pub async fn attach_session(
        &self,
        id: Uuid,
        session_id: &str,
        checkout_url: &str,
    ) -> Result<(), PaymentStoreError> {
        let rows = sqlx::query(
            r#"
            UPDATE payment_records
            SET external_session_id = $2, checkout_url = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(session_id)
        .bind(checkout_url)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(PaymentStoreError::NotFound(id));
        }
        Ok(())
    }

    // =========================================================================
    // mark_paid (idempotent)
    // =========================================================================

    /// Transition UNPAID -> PAID exactly once.
    ///
    /// Returns `already_paid = true` without touching status, amount or
    /// paid_at when the record was PAID before; only the gateway snapshot is
    /// refreshed. A cancelled attempt is reactivated: a real payment always
    /// wins over a client-side cancel.
    pub async fn mark_paid(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        gateway_snapshot: &serde_json::Value,
    ) -> Result<MarkPaidOutcome, PaymentStoreError> {
        let transitioned: Option<RecordRow> = sqlx::query_as(&format!(
            r#"
            UPDATE payment_records
            SET status = 'paid', lifecycle = 'active', paid_at = NOW(),
                gateway_snapshot = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'unpaid'
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(gateway_snapshot)
        .fetch_optional(&mut **tx)
        .await?;

        if let Some(row) = transitioned {
            return Ok(MarkPaidOutcome {
                already_paid: false,
                record: decode_record(row)?,
            });
        }

        let existing: Option<RecordRow> = sqlx::query_as(&format!(
            r#"
            UPDATE payment_records
            SET gateway_snapshot = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'paid'
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(gateway_snapshot)
        .fetch_optional(&mut **tx)
        .await?;

        match existing {
            Some(row) => Ok(MarkPaidOutcome {
                already_paid: true,
                record: decode_record(row)?,
            }),
            None => Err(PaymentStoreError::NotFound(id)),
        }
    }

    /// Checkout finished without payment: keep the record UNPAID.
    /// A PAID record is never moved back.
    pub async fn record_unpaid(
        &self,
        id: Uuid,
        gateway_snapshot: &serde_json::Value,
    ) -> Result<UnpaidNotificationEffect, PaymentStoreError> {
        let rows = sqlx::query(
            r#"
            UPDATE payment_records
            SET gateway_snapshot = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'unpaid'
            "#,
        )
        .bind(id)
        .bind(gateway_snapshot)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows > 0 {
            return Ok(UnpaidNotificationEffect::RecordedUnpaid);
        }

        match self.get(id).await? {
            Some(record) if record.status == PaymentStatus::Paid => {
                Ok(UnpaidNotificationEffect::AlreadyPaid)
            }
            Some(_) => Ok(UnpaidNotificationEffect::RecordedUnpaid),
            None => Err(PaymentStoreError::NotFound(id)),
        }
    }

    // =========================================================================
    // cancel / discard
    // =========================================================================

    /// Owner-initiated cancel of an UNPAID attempt. Never touches capacity:
    /// unpaid attempts never held a slot.
    pub async fn cancel(&self, id: Uuid, owner: Uuid) -> Result<PaymentRecord, PaymentStoreError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<RecordRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM payment_records WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let mut record = row
            .map(decode_record)
            .transpose()?
            .ok_or(PaymentStoreError::NotFound(id))?;

        record.ensure_cancellable_by(owner)?;

        sqlx::query(
            r#"
            UPDATE payment_records
            SET lifecycle = 'cancelled', updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        record.lifecycle = PaymentLifecycle::Cancelled;
        Ok(record)
    }

    /// Drop an attempt whose checkout session could not be created
    pub async fn discard(&self, id: Uuid) -> Result<(), PaymentStoreError> {
        sqlx::query(
            r#"
            UPDATE payment_records
            SET lifecycle = 'cancelled', updated_at = NOW()
            WHERE id = $1 AND status = 'unpaid'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Cancel UNPAID attempts older than `ttl_minutes`
    pub async fn expire_stale_unpaid(&self, ttl_minutes: i64) -> Result<u64, PaymentStoreError> {
        let rows = sqlx::query(
            r#"
            UPDATE payment_records
            SET lifecycle = 'cancelled', updated_at = NOW()
            WHERE status = 'unpaid' AND lifecycle = 'active'
              AND created_at < NOW() - make_interval(mins => $1::int)
            "#,
        )
        .bind(ttl_minutes)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn row(status: &str, lifecycle: &str) -> RecordRow {
        (
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            dec!(20.00),
            "usd".to_string(),
            "cs_test_123".to_string(),
            Some("https://checkout.example/cs_test_123".to_string()),
            status.to_string(),
            lifecycle.to_string(),
            None,
            Some(json!({"payment_status": "unpaid"})),
            Utc::now(),
        )
    }

    #[test]
    fn test_decode_record() {
        let record = decode_record(row("unpaid", "active")).unwrap();
        assert_eq!(record.status, PaymentStatus::Unpaid);
        assert_eq!(record.lifecycle, PaymentLifecycle::Active);
        assert!(record.is_active_unpaid());
        assert_eq!(record.amount, dec!(20));
    }

    #[test]
    fn test_decode_rejects_unknown_status() {
        assert!(matches!(
            decode_record(row("refunded", "active")),
            Err(PaymentStoreError::CorruptRow { .. })
        ));
    }

    #[test]
    fn test_error_display() {
        assert!(PaymentStoreError::ActiveUnpaidExists
            .to_string()
            .contains("unpaid payment already exists"));
        assert!(PaymentStoreError::NotFound(Uuid::nil())
            .to_string()
            .contains("not found"));
    }
}
