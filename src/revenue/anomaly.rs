//! Settlement anomalies
//!
//! A payment the gateway confirmed but the ledger could not admit (event full,
//! cancelled, completed or removed by the time the notification arrived), or
//! a second payment by a user who is already a participant. The record stays
//! PAID; an operator resolves the row after refunding or otherwise
//! compensating out of band.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::PaymentRecord;

use super::RevenueError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    CapacityConflict,
    DuplicatePayment,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::CapacityConflict => "capacity_conflict",
            AnomalyKind::DuplicatePayment => "duplicate_payment",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SettlementAnomaly {
    pub id: Uuid,
    pub payment_record_id: Uuid,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub kind: String,
    pub detail: String,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_note: Option<String>,
    pub created_at: DateTime<Utc>,
}

type AnomalyRow = (
    Uuid,
    Uuid,
    Uuid,
    Uuid,
    Decimal,
    String,
    String,
    Option<DateTime<Utc>>,
    Option<String>,
    DateTime<Utc>,
);

const ANOMALY_COLUMNS: &str = r#"
    id, payment_record_id, event_id, user_id, amount, kind, detail,
    resolved_at, resolution_note, created_at
"#;

fn decode_anomaly(row: AnomalyRow) -> SettlementAnomaly {
    let (
        id,
        payment_record_id,
        event_id,
        user_id,
        amount,
        kind,
        detail,
        resolved_at,
        resolution_note,
        created_at,
    ) = row;
    SettlementAnomaly {
        id,
        payment_record_id,
        event_id,
        user_id,
        amount,
        kind,
        detail,
        resolved_at,
        resolution_note,
        created_at,
    }
}

#[derive(Debug, Clone)]
pub struct SettlementAnomalyStore {
    pool: PgPool,
}

impl SettlementAnomalyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record an anomaly for `record`. At most one row per payment record;
    /// a redelivered notification finds the existing row.
    pub async fn record(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        record: &PaymentRecord,
        kind: AnomalyKind,
        detail: &str,
    ) -> Result<SettlementAnomaly, RevenueError> {
        let inserted: Option<AnomalyRow> = sqlx::query_as(&format!(
            r#"
            INSERT INTO settlement_anomalies (
                id, payment_record_id, event_id, user_id, amount, kind, detail
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (payment_record_id) DO NOTHING
            RETURNING {ANOMALY_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(record.id)
        .bind(record.event_id)
        .bind(record.user_id)
        .bind(record.amount)
        .bind(kind.as_str())
        .bind(detail)
        .fetch_optional(&mut **tx)
        .await?;

        if let Some(row) = inserted {
            return Ok(decode_anomaly(row));
        }

        let existing: AnomalyRow = sqlx::query_as(&format!(
            "SELECT {ANOMALY_COLUMNS} FROM settlement_anomalies WHERE payment_record_id = $1"
        ))
        .bind(record.id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(decode_anomaly(existing))
    }

    pub async fn list(&self, unresolved_only: bool) -> Result<Vec<SettlementAnomaly>, RevenueError> {
        let rows: Vec<AnomalyRow> = sqlx::query_as(&format!(
            r#"
            SELECT {ANOMALY_COLUMNS}
            FROM settlement_anomalies
            WHERE ($1 = FALSE OR resolved_at IS NULL)
            ORDER BY created_at ASC
            "#
        ))
        .bind(unresolved_only)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(decode_anomaly).collect())
    }

    pub async fn find_by_payment(
        &self,
        payment_record_id: Uuid,
    ) -> Result<Option<SettlementAnomaly>, RevenueError> {
        let row: Option<AnomalyRow> = sqlx::query_as(&format!(
            "SELECT {ANOMALY_COLUMNS} FROM settlement_anomalies WHERE payment_record_id = $1"
        ))
        .bind(payment_record_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(decode_anomaly))
    }

    /// Mark an anomaly as handled. Never touches the payment or the ledger.
    pub async fn resolve(&self, id: Uuid, note: &str) -> Result<SettlementAnomaly, RevenueError> {
        let updated: Option<AnomalyRow> = sqlx::query_as(&format!(
            r#"
            UPDATE settlement_anomalies
            SET resolved_at = NOW(), resolution_note = $2
            WHERE id = $1 AND resolved_at IS NULL
            RETURNING {ANOMALY_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(note)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = updated {
            return Ok(decode_anomaly(row));
        }

        let exists: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM settlement_anomalies WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match exists {
            Some(_) => Err(RevenueError::AnomalyAlreadyResolved(id)),
            None => Err(RevenueError::AnomalyNotFound(id)),
        }
    }
}
