//! Participant rows
//!
//! At most one row per (event_id, user_id). Leaving soft-removes the row and
//! re-joining reactivates it, so there is never a duplicate.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::{Lifecycle, Participant};

use super::LedgerError;

type ParticipantRow = (Uuid, Uuid, Uuid, DateTime<Utc>, String);

fn decode_participant(row: ParticipantRow) -> Result<Participant, LedgerError> {
    let (id, event_id, user_id, joined_at, lifecycle) = row;
    let lifecycle: Lifecycle = lifecycle.parse().map_err(|e: crate::domain::DomainError| {
        LedgerError::CorruptRow {
            id,
            reason: e.to_string(),
        }
    })?;

    Ok(Participant {
        id,
        event_id,
        user_id,
        joined_at,
        lifecycle,
    })
}

#[derive(Debug, Clone)]
pub struct ParticipantRepository {
    pool: PgPool,
}

impl ParticipantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Active participant for (event, user), read inside the caller's transaction
    pub async fn find_active(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Participant>, LedgerError> {
        let row: Option<ParticipantRow> = sqlx::query_as(
            r#"
            SELECT id, event_id, user_id, joined_at, lifecycle
            FROM participants
            WHERE event_id = $1 AND user_id = $2 AND lifecycle = 'active'
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;

        row.map(decode_participant).transpose()
    }

    /// Insert, or reactivate a previously removed row
    pub async fn upsert_active(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event_id: Uuid,
        user_id: Uuid,
    ) -> Result<Participant, LedgerError> {
        let row: ParticipantRow = sqlx::query_as(
            r#"
            INSERT INTO participants (id, event_id, user_id, joined_at, lifecycle)
            VALUES ($1, $2, $3, NOW(), 'active')
            ON CONFLICT (event_id, user_id) DO UPDATE
            SET lifecycle = 'active', joined_at = NOW(), removed_at = NULL
            RETURNING id, event_id, user_id, joined_at, lifecycle
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event_id)
        .bind(user_id)
        .fetch_one(&mut **tx)
        .await?;

        decode_participant(row)
    }

    /// Soft-remove the active row. Returns false if there was none.
    pub async fn remove_active(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, LedgerError> {
        let rows = sqlx::query(
            r#"
            UPDATE participants
            SET lifecycle = 'removed', removed_at = NOW()
            WHERE event_id = $1 AND user_id = $2 AND lifecycle = 'active'
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        Ok(rows > 0)
    }

    /// Number of active participants, the value `current_participants` must equal
    pub async fn count_active(&self, event_id: Uuid) -> Result<i64, LedgerError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM participants WHERE event_id = $1 AND lifecycle = 'active'",
        )
        .bind(event_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
