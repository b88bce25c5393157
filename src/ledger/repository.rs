//! Capacity Ledger Repository
//!
//! Owns `events.current_participants` / `events.status`. Concurrent joiners
//! are serialized by `SELECT ... FOR UPDATE` on the event row; the domain
//! state machine in `EventCapacity` decides the new values and the row is
//! written back before the caller's transaction commits.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::{DomainError, EventCapacity, EventStatus, JoiningFee, SlotReservation};

use super::LedgerError;

type EventRow = (
    Uuid,
    Uuid,
    DateTime<Utc>,
    i32,
    i32,
    i32,
    Decimal,
    String,
    String,
    i64,
);

const EVENT_COLUMNS: &str = r#"
    id, host_id, event_date, min_participants, max_participants,
    current_participants, joining_fee, status, lifecycle, version
"#;

fn decode_event(row: EventRow) -> Result<EventCapacity, LedgerError> {
    let (id, host_id, event_date, min, max, current, fee, status, lifecycle, version) = row;
    let corrupt = |reason: String| LedgerError::CorruptRow { id, reason };

    Ok(EventCapacity {
        id,
        host_id,
        event_date,
        min_participants: min,
        max_participants: max,
        current_participants: current,
        joining_fee: JoiningFee::new(fee).map_err(|e| corrupt(e.to_string()))?,
        status: status.parse().map_err(|e: DomainError| corrupt(e.to_string()))?,
        lifecycle: lifecycle
            .parse()
            .map_err(|e: DomainError| corrupt(e.to_string()))?,
        version,
    })
}

/// Input for registering a new event
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub host_id: Uuid,
    pub title: String,
    pub event_date: DateTime<Utc>,
    pub min_participants: i32,
    pub max_participants: i32,
    pub joining_fee: JoiningFee,
}

/// Event as shown to callers: ledger state plus descriptive fields
#[derive(Debug, Clone, Serialize)]
pub struct EventDetails {
    pub title: String,
    #[serde(flatten)]
    pub capacity: EventCapacity,
    pub created_at: DateTime<Utc>,
}

/// Capacity Ledger backed by the `events` table
#[derive(Debug, Clone)]
pub struct CapacityLedger {
    pool: PgPool,
}

impl CapacityLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Register a new event (status OPEN, no participants)
    pub async fn create_event(&self, new_event: NewEvent) -> Result<EventCapacity, LedgerError> {
        let event = EventCapacity::new(
            Uuid::new_v4(),
            new_event.host_id,
            new_event.event_date,
            new_event.min_participants,
            new_event.max_participants,
            new_event.joining_fee,
        )?;

        sqlx::query(
            r#"
            INSERT INTO events (
                id, host_id, title, event_date, min_participants, max_participants,
                current_participants, joining_fee, status, lifecycle
            )
            VALUES ($1, $2, $3, $4, $5, $6, 0, $7, $8, $9)
            "#,
        )
        .bind(event.id)
        .bind(event.host_id)
        .bind(&new_event.title)
        .bind(event.event_date)
        .bind(event.min_participants)
        .bind(event.max_participants)
        .bind(event.joining_fee.value())
        .bind(event.status.as_str())
        .bind(event.lifecycle.as_str())
        .execute(&self.pool)
        .await?;

        tracing::info!(
            event_id = %event.id,
            host_id = %event.host_id,
            max_participants = event.max_participants,
            joining_fee = %event.joining_fee,
            "Event registered"
        );

        Ok(event)
    }

    /// Read the current ledger state without locking (for queries only)
    pub async fn get(&self, event_id: Uuid) -> Result<Option<EventCapacity>, LedgerError> {
        let row: Option<EventRow> =
            sqlx::query_as(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"))
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(decode_event).transpose()
    }

    /// Ledger state together with title and creation time, in one read
    pub async fn get_details(&self, event_id: Uuid) -> Result<Option<EventDetails>, LedgerError> {
        type DetailsRow = (
            Uuid,
            Uuid,
            DateTime<Utc>,
            i32,
            i32,
            i32,
            Decimal,
            String,
            String,
            i64,
            String,
            DateTime<Utc>,
        );

        let row: Option<DetailsRow> = sqlx::query_as(&format!(
            "SELECT {EVENT_COLUMNS}, title, created_at FROM events WHERE id = $1"
        ))
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, host, date, min, max, current, fee, status, lifecycle, version, title, created_at)) =
            row
        else {
            return Ok(None);
        };

        let capacity = decode_event((
            id, host, date, min, max, current, fee, status, lifecycle, version,
        ))?;

        Ok(Some(EventDetails {
            title,
            capacity,
            created_at,
        }))
    }

    // =========================================================================
    // Locked access (must run inside the caller's transaction)
    // =========================================================================

    /// Load the event row with a write-intent lock held until the transaction ends
    pub async fn lock(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event_id: Uuid,
    ) -> Result<EventCapacity, LedgerError> {
        let row: Option<EventRow> = sqlx::query_as(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = $1 FOR UPDATE"
        ))
        .bind(event_id)
        .fetch_optional(&mut **tx)
        .await?;

        row.map(decode_event)
            .transpose()?
            .ok_or(LedgerError::EventNotFound(event_id))
    }

    /// Write back counter, ceiling, status and lifecycle of a locked event
    pub async fn save(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: &EventCapacity,
    ) -> Result<i64, LedgerError> {
        let version: i64 = sqlx::query_scalar(
            r#"
            UPDATE events
            SET
                current_participants = $2,
                max_participants = $3,
                status = $4,
                lifecycle = $5,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1
            RETURNING version
            "#,
        )
        .bind(event.id)
        .bind(event.current_participants)
        .bind(event.max_participants)
        .bind(event.status.as_str())
        .bind(event.lifecycle.as_str())
        .fetch_one(&mut **tx)
        .await?;

        Ok(version)
    }

    /// Claim one slot for `event_id`.
    ///
    /// A rejection is returned as `SlotReservation::Rejected` and writes
    /// nothing; callers branch on it.
    pub async fn try_reserve_slot(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event_id: Uuid,
    ) -> Result<SlotReservation, LedgerError> {
        let mut event = self.lock(tx, event_id).await?;
        let reservation = event.try_reserve();

        match reservation {
            SlotReservation::Accepted { status } => {
                self.save(tx, &event).await?;
                tracing::debug!(
                    event_id = %event_id,
                    current = event.current_participants,
                    max = event.max_participants,
                    status = %status,
                    "Slot reserved"
                );
            }
            SlotReservation::Rejected(reason) => {
                tracing::debug!(event_id = %event_id, reason = reason.code(), "Slot rejected");
            }
        }

        Ok(reservation)
    }

    /// Give back one slot of `event_id`
    pub async fn release_slot(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event_id: Uuid,
    ) -> Result<EventStatus, LedgerError> {
        let mut event = self.lock(tx, event_id).await?;
        let status = event.release()?;
        self.save(tx, &event).await?;

        tracing::debug!(
            event_id = %event_id,
            current = event.current_participants,
            status = %status,
            "Slot released"
        );

        Ok(status)
    }

    /// Lock, apply `change` and persist. Used by the host/admin operations
    /// (capacity change, cancel, complete, remove).
    pub async fn update_with<F>(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event_id: Uuid,
        change: F,
    ) -> Result<(EventCapacity, EventCapacity), LedgerError>
    where
        F: FnOnce(&mut EventCapacity) -> Result<(), DomainError>,
    {
        let before = self.lock(tx, event_id).await?;
        let mut after = before.clone();
        change(&mut after)?;
        after.version = self.save(tx, &after).await?;
        Ok((before, after))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventStatus, Lifecycle};
    use rust_decimal_macros::dec;

    #[test]
    fn test_decode_event_row() {
        let id = Uuid::new_v4();
        let row: EventRow = (
            id,
            Uuid::new_v4(),
            Utc::now(),
            1,
            10,
            10,
            dec!(20.00),
            "full".to_string(),
            "active".to_string(),
            7,
        );

        let event = decode_event(row).unwrap();
        assert_eq!(event.id, id);
        assert_eq!(event.status, EventStatus::Full);
        assert_eq!(event.lifecycle, Lifecycle::Active);
        assert_eq!(event.joining_fee.value(), dec!(20));
        assert_eq!(event.version, 7);
    }

    #[test]
    fn test_decode_rejects_unknown_status() {
        let row: EventRow = (
            Uuid::new_v4(),
            Uuid::new_v4(),
            Utc::now(),
            1,
            10,
            0,
            Decimal::ZERO,
            "archived".to_string(),
            "active".to_string(),
            0,
        );

        assert!(matches!(decode_event(row), Err(LedgerError::CorruptRow { .. })));
    }
}
