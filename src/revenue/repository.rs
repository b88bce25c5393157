//! Host revenue totals

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::Amount;

use super::RevenueError;

/// Revenue total of one host
#[derive(Debug, Clone, Serialize)]
pub struct HostRevenue {
    pub host_id: Uuid,
    pub total_revenue: Decimal,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct RevenueAccumulator {
    pool: PgPool,
}

impl RevenueAccumulator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Add `amount` to the host's total, creating the row on first payment.
    /// Runs in the settlement transaction so it commits with the PAID mark.
    pub async fn increment(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        host_id: Uuid,
        amount: Amount,
    ) -> Result<Decimal, RevenueError> {
        let total: Decimal = sqlx::query_scalar(
            r#"
            INSERT INTO host_revenue (host_id, total_revenue, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (host_id) DO UPDATE
            SET total_revenue = host_revenue.total_revenue + EXCLUDED.total_revenue,
                updated_at = NOW()
            RETURNING total_revenue
            "#,
        )
        .bind(host_id)
        .bind(amount.value())
        .fetch_one(&mut **tx)
        .await?;

        tracing::debug!(host_id = %host_id, amount = %amount, total = %total, "Revenue incremented");
        Ok(total)
    }

    /// Current total; zero for a host that never received a payment
    pub async fn get_host_revenue(&self, host_id: Uuid) -> Result<HostRevenue, RevenueError> {
        let row: Option<(Decimal, DateTime<Utc>)> = sqlx::query_as(
            "SELECT total_revenue, updated_at FROM host_revenue WHERE host_id = $1",
        )
        .bind(host_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some((total_revenue, updated_at)) => HostRevenue {
                host_id,
                total_revenue,
                updated_at: Some(updated_at),
            },
            None => HostRevenue {
                host_id,
                total_revenue: Decimal::ZERO,
                updated_at: None,
            },
        })
    }
}
