//! Revenue Accumulator module
//!
//! Running revenue total per host, incremented once per settled payment, and
//! the settlement anomaly log for payments that could not be honored.

mod anomaly;
mod repository;

pub use anomaly::{AnomalyKind, SettlementAnomaly, SettlementAnomalyStore};
pub use repository::{HostRevenue, RevenueAccumulator};

use uuid::Uuid;

/// Revenue and anomaly store errors
#[derive(Debug, thiserror::Error)]
pub enum RevenueError {
    #[error("Settlement anomaly not found: {0}")]
    AnomalyNotFound(Uuid),

    #[error("Settlement anomaly already resolved: {0}")]
    AnomalyAlreadyResolved(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
