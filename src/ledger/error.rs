//! Ledger Errors

use uuid::Uuid;

use crate::domain::DomainError;

/// Errors that can occur in the capacity ledger
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Event not found: {0}")]
    EventNotFound(Uuid),

    /// A state rule rejected the change (not used for admission rejections)
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row holds a value the domain types refuse
    #[error("Corrupt event row {id}: {reason}")]
    CorruptRow { id: Uuid, reason: String },
}
