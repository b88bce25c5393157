//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use thiserror::Error;

use super::{AmountError, EventStatus};

/// Business rule violations for events, participants and payment records.
///
/// Admission rejections (event full, already joined, ...) are not in here:
/// they are ordinary outcomes, see `RejectionReason`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// min/max participant bounds are inconsistent
    #[error("Invalid capacity: {0}")]
    InvalidCapacity(String),

    #[error("Invalid joining fee: {0}")]
    InvalidFee(#[from] AmountError),

    /// Capacity may not drop below the number of admitted participants
    #[error("Cannot reduce capacity to {requested}: {current} participants already joined")]
    CapacityBelowParticipants { requested: i32, current: i32 },

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition { from: EventStatus, to: EventStatus },

    /// COMPLETED is terminal
    #[error("Event is completed")]
    EventCompleted,

    #[error("Unknown status value: {0}")]
    UnknownStatus(String),

    #[error("No active participant for this user")]
    NoActiveParticipant,

    #[error("Participant count would become negative")]
    ParticipantCountUnderflow,

    #[error("Payment cannot be cancelled: {0}")]
    PaymentNotCancellable(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl DomainError {
    pub fn invalid_capacity(msg: impl Into<String>) -> Self {
        Self::InvalidCapacity(msg.into())
    }
}
