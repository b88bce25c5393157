//! Domain module
//!
//! Core domain types and business rules for admission and settlement.

pub mod amount;
pub mod context;
pub mod error;
pub mod event;
pub mod payment;

pub use amount::{Amount, AmountError, JoiningFee};
pub use context::OperationContext;
pub use error::DomainError;
pub use event::{EventCapacity, EventStatus, Lifecycle, RejectionReason, SlotReservation};
pub use payment::{
    CorrelationMetadata, MarkPaidOutcome, Participant, PaymentLifecycle, PaymentRecord,
    PaymentStatus,
};
