//! Capacity Ledger module
//!
//! Persistence for the event counter/status pair and for participant rows.
//! Every mutation takes the event row lock first and runs inside a caller
//! supplied transaction.

mod error;
mod participants;
mod repository;

pub use error::LedgerError;
pub use participants::ParticipantRepository;
pub use repository::{CapacityLedger, EventDetails, NewEvent};
