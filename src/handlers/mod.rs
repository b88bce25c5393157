//! Command Handlers module
//!
//! Handlers orchestrate the ledger, payment store, revenue accumulator and
//! audit log for one operation each. Every multi-row mutation runs in a single
//! transaction that takes the event row lock first.

mod commands;
mod event_handler;
mod notification_handler;
mod operator_handler;
mod payment_handler;
mod registration_handler;


pub use commands::*;
pub use event_handler::EventManagementHandler;
pub use notification_handler::NotificationHandler;
pub use operator_handler::OperatorHandler;
pub use payment_handler::PaymentHandler;
pub use registration_handler::RegistrationCoordinator;
