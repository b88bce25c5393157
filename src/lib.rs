//! event_settlement Library
//!
//! Event capacity reservation and payment settlement. Re-exports modules for
//! the server binary, the load tester and integration tests.

pub mod api;
pub mod audit;
pub mod domain;
pub mod gateway;
pub mod handlers;
pub mod jobs;
pub mod ledger;
pub mod payments;
pub mod revenue;

pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use domain::{Amount, AmountError, DomainError, JoiningFee, OperationContext};
pub use error::{AppError, AppResult};
