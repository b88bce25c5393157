//! Payment Record Store module
//!
//! One payment attempt per (event, user). `mark_paid` is the single
//! state-changing entry point for settlement and is idempotent, which is what
//! makes duplicate gateway notifications harmless.

mod repository;

pub use repository::{PaymentRecordStore, PaymentStoreError, UnpaidNotificationEffect};
