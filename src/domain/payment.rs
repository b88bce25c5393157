//! Payment records and participants
//!
//! A PaymentRecord and a Participant are siblings correlated by
//! (event_id, user_id). On the paid path the record exists first and the
//! participant is created when the gateway confirms payment.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::{DomainError, Lifecycle};

/// Payment status. UNPAID -> PAID happens at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(PaymentStatus::Unpaid),
            "paid" => Ok(PaymentStatus::Paid),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// Whether an unpaid attempt is still live. Cancelled attempts are kept for
/// reconciliation; a late "paid" notification reactivates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentLifecycle {
    Active,
    Cancelled,
}

impl PaymentLifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentLifecycle::Active => "active",
            PaymentLifecycle::Cancelled => "cancelled",
        }
    }
}

impl FromStr for PaymentLifecycle {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(PaymentLifecycle::Active),
            "cancelled" => Ok(PaymentLifecycle::Cancelled),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// One attempt to pay the joining fee of one event by one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    /// Placeholder until the gateway issues its own session id
    pub external_session_id: String,
    pub checkout_url: Option<String>,
    pub status: PaymentStatus,
    pub lifecycle: PaymentLifecycle,
    pub paid_at: Option<DateTime<Utc>>,
    pub gateway_snapshot: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl PaymentRecord {
    pub fn is_active_unpaid(&self) -> bool {
        self.status == PaymentStatus::Unpaid && self.lifecycle == PaymentLifecycle::Active
    }

    /// Only the owner may cancel, and only before payment
    pub fn ensure_cancellable_by(&self, user_id: Uuid) -> Result<(), DomainError> {
        if self.user_id != user_id {
            return Err(DomainError::Unauthorized(
                "payment belongs to another user".to_string(),
            ));
        }
        if self.status == PaymentStatus::Paid {
            return Err(DomainError::PaymentNotCancellable(
                "payment already completed".to_string(),
            ));
        }
        if self.lifecycle == PaymentLifecycle::Cancelled {
            return Err(DomainError::PaymentNotCancellable(
                "payment already cancelled".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of `PaymentRecordStore::mark_paid`
#[derive(Debug, Clone)]
pub struct MarkPaidOutcome {
    /// True when the record was PAID before this call; nothing was changed
    pub already_paid: bool,
    pub record: PaymentRecord,
}

/// Join record between a user and an event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
    pub lifecycle: Lifecycle,
}

/// Identifiers handed to the gateway at checkout and echoed back verbatim in
/// its notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationMetadata {
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub payment_record_id: Uuid,
}

impl CorrelationMetadata {
    pub const EVENT_ID: &'static str = "event_id";
    pub const USER_ID: &'static str = "user_id";
    pub const PAYMENT_RECORD_ID: &'static str = "payment_record_id";

    /// Key/value pairs as sent to the gateway
    pub fn to_pairs(&self) -> [(&'static str, String); 3] {
        [
            (Self::EVENT_ID, self.event_id.to_string()),
            (Self::USER_ID, self.user_id.to_string()),
            (Self::PAYMENT_RECORD_ID, self.payment_record_id.to_string()),
        ]
    }

    /// Rebuild from the gateway's echoed metadata object. `None` if any key is
    /// missing or malformed.
    pub fn from_json(metadata: &serde_json::Value) -> Option<Self> {
        let field = |key: &str| {
            metadata
                .get(key)
                .and_then(|v| v.as_str())
                .and_then(|s| Uuid::parse_str(s).ok())
        };

        Some(Self {
            event_id: field(Self::EVENT_ID)?,
            user_id: field(Self::USER_ID)?,
            payment_record_id: field(Self::PAYMENT_RECORD_ID)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn record(user_id: Uuid) -> PaymentRecord {
        PaymentRecord {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            user_id,
            amount: dec!(20),
            currency: "usd".to_string(),
            external_session_id: "pending_x".to_string(),
            checkout_url: None,
            status: PaymentStatus::Unpaid,
            lifecycle: PaymentLifecycle::Active,
            paid_at: None,
            gateway_snapshot: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_owner_can_cancel_unpaid() {
        let owner = Uuid::new_v4();
        let r = record(owner);
        assert!(r.is_active_unpaid());
        assert!(r.ensure_cancellable_by(owner).is_ok());
        assert!(matches!(
            r.ensure_cancellable_by(Uuid::new_v4()),
            Err(DomainError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_paid_or_cancelled_cannot_be_cancelled() {
        let owner = Uuid::new_v4();

        let mut paid = record(owner);
        paid.status = PaymentStatus::Paid;
        assert!(matches!(
            paid.ensure_cancellable_by(owner),
            Err(DomainError::PaymentNotCancellable(_))
        ));

        let mut cancelled = record(owner);
        cancelled.lifecycle = PaymentLifecycle::Cancelled;
        assert!(!cancelled.is_active_unpaid());
        assert!(cancelled.ensure_cancellable_by(owner).is_err());
    }

    #[test]
    fn test_metadata_from_json() {
        let meta = CorrelationMetadata {
            event_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            payment_record_id: Uuid::new_v4(),
        };
        let value = json!({
            "event_id": meta.event_id.to_string(),
            "user_id": meta.user_id.to_string(),
            "payment_record_id": meta.payment_record_id.to_string(),
            "unrelated": "kept by gateway",
        });

        assert_eq!(CorrelationMetadata::from_json(&value), Some(meta));
    }

    #[test]
    fn test_metadata_missing_or_malformed() {
        assert!(CorrelationMetadata::from_json(&json!({})).is_none());
        assert!(CorrelationMetadata::from_json(&json!({
            "event_id": Uuid::new_v4().to_string(),
            "user_id": "not-a-uuid",
            "payment_record_id": Uuid::new_v4().to_string(),
        }))
        .is_none());
    }
}
