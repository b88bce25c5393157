//! Command definitions
//!
//! Commands represent intentions to change the system state. Request bodies
//! are mapped onto these at the API boundary; validation of their values
//! happens in the handlers before any state is touched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{EventStatus, Participant, RejectionReason};
use crate::revenue::AnomalyKind;

// =========================================================================
// Event management
// =========================================================================

/// Command to register a new event. The host is the acting user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEventCommand {
    pub title: String,
    pub event_date: DateTime<Utc>,
    pub min_participants: i32,
    pub max_participants: i32,
    /// Decimal string, "0" for a free event
    #[serde(default = "free_fee")]
    pub joining_fee: String,
}

fn free_fee() -> String {
    "0".to_string()
}

impl CreateEventCommand {
    pub fn new(title: impl Into<String>, event_date: DateTime<Utc>, min: i32, max: i32) -> Self {
        Self {
            title: title.into(),
            event_date,
            min_participants: min,
            max_participants: max,
            joining_fee: free_fee(),
        }
    }

    pub fn with_fee(mut self, joining_fee: impl Into<String>) -> Self {
        self.joining_fee = joining_fee.into();
        self
    }
}

/// Command to move the participant ceiling of an event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeCapacityCommand {
    pub event_id: Uuid,
    pub max_participants: i32,
}

// =========================================================================
// Registration
// =========================================================================

/// Command to join an event
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct JoinEventCommand {
    pub event_id: Uuid,
    pub user_id: Uuid,
}

impl JoinEventCommand {
    pub fn new(event_id: Uuid, user_id: Uuid) -> Self {
        Self { event_id, user_id }
    }
}

/// Result of a join request. Rejections are outcomes, not errors.
#[derive(Debug, Clone)]
pub enum JoinOutcome {
    /// Free event: the user is a participant now
    JoinedFree {
        participant: Participant,
        event_status: EventStatus,
    },
    /// Paid event: the user must complete checkout; no slot is held yet
    PaymentSessionCreated {
        payment_record_id: Uuid,
        session_id: String,
        checkout_url: String,
    },
    Rejected(RejectionReason),
}

impl JoinOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, JoinOutcome::Rejected(_))
    }
}

/// Result of leaving an event
#[derive(Debug, Clone, Serialize)]
pub struct LeaveResult {
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub event_status: EventStatus,
}

// =========================================================================
// Gateway notifications
// =========================================================================

/// What a gateway notification did. Every variant is acknowledged with 200.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationAck {
    /// First "paid" observation: participant admitted and revenue booked
    Settled { participant_id: Uuid },
    /// Redelivery of an already processed "paid" notification
    Duplicate,
    /// Paid, but could not be admitted; surfaced to operators
    Anomaly { anomaly_id: Uuid, kind: AnomalyKind },
    /// Checkout finished without payment; record stays UNPAID
    MarkedUnpaid,
    /// Not a notification this service acts on, or not correlatable
    Ignored,
}

impl NotificationAck {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationAck::Settled { .. } => "settled",
            NotificationAck::Duplicate => "duplicate",
            NotificationAck::Anomaly { .. } => "anomaly",
            NotificationAck::MarkedUnpaid => "marked_unpaid",
            NotificationAck::Ignored => "ignored",
        }
    }
}

// =========================================================================
// Operator
// =========================================================================

/// Command to close a settlement anomaly after out-of-band compensation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveAnomalyCommand {
    pub anomaly_id: Uuid,
    pub note: String,
}
