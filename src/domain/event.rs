//! Event capacity ledger
//!
//! Pure state machine over an event's participant count and status. The
//! `ledger` repository loads an `EventCapacity` under a row lock, applies one
//! of these operations and writes the result back in the same transaction.
//!
//! Invariants:
//! - `0 <= current_participants <= max_participants`
//! - `status == Full` iff `current_participants >= max_participants`,
//!   unless the status is `Cancelled` or `Completed`
//! - `Completed` is terminal

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{DomainError, JoiningFee};

/// Event status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Open,
    Full,
    Cancelled,
    Completed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Open => "open",
            EventStatus::Full => "full",
            EventStatus::Cancelled => "cancelled",
            EventStatus::Completed => "completed",
        }
    }

    /// Whether the status is decided by an explicit host/admin action rather
    /// than derived from the participant count
    pub fn is_explicit(&self) -> bool {
        matches!(self, EventStatus::Cancelled | EventStatus::Completed)
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(EventStatus::Open),
            "full" => Ok(EventStatus::Full),
            "cancelled" => Ok(EventStatus::Cancelled),
            "completed" => Ok(EventStatus::Completed),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// Soft-delete state shared by events and participants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Active,
    Removed,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Active => "active",
            Lifecycle::Removed => "removed",
        }
    }
}

impl FromStr for Lifecycle {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Lifecycle::Active),
            "removed" => Ok(Lifecycle::Removed),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// Why a join attempt was turned away. These are expected outcomes, not faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// Removed, cancelled or completed
    EventClosed,
    EventFull,
    AlreadyJoined,
    /// An unpaid checkout for this user must be finished or cancelled first
    PendingPayment,
}

impl RejectionReason {
    /// Stable machine-readable code returned to callers
    pub fn code(&self) -> &'static str {
        match self {
            RejectionReason::EventClosed => "event_closed",
            RejectionReason::EventFull => "event_full",
            RejectionReason::AlreadyJoined => "already_joined",
            RejectionReason::PendingPayment => "pending_payment",
        }
    }

    /// Message shown to the end user
    pub fn message(&self) -> &'static str {
        match self {
            RejectionReason::EventClosed => "This event is not accepting participants",
            RejectionReason::EventFull => "This event is full",
            RejectionReason::AlreadyJoined => "You have already joined this event",
            RejectionReason::PendingPayment => {
                "You already have a pending payment for this event"
            }
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Result of `EventCapacity::try_reserve`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotReservation {
    Accepted { status: EventStatus },
    Rejected(RejectionReason),
}

impl SlotReservation {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SlotReservation::Accepted { .. })
    }
}

/// The authoritative counter + status pair of one event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventCapacity {
    pub id: Uuid,
    pub host_id: Uuid,
    pub event_date: DateTime<Utc>,
    pub min_participants: i32,
    pub max_participants: i32,
    pub current_participants: i32,
    pub joining_fee: JoiningFee,
    pub status: EventStatus,
    pub lifecycle: Lifecycle,
    pub version: i64,
}

impl EventCapacity {
    /// A freshly created event: open, nobody admitted yet
    pub fn new(
        id: Uuid,
        host_id: Uuid,
        event_date: DateTime<Utc>,
        min_participants: i32,
        max_participants: i32,
        joining_fee: JoiningFee,
    ) -> Result<Self, DomainError> {
        Self::validate_bounds(min_participants, max_participants)?;

        Ok(Self {
            id,
            host_id,
            event_date,
            min_participants,
            max_participants,
            current_participants: 0,
            joining_fee,
            status: EventStatus::Open,
            lifecycle: Lifecycle::Active,
            version: 0,
        })
    }

    /// `1 <= min <= max`
    pub fn validate_bounds(min: i32, max: i32) -> Result<(), DomainError> {
        if min < 1 || max < 1 {
            return Err(DomainError::invalid_capacity(
                "participant limits must be at least 1",
            ));
        }
        if min > max {
            return Err(DomainError::invalid_capacity(format!(
                "minimum ({min}) exceeds maximum ({max})"
            )));
        }
        Ok(())
    }

    /// Status implied by a count, leaving explicit statuses untouched
    pub fn derive_status(current: i32, max: i32, status: EventStatus) -> EventStatus {
        if status.is_explicit() {
            status
        } else if current >= max {
            EventStatus::Full
        } else {
            EventStatus::Open
        }
    }

    pub fn is_removed(&self) -> bool {
        self.lifecycle == Lifecycle::Removed
    }

    pub fn is_free(&self) -> bool {
        self.joining_fee.is_free()
    }

    /// Admission gate shared by the coordinator and the reservation itself
    pub fn admission_check(&self) -> Result<(), RejectionReason> {
        if self.is_removed() {
            return Err(RejectionReason::EventClosed);
        }
        match self.status {
            EventStatus::Open => {}
            EventStatus::Full => return Err(RejectionReason::EventFull),
            EventStatus::Cancelled | EventStatus::Completed => {
                return Err(RejectionReason::EventClosed)
            }
        }
        if self.current_participants >= self.max_participants {
            return Err(RejectionReason::EventFull);
        }
        Ok(())
    }

    /// Claim one slot. Rejection leaves the state untouched.
    pub fn try_reserve(&mut self) -> SlotReservation {
        if let Err(reason) = self.admission_check() {
            return SlotReservation::Rejected(reason);
        }

        self.current_participants += 1;
        self.status =
            Self::derive_status(self.current_participants, self.max_participants, self.status);

        SlotReservation::Accepted {
            status: self.status,
        }
    }

    /// Give back one slot after a participant was removed
    pub fn release(&mut self) -> Result<EventStatus, DomainError> {
        if self.status == EventStatus::Completed {
            return Err(DomainError::EventCompleted);
        }
        if self.current_participants == 0 {
            return Err(DomainError::ParticipantCountUnderflow);
        }

        self.current_participants -= 1;
        self.status =
            Self::derive_status(self.current_participants, self.max_participants, self.status);
        Ok(self.status)
    }

    /// Move the participant ceiling. Raising it above the count reopens a
    /// full event.
    pub fn change_capacity(&mut self, new_max: i32) -> Result<EventStatus, DomainError> {
        if self.status == EventStatus::Completed {
            return Err(DomainError::EventCompleted);
        }
        Self::validate_bounds(self.min_participants, new_max)?;
        if new_max < self.current_participants {
            return Err(DomainError::CapacityBelowParticipants {
                requested: new_max,
                current: self.current_participants,
            });
        }

        self.max_participants = new_max;
        self.status = Self::derive_status(self.current_participants, new_max, self.status);
        Ok(self.status)
    }

    /// OPEN/FULL -> CANCELLED
    pub fn cancel(&mut self) -> Result<(), DomainError> {
        self.transition_to(EventStatus::Cancelled)
    }

    /// any non-COMPLETED -> COMPLETED
    pub fn complete(&mut self) -> Result<(), DomainError> {
        self.transition_to(EventStatus::Completed)
    }

    /// Soft-remove the event. Forces CANCELLED unless it already completed.
    pub fn remove(&mut self) {
        self.lifecycle = Lifecycle::Removed;
        if !self.status.is_explicit() {
            self.status = EventStatus::Cancelled;
        }
    }

    fn transition_to(&mut self, target: EventStatus) -> Result<(), DomainError> {
        let allowed = match (self.status, target) {
            (EventStatus::Completed, _) => false,
            (EventStatus::Open | EventStatus::Full, EventStatus::Cancelled) => true,
            (_, EventStatus::Completed) => true,
            _ => false,
        };

        if !allowed {
            return Err(DomainError::InvalidStatusTransition {
                from: self.status,
                to: target,
            });
        }

        self.status = target;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn event(max: i32) -> EventCapacity {
        EventCapacity::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Utc::now(),
            1,
            max,
            JoiningFee::free(),
        )
        .unwrap()
    }

    #[test]
    fn test_new_event_is_open_and_empty() {
        let e = event(3);
        assert_eq!(e.status, EventStatus::Open);
        assert_eq!(e.current_participants, 0);
        assert!(e.is_free());
    }

    #[test]
    fn test_bounds_validation() {
        assert!(EventCapacity::validate_bounds(1, 1).is_ok());
        assert!(EventCapacity::validate_bounds(0, 5).is_err());
        assert!(EventCapacity::validate_bounds(5, 4).is_err());
        assert!(EventCapacity::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Utc::now(),
            3,
            2,
            JoiningFee::new(dec!(10)).unwrap()
        )
        .is_err());
    }

    #[test]
    fn test_reserve_fills_last_slot() {
        let mut e = event(2);

        assert_eq!(
            e.try_reserve(),
            SlotReservation::Accepted {
                status: EventStatus::Open
            }
        );
        assert_eq!(
            e.try_reserve(),
            SlotReservation::Accepted {
                status: EventStatus::Full
            }
        );
        assert_eq!(e.current_participants, 2);

        // no slot left: rejection, state untouched
        assert_eq!(
            e.try_reserve(),
            SlotReservation::Rejected(RejectionReason::EventFull)
        );
        assert_eq!(e.current_participants, 2);
        assert_eq!(e.status, EventStatus::Full);
    }

    #[test]
    fn test_count_never_exceeds_max() {
        let mut e = event(5);
        let accepted = (0..50).filter(|_| e.try_reserve().is_accepted()).count();
        assert_eq!(accepted, 5);
        assert_eq!(e.current_participants, e.max_participants);
    }

    #[test]
    fn test_reserve_rejected_when_closed() {
        let mut cancelled = event(3);
        cancelled.cancel().unwrap();
        assert_eq!(
            cancelled.try_reserve(),
            SlotReservation::Rejected(RejectionReason::EventClosed)
        );

        let mut removed = event(3);
        removed.remove();
        assert_eq!(removed.status, EventStatus::Cancelled);
        assert_eq!(
            removed.try_reserve(),
            SlotReservation::Rejected(RejectionReason::EventClosed)
        );
    }

    #[test]
    fn test_release_reopens_full_event() {
        let mut e = event(1);
        assert!(e.try_reserve().is_accepted());
        assert_eq!(e.status, EventStatus::Full);

        assert_eq!(e.release().unwrap(), EventStatus::Open);
        assert_eq!(e.current_participants, 0);
        assert_eq!(e.release(), Err(DomainError::ParticipantCountUnderflow));
    }

    #[test]
    fn test_release_keeps_cancelled_status() {
        let mut e = event(2);
        e.try_reserve();
        e.cancel().unwrap();
        assert_eq!(e.release().unwrap(), EventStatus::Cancelled);
    }

    #[test]
    fn test_raising_capacity_reopens() {
        let mut e = event(1);
        e.try_reserve();
        assert_eq!(e.status, EventStatus::Full);

        assert_eq!(e.change_capacity(3).unwrap(), EventStatus::Open);
        assert_eq!(e.max_participants, 3);

        // shrinking back to the count fills it again
        assert_eq!(e.change_capacity(1).unwrap(), EventStatus::Full);
    }

    #[test]
    fn test_capacity_cannot_drop_below_count() {
        let mut e = event(4);
        e.try_reserve();
        e.try_reserve();
        assert_eq!(
            e.change_capacity(1),
            Err(DomainError::CapacityBelowParticipants {
                requested: 1,
                current: 2
            })
        );
        assert_eq!(e.max_participants, 4);
    }

    #[test]
    fn test_completed_is_terminal() {
        let mut e = event(2);
        e.try_reserve();
        e.complete().unwrap();

        assert_eq!(
            e.try_reserve(),
            SlotReservation::Rejected(RejectionReason::EventClosed)
        );
        assert_eq!(e.change_capacity(10), Err(DomainError::EventCompleted));
        assert_eq!(e.release(), Err(DomainError::EventCompleted));
        assert!(e.cancel().is_err());
        assert!(e.complete().is_err());

        e.remove();
        assert_eq!(e.status, EventStatus::Completed);
        assert_eq!(e.current_participants, 1);
    }

    #[test]
    fn test_cancelled_can_complete_but_not_cancel_again() {
        let mut e = event(2);
        e.cancel().unwrap();
        assert!(matches!(
            e.cancel(),
            Err(DomainError::InvalidStatusTransition { .. })
        ));
        e.complete().unwrap();
        assert_eq!(e.status, EventStatus::Completed);
    }

    #[test]
    fn test_derive_status() {
        assert_eq!(
            EventCapacity::derive_status(3, 3, EventStatus::Open),
            EventStatus::Full
        );
        assert_eq!(
            EventCapacity::derive_status(2, 3, EventStatus::Full),
            EventStatus::Open
        );
        assert_eq!(
            EventCapacity::derive_status(3, 3, EventStatus::Cancelled),
            EventStatus::Cancelled
        );
    }

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            EventStatus::Open,
            EventStatus::Full,
            EventStatus::Cancelled,
            EventStatus::Completed,
        ] {
            assert_eq!(status.as_str().parse::<EventStatus>().unwrap(), status);
        }
        assert!("archived".parse::<EventStatus>().is_err());
    }

    #[test]
    fn test_rejection_codes() {
        assert_eq!(RejectionReason::EventFull.code(), "event_full");
        assert_eq!(RejectionReason::PendingPayment.code(), "pending_payment");
        assert!(RejectionReason::PendingPayment
            .to_string()
            .contains("pending payment"));
    }
}
