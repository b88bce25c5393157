//! Typed gateway notifications
//!
//! The raw webhook body is parsed into a closed set of variants before any
//! settlement logic runs. Unknown notification types are kept as `Other` so
//! the handler can acknowledge them.

use serde::Deserialize;
use serde_json::Value;

use crate::domain::CorrelationMetadata;

pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    #[error("Notification body is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Notification is missing field: {0}")]
    MissingField(&'static str),
}

/// Payment outcome reported with a completed checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutOutcome {
    Paid,
    /// Any other `payment_status` (e.g. "unpaid", "no_payment_required")
    NotPaid(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayNotification {
    CheckoutCompleted {
        notification_id: String,
        session_id: String,
        outcome: CheckoutOutcome,
        /// `None` when the metadata is absent or does not parse
        metadata: Option<CorrelationMetadata>,
        /// Session object as received, stored on the payment record
        snapshot: Value,
    },
    Other {
        notification_id: String,
        kind: String,
    },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    id: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    data: Option<EnvelopeData>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeData {
    object: Value,
}

impl GatewayNotification {
    pub fn parse(payload: &[u8]) -> Result<Self, NotificationError> {
        let envelope: Envelope = serde_json::from_slice(payload)
            .map_err(|e| NotificationError::InvalidJson(e.to_string()))?;

        let notification_id = envelope.id.unwrap_or_default();
        let kind = envelope.kind.ok_or(NotificationError::MissingField("type"))?;

        if kind != CHECKOUT_COMPLETED {
            return Ok(GatewayNotification::Other {
                notification_id,
                kind,
            });
        }

        let object = envelope
            .data
            .ok_or(NotificationError::MissingField("data"))?
            .object;

        let session_id = object
            .get("id")
            .and_then(Value::as_str)
            .ok_or(NotificationError::MissingField("data.object.id"))?
            .to_string();

        let outcome = match object.get("payment_status").and_then(Value::as_str) {
            Some("paid") => CheckoutOutcome::Paid,
            Some(other) => CheckoutOutcome::NotPaid(other.to_string()),
            None => return Err(NotificationError::MissingField("data.object.payment_status")),
        };

        let metadata = object.get("metadata").and_then(CorrelationMetadata::from_json);

        Ok(GatewayNotification::CheckoutCompleted {
            notification_id,
            session_id,
            outcome,
            metadata,
            snapshot: object,
        })
    }

    pub fn notification_id(&self) -> &str {
        match self {
            GatewayNotification::CheckoutCompleted {
                notification_id, ..
            }
            | GatewayNotification::Other {
                notification_id, ..
            } => notification_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn completed(payment_status: &str, metadata: Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {
                "object": {
                    "id": "cs_test_1",
                    "payment_status": payment_status,
                    "metadata": metadata
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_paid_checkout() {
        let event_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let payment_record_id = Uuid::new_v4();
        let body = completed(
            "paid",
            json!({
                "event_id": event_id.to_string(),
                "user_id": user_id.to_string(),
                "payment_record_id": payment_record_id.to_string()
            }),
        );

        match GatewayNotification::parse(&body).unwrap() {
            GatewayNotification::CheckoutCompleted {
                session_id,
                outcome,
                metadata,
                ..
            } => {
                assert_eq!(session_id, "cs_test_1");
                assert_eq!(outcome, CheckoutOutcome::Paid);
                assert_eq!(
                    metadata,
                    Some(CorrelationMetadata {
                        event_id,
                        user_id,
                        payment_record_id
                    })
                );
            }
            other => panic!("unexpected notification: {other:?}"),
        }
    }

    #[test]
    fn test_parse_unpaid_checkout_without_metadata() {
        let body = completed("unpaid", json!({}));

        match GatewayNotification::parse(&body).unwrap() {
            GatewayNotification::CheckoutCompleted {
                outcome, metadata, ..
            } => {
                assert_eq!(outcome, CheckoutOutcome::NotPaid("unpaid".to_string()));
                assert!(metadata.is_none());
            }
            other => panic!("unexpected notification: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_is_other() {
        let body = br#"{"id":"evt_2","type":"charge.refunded","data":{"object":{}}}"#;
        let notification = GatewayNotification::parse(body).unwrap();

        assert_eq!(
            notification,
            GatewayNotification::Other {
                notification_id: "evt_2".to_string(),
                kind: "charge.refunded".to_string()
            }
        );
        assert_eq!(notification.notification_id(), "evt_2");
    }

    #[test]
    fn test_invalid_payloads() {
        assert!(matches!(
            GatewayNotification::parse(b"not json"),
            Err(NotificationError::InvalidJson(_))
        ));
        assert_eq!(
            GatewayNotification::parse(br#"{"id":"evt_3"}"#),
            Err(NotificationError::MissingField("type"))
        );
        assert_eq!(
            GatewayNotification::parse(
                br#"{"type":"checkout.session.completed","data":{"object":{"id":"cs_1"}}}"#
            ),
            Err(NotificationError::MissingField("data.object.payment_status"))
        );
    }
}
