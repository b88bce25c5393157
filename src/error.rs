//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::audit::AuditLogError;
use crate::domain::{DomainError, RejectionReason};
use crate::gateway::{GatewayError, NotificationError, SignatureError};
use crate::ledger::LedgerError;
use crate::payments::PaymentStoreError;
use crate::revenue::RevenueError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Missing required header: {0}")]
    MissingHeader(String),

    #[error("Event not found: {0}")]
    EventNotFound(Uuid),

    #[error("Payment not found: {0}")]
    PaymentNotFound(Uuid),

    #[error("Settlement anomaly not found: {0}")]
    AnomalyNotFound(Uuid),

    #[error("Settlement anomaly already resolved: {0}")]
    AnomalyAlreadyResolved(Uuid),

    /// Join refused by an admission rule
    #[error("Join rejected: {}", .0.message())]
    Rejected(RejectionReason),

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    #[error("Invalid webhook payload: {0}")]
    InvalidNotification(#[from] NotificationError),

    // Domain errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    // 502
    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    // Server errors (5xx)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::EventNotFound(id) => AppError::EventNotFound(id),
            LedgerError::Domain(e) => AppError::Domain(e),
            LedgerError::Database(e) => AppError::Database(e),
            LedgerError::CorruptRow { .. } => AppError::Internal(err.to_string()),
        }
    }
}

impl From<PaymentStoreError> for AppError {
    fn from(err: PaymentStoreError) -> Self {
        match err {
            PaymentStoreError::NotFound(id) => AppError::PaymentNotFound(id),
            PaymentStoreError::ActiveUnpaidExists => {
                AppError::Rejected(RejectionReason::PendingPayment)
            }
            PaymentStoreError::Domain(e) => AppError::Domain(e),
            PaymentStoreError::Database(e) => AppError::Database(e),
            PaymentStoreError::CorruptRow { .. } => AppError::Internal(err.to_string()),
        }
    }
}

impl From<RevenueError> for AppError {
    fn from(err: RevenueError) -> Self {
        match err {
            RevenueError::AnomalyNotFound(id) => AppError::AnomalyNotFound(id),
            RevenueError::AnomalyAlreadyResolved(id) => AppError::AnomalyAlreadyResolved(id),
            RevenueError::Database(e) => AppError::Database(e),
        }
    }
}

impl From<AuditLogError> for AppError {
    fn from(err: AuditLogError) -> Self {
        match err {
            AuditLogError::Database(e) => AppError::Database(e),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str, Option<String>) {
        match self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }
            AppError::MissingHeader(header) => {
                (StatusCode::BAD_REQUEST, "missing_header", Some(header.clone()))
            }
            AppError::InvalidSignature(e) => {
                (StatusCode::BAD_REQUEST, "invalid_signature", Some(e.to_string()))
            }
            AppError::InvalidNotification(e) => {
                (StatusCode::BAD_REQUEST, "invalid_notification", Some(e.to_string()))
            }

            // 401 Unauthorized
            AppError::InvalidApiKey => (StatusCode::UNAUTHORIZED, "invalid_api_key", None),

            // 403 Forbidden
            AppError::PermissionDenied => (StatusCode::FORBIDDEN, "permission_denied", None),

            // 404 Not Found
            AppError::EventNotFound(id) => {
                (StatusCode::NOT_FOUND, "event_not_found", Some(id.to_string()))
            }
            AppError::PaymentNotFound(id) => {
                (StatusCode::NOT_FOUND, "payment_not_found", Some(id.to_string()))
            }
            AppError::AnomalyNotFound(id) => {
                (StatusCode::NOT_FOUND, "anomaly_not_found", Some(id.to_string()))
            }

            // 409 Conflict
            AppError::AnomalyAlreadyResolved(id) => {
                (StatusCode::CONFLICT, "anomaly_already_resolved", Some(id.to_string()))
            }
            AppError::Rejected(reason) => (StatusCode::CONFLICT, reason.code(), None),

            // Domain errors - map to appropriate HTTP status
            AppError::Domain(domain_err) => match domain_err {
                DomainError::InvalidCapacity(msg) => {
                    (StatusCode::BAD_REQUEST, "invalid_capacity", Some(msg.clone()))
                }
                DomainError::InvalidFee(e) => {
                    (StatusCode::BAD_REQUEST, "invalid_fee", Some(e.to_string()))
                }
                DomainError::CapacityBelowParticipants { .. } => (
                    StatusCode::CONFLICT,
                    "capacity_below_participants",
                    Some(domain_err.to_string()),
                ),
                DomainError::InvalidStatusTransition { .. } => (
                    StatusCode::CONFLICT,
                    "invalid_status_transition",
                    Some(domain_err.to_string()),
                ),
                DomainError::EventCompleted => (StatusCode::CONFLICT, "event_completed", None),
                DomainError::NoActiveParticipant => {
                    (StatusCode::NOT_FOUND, "participant_not_found", None)
                }
                DomainError::PaymentNotCancellable(msg) => (
                    StatusCode::CONFLICT,
                    "payment_not_cancellable",
                    Some(msg.clone()),
                ),
                DomainError::Unauthorized(msg) => {
                    (StatusCode::FORBIDDEN, "unauthorized", Some(msg.clone()))
                }
                DomainError::UnknownStatus(_) | DomainError::ParticipantCountUnderflow => {
                    tracing::error!("Domain invariant violated: {}", domain_err);
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
                }
            },

            // 502 Bad Gateway
            AppError::Gateway(e) => {
                tracing::error!("Payment gateway error: {}", e);
                (StatusCode::BAD_GATEWAY, "payment_gateway_error", None)
            }

            // 500 Internal Server Error
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", None)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = self.status_and_code();

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_maps_to_conflict_with_reason_code() {
        let (status, code, _) = AppError::Rejected(RejectionReason::EventFull).status_and_code();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(code, RejectionReason::EventFull.code());
    }

    #[test]
    fn test_signature_failure_is_bad_request() {
        let err = AppError::from(SignatureError::Mismatch);
        assert_eq!(err.status_and_code().0, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_gateway_failure_is_bad_gateway() {
        let err = AppError::from(GatewayError::Transport("timeout".to_string()));
        assert_eq!(err.status_and_code().0, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_layer_errors_convert() {
        let id = Uuid::new_v4();
        assert!(matches!(
            AppError::from(LedgerError::EventNotFound(id)),
            AppError::EventNotFound(found) if found == id
        ));
        assert!(matches!(
            AppError::from(PaymentStoreError::ActiveUnpaidExists),
            AppError::Rejected(RejectionReason::PendingPayment)
        ));
        assert!(matches!(
            AppError::from(RevenueError::AnomalyNotFound(id)),
            AppError::AnomalyNotFound(_)
        ));
    }

    #[test]
    fn test_domain_status_codes() {
        let (status, code, _) = AppError::Domain(DomainError::EventCompleted).status_and_code();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(code, "event_completed");

        let (status, _, _) =
            AppError::Domain(DomainError::Unauthorized("not host".into())).status_and_code();
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
