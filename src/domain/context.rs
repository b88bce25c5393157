//! Operation Context
//!
//! Who is acting and under which request, carried into audit rows and logs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DomainError;

/// Context for an operation, used for authorization, auditing and tracing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationContext {
    /// API key ID used for this request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_id: Option<Uuid>,

    /// End user on whose behalf the presentation layer calls (X-Request-User-Id)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_user_id: Option<Uuid>,

    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,

    /// Set when the API key carries the `admin` permission
    #[serde(default)]
    pub is_admin: bool,
}

impl OperationContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for work triggered by the payment gateway rather than a caller
    pub fn system(correlation_id: Uuid) -> Self {
        Self::new().with_correlation_id(correlation_id)
    }

    pub fn with_api_key(mut self, api_key_id: Uuid) -> Self {
        self.api_key_id = Some(api_key_id);
        self
    }

    pub fn with_request_user(mut self, user_id: Uuid) -> Self {
        self.request_user_id = Some(user_id);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn as_admin(mut self) -> Self {
        self.is_admin = true;
        self
    }

    /// The acting end user, required by user-facing operations
    pub fn acting_user(&self) -> Result<Uuid, DomainError> {
        self.request_user_id
            .ok_or_else(|| DomainError::Unauthorized("request user is required".to_string()))
    }

    /// Host-level operations are allowed for the event's host and for admins
    pub fn ensure_can_manage(&self, host_id: Uuid) -> Result<(), DomainError> {
        if self.is_admin || self.request_user_id == Some(host_id) {
            Ok(())
        } else {
            Err(DomainError::Unauthorized(
                "only the host or an admin may manage this event".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_builder() {
        let api_key_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        let context = OperationContext::new()
            .with_api_key(api_key_id)
            .with_request_user(user_id);

        assert_eq!(context.api_key_id, Some(api_key_id));
        assert_eq!(context.acting_user().unwrap(), user_id);
        assert!(!context.is_admin);
    }

    #[test]
    fn test_acting_user_required() {
        let context = OperationContext::new();
        assert!(matches!(context.acting_user(), Err(DomainError::Unauthorized(_))));
    }

    #[test]
    fn test_manage_rules() {
        let host = Uuid::new_v4();
        let stranger = Uuid::new_v4();

        assert!(OperationContext::new().with_request_user(host).ensure_can_manage(host).is_ok());
        assert!(OperationContext::new()
            .with_request_user(stranger)
            .ensure_can_manage(host)
            .is_err());
        assert!(OperationContext::new().as_admin().ensure_can_manage(host).is_ok());
    }
}
