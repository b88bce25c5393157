//! Payment gateway adapter
//!
//! The gateway hosts the checkout page and later tells us, via signed
//! notifications, whether the user paid. Only session creation is an outbound
//! call; everything else arrives through `/webhooks/payments`.

mod mock;
mod notification;
mod signature;
mod stripe;

pub use mock::MockGateway;
pub use notification::{CheckoutOutcome, GatewayNotification, NotificationError};
pub use signature::{sign_payload, verify_signature, SignatureError, SIGNATURE_HEADER};
pub use stripe::StripeGateway;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Amount, CorrelationMetadata};

/// Checkout session request
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub payment_record_id: Uuid,
    pub amount: Amount,
    pub currency: String,
    pub description: String,
    pub metadata: CorrelationMetadata,
}

/// Checkout session as issued by the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub session_id: String,
    pub checkout_url: String,
}

/// Gateway errors
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Gateway request failed: {0}")]
    Transport(String),

    #[error("Gateway rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Unexpected gateway response: {0}")]
    InvalidResponse(String),
}

/// Outbound port to the payment provider
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a hosted checkout session carrying `metadata` so that the
    /// provider echoes it back in its notifications
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError>;
}
