//! In-process gateway for tests and load testing

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{CheckoutRequest, CheckoutSession, GatewayError, PaymentGateway};

/// Records every checkout request and answers with a deterministic session
#[derive(Debug, Default)]
pub struct MockGateway {
    requests: Mutex<Vec<CheckoutRequest>>,
    failing: AtomicBool,
    fixed_session_id: Mutex<Option<String>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent calls fail with a transport error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Answer every call with the same session id (None restores the default)
    pub fn set_fixed_session_id(&self, session_id: Option<String>) {
        if let Ok(mut fixed) = self.fixed_session_id.lock() {
            *fixed = session_id;
        }
    }

    pub fn requests(&self) -> Vec<CheckoutRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn session_id_for(request: &CheckoutRequest) -> String {
        format!("cs_mock_{}", request.payment_record_id.simple())
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("mock gateway unavailable".to_string()));
        }

        let fixed = self
            .fixed_session_id
            .lock()
            .ok()
            .and_then(|fixed| fixed.clone());
        let session_id = fixed.unwrap_or_else(|| Self::session_id_for(&request));
        let session = CheckoutSession {
            checkout_url: format!("https://checkout.mock/pay/{session_id}"),
            session_id,
        };

        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        Ok(session)
    }
}
