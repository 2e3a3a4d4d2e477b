//! A scriptable in-memory payment gateway for tests.
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use crate::{
    db_types::GatewayDecision,
    traits::{GatewayError, GatewayOperation, GatewayRequest, PaymentGateway},
};

/// How the gateway answers one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockResponse {
    Approve,
    Decline(String),
    Unavailable,
    /// Wait before approving. Used to trip timeouts and widen race windows.
    Delay(Duration),
}

#[derive(Debug, Default)]
struct MockGatewayState {
    script: VecDeque<MockResponse>,
    calls: Vec<GatewayRequest>,
}

/// Answers calls from a script, approving everything once the script runs out. Every call is recorded.
///
/// Clones share state, so a test can keep a handle after moving the gateway into the API.
#[derive(Debug, Clone, Default)]
pub struct MockGateway {
    state: Arc<Mutex<MockGatewayState>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: MockResponse) -> &Self {
        self.state.lock().unwrap().script.push_back(response);
        self
    }

    pub fn calls(&self) -> Vec<GatewayRequest> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    pub fn calls_for(&self, operation: GatewayOperation) -> Vec<GatewayRequest> {
        self.calls().into_iter().filter(|c| c.operation == operation).collect()
    }
}

impl PaymentGateway for MockGateway {
    async fn process(&self, request: GatewayRequest) -> Result<GatewayDecision, GatewayError> {
        let (response, n) = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(request.clone());
            (state.script.pop_front().unwrap_or(MockResponse::Approve), state.calls.len())
        };
        let reference = format!("{}-{}-{n}", request.operation, request.transaction_id);
        match response {
            MockResponse::Approve => Ok(GatewayDecision::approved(reference)),
            MockResponse::Decline(code) => Ok(GatewayDecision::declined(code)),
            MockResponse::Unavailable => Err(GatewayError::Unavailable("mock gateway is down".into())),
            MockResponse::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(GatewayDecision::approved(reference))
            },
        }
    }
}
