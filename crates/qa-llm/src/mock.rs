use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use qa_core::errors::GatewayError;
use qa_core::worker::{Worker, WorkerCall, WorkerRole};

/// Pre-programmed replies for deterministic testing without API calls.
#[derive(Clone, Debug)]
pub enum MockReply {
    Text(String),
    Error(GatewayError),
    /// Wait a duration, then produce the inner reply.
    Delay(Duration, Box<MockReply>),
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self::Text(value.to_string())
    }

    pub fn delayed(delay: Duration, inner: MockReply) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Mock worker with a reply queue per role. Once a role's queue is drained
/// the default reply (an empty JSON object) is used.
pub struct MockWorker {
    queues: Mutex<HashMap<WorkerRole, VecDeque<MockReply>>>,
    default_reply: MockReply,
    calls: Mutex<Vec<WorkerCall>>,
    attachments: bool,
}

impl Default for MockWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl MockWorker {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            default_reply: MockReply::text("{}"),
            calls: Mutex::new(Vec::new()),
            attachments: false,
        }
    }

    /// Every unscripted call gets `reply`.
    pub fn with_default(mut self, reply: MockReply) -> Self {
        self.default_reply = reply;
        self
    }

    pub fn with_attachments(mut self, enabled: bool) -> Self {
        self.attachments = enabled;
        self
    }

    pub fn push(&self, role: WorkerRole, reply: MockReply) {
        self.queues.lock().entry(role).or_default().push_back(reply);
    }

    pub fn calls(&self) -> Vec<WorkerCall> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, role: WorkerRole) -> Vec<WorkerCall> {
        self.calls.lock().iter().filter(|c| c.role == role).cloned().collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn next_reply(&self, role: WorkerRole) -> MockReply {
        self.queues
            .lock()
            .get_mut(&role)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.default_reply.clone())
    }
}

#[async_trait]
impl Worker for MockWorker {
    fn name(&self) -> &str {
        "mock"
    }

    fn supports_attachments(&self) -> bool {
        self.attachments
    }

    async fn invoke(&self, call: &WorkerCall) -> Result<String, GatewayError> {
        self.calls.lock().push(call.clone());
        let mut reply = self.next_reply(call.role);
        loop {
            match reply {
                MockReply::Text(text) => return Ok(text),
                MockReply::Error(e) => return Err(e),
                MockReply::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
            }
        }
    }
}
