use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::GatewayError;

/// The fixed set of specialized analysis roles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerRole {
    LogAnalyst,
    VideoAnalyst,
    ReproPlanner,
    Synthesizer,
    QaChat,
}

impl WorkerRole {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LogAnalyst => "log_analyst",
            Self::VideoAnalyst => "video_analyst",
            Self::ReproPlanner => "repro_planner",
            Self::Synthesizer => "synthesizer",
            Self::QaChat => "qa_chat",
        }
    }
}

/// Media reference passed alongside a visual worker's prompt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub uri: String,
    pub mime_type: String,
}

/// One request to a worker backend.
#[derive(Clone, Debug)]
pub struct WorkerCall {
    pub role: WorkerRole,
    pub model: String,
    pub instruction: String,
    pub prompt: String,
    pub attachment: Option<Attachment>,
}

impl WorkerCall {
    pub fn new(role: WorkerRole, model: impl Into<String>, instruction: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            role,
            model: model.into(),
            instruction: instruction.into(),
            prompt: prompt.into(),
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn without_attachment(&self) -> Self {
        Self {
            attachment: None,
            ..self.clone()
        }
    }
}

/// A text-in, text-out model backend. Replies are expected to contain JSON
/// but nothing here enforces it; recovery happens in the engine.
#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> &str;

    /// Whether `WorkerCall::attachment` is forwarded to the model.
    fn supports_attachments(&self) -> bool {
        false
    }

    async fn invoke(&self, call: &WorkerCall) -> Result<String, GatewayError>;
}
