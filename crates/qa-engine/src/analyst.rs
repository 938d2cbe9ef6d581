use async_trait::async_trait;
use serde_json::Value;

use qa_core::report::{Document, WorkerOutput};
use qa_core::worker::{Attachment, WorkerRole};

/// One role invocation as the coordinator sees it.
#[derive(Clone, Debug)]
pub struct Invocation {
    pub role: WorkerRole,
    pub task: &'static str,
    pub payload: Value,
    pub attachment: Option<Attachment>,
    /// Overrides the role's configured model.
    pub model: Option<String>,
}

impl Invocation {
    pub fn new(role: WorkerRole, task: &'static str, payload: Value) -> Self {
        Self {
            role,
            task,
            payload,
            attachment: None,
            model: None,
        }
    }
}

/// Something that can play every worker role: the model-backed adapter or
/// the deterministic rule set. Both yield the same document shapes.
#[async_trait]
pub trait Analyst: Send + Sync {
    fn name(&self) -> &str;

    /// Never fails; any problem yields an empty document.
    async fn invoke(&self, invocation: &Invocation) -> Document;

    async fn analyze(&self, invocation: &Invocation) -> WorkerOutput {
        let doc = self.invoke(invocation).await;
        WorkerOutput::from_document(invocation.role.name(), &doc)
    }
}
