use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use qa_core::errors::GatewayError;
use qa_core::report::Document;
use qa_core::worker::{Worker, WorkerCall, WorkerRole};

use crate::analyst::{Analyst, Invocation};
use crate::prompts;
use crate::recovery::parse_document;

/// Fail-soft bridge from a [`Worker`] transport to the [`Analyst`] contract.
///
/// Transport errors, timeouts and unparsable replies are logged and turned
/// into an empty document. A visual call carrying an attachment that fails
/// is repeated once without it.
pub struct WorkerAdapter {
    worker: Arc<dyn Worker>,
    timeout: Duration,
    text_model: String,
    video_model: String,
}

impl WorkerAdapter {
    pub fn new(worker: Arc<dyn Worker>, timeout: Duration, text_model: impl Into<String>, video_model: impl Into<String>) -> Self {
        Self {
            worker,
            timeout,
            text_model: text_model.into(),
            video_model: video_model.into(),
        }
    }

    pub fn text_model(&self) -> &str {
        &self.text_model
    }

    fn model_for(&self, invocation: &Invocation) -> String {
        if let Some(model) = invocation.model.as_ref().filter(|m| !m.is_empty()) {
            return model.clone();
        }
        match invocation.role {
            WorkerRole::VideoAnalyst => self.video_model.clone(),
            _ => self.text_model.clone(),
        }
    }

    fn build_call(&self, invocation: &Invocation) -> WorkerCall {
        let call = WorkerCall::new(
            invocation.role,
            self.model_for(invocation),
            prompts::instruction(invocation.role),
            prompts::render(invocation.task, &invocation.payload),
        );
        match &invocation.attachment {
            Some(attachment) if self.worker.supports_attachments() => call.with_attachment(attachment.clone()),
            _ => call,
        }
    }

    async fn call_once(&self, call: &WorkerCall) -> Result<String, GatewayError> {
        match tokio::time::timeout(self.timeout, self.worker.invoke(call)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(self.timeout)),
        }
    }

    async fn call_with_fallback(&self, call: &WorkerCall) -> Result<String, GatewayError> {
        match self.call_once(call).await {
            Err(e) if call.attachment.is_some() => {
                warn!(
                    worker = call.role.name(),
                    error_kind = e.error_kind(),
                    error = %e,
                    "call with attachment failed, retrying as text only"
                );
                self.call_once(&call.without_attachment()).await
            }
            other => other,
        }
    }
}

#[async_trait]
impl Analyst for WorkerAdapter {
    fn name(&self) -> &str {
        self.worker.name()
    }

    async fn invoke(&self, invocation: &Invocation) -> Document {
        let role = invocation.role.name();
        let call = self.build_call(invocation);
        let started = Instant::now();

        let text = match self.call_with_fallback(&call).await {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    worker = role,
                    error_kind = e.error_kind(),
                    error = %e,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "worker call failed"
                );
                return Document::new();
            }
        };

        match parse_document(&text) {
            Ok(doc) => {
                debug!(worker = role, elapsed_ms = started.elapsed().as_millis() as u64, "worker replied");
                doc
            }
            Err(e) => {
                warn!(worker = role, error = %e, reply_len = text.len(), "unparsable worker reply");
                Document::new()
            }
        }
    }
}
