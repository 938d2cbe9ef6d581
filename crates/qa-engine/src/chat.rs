//! Conversational path: one chat worker call over the session's context.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, instrument};

use qa_core::events::{Event, Session};
use qa_core::ids::SessionId;
use qa_core::report::strings;
use qa_core::worker::WorkerRole;

use crate::analyst::Invocation;
use crate::error::EngineError;
use crate::filter::{trim_events, EVENT_WINDOW};
use crate::pipeline::Coordinator;
use crate::prompts;

const NO_RESPONSE: &str = "No response generated.";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    #[default]
    Investigate,
    Summarize,
    Triage,
    #[serde(other)]
    Default,
}

impl ChatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Investigate => "investigate",
            Self::Summarize => "summarize",
            Self::Triage => "triage",
            Self::Default => "default",
        }
    }

    pub fn instruction(&self) -> &'static str {
        match self {
            Self::Summarize => "Summarize the session and highlight the most important issues.",
            Self::Triage => "List top issues with severity and likely impact. Be concise.",
            Self::Investigate | Self::Default => "You are a QA exploratory testing assistant. Respond succinctly.",
        }
    }
}

fn default_model_name() -> String {
    "default".to_string()
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChatParams {
    #[serde(default)]
    pub session: Session,
    #[serde(default)]
    pub analysis: Value,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub mode: ChatMode,
    #[serde(default = "default_model_name")]
    pub model: String,
}

impl ChatParams {
    pub fn new(session: Session, message: impl Into<String>) -> Self {
        Self {
            session,
            message: message.into(),
            model: default_model_name(),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
    pub suggested_next_steps: Vec<String>,
    pub mode: ChatMode,
    pub model: String,
    pub session_id: SessionId,
}

/// `default`, `auto` and blank all mean "the configured text model".
pub fn pick_model<'a>(requested: &'a str, configured: &'a str) -> &'a str {
    match requested.trim() {
        "" | "default" | "auto" => configured,
        other => other,
    }
}

impl Coordinator {
    #[instrument(skip_all, fields(session_id = %params.session.id, mode = params.mode.as_str()))]
    pub async fn chat(&self, params: ChatParams) -> Result<ChatReply, EngineError> {
        let model = pick_model(&params.model, self.default_model()).to_string();
        let checkpoint = self.checkpoint_context(&params.session.id).await?;
        let analysis = if params.analysis.is_null() { json!({}) } else { params.analysis };

        let mut invocation = Invocation::new(
            WorkerRole::QaChat,
            prompts::TASK_CHAT,
            json!({
                "instruction": params.mode.instruction(),
                "mode": params.mode,
                "user_message": params.message,
                "session": params.session,
                "analysis": analysis,
                "events": trim_events(&params.events, EVENT_WINDOW),
                "checkpoint": checkpoint,
            }),
        );
        invocation.model = Some(model.clone());

        let doc = self.analyst().invoke(&invocation).await;
        let reply = doc
            .get("reply")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(NO_RESPONSE)
            .to_string();
        let suggested_next_steps = strings(doc.get("suggested_next_steps"));
        info!(model = %model, steps = suggested_next_steps.len(), "chat answered");

        Ok(ChatReply {
            reply,
            suggested_next_steps,
            mode: params.mode,
            model,
            session_id: params.session.id,
        })
    }
}
