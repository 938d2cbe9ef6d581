//! Deterministic analysts used when no model backend is available.
//!
//! They read the same payloads and return the same document shapes as the
//! model-backed workers, so the coordinator treats both identically.

use async_trait::async_trait;
use serde_json::{json, Value};

use qa_core::events::{Event, EventKind};
use qa_core::report::Document;
use qa_core::worker::WorkerRole;

use crate::analyst::{Analyst, Invocation};

pub const DISABLED_PREFIX: &str = "ADK is disabled. ";

#[derive(Clone, Copy, Debug, Default)]
pub struct RuleAnalyst;

impl RuleAnalyst {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Analyst for RuleAnalyst {
    fn name(&self) -> &str {
        "rules"
    }

    async fn invoke(&self, invocation: &Invocation) -> Document {
        let payload = &invocation.payload;
        let doc = match invocation.role {
            WorkerRole::LogAnalyst => log_findings(&payload_events(payload)),
            WorkerRole::VideoAnalyst => json!({"summary": "Video analysis stub."}),
            WorkerRole::ReproPlanner => repro_findings(&payload_events(payload)),
            WorkerRole::Synthesizer => synthesize(payload),
            WorkerRole::QaChat => chat_reply(payload),
        };
        match doc {
            Value::Object(map) => map,
            _ => Document::new(),
        }
    }
}

fn payload_events(payload: &Value) -> Vec<Event> {
    payload
        .get("events")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

/// Console events at `error`/`fatal` level or mentioning "error", and
/// network events with status >= 400.
pub fn is_error_event(event: &Event) -> bool {
    match event.kind {
        EventKind::Console => {
            let level = event.field_text("level").unwrap_or_default().to_lowercase();
            let message = event.field_text("message").unwrap_or_default().to_lowercase();
            matches!(level.as_str(), "error" | "fatal") || message.contains("error")
        }
        EventKind::Network => event
            .field("status")
            .and_then(Value::as_f64)
            .is_some_and(|status| status >= 400.0),
        _ => false,
    }
}

fn log_findings(events: &[Event]) -> Value {
    let mut issues = Vec::new();
    let mut evidence = Vec::new();
    for event in events.iter().filter(|e| is_error_event(e)) {
        match event.kind {
            EventKind::Console => {
                let message = event.field_text("message").unwrap_or_default();
                issues.push(json!({
                    "title": "Console error detected",
                    "severity": "medium",
                    "detail": message,
                    "ts": event.ts,
                }));
                evidence.push(json!({"type": "console", "message": message, "ts": event.ts}));
            }
            EventKind::Network => {
                let status = event.field("status").cloned().unwrap_or(Value::Null);
                let url = event.field_text("url").unwrap_or_default();
                let status_text = event.field_text("status").unwrap_or_default();
                issues.push(json!({
                    "title": "Network error detected",
                    "severity": "medium",
                    "detail": format!("{status_text} {url}"),
                    "ts": event.ts,
                }));
                evidence.push(json!({"type": "network", "status": status, "url": url, "ts": event.ts}));
            }
            _ => {}
        }
    }
    let summary = if issues.is_empty() {
        "No console errors detected."
    } else {
        "Console errors detected in this chunk."
    };
    json!({"summary": summary, "issues": issues, "evidence": evidence})
}

fn repro_step(event: &Event) -> Option<String> {
    let step = match event.kind {
        EventKind::Interaction => {
            let action = event.field_text("action").unwrap_or_default();
            let selector = event.field_text("selector").unwrap_or_default();
            format!("{action} {selector}").trim().to_string()
        }
        EventKind::Marker => {
            let label = event
                .field_text("label")
                .filter(|s| !s.is_empty())
                .or_else(|| event.field_text("message"))?;
            format!("Marker: {label}")
        }
        EventKind::Annotation => format!("Annotation: {}", event.field_text("text")?),
        _ => return None,
    };
    Some(step).filter(|s| !s.is_empty() && !s.ends_with(": "))
}

fn repro_findings(events: &[Event]) -> Value {
    let steps: Vec<String> = events.iter().filter_map(repro_step).collect();
    let summary = if steps.is_empty() {
        "No interaction steps captured."
    } else {
        "Repro steps derived from interaction events."
    };
    json!({"summary": summary, "repro_steps": steps})
}

/// Chunk synthesis only. Session payloads (they carry `chunk_count`) get an
/// empty reply so the coordinator's defaults apply.
fn synthesize(payload: &Value) -> Value {
    if payload.get("chunk_count").is_some() {
        return json!({});
    }
    let issues = payload.get("issues").and_then(Value::as_array).cloned().unwrap_or_default();
    if issues.is_empty() {
        return json!({"summary": "No obvious issues detected in this chunk."});
    }
    let root_cause = issues[0].get("detail").and_then(Value::as_str).unwrap_or_default();
    json!({
        "summary": "Potential issues detected in this chunk.",
        "suspected_root_cause": root_cause,
    })
}

fn chat_reply(payload: &Value) -> Value {
    let summary = ["/analysis/summary", "/checkpoint/summary"]
        .iter()
        .filter_map(|pointer| payload.pointer(pointer).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty());
    let reply = match summary {
        Some(summary) => format!("{DISABLED_PREFIX}Latest analysis summary: {summary}"),
        None => format!("{DISABLED_PREFIX}No analysis summary available yet."),
    };
    json!({"reply": reply, "suggested_next_steps": []})
}
