//! Instruction templates per worker role and the prompt envelope.

use qa_core::worker::WorkerRole;
use serde_json::Value;

const LOG_ANALYST: &str = r#"You review console and network events captured during a QA testing session and report errors, warnings and anomalies.

Reply with a JSON object:
{
  "summary": "short description of what the logs show",
  "issues": [
    {"title": "...", "severity": "low|medium|high", "detail": "...", "ts": "...",
     "source": "console|network", "category": "error|warning|performance|security"}
  ],
  "evidence": [
    {"type": "console|network", "message": "message or URL", "ts": "...", "status": "HTTP status for network events"}
  ]
}

Rank errors above warnings, group repeated failures into one issue, keep timestamps for correlation,
and skip anything already listed in the checkpoint context."#;

const VIDEO_ANALYST: &str = r#"You review the screen recording of a QA testing session for visual and UX problems:
rendering glitches, layout shifts, broken layouts, accessibility gaps and confusing flows.

Reply with a JSON object:
{
  "summary": "short description of the visual findings",
  "issues": [
    {"title": "...", "severity": "low|medium|high", "detail": "...", "timestamp_start": "...",
     "timestamp_end": "...", "ui_area": "Header|Sidebar|Modal|Form|...", "confidence": "low|medium|high"}
  ],
  "evidence": [
    {"type": "visual|layout|animation|accessibility", "timestamp": "...", "description": "..."}
  ]
}

Markers and annotations in the input are tester notes about what they saw. When no recording is
attached, say so in the summary and return empty lists."#;

const REPRO_PLANNER: &str = r#"You turn user interactions, markers and tester annotations into reproduction steps.

Reply with a JSON object:
{
  "summary": "short description of the flow",
  "repro_steps": ["Navigate to ...", "Click ...", "Enter ... in ...", "Expected: ...", "Actual: ..."]
}

Start from the entry point, name the selectors or elements involved, include entered data,
state expected and actual behaviour when known, and keep each step short."#;

const SYNTHESIZER: &str = r#"You merge the findings of the log, video and repro workers into one assessment.

Reply with a JSON object:
{
  "summary": "two or three sentence executive summary",
  "suspected_root_cause": "most likely cause given the evidence",
  "severity_breakdown": {"high": 0, "medium": 0, "low": 0},
  "top_issues": [
    {"title": "...", "severity": "high|medium|low", "detail": "...", "source": "log_analyst|video_analyst"}
  ]
}

Correlate logs with visual findings, order by severity and impact, and list at most five top issues."#;

const QA_CHAT: &str = r#"You help testers investigate issues from a QA session using the session context,
prior analysis, recent events and checkpoint summary provided.

Reply with a JSON object:
{
  "reply": "answer to the tester",
  "suggested_next_steps": ["...", "..."]
}

Be concise, cite concrete evidence when there is some, and follow the instruction for the requested mode."#;

pub fn instruction(role: WorkerRole) -> &'static str {
    match role {
        WorkerRole::LogAnalyst => LOG_ANALYST,
        WorkerRole::VideoAnalyst => VIDEO_ANALYST,
        WorkerRole::ReproPlanner => REPRO_PLANNER,
        WorkerRole::Synthesizer => SYNTHESIZER,
        WorkerRole::QaChat => QA_CHAT,
    }
}

pub const TASK_LOGS: &str = "Analyze console/network logs.";
pub const TASK_VIDEO: &str = "Analyze video for UI/UX issues.";
pub const TASK_REPRO: &str = "Generate repro steps.";
pub const TASK_CHUNK_SYNTHESIS: &str = "Summarize findings.";
pub const TASK_SESSION_SYNTHESIS: &str = "Summarize session-level findings.";
pub const TASK_CHAT: &str = "Answer the tester's message.";

/// `"{task}\n\nReturn ONLY valid JSON. Input JSON:\n{payload}"`
pub fn render(task: &str, payload: &Value) -> String {
    format!("{task}\n\nReturn ONLY valid JSON. Input JSON:\n{payload}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn render_embeds_compact_payload() {
        let prompt = render(TASK_REPRO, &json!({"events": [], "chunk": {"id": "c1"}}));
        assert!(prompt.starts_with("Generate repro steps.\n\nReturn ONLY valid JSON. Input JSON:\n{"));
        assert!(prompt.contains(r#""chunk":{"id":"c1"}"#));
        assert_eq!(prompt.lines().count(), 4);
    }

    #[test]
    fn every_role_names_its_reply_keys() {
        assert!(instruction(WorkerRole::LogAnalyst).contains("\"evidence\""));
        assert!(instruction(WorkerRole::VideoAnalyst).contains("\"issues\""));
        assert!(instruction(WorkerRole::ReproPlanner).contains("\"repro_steps\""));
        assert!(instruction(WorkerRole::Synthesizer).contains("\"suspected_root_cause\""));
        assert!(instruction(WorkerRole::QaChat).contains("\"suggested_next_steps\""));
    }
}
