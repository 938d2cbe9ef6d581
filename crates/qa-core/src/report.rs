//! Worker outputs and the reports merged from them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::{ChunkId, SessionId};

/// Schema-by-convention record (`title`, `severity`, `detail`, `ts`, ...).
/// The core passes these through; only `severity` is ever inspected.
pub type Document = Map<String, Value>;
pub type Issue = Document;
pub type Evidence = Document;

/// Counts per severity bucket.
pub type SeverityBreakdown = BTreeMap<String, i64>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    High,
    Medium,
    Low,
    Unknown,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Self::High, Self::Medium, Self::Low, Self::Unknown];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Unknown => "unknown",
        }
    }

    /// Bucket an issue by its `severity` field. Missing, non-string or
    /// unrecognized values land in `Unknown`.
    pub fn of(issue: &Issue) -> Self {
        let raw = issue.get("severity").and_then(Value::as_str).unwrap_or_default();
        match raw.trim().to_lowercase().as_str() {
            "high" => Self::High,
            "medium" => Self::Medium,
            "low" => Self::Low,
            _ => Self::Unknown,
        }
    }
}

/// Histogram of `issues` over all four buckets (zeros included).
pub fn severity_breakdown(issues: &[Issue]) -> SeverityBreakdown {
    let mut breakdown: SeverityBreakdown = Severity::ALL.iter().map(|s| (s.as_str().to_string(), 0)).collect();
    for issue in issues {
        *breakdown.entry(Severity::of(issue).as_str().to_string()).or_insert(0) += 1;
    }
    breakdown
}

/// Result of exactly one worker invocation.
///
/// Always well-formed: a failed or unparsable invocation is represented by
/// empty collections and an empty summary, so merge code never has to ask
/// whether a worker ran.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerOutput {
    pub name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    #[serde(default)]
    pub repro_steps: Vec<String>,
    #[serde(rename = "suspected_root_cause", default)]
    pub root_cause: Option<String>,
    #[serde(default)]
    pub severity_breakdown: Option<SeverityBreakdown>,
    #[serde(default)]
    pub top_issues: Option<Vec<Issue>>,
}

impl WorkerOutput {
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Coerce a parsed worker reply into the output contract. Fields that
    /// are missing or have the wrong shape become their empty default.
    pub fn from_document(name: impl Into<String>, doc: &Document) -> Self {
        Self {
            name: name.into(),
            summary: doc.get("summary").map(text_or_empty).unwrap_or_default(),
            issues: documents(doc.get("issues")),
            evidence: documents(doc.get("evidence")),
            repro_steps: strings(doc.get("repro_steps")),
            root_cause: doc
                .get("suspected_root_cause")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            severity_breakdown: breakdown(doc.get("severity_breakdown")),
            top_issues: Some(documents(doc.get("top_issues"))).filter(|v| !v.is_empty()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.summary.is_empty()
            && self.issues.is_empty()
            && self.evidence.is_empty()
            && self.repro_steps.is_empty()
            && self.root_cause.is_none()
            && self.severity_breakdown.is_none()
            && self.top_issues.is_none()
    }
}

fn text_or_empty(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn documents(value: Option<&Value>) -> Vec<Document> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(|v| v.as_object().cloned()).collect(),
        _ => Vec::new(),
    }
}

/// Coerce a JSON array into a list of strings. Non-string scalars are
/// rendered as text; nested objects and arrays are dropped.
pub fn strings(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(text_or_empty)
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn breakdown(value: Option<&Value>) -> Option<SeverityBreakdown> {
    let map = value?.as_object()?;
    let counts: SeverityBreakdown = map
        .iter()
        .filter_map(|(k, v)| {
            let n = v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))?;
            Some((k.to_lowercase(), n))
        })
        .collect();
    Some(counts).filter(|c| !c.is_empty())
}

/// Merged view of one chunk. Immutable once built; the unit appended to a
/// checkpoint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkReport {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub suspected_root_cause: Option<String>,
    #[serde(default)]
    pub severity_breakdown: SeverityBreakdown,
    #[serde(default)]
    pub top_issues: Vec<Issue>,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    #[serde(default)]
    pub repro_steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agents: Vec<WorkerOutput>,
    #[serde(default)]
    pub chunk_id: Option<ChunkId>,
    #[serde(default)]
    pub chunk_idx: Option<i64>,
    #[serde(default)]
    pub session_id: Option<SessionId>,
}

/// Session-level roll-up over all chunk reports.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub summary: String,
    #[serde(default)]
    pub suspected_root_cause: Option<String>,
    pub severity_breakdown: SeverityBreakdown,
    pub top_issues: Vec<Issue>,
    pub issues: Vec<Issue>,
    pub evidence: Vec<Evidence>,
    pub repro_steps: Vec<String>,
    #[serde(default)]
    pub chunk_count: usize,
    #[serde(default)]
    pub session_id: Option<SessionId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issue(severity: Value) -> Issue {
        json!({"title": "x", "severity": severity}).as_object().cloned().unwrap()
    }

    #[test]
    fn severity_buckets_are_case_insensitive() {
        assert_eq!(Severity::of(&issue(json!("HIGH"))), Severity::High);
        assert_eq!(Severity::of(&issue(json!(" Medium "))), Severity::Medium);
        assert_eq!(Severity::of(&issue(json!("critical"))), Severity::Unknown);
        assert_eq!(Severity::of(&issue(json!(3))), Severity::Unknown);
        assert_eq!(Severity::of(&Issue::new()), Severity::Unknown);
    }

    #[test]
    fn breakdown_includes_all_buckets() {
        let issues = vec![issue(json!("high")), issue(json!("low")), issue(json!("low")), issue(json!(null))];
        let breakdown = severity_breakdown(&issues);
        assert_eq!(breakdown["high"], 1);
        assert_eq!(breakdown["medium"], 0);
        assert_eq!(breakdown["low"], 2);
        assert_eq!(breakdown["unknown"], 1);
        assert_eq!(breakdown.len(), 4);
    }

    #[test]
    fn from_document_reads_well_formed_reply() {
        let doc = json!({
            "summary": "Two errors",
            "issues": [{"title": "a", "severity": "high"}],
            "evidence": [{"type": "console", "message": "boom"}],
            "repro_steps": ["open page", "click save"],
            "suspected_root_cause": "missing handler",
            "severity_breakdown": {"High": 1, "low": 0},
            "top_issues": [{"title": "a"}]
        });
        let out = WorkerOutput::from_document("synthesizer", doc.as_object().unwrap());
        assert_eq!(out.name, "synthesizer");
        assert_eq!(out.summary, "Two errors");
        assert_eq!(out.issues.len(), 1);
        assert_eq!(out.evidence[0]["message"], "boom");
        assert_eq!(out.repro_steps, vec!["open page", "click save"]);
        assert_eq!(out.root_cause.as_deref(), Some("missing handler"));
        assert_eq!(out.severity_breakdown.unwrap()["high"], 1);
        assert_eq!(out.top_issues.unwrap().len(), 1);
    }

    #[test]
    fn from_document_coerces_wrong_shapes_to_empty() {
        let doc = json!({
            "summary": {"nested": true},
            "issues": "not a list",
            "evidence": [1, "two", {"ok": true}],
            "repro_steps": {"step": 1},
            "suspected_root_cause": "",
            "severity_breakdown": ["high"],
            "top_issues": []
        });
        let out = WorkerOutput::from_document("log_analyst", doc.as_object().unwrap());
        assert_eq!(out.summary, "");
        assert!(out.issues.is_empty());
        assert_eq!(out.evidence.len(), 1);
        assert!(out.repro_steps.is_empty());
        assert!(out.root_cause.is_none());
        assert!(out.severity_breakdown.is_none());
        assert!(out.top_issues.is_none());
    }

    #[test]
    fn empty_output_is_empty() {
        let out = WorkerOutput::empty("video_analyst");
        assert!(out.is_empty());
        assert_eq!(out, WorkerOutput::from_document("video_analyst", &Document::new()));
    }

    #[test]
    fn chunk_report_loads_from_partial_document() {
        let report: ChunkReport = serde_json::from_value(json!({
            "issues": [{"title": "Console error"}],
            "chunk_id": "c1"
        }))
        .unwrap();
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.chunk_id.unwrap().as_str(), "c1");
        assert!(report.repro_steps.is_empty());
    }
}
