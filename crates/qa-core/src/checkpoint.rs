//! Per-session accumulated state, persisted between chunk analyses.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::ids::{ChunkId, SessionId};
use crate::report::{ChunkReport, Evidence, Issue};

/// Accumulated analysis for one session.
///
/// `issues`, `evidence` and `repro_steps` are always the concatenation of the
/// corresponding lists over `chunk_reports`, in report order. Only
/// [`Checkpoint::push_report`] grows `chunk_reports`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default)]
    pub session_id: SessionId,
    #[serde(default)]
    pub chunk_reports: Vec<ChunkReport>,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    #[serde(default)]
    pub repro_steps: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub suspected_root_cause: Option<String>,
    #[serde(default)]
    pub last_chunk_id: Option<ChunkId>,
    #[serde(default)]
    pub last_chunk_idx: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            ..Default::default()
        }
    }

    /// Append one chunk report and bring the derived fields up to date.
    ///
    /// Summary, root cause and last-chunk markers are replaced only when the
    /// report provides them; a missing value never erases an earlier one.
    pub fn push_report(&mut self, report: ChunkReport) {
        if !report.summary.trim().is_empty() {
            self.summary = Some(report.summary.clone());
        }
        if let Some(cause) = report.suspected_root_cause.as_ref().filter(|c| !c.trim().is_empty()) {
            self.suspected_root_cause = Some(cause.clone());
        }
        if let Some(id) = report.chunk_id.as_ref().filter(|id| !id.is_empty()) {
            self.last_chunk_id = Some(id.clone());
        }
        if report.chunk_idx.is_some() {
            self.last_chunk_idx = report.chunk_idx;
        }
        self.chunk_reports.push(report);
        self.recompute_accumulators();
    }

    /// Rebuild the accumulated lists from `chunk_reports`.
    pub fn recompute_accumulators(&mut self) {
        self.issues = self.chunk_reports.iter().flat_map(|r| r.issues.iter().cloned()).collect();
        self.evidence = self.chunk_reports.iter().flat_map(|r| r.evidence.iter().cloned()).collect();
        self.repro_steps = self.chunk_reports.iter().flat_map(|r| r.repro_steps.iter().cloned()).collect();
    }
}

/// Accepts RFC 3339 strings and naive ISO timestamps (read as UTC). Anything
/// else reads as absent so the file age decides expiry.
fn lenient_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    let Some(Value::String(s)) = raw else {
        return Ok(None);
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(&s) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    Ok(NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc()))
}

/// Compact view of a checkpoint handed to the chat worker.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointContext {
    pub summary: Option<String>,
    pub suspected_root_cause: Option<String>,
    pub issues: Vec<Issue>,
    pub evidence: Vec<Evidence>,
    pub repro_steps: Vec<String>,
    pub issue_count: usize,
    pub chunk_count: usize,
    pub last_chunk_id: Option<ChunkId>,
    pub last_chunk_idx: Option<i64>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CheckpointContext {
    /// Each list keeps at most `cap` entries; `issue_count` is the full total.
    pub fn from_checkpoint(checkpoint: &Checkpoint, cap: usize) -> Self {
        Self {
            summary: checkpoint.summary.clone(),
            suspected_root_cause: checkpoint.suspected_root_cause.clone(),
            issues: checkpoint.issues.iter().take(cap).cloned().collect(),
            evidence: checkpoint.evidence.iter().take(cap).cloned().collect(),
            repro_steps: checkpoint.repro_steps.iter().take(cap).cloned().collect(),
            issue_count: checkpoint.issues.len(),
            chunk_count: checkpoint.chunk_reports.len(),
            last_chunk_id: checkpoint.last_chunk_id.clone(),
            last_chunk_idx: checkpoint.last_chunk_idx,
            updated_at: checkpoint.updated_at,
        }
    }
}
