//! Per-chunk fan-out/fan-in and session roll-up.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use qa_core::checkpoint::CheckpointContext;
use qa_core::events::{Chunk, Event, Session};
use qa_core::ids::SessionId;
use qa_core::report::{severity_breakdown, ChunkReport, Evidence, Issue, SessionReport, WorkerOutput};
use qa_core::worker::{Attachment, WorkerRole};
use qa_store::CheckpointStore;

use crate::analyst::{Analyst, Invocation};
use crate::error::EngineError;
use crate::filter;
use crate::prompts;

/// Prior findings carried into each payload.
pub const CONTEXT_CAP: usize = 20;
pub const CHUNK_TOP_ISSUES: usize = 5;
pub const SESSION_TOP_ISSUES: usize = 8;

const DEFAULT_CHUNK_SUMMARY: &str = "Analysis complete.";
const EMPTY_SESSION_SUMMARY: &str = "No chunk analysis available.";

/// Runs the worker roles over a chunk and keeps the session checkpoint
/// current. The analyst decides whether findings come from a model or from
/// the rule set; the flow is the same either way.
pub struct Coordinator {
    analyst: Arc<dyn Analyst>,
    store: Arc<CheckpointStore>,
    default_model: String,
}

impl Coordinator {
    pub fn new(analyst: Arc<dyn Analyst>, store: Arc<CheckpointStore>, default_model: impl Into<String>) -> Self {
        Self {
            analyst,
            store,
            default_model: default_model.into(),
        }
    }

    pub fn analyst(&self) -> &dyn Analyst {
        self.analyst.as_ref()
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Compact checkpoint view for payloads; `{}` when nothing is stored.
    pub(crate) async fn checkpoint_context(&self, session_id: &SessionId) -> Result<Value, EngineError> {
        match self.store.load(session_id).await {
            Some(checkpoint) => Ok(serde_json::to_value(CheckpointContext::from_checkpoint(
                &checkpoint,
                CONTEXT_CAP,
            ))?),
            None => Ok(json!({})),
        }
    }

    /// Analyze one chunk and append the resulting report to the session's
    /// checkpoint. Worker failures only thin out the report; storage write
    /// failures are returned.
    #[instrument(skip_all, fields(session_id = %session.id, chunk_id = %chunk.id, analyst = self.analyst.name()))]
    pub async fn analyze_chunk(&self, session: &Session, chunk: &Chunk, events: &[Event]) -> Result<ChunkReport, EngineError> {
        let events = if events.is_empty() { &chunk.events[..] } else { events };
        let checkpoint = self.checkpoint_context(&session.id).await?;
        let session_value = serde_json::to_value(session)?;
        let descriptor = chunk.descriptor();
        let content_ref = chunk.resolved_content_ref();

        let log_inv = Invocation::new(
            WorkerRole::LogAnalyst,
            prompts::TASK_LOGS,
            json!({
                "session": session_value,
                "chunk": descriptor,
                "events": filter::log_view(events),
                "checkpoint": checkpoint,
            }),
        );
        let mut video_inv = Invocation::new(
            WorkerRole::VideoAnalyst,
            prompts::TASK_VIDEO,
            json!({
                "session": session_value,
                "chunk": descriptor,
                "events": filter::visual_view(events),
                "content_ref": content_ref,
                "checkpoint": checkpoint,
            }),
        );
        video_inv.attachment = content_ref.map(|uri| Attachment {
            uri: uri.to_string(),
            mime_type: chunk.content_type_or_default().to_string(),
        });
        let repro_inv = Invocation::new(
            WorkerRole::ReproPlanner,
            prompts::TASK_REPRO,
            json!({
                "session": session_value,
                "chunk": descriptor,
                "events": filter::repro_view(events),
                "checkpoint": checkpoint,
            }),
        );

        let (log, video, repro) = tokio::join!(
            self.analyst.analyze(&log_inv),
            self.analyst.analyze(&video_inv),
            self.analyst.analyze(&repro_inv),
        );
        debug!(
            log_issues = log.issues.len(),
            video_issues = video.issues.len(),
            repro_steps = repro.repro_steps.len(),
            "workers joined"
        );

        let issues: Vec<_> = log.issues.iter().chain(&video.issues).cloned().collect();
        let evidence: Vec<_> = log.evidence.iter().chain(&video.evidence).cloned().collect();
        let repro_steps = repro.repro_steps.clone();

        let synth_inv = Invocation::new(
            WorkerRole::Synthesizer,
            prompts::TASK_CHUNK_SYNTHESIS,
            json!({
                "session": {"id": session.id},
                "chunk": {"id": chunk.id, "idx": chunk.idx},
                "log_summary": log.summary,
                "video_summary": video.summary,
                "issues": issues,
                "repro_steps": repro_steps,
                "environment": session.metadata,
                "checkpoint": checkpoint,
            }),
        );
        let synth = self.analyst.analyze(&synth_inv).await;

        let report = assemble_chunk_report(session, chunk, issues, evidence, repro_steps, [log, video, repro, synth]);
        self.store.append_chunk(&session.id, report.clone()).await?;
        info!(
            issues = report.issues.len(),
            repro_steps = report.repro_steps.len(),
            "chunk analyzed"
        );
        Ok(report)
    }

    /// Roll every chunk report of a session into one report. With no reports
    /// supplied, the stored checkpoint's reports are used. The summary and
    /// root cause are written back to an existing checkpoint.
    #[instrument(skip_all, fields(session_id = %session.id, analyst = self.analyst.name()))]
    pub async fn aggregate_session(&self, session: &Session, chunk_reports: Vec<ChunkReport>) -> Result<SessionReport, EngineError> {
        let chunk_reports = if chunk_reports.is_empty() {
            self.store
                .load(&session.id)
                .await
                .map(|checkpoint| checkpoint.chunk_reports)
                .unwrap_or_default()
        } else {
            chunk_reports
        };

        let issues: Vec<_> = chunk_reports.iter().flat_map(|r| r.issues.iter().cloned()).collect();
        let evidence: Vec<_> = chunk_reports.iter().flat_map(|r| r.evidence.iter().cloned()).collect();
        let repro_steps: Vec<_> = chunk_reports.iter().flat_map(|r| r.repro_steps.iter().cloned()).collect();

        let synth_inv = Invocation::new(
            WorkerRole::Synthesizer,
            prompts::TASK_SESSION_SYNTHESIS,
            json!({
                "session": {"id": session.id},
                "chunk_count": chunk_reports.len(),
                "issues": issues,
                "evidence": evidence,
                "repro_steps": repro_steps,
            }),
        );
        let synth = self.analyst.analyze(&synth_inv).await;

        let summary = if !synth.summary.trim().is_empty() {
            synth.summary.clone()
        } else if chunk_reports.is_empty() {
            EMPTY_SESSION_SUMMARY.to_string()
        } else {
            format!(
                "{} total issues detected across {} chunks.",
                issues.len(),
                chunk_reports.len()
            )
        };
        let report = SessionReport {
            summary,
            suspected_root_cause: synth.root_cause.clone(),
            severity_breakdown: synth.severity_breakdown.clone().unwrap_or_else(|| severity_breakdown(&issues)),
            top_issues: synth
                .top_issues
                .clone()
                .unwrap_or_else(|| issues.iter().take(SESSION_TOP_ISSUES).cloned().collect()),
            chunk_count: chunk_reports.len(),
            session_id: Some(session.id.clone()).filter(|id| !id.is_empty()),
            issues,
            evidence,
            repro_steps,
        };

        let summary = report.summary.clone();
        let root_cause = report.suspected_root_cause.clone();
        let persisted = self
            .store
            .update(&session.id, move |checkpoint| {
                checkpoint.summary = Some(summary);
                if let Some(root_cause) = root_cause {
                    checkpoint.suspected_root_cause = Some(root_cause);
                }
            })
            .await?;
        info!(
            chunks = report.chunk_count,
            issues = report.issues.len(),
            persisted = persisted.is_some(),
            "session aggregated"
        );
        Ok(report)
    }
}

fn assemble_chunk_report(
    session: &Session,
    chunk: &Chunk,
    issues: Vec<Issue>,
    evidence: Vec<Evidence>,
    repro_steps: Vec<String>,
    agents: [WorkerOutput; 4],
) -> ChunkReport {
    let synth = &agents[3];
    let summary = if synth.summary.trim().is_empty() {
        DEFAULT_CHUNK_SUMMARY.to_string()
    } else {
        synth.summary.clone()
    };
    ChunkReport {
        summary,
        suspected_root_cause: synth.root_cause.clone(),
        severity_breakdown: synth.severity_breakdown.clone().unwrap_or_else(|| severity_breakdown(&issues)),
        top_issues: synth
            .top_issues
            .clone()
            .unwrap_or_else(|| issues.iter().take(CHUNK_TOP_ISSUES).cloned().collect()),
        issues,
        evidence,
        repro_steps,
        agents: agents.into(),
        chunk_id: Some(chunk.id.clone()).filter(|id| !id.is_empty()),
        chunk_idx: chunk.idx,
        session_id: Some(session.id.clone()).filter(|id| !id.is_empty()),
    }
}
