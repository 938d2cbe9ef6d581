//! Backend selection: model-backed workers when the primary backend is
//! usable, the rule set otherwise.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use qa_core::events::{Chunk, Event, Session};
use qa_core::report::{ChunkReport, SessionReport};
use qa_core::settings::{Settings, DEFAULT_MODEL};
use qa_core::worker::Worker;
use qa_store::CheckpointStore;

use crate::adapter::WorkerAdapter;
use crate::analyst::Analyst;
use crate::chat::{ChatParams, ChatReply};
use crate::error::EngineError;
use crate::pipeline::Coordinator;
use crate::rules::RuleAnalyst;

/// Whether the primary (model) backend can be used.
pub trait CapabilityProbe: Send + Sync {
    fn primary_available(&self) -> bool;
}

/// Reads availability from settings: enabled and an API key present.
pub struct SettingsProbe<'a>(pub &'a Settings);

impl CapabilityProbe for SettingsProbe<'_> {
    fn primary_available(&self) -> bool {
        self.0.primary_backend_available()
    }
}

/// Fixed answer, for tests and forced modes.
#[derive(Clone, Copy, Debug)]
pub struct StaticProbe(pub bool);

impl CapabilityProbe for StaticProbe {
    fn primary_available(&self) -> bool {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    Full,
    RuleBased,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub timeout: Duration,
    pub text_model: String,
    pub video_model: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            text_model: DEFAULT_MODEL.to_string(),
            video_model: DEFAULT_MODEL.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            timeout: settings.worker_timeout,
            text_model: settings.text_model.clone(),
            video_model: settings.video_model.clone(),
        }
    }
}

/// The engine service handed to request handlers.
pub struct Orchestrator {
    coordinator: Coordinator,
    mode: AnalysisMode,
    config: EngineConfig,
}

impl Orchestrator {
    /// The worker is only used when the probe passes; without one the rule
    /// set is used regardless of the probe.
    pub fn from_probe(
        probe: &dyn CapabilityProbe,
        worker: Option<Arc<dyn Worker>>,
        store: Arc<CheckpointStore>,
        config: EngineConfig,
    ) -> Self {
        let (analyst, mode): (Arc<dyn Analyst>, AnalysisMode) = match worker {
            Some(worker) if probe.primary_available() => (
                Arc::new(WorkerAdapter::new(
                    worker,
                    config.timeout,
                    config.text_model.clone(),
                    config.video_model.clone(),
                )),
                AnalysisMode::Full,
            ),
            _ => (Arc::new(RuleAnalyst::new()), AnalysisMode::RuleBased),
        };
        info!(
            mode = ?mode,
            analyst = analyst.name(),
            text_model = %config.text_model,
            video_model = %config.video_model,
            "analysis engine ready"
        );
        Self {
            coordinator: Coordinator::new(analyst, store, config.text_model.clone()),
            mode,
            config,
        }
    }

    pub fn mode(&self) -> AnalysisMode {
        self.mode
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &CheckpointStore {
        self.coordinator.store()
    }

    pub async fn analyze_chunk(&self, session: &Session, chunk: &Chunk, events: &[Event]) -> Result<ChunkReport, EngineError> {
        self.coordinator.analyze_chunk(session, chunk, events).await
    }

    pub async fn aggregate_session(&self, session: &Session, chunk_reports: Vec<ChunkReport>) -> Result<SessionReport, EngineError> {
        self.coordinator.aggregate_session(session, chunk_reports).await
    }

    pub async fn chat(&self, params: ChatParams) -> Result<ChatReply, EngineError> {
        self.coordinator.chat(params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qa_llm::MockWorker;
    use secrecy::SecretString;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> Arc<CheckpointStore> {
        Arc::new(CheckpointStore::new(dir.path(), 48))
    }

    #[test]
    fn probe_and_worker_select_mode() {
        let dir = TempDir::new().unwrap();
        let worker = || Some(Arc::new(MockWorker::new()) as Arc<dyn Worker>);

        let full = Orchestrator::from_probe(&StaticProbe(true), worker(), store(&dir), EngineConfig::default());
        assert_eq!(full.mode(), AnalysisMode::Full);

        let off = Orchestrator::from_probe(&StaticProbe(false), worker(), store(&dir), EngineConfig::default());
        assert_eq!(off.mode(), AnalysisMode::RuleBased);

        let missing = Orchestrator::from_probe(&StaticProbe(true), None, store(&dir), EngineConfig::default());
        assert_eq!(missing.mode(), AnalysisMode::RuleBased);
    }

    #[test]
    fn settings_probe_needs_flag_and_key() {
        let mut settings = Settings::default();
        assert!(!SettingsProbe(&settings).primary_available());
        settings.api_key = Some(SecretString::from("k".to_string()));
        assert!(SettingsProbe(&settings).primary_available());
        settings.adk_enabled = false;
        assert!(!SettingsProbe(&settings).primary_available());
    }

    #[test]
    fn config_follows_settings() {
        let settings = Settings {
            text_model: "t".into(),
            video_model: "v".into(),
            worker_timeout: Duration::from_secs(7),
            ..Default::default()
        };
        let config = EngineConfig::from_settings(&settings);
        assert_eq!(config.text_model, "t");
        assert_eq!(config.video_model, "v");
        assert_eq!(config.timeout, Duration::from_secs(7));
    }

    #[test]
    fn mode_serializes_snake_case() {
        assert_eq!(serde_json::to_value(AnalysisMode::RuleBased).unwrap(), "rule_based");
    }
}
