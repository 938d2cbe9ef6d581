use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use qa_core::settings::{LogFormat, Settings};
use qa_core::worker::Worker;
use qa_engine::{EngineConfig, Orchestrator, SettingsProbe};
use qa_llm::{GeminiConfig, GeminiWorker, RetryConfig, RetryingWorker};
use qa_server::ServerConfig;
use qa_store::CheckpointStore;
use qa_telemetry::{init_telemetry, TelemetryConfig};

/// QA session analysis service.
#[derive(Debug, Parser)]
#[command(name = "qa-assist", version)]
struct Cli {
    /// Address to bind (overrides HOST).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides PORT).
    #[arg(long)]
    port: Option<u16>,

    /// Checkpoint directory (overrides CHECKPOINT_DIR).
    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,

    /// Log level (overrides LOG_LEVEL).
    #[arg(long)]
    log_level: Option<String>,

    /// Human-readable logs instead of JSON.
    #[arg(long)]
    pretty: bool,

    /// Force the rule-based pipeline even when a model backend is configured.
    #[arg(long)]
    rules_only: bool,
}

impl Cli {
    fn apply(self, settings: &mut Settings) {
        if let Some(host) = self.host {
            settings.host = host;
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(dir) = self.checkpoint_dir {
            settings.checkpoint_dir = dir;
        }
        if let Some(level) = self.log_level {
            settings.log_level = level;
        }
        if self.pretty {
            settings.log_format = LogFormat::Pretty;
        }
        if self.rules_only {
            settings.adk_enabled = false;
        }
    }
}

fn build_worker(settings: &Settings) -> anyhow::Result<Option<Arc<dyn Worker>>> {
    if !settings.primary_backend_available() {
        return Ok(None);
    }
    let Some(api_key) = settings.api_key.clone() else {
        return Ok(None);
    };
    let gemini = GeminiWorker::new(GeminiConfig::new(api_key)).context("building Gemini client")?;
    let retry = RetryConfig {
        max_retries: settings.worker_max_retries,
        ..Default::default()
    };
    let worker: Arc<dyn Worker> = Arc::new(RetryingWorker::new(gemini, retry));
    Ok(Some(worker))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut settings = Settings::from_env();
    Cli::parse().apply(&mut settings);
    settings.validate().context("invalid settings")?;

    init_telemetry(&TelemetryConfig::from_settings(&settings));
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting qa-assist");
    settings.log_rejected();

    tokio::fs::create_dir_all(&settings.checkpoint_dir)
        .await
        .with_context(|| format!("creating {}", settings.checkpoint_dir.display()))?;
    let store = Arc::new(CheckpointStore::new(settings.checkpoint_dir.clone(), settings.checkpoint_ttl_hours));
    tracing::info!(
        path = %settings.checkpoint_dir.display(),
        ttl_hours = settings.checkpoint_ttl_hours,
        "checkpoint store ready"
    );

    let worker = build_worker(&settings)?;
    let orchestrator = Orchestrator::from_probe(
        &SettingsProbe(&settings),
        worker,
        store,
        EngineConfig::from_settings(&settings),
    );

    let config = ServerConfig {
        host: settings.host.clone(),
        port: settings.port,
    };
    let handle = qa_server::start(config, Arc::new(orchestrator))
        .await
        .context("starting server")?;
    tracing::info!(port = handle.port, "qa-assist ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await.context("listening for ctrl+c")?;
    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(())
}
