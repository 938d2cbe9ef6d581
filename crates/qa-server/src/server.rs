use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::sync::oneshot;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use qa_engine::Orchestrator;

use crate::handlers;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/analyze", post(handlers::analyze))
        .route("/aggregate", post(handlers::aggregate))
        .route("/chat", post(handlers::chat))
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and start serving. Port 0 picks a free port.
pub async fn start(config: ServerConfig, orchestrator: Arc<Orchestrator>) -> Result<ServerHandle, std::io::Error> {
    let router = build_router(AppState { orchestrator });
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(host = %config.host, port = local_addr.port(), "server started");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let shutdown = async {
            let _ = shutdown_rx.await;
        };
        if let Err(e) = axum::serve(listener, router).with_graceful_shutdown(shutdown).await {
            tracing::error!(error = %e, "server stopped with error");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        shutdown: Some(shutdown_tx),
        server,
    })
}

/// Handle returned by `start()`; dropping it leaves the server running.
pub struct ServerHandle {
    pub port: u16,
    shutdown: Option<oneshot::Sender<()>>,
    server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.server.await;
        tracing::info!("server stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qa_engine::{EngineConfig, StaticProbe};
    use qa_store::CheckpointStore;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    async fn spawn(dir: &TempDir) -> ServerHandle {
        let store = Arc::new(CheckpointStore::new(dir.path(), 48));
        let orchestrator = Orchestrator::from_probe(&StaticProbe(false), None, store, EngineConfig::default());
        let config = ServerConfig {
            port: 0, // Random port
            ..Default::default()
        };
        start(config, Arc::new(orchestrator)).await.unwrap()
    }

    #[tokio::test]
    async fn server_serves_health() {
        let dir = TempDir::new().unwrap();
        let handle = spawn(&dir).await;
        assert!(handle.port > 0);

        let url = format!("http://127.0.0.1:{}/health", handle.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["adk_enabled"], false);
        assert_eq!(body["adk_text_model"], EngineConfig::default().text_model);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn analyze_aggregate_and_chat_over_http() {
        let dir = TempDir::new().unwrap();
        let handle = spawn(&dir).await;
        let base = format!("http://127.0.0.1:{}", handle.port);
        let client = reqwest::Client::new();

        let report: Value = client
            .post(format!("{base}/analyze"))
            .json(&json!({
                "session": {"id": "s-http"},
                "chunk": {"id": "c1", "idx": 0},
                "events": [{"type": "network", "ts": 5, "payload": {"status": 503, "url": "/api/cart"}}]
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(report["issues"][0]["detail"], "503 /api/cart");
        assert_eq!(report["chunk_id"], "c1");

        let session: Value = client
            .post(format!("{base}/aggregate"))
            .json(&json!({"session": {"id": "s-http"}}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(session["summary"], "1 total issues detected across 1 chunks.");

        let reply: Value = client
            .post(format!("{base}/chat"))
            .json(&json!({"session": {"id": "s-http"}, "message": "status?", "mode": "summarize"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(reply["mode"], "summarize");
        assert!(reply["reply"].as_str().unwrap().contains("1 total issues"));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let dir = TempDir::new().unwrap();
        let handle = spawn(&dir).await;
        let resp = reqwest::get(format!("http://127.0.0.1:{}/nope", handle.port)).await.unwrap();
        assert_eq!(resp.status(), 404);
        handle.shutdown().await;
    }
}
