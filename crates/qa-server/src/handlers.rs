use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use qa_core::events::{Chunk, Event, Session};
use qa_core::report::{ChunkReport, SessionReport};
use qa_engine::{AnalysisMode, ChatParams, ChatReply, EngineError};

use crate::server::AppState;

/// Engine failures surfaced over HTTP. Only storage and encoding errors get
/// this far; worker failures are absorbed inside the engine.
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub session: Session,
    #[serde(default)]
    pub chunk: Chunk,
    #[serde(default)]
    pub events: Vec<Event>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AggregateRequest {
    #[serde(default)]
    pub session: Session,
    #[serde(default)]
    pub chunk_reports: Vec<ChunkReport>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub adk_enabled: bool,
    pub adk_text_model: String,
    pub adk_video_model: String,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let config = state.orchestrator.config();
    Json(HealthResponse {
        status: "ok".into(),
        adk_enabled: state.orchestrator.mode() == AnalysisMode::Full,
        adk_text_model: config.text_model.clone(),
        adk_video_model: config.video_model.clone(),
    })
}

pub async fn analyze(State(state): State<AppState>, Json(req): Json<AnalyzeRequest>) -> Result<Json<ChunkReport>, ApiError> {
    let report = state
        .orchestrator
        .analyze_chunk(&req.session, &req.chunk, &req.events)
        .await?;
    Ok(Json(report))
}

pub async fn aggregate(State(state): State<AppState>, Json(req): Json<AggregateRequest>) -> Result<Json<SessionReport>, ApiError> {
    let report = state
        .orchestrator
        .aggregate_session(&req.session, req.chunk_reports)
        .await?;
    Ok(Json(report))
}

pub async fn chat(State(state): State<AppState>, Json(params): Json<ChatParams>) -> Result<Json<ChatReply>, ApiError> {
    Ok(Json(state.orchestrator.chat(params).await?))
}

/// Fallback for unknown routes.
pub async fn not_found() -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({"error": "not found"})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use qa_store::StoreError;

    #[test]
    fn analyze_request_tolerates_missing_fields() {
        let req: AnalyzeRequest = serde_json::from_value(json!({"chunk": {"id": "c1", "idx": 2}})).unwrap();
        assert!(req.session.id.is_empty());
        assert_eq!(req.chunk.idx, Some(2));
        assert!(req.events.is_empty());
    }

    #[test]
    fn aggregate_request_defaults_to_no_reports() {
        let req: AggregateRequest = serde_json::from_value(json!({"session": {"id": "s1"}})).unwrap();
        assert_eq!(req.session.id.as_str(), "s1");
        assert!(req.chunk_reports.is_empty());
    }

    #[test]
    fn store_error_maps_to_500() {
        let err = ApiError(EngineError::Store(StoreError::Io("disk full".into())));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
