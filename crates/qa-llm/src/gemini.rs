use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use qa_core::errors::GatewayError;
use qa_core::worker::{Worker, WorkerCall};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const EMPTY_REPLY: &str = "{}";

#[derive(Clone, Debug)]
pub struct GeminiConfig {
    pub api_key: SecretString,
    pub base_url: String,
}

impl GeminiConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Worker backed by the Gemini `generateContent` endpoint. One HTTP request
/// per invocation, JSON response mode.
pub struct GeminiWorker {
    client: Client,
    config: GeminiConfig,
}

impl GeminiWorker {
    pub fn new(config: GeminiConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::InvalidRequest(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.config.base_url, model)
    }
}

/// Request body for one call: system instruction, optional file part, then
/// the text prompt.
pub fn build_request_body(call: &WorkerCall) -> Value {
    let mut parts = Vec::new();
    if let Some(attachment) = &call.attachment {
        parts.push(json!({
            "fileData": {"mimeType": attachment.mime_type, "fileUri": attachment.uri}
        }));
    }
    parts.push(json!({"text": call.prompt}));

    let mut body = json!({
        "contents": [{"role": "user", "parts": parts}],
        "generationConfig": {"responseMimeType": "application/json"},
    });
    if !call.instruction.is_empty() {
        body["systemInstruction"] = json!({"parts": [{"text": call.instruction}]});
    }
    body
}

/// Concatenated text parts of the first candidate.
pub fn extract_text(response: &Value) -> String {
    let parts = response
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array);
    let text: String = parts
        .into_iter()
        .flatten()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if text.trim().is_empty() {
        EMPTY_REPLY.to_string()
    } else {
        text
    }
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl Worker for GeminiWorker {
    fn name(&self) -> &str {
        "gemini"
    }

    fn supports_attachments(&self) -> bool {
        true
    }

    #[instrument(skip(self, call), fields(role = call.role.name(), model = %call.model))]
    async fn invoke(&self, call: &WorkerCall) -> Result<String, GatewayError> {
        let resp = self
            .client
            .post(self.endpoint(&call.model))
            .header("x-goog-api-key", self.config.api_key.expose_secret())
            .header("content-type", "application/json")
            .json(&build_request_body(call))
            .send()
            .await
            .map_err(|e| GatewayError::NetworkError(e.to_string()))?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let retry_after = retry_after(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            debug!(status, "gemini request failed");
            return Err(match GatewayError::from_google_response(status, body) {
                GatewayError::RateLimited { retry_after: hint } => GatewayError::RateLimited {
                    retry_after: retry_after.or(hint),
                },
                other => other,
            });
        }

        let body: Value = resp.json().await.map_err(|e| GatewayError::Decode(e.to_string()))?;
        Ok(extract_text(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qa_core::worker::{Attachment, WorkerRole};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn call() -> WorkerCall {
        WorkerCall::new(WorkerRole::LogAnalyst, "gemini-2.0-flash", "Find issues.", "{\"events\":[]}")
    }

    async fn worker_for(server: &MockServer) -> GeminiWorker {
        let config = GeminiConfig::new(SecretString::from("test-key")).with_base_url(server.uri());
        GeminiWorker::new(config).unwrap()
    }

    #[test]
    fn body_without_attachment() {
        let body = build_request_body(&call());
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Find issues.");
        assert_eq!(body["contents"][0]["parts"].as_array().unwrap().len(), 1);
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
    }

    #[test]
    fn body_with_attachment_puts_file_first() {
        let body = build_request_body(&call().with_attachment(Attachment {
            uri: "gs://bucket/c1.webm".into(),
            mime_type: "video/webm".into(),
        }));
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts[0]["fileData"]["fileUri"], "gs://bucket/c1.webm");
        assert_eq!(parts[1]["text"], "{\"events\":[]}");
    }

    #[test]
    fn extract_text_joins_parts_and_defaults_to_empty_object() {
        let response = json!({"candidates": [{"content": {"parts": [{"text": "{\"summary\":"}, {"text": "\"ok\"}"}]}}]});
        assert_eq!(extract_text(&response), "{\"summary\":\"ok\"}");
        assert_eq!(extract_text(&json!({"candidates": []})), "{}");
    }

    #[tokio::test]
    async fn invoke_posts_to_generate_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({"generationConfig": {"responseMimeType": "application/json"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "{\"summary\":\"clean\"}"}]}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = worker_for(&server).await.invoke(&call()).await.unwrap();
        assert_eq!(reply, "{\"summary\":\"clean\"}");
    }

    #[tokio::test]
    async fn invoke_maps_rate_limit_with_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let err = worker_for(&server).await.invoke(&call()).await.unwrap_err();
        assert_eq!(err.suggested_delay(), Some(Duration::from_secs(7)));
    }

    #[tokio::test]
    async fn invoke_reads_quota_exhaustion_from_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "code": 429,
                    "message": "Quota exceeded for generate_content_requests",
                    "status": "RESOURCE_EXHAUSTED",
                    "details": [{"@type": "type.googleapis.com/google.rpc.RetryInfo", "retryDelay": "12s"}]
                }
            })))
            .mount(&server)
            .await;

        let err = worker_for(&server).await.invoke(&call()).await.unwrap_err();
        assert_eq!(err.error_kind(), "rate_limited");
        assert_eq!(err.suggested_delay(), Some(Duration::from_secs(12)));
    }

    #[tokio::test]
    async fn invoke_maps_auth_failure_as_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("API key not valid"))
            .mount(&server)
            .await;

        let err = worker_for(&server).await.invoke(&call()).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("API key not valid"));
    }

    #[tokio::test]
    async fn invoke_rejects_non_json_success_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = worker_for(&server).await.invoke(&call()).await.unwrap_err();
        assert_eq!(err.error_kind(), "decode");
    }
}
