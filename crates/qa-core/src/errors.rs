use std::time::Duration;

use serde_json::Value;

/// Failure of a single worker invocation at the transport level.
/// Never crosses the worker adapter: the adapter turns it into an empty output.
#[derive(Clone, Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("backend overloaded")]
    Overloaded,
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("undecodable response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Rate limits, 5xx and connection failures. Timeouts are not retried:
    /// the caller's budget is already spent.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::ServerError { .. } | Self::Overloaded | Self::NetworkError(_)
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AuthenticationFailed(_) | Self::InvalidRequest(_))
    }

    pub fn suggested_delay(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::InvalidRequest(_) => "invalid_request",
            Self::RateLimited { .. } => "rate_limited",
            Self::ServerError { .. } => "server_error",
            Self::Overloaded => "overloaded",
            Self::NetworkError(_) => "network_error",
            Self::Timeout(_) => "timeout",
            Self::Decode(_) => "decode",
        }
    }

    /// Classify a failed Gemini response. The canonical `error.status` in the
    /// body wins over the HTTP code; a `RetryInfo.retryDelay` detail becomes
    /// the rate-limit hint.
    pub fn from_google_response(http_status: u16, body: String) -> Self {
        let parsed: Option<Value> = serde_json::from_str(&body).ok();
        let error = parsed.as_ref().and_then(|v| v.get("error"));
        let canonical = error.and_then(|e| e.get("status")).and_then(Value::as_str);
        let message = error
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| body.clone());

        match canonical {
            Some("RESOURCE_EXHAUSTED") => Self::RateLimited {
                retry_after: error.and_then(retry_delay),
            },
            Some("UNAVAILABLE") => Self::Overloaded,
            Some("UNAUTHENTICATED" | "PERMISSION_DENIED") => Self::AuthenticationFailed(message),
            Some("INVALID_ARGUMENT" | "NOT_FOUND" | "FAILED_PRECONDITION" | "OUT_OF_RANGE") => {
                Self::InvalidRequest(message)
            }
            Some("INTERNAL" | "DEADLINE_EXCEEDED" | "UNKNOWN") => Self::ServerError {
                status: http_status,
                body: message,
            },
            _ => Self::from_status(http_status, body),
        }
    }

    /// Classify by HTTP code alone.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed(body),
            400 | 404 => Self::InvalidRequest(body),
            429 => Self::RateLimited { retry_after: None },
            503 => Self::Overloaded,
            500..=599 => Self::ServerError { status, body },
            _ => Self::InvalidRequest(format!("unexpected status {status}: {body}")),
        }
    }
}

/// `"37s"` or `"1.5s"` from a `google.rpc.RetryInfo` detail.
fn retry_delay(error: &Value) -> Option<Duration> {
    error
        .get("details")?
        .as_array()?
        .iter()
        .filter_map(|d| d.get("retryDelay").and_then(Value::as_str))
        .find_map(|raw| raw.trim().strip_suffix('s')?.parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn google_body(code: u16, status: &str, details: Value) -> String {
        json!({"error": {"code": code, "message": format!("{status} happened"), "status": status, "details": details}})
            .to_string()
    }

    #[test]
    fn resource_exhausted_is_a_rate_limit_with_delay() {
        let body = google_body(
            429,
            "RESOURCE_EXHAUSTED",
            json!([{"@type": "type.googleapis.com/google.rpc.RetryInfo", "retryDelay": "37s"}]),
        );
        let err = GatewayError::from_google_response(429, body);
        assert!(err.is_retryable());
        assert_eq!(err.suggested_delay(), Some(Duration::from_secs(37)));
    }

    #[test]
    fn unavailable_is_overloaded() {
        let err = GatewayError::from_google_response(503, google_body(503, "UNAVAILABLE", json!([])));
        assert!(matches!(err, GatewayError::Overloaded));
    }

    #[test]
    fn canonical_status_beats_http_code() {
        let err = GatewayError::from_google_response(400, google_body(400, "RESOURCE_EXHAUSTED", json!([])));
        assert!(matches!(err, GatewayError::RateLimited { retry_after: None }));

        let denied = GatewayError::from_google_response(403, google_body(403, "PERMISSION_DENIED", json!([])));
        assert!(denied.is_fatal());
        assert_eq!(denied.to_string(), "authentication failed: PERMISSION_DENIED happened");

        let internal = GatewayError::from_google_response(500, google_body(500, "INTERNAL", json!([])));
        assert!(matches!(internal, GatewayError::ServerError { status: 500, .. }));
    }

    #[test]
    fn plain_bodies_fall_back_to_http_code() {
        assert!(GatewayError::from_google_response(401, "nope".into()).is_fatal());
        assert!(GatewayError::from_google_response(502, "<html>".into()).is_retryable());
        assert!(matches!(
            GatewayError::from_google_response(503, String::new()),
            GatewayError::Overloaded
        ));
        assert!(GatewayError::from_google_response(418, "teapot".into()).is_fatal());
    }

    #[test]
    fn timeout_and_decode_are_neither_retryable_nor_fatal() {
        for err in [GatewayError::Timeout(Duration::from_secs(30)), GatewayError::Decode("not json".into())] {
            assert!(!err.is_retryable(), "{err}");
            assert!(!err.is_fatal(), "{err}");
        }
    }

    #[test]
    fn malformed_retry_delay_is_ignored() {
        let body = google_body(429, "RESOURCE_EXHAUSTED", json!([{"retryDelay": "soon"}]));
        assert_eq!(GatewayError::from_google_response(429, body).suggested_delay(), None);
    }
}
