//! Process settings read from environment variables.
//!
//! Each variable has strict parsing rules. Integers must be valid and within
//! range; booleans accept `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
//! Invalid values are ignored, leaving the default in place, and are kept in
//! `Settings::rejected` so they can be logged once a subscriber exists.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl LogFormat {
    pub fn parse(val: &str) -> Option<Self> {
        match val.trim().to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" | "text" => Some(Self::Pretty),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub checkpoint_dir: PathBuf,
    /// Zero or negative disables expiry.
    pub checkpoint_ttl_hours: i64,
    pub adk_enabled: bool,
    pub api_key: Option<SecretString>,
    pub text_model: String,
    pub video_model: String,
    pub worker_timeout: Duration,
    pub worker_max_retries: u32,
    /// Variables whose values failed to parse.
    pub rejected: Vec<RejectedVar>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectedVar {
    pub key: &'static str,
    pub value: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            log_level: "info".into(),
            log_format: LogFormat::Json,
            checkpoint_dir: PathBuf::from(".checkpoints"),
            checkpoint_ttl_hours: 48,
            adk_enabled: true,
            api_key: None,
            text_model: DEFAULT_MODEL.into(),
            video_model: DEFAULT_MODEL.into(),
            worker_timeout: Duration::from_secs(120),
            worker_max_retries: 2,
            rejected: Vec::new(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut settings = Self::default();

        if let Some(v) = read("HOST") {
            settings.host = v;
        }
        if let Some(v) = read("PORT") {
            let parsed = parse_u64_range(&v, 1, 65535).map(|n| n as u16);
            apply(&mut settings.port, &mut settings.rejected, "PORT", &v, parsed);
        }
        if let Some(v) = read("LOG_LEVEL") {
            settings.log_level = v.to_lowercase();
        }
        if let Some(v) = read("LOG_FORMAT") {
            apply(&mut settings.log_format, &mut settings.rejected, "LOG_FORMAT", &v, LogFormat::parse(&v));
        }
        if let Some(v) = read("CHECKPOINT_DIR") {
            settings.checkpoint_dir = PathBuf::from(v);
        }
        if let Some(v) = read("CHECKPOINT_TTL_HOURS") {
            let parsed = v.trim().parse().ok();
            apply(&mut settings.checkpoint_ttl_hours, &mut settings.rejected, "CHECKPOINT_TTL_HOURS", &v, parsed);
        }
        if let Some(v) = read("ADK_ENABLED") {
            apply(&mut settings.adk_enabled, &mut settings.rejected, "ADK_ENABLED", &v, parse_bool(&v));
        }
        settings.api_key = read("GOOGLE_API_KEY")
            .or_else(|| read("GEMINI_API_KEY"))
            .map(SecretString::from);
        if let Some(v) = read("ADK_TEXT_MODEL") {
            settings.text_model = v;
        }
        if let Some(v) = read("ADK_VIDEO_MODEL") {
            settings.video_model = v;
        }
        if let Some(v) = read("WORKER_TIMEOUT_SECS") {
            let parsed = parse_u64_range(&v, 1, 3600).map(Duration::from_secs);
            apply(&mut settings.worker_timeout, &mut settings.rejected, "WORKER_TIMEOUT_SECS", &v, parsed);
        }
        if let Some(v) = read("WORKER_MAX_RETRIES") {
            let parsed = parse_u64_range(&v, 0, 10).map(|n| n as u32);
            apply(&mut settings.worker_max_retries, &mut settings.rejected, "WORKER_MAX_RETRIES", &v, parsed);
        }
        settings
    }

    /// Warn about every rejected variable. Call after telemetry is up.
    pub fn log_rejected(&self) {
        for var in &self.rejected {
            warn!(key = var.key, value = %var.value, "invalid env var, ignoring");
        }
    }

    /// Whether the model-backed pipeline can run at all.
    pub fn primary_backend_available(&self) -> bool {
        self.adk_enabled && self.api_key.is_some()
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.host.trim().is_empty() {
            return Err(SettingsError::InvalidValue("host must not be empty".into()));
        }
        if self.checkpoint_dir.as_os_str().is_empty() {
            return Err(SettingsError::InvalidValue("checkpoint dir must not be empty".into()));
        }
        if self.text_model.trim().is_empty() || self.video_model.trim().is_empty() {
            return Err(SettingsError::InvalidValue("model names must not be empty".into()));
        }
        Ok(())
    }
}

fn apply<T>(slot: &mut T, rejected: &mut Vec<RejectedVar>, key: &'static str, raw: &str, parsed: Option<T>) {
    match parsed {
        Some(v) => *slot = v,
        None => rejected.push(RejectedVar {
            key,
            value: raw.to_string(),
        }),
    }
}

/// Accepts (case-insensitive) `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Settings {
        let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_without_env() {
        let settings = from_pairs(&[]);
        assert_eq!(settings.port, 8000);
        assert_eq!(settings.checkpoint_ttl_hours, 48);
        assert_eq!(settings.checkpoint_dir, PathBuf::from(".checkpoints"));
        assert_eq!(settings.text_model, DEFAULT_MODEL);
        assert_eq!(settings.worker_timeout, Duration::from_secs(120));
        assert!(settings.adk_enabled);
        assert!(!settings.primary_backend_available());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn overrides_apply() {
        let settings = from_pairs(&[
            ("PORT", "9001"),
            ("LOG_FORMAT", "pretty"),
            ("CHECKPOINT_TTL_HOURS", "0"),
            ("ADK_ENABLED", "off"),
            ("ADK_VIDEO_MODEL", "gemini-pro-vision"),
            ("WORKER_MAX_RETRIES", "0"),
        ]);
        assert_eq!(settings.port, 9001);
        assert_eq!(settings.log_format, LogFormat::Pretty);
        assert_eq!(settings.checkpoint_ttl_hours, 0);
        assert!(!settings.adk_enabled);
        assert_eq!(settings.video_model, "gemini-pro-vision");
        assert_eq!(settings.worker_max_retries, 0);
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let settings = from_pairs(&[("PORT", "0"), ("ADK_ENABLED", "maybe"), ("WORKER_TIMEOUT_SECS", "soon")]);
        assert_eq!(settings.port, 8000);
        assert!(settings.adk_enabled);
        assert_eq!(settings.worker_timeout, Duration::from_secs(120));
    }

    #[test]
    fn invalid_values_are_reported() {
        let settings = from_pairs(&[("PORT", "80a0"), ("CHECKPOINT_TTL_HOURS", "two days"), ("HOST", "0.0.0.0")]);
        assert_eq!(
            settings.rejected,
            vec![
                RejectedVar { key: "PORT", value: "80a0".into() },
                RejectedVar { key: "CHECKPOINT_TTL_HOURS", value: "two days".into() },
            ]
        );
        assert_eq!(settings.port, 8000);
        assert_eq!(settings.checkpoint_ttl_hours, 48);
        assert!(from_pairs(&[("PORT", "9000")]).rejected.is_empty());
    }

    #[test]
    fn google_key_wins_over_gemini_key() {
        let settings = from_pairs(&[("GOOGLE_API_KEY", "g-key"), ("GEMINI_API_KEY", "m-key")]);
        assert_eq!(settings.api_key.as_ref().unwrap().expose_secret(), "g-key");
        assert!(settings.primary_backend_available());

        let fallback = from_pairs(&[("GOOGLE_API_KEY", " "), ("GEMINI_API_KEY", "m-key")]);
        assert_eq!(fallback.api_key.as_ref().unwrap().expose_secret(), "m-key");
    }

    #[test]
    fn parse_bool_variants() {
        for v in ["true", "1", "YES", "On"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["false", "0", "no", "OFF"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("enabled"), None);
    }

    #[test]
    fn validate_rejects_empty_model() {
        let settings = Settings {
            text_model: " ".into(),
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(SettingsError::InvalidValue(_))));
    }
}
