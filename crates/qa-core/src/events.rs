//! Caller-owned inputs: the session, its chunks, and the recorded events.
//!
//! These are read and filtered by the engine but never mutated. Unknown
//! fields are kept in `extra` so they pass through to workers untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::{ChunkId, SessionId};

/// Keys a chunk may use to point at its recorded media, in lookup order.
const CONTENT_REF_KEYS: &[&str] = &["video_url", "gcs_url", "gcs_uri", "video_gcs_uri"];

const DEFAULT_CONTENT_TYPE: &str = "video/webm";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub id: SessionId,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: SessionId::from_raw(id),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    Console,
    Network,
    Interaction,
    Marker,
    Annotation,
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Console => "console",
            Self::Network => "network",
            Self::Interaction => "interaction",
            Self::Marker => "marker",
            Self::Annotation => "annotation",
            Self::Other(s) => s,
        }
    }
}

impl Default for EventKind {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl From<String> for EventKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "console" => Self::Console,
            "network" => Self::Network,
            "interaction" => Self::Interaction,
            "marker" => Self::Marker,
            "annotation" => Self::Annotation,
            _ => Self::Other(s),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

/// One recorded session event. `ts` is passed through as submitted
/// (epoch millis or an ISO string, depending on the recorder).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type", default)]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub ts: Value,
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Event {
    pub fn new(kind: EventKind, ts: impl Into<Value>, payload: Value) -> Self {
        Self {
            kind,
            ts: ts.into(),
            payload: match payload {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            extra: Map::new(),
        }
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key).filter(|v| !v.is_null())
    }

    /// Payload field rendered as text; strings come back unquoted.
    pub fn field_text(&self, key: &str) -> Option<String> {
        match self.field(key)? {
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(default)]
    pub id: ChunkId,
    #[serde(default)]
    pub idx: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<Event>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Chunk {
    pub fn new(id: impl Into<String>, idx: i64) -> Self {
        Self {
            id: ChunkId::from_raw(id),
            idx: Some(idx),
            ..Default::default()
        }
    }

    /// The media reference for this chunk, from `content_ref` or any of the
    /// recorder-specific URL fields.
    pub fn resolved_content_ref(&self) -> Option<&str> {
        let explicit = self.content_ref.as_deref().filter(|s| !s.is_empty());
        explicit.or_else(|| {
            CONTENT_REF_KEYS
                .iter()
                .filter_map(|key| self.extra.get(*key).and_then(Value::as_str))
                .find(|s| !s.is_empty())
        })
    }

    pub fn content_type_or_default(&self) -> &str {
        self.content_type
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
    }

    /// The chunk as sent to workers: everything except the event list,
    /// which travels separately in scoped form.
    pub fn descriptor(&self) -> Value {
        let mut map = self.extra.clone();
        map.insert("id".into(), Value::String(self.id.to_string()));
        map.insert("idx".into(), self.idx.map(Value::from).unwrap_or(Value::Null));
        if let Some(uri) = self.resolved_content_ref() {
            map.insert("content_ref".into(), Value::String(uri.to_string()));
        }
        if let Some(content_type) = &self.content_type {
            map.insert("content_type".into(), Value::String(content_type.clone()));
        }
        Value::Object(map)
    }
}
