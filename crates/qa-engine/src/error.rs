use qa_store::StoreError;

/// Failures that reach callers of the engine. Worker problems never do;
/// they are absorbed by the adapter.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("payload encoding failed: {0}")]
    Encoding(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Encoding(e.to_string())
    }
}
