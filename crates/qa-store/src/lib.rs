pub mod checkpoints;
pub mod error;

pub use checkpoints::{sanitize_session_id, CheckpointStore};
pub use error::StoreError;
