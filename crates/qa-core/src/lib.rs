pub mod checkpoint;
pub mod errors;
pub mod events;
pub mod ids;
pub mod report;
pub mod settings;
pub mod worker;

pub use checkpoint::{Checkpoint, CheckpointContext};
pub use errors::GatewayError;
pub use events::{Chunk, Event, EventKind, Session};
pub use ids::{ChunkId, SessionId};
pub use report::{ChunkReport, Document, Evidence, Issue, SessionReport, Severity, SeverityBreakdown, WorkerOutput};
pub use settings::{LogFormat, RejectedVar, Settings, SettingsError};
pub use worker::{Attachment, Worker, WorkerCall, WorkerRole};
