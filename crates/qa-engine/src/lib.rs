pub mod adapter;
pub mod analyst;
pub mod chat;
pub mod error;
pub mod filter;
pub mod orchestrator;
pub mod pipeline;
pub mod prompts;
pub mod recovery;
pub mod rules;

pub use adapter::WorkerAdapter;
pub use analyst::{Analyst, Invocation};
pub use chat::{ChatMode, ChatParams, ChatReply};
pub use error::EngineError;
pub use orchestrator::{AnalysisMode, CapabilityProbe, EngineConfig, Orchestrator, SettingsProbe, StaticProbe};
pub use pipeline::Coordinator;
pub use recovery::{parse_document, ParseError};
pub use rules::RuleAnalyst;
