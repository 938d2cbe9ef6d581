pub mod gemini;
pub mod mock;
pub mod retrying;

pub use gemini::{GeminiConfig, GeminiWorker};
pub use mock::{MockReply, MockWorker};
pub use retrying::{RetryConfig, RetryingWorker};
