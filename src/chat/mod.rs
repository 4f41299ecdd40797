//! Grounded question answering over a collection.

pub mod orchestrator;
pub mod prompt;

pub use orchestrator::{ChatAnswer, ChatMode, ChatOrchestrator, ChatOutcome, Degraded};
pub use prompt::{Citation, UNSURE_SENTINEL};
