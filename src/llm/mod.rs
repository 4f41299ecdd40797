pub mod openai;
pub mod provider;
pub mod types;

pub use openai::OpenAiProvider;
pub use provider::{EmbeddingProvider, LlmProvider, TokenStream};
pub use types::{ChatMessage, ChatRequest, Role};
