mod agent;
pub mod mock;
mod openai;
mod provider;

pub use agent::LlmFieldExtractor;
pub use mock::MockProvider;
pub use openai::OpenAiChatProvider;
pub use provider::{ChatProvider, ExtractionRequest, ModelSettings};
