//! Provider stream adapters
//!
//! One adapter per upstream wire shape. Each adapter translates native
//! events into the closed decoder input set and can expand a persisted
//! non-streaming response back into native stream events for replay.

pub mod adapter;
pub mod anthropic;
pub mod bedrock;
pub mod gemini;
pub mod openai;
pub mod responses;

pub use adapter::{StreamAdapter, TranslateError};

// Re-export concrete adapters
pub use anthropic::AnthropicAdapter;
pub use bedrock::BedrockAdapter;
pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;
pub use responses::ResponsesAdapter;
