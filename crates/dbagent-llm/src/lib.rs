//! LLM client backing the dbagent reasoning capability.
//!
//! Provides the `ProviderAdapter` trait, `DynProvider` wrapper, a middleware
//! chain, the model catalog, and `LlmClient` for routing requests by
//! `provider/model` name.

mod client;
mod gemini;
mod openai;
mod provider;
mod types;

pub use client::*;
pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;
pub use provider::*;
pub use types::*;
