//! LLM Client: issues chat-completion calls at a role, retrying only on
//! transport failure. Streaming and backoff are split into submodules so
//! the retry policy and SSE parsing can be tested independently.

pub mod client;
pub mod retry;
pub mod streaming;

pub use client::{ChatMessage, CompletionRequest, HttpLlmClient, LlmClient};
