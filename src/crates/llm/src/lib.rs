//! LLM provider implementations for the pipeline's task router.
//!
//! This crate provides concrete [`chat::ChatModel`] implementations for both
//! local and remote providers, plus the shared chat vocabulary
//! ([`chat::Message`], [`chat::ChatRequest`], [`chat::ChatResponse`]) they
//! speak. It has no opinion on routing or fallback policy; that lives in the
//! `pipeline` crate's task router, which holds one or more `Box<dyn ChatModel>`
//! and decides which to call.
//!
//! # Local Providers
//!
//! Local providers connect to LLM servers running on localhost or the local
//! network:
//! - **Ollama** - popular local LLM runner with wide model support
//!
//! # Remote Providers
//!
//! Remote providers connect to cloud-hosted LLM APIs:
//! - **Claude** - Anthropic's Claude models
//! - **OpenAI** - OpenAI models (GPT-4, o1, etc.)
//!
//! # Example Usage
//!
//! ## Local Provider (Ollama)
//!
//! ```rust,ignore
//! use llm::local::OllamaClient;
//! use llm::config::LocalLlmConfig;
//! use llm::chat::{ChatModel, ChatRequest, Message};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = LocalLlmConfig::new("http://localhost:11434", "llama2");
//!     let client = OllamaClient::new(config);
//!
//!     let request = ChatRequest::new(vec![
//!         Message::human("What is Rust?")
//!     ]);
//!
//!     let response = client.chat(request).await?;
//!     println!("Response: {}", response.message.text().unwrap());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Remote Provider (OpenAI) With Fallback
//!
//! ```rust,ignore
//! use llm::remote::OpenAiClient;
//! use llm::config::RemoteLlmConfig;
//! use llm::chat::{ChatModel, ChatRequest, Message};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RemoteLlmConfig::from_env(
//!         "OPENAI_API_KEY",
//!         "https://api.openai.com/v1",
//!         "gpt-4"
//!     )?;
//!     let client = OpenAiClient::new(config);
//!
//!     let request = ChatRequest::new(vec![
//!         Message::human("Summarize this transcript segment.")
//!     ]).with_temperature(0.3);
//!
//!     let response = client.chat(request).await?;
//!     println!("Response: {}", response.message.text().unwrap());
//!
//!     Ok(())
//! }
//! ```

pub mod chat;
pub mod config;
pub mod error;
pub mod provider_utils;

#[macro_use]
mod provider_macros;

#[cfg(feature = "local")]
pub mod local;

#[cfg(feature = "remote")]
pub mod remote;

// Re-export commonly used types
pub use chat::{
    ChatConfig, ChatModel, ChatRequest, ChatResponse, ChatStreamResponse, Message, MessageContent,
    MessageRole, ReasoningContent, ReasoningMode, ToolCall, ToolDefinition, ToolResult,
    UsageMetadata,
};
pub use config::{LocalLlmConfig, RemoteLlmConfig};
pub use error::{LlmError, Result};
pub use provider_utils::{ModelInfo, ProviderUtils};
