//! Remote LLM provider implementations.
//!
//! Cloud-hosted APIs, used as the fallback tier when a local provider is
//! unavailable or a task is routed to a stronger model.
//!
//! # Providers
//!
//! - **Claude** - Anthropic's Claude models
//! - **OpenAI** - OpenAI's GPT models

pub mod claude;
pub mod openai;

pub use claude::ClaudeClient;
pub use openai::OpenAiClient;
