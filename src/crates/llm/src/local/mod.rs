//! Local LLM provider implementations.
//!
//! Providers running on localhost or the local network. No API keys, lower
//! latency, and no per-token cost, at the expense of model quality versus a
//! top-tier hosted model.
//!
//! # Providers
//!
//! - **Ollama** - local LLM runner with wide model support

pub mod ollama;

pub use ollama::OllamaClient;
