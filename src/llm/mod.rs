//! Language-model access.
//!
//! - [`provider`]: the [`ChatModel`] trait, OpenAI and Gemini clients, and
//!   the lazy wrapper used by the pipeline.
//! - [`schema`]: structured-output schemas and reply validation.
//! - [`service`]: [`LlmService`], which turns documents into queries and
//!   (document, query) pairs into scores.

pub mod provider;
pub mod schema;
pub mod service;

pub use provider::{build_chat_model, ChatMessage, ChatModel, LazyChatModel, Role};
pub use schema::StructuredSchema;
pub use service::LlmService;
