//! nyay-providers: LLM and embedding clients for Nyay Sathi
//!
//! Both clients speak the OpenAI-compatible HTTP API, which Groq and most
//! self-hosted inference servers expose.

pub mod embeddings;
pub mod openai;

pub use embeddings::{OpenAIEmbedder, DEFAULT_EMBEDDING_MODEL};
pub use openai::{OpenAIProvider, GROQ_BASE_URL, GROQ_DEFAULT_MODEL};
