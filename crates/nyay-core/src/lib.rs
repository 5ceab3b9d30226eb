//! nyay-core: agent loop and domain types for Nyay Sathi
//!
//! This crate holds everything that does not talk to the network directly:
//! the oracle contracts, the tool dispatcher, tool-call parsing, answer-mode
//! classification, the batch and streaming agent loop, and the single-shot
//! explainer.

pub mod agent;
pub mod blocking;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod event;
pub mod explain;
pub mod message;
pub mod mode;
pub mod oracle;
pub mod parse;
pub mod prompts;
pub mod provider;
pub mod record;
pub mod sanitize;
pub mod text;
pub mod tool;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use agent::{is_greeting, AgentConfig, AgentContext, LegalAgent};
pub use blocking::run_blocking;
pub use dispatch::ToolDispatcher;
pub use domain::{domain_of, DomainWhitelist};
pub use error::Error;
pub use event::ProgressEvent;
pub use explain::{Explainer, ExplainerConfig, Explanation};
pub use message::{Message, Role, ToolCall, Usage};
pub use mode::{classify, AnswerMode, Confidence};
pub use oracle::{Embedder, PageContent, RetrievalOracle, SectionHit, TrustedWebOracle, WebHit};
pub use parse::{ParsedCalls, ToolCallParser};
pub use provider::{CompletionRequest, CompletionResponse, FinishReason, Provider, ToolChoice};
pub use record::{AgentRunResult, LocalSource, SourceDigest, ToolUsageRecord, WebSource};
pub use sanitize::{clean_extracted_text, sanitize_web_content, validate_query};
pub use tool::{
    tool_menu, PropertySchema, ToolArgs, ToolData, ToolDefinition, ToolInvocation, ToolKind,
    ToolParameters, ToolResult, ToolStatus,
};

pub type Result<T> = std::result::Result<T, Error>;
