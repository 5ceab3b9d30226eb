//! Progress events emitted by a streaming agent run.

use serde::{Deserialize, Serialize};

use crate::mode::{AnswerMode, Confidence};
use crate::record::{AgentRunResult, LocalSource, SourceDigest, WebSource};
use crate::text::ellipsize;
use crate::tool::{ToolDisplay, ToolInvocation, ToolResult};

/// Characters of the query shown in the opening status event.
const STATUS_DETAIL_BUDGET: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Status {
        message: String,
        icon: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    ToolStart {
        tool: String,
        display_name: String,
        icon: String,
        message: String,
        detail: String,
        query: String,
    },
    ToolResult {
        tool: String,
        display_name: String,
        icon: String,
        status: String,
        count: usize,
        message: String,
    },
    Thinking {
        message: String,
        icon: String,
    },
    Sources {
        local: Vec<LocalSource>,
        web: Vec<WebSource>,
    },
    Answer {
        text: String,
        mode: AnswerMode,
        confidence: Confidence,
        tokens_in: u32,
        tokens_out: u32,
    },
    Error {
        message: String,
    },
}

impl ProgressEvent {
    pub fn understanding(query: &str) -> Self {
        ProgressEvent::Status {
            message: "Understanding your question".to_string(),
            icon: "🤔".to_string(),
            detail: Some(ellipsize(query, STATUS_DETAIL_BUDGET)),
        }
    }

    pub fn generating() -> Self {
        ProgressEvent::Status {
            message: "Generating response".to_string(),
            icon: "✍️".to_string(),
            detail: None,
        }
    }

    /// `iteration` is zero-based; the message counts from one.
    pub fn thinking(iteration: usize) -> Self {
        ProgressEvent::Thinking {
            message: format!("Analyzing results (step {})", iteration + 1),
            icon: "💭".to_string(),
        }
    }

    pub fn tool_start(invocation: &ToolInvocation) -> Self {
        let display = ToolDisplay::for_name(&invocation.name);
        ProgressEvent::ToolStart {
            tool: invocation.name.clone(),
            display_name: display.name,
            icon: display.icon,
            message: display.searching,
            detail: display.detail,
            query: invocation.display_query(),
        }
    }

    pub fn tool_result(name: &str, result: &ToolResult) -> Self {
        let display = ToolDisplay::for_name(name);
        let count = result.count();
        let (icon, message) = if result.is_success() {
            ("✓", format!("Found {} results", count))
        } else {
            ("✗", "No results".to_string())
        };
        ProgressEvent::ToolResult {
            tool: name.to_string(),
            display_name: display.name,
            icon: icon.to_string(),
            status: result.status.to_string(),
            count,
            message,
        }
    }

    pub fn sources(digest: SourceDigest) -> Self {
        ProgressEvent::Sources {
            local: digest.local,
            web: digest.web,
        }
    }

    pub fn answer(result: &AgentRunResult) -> Self {
        ProgressEvent::Answer {
            text: result.answer.clone(),
            mode: result.mode,
            confidence: result.confidence(),
            tokens_in: result.tokens_in,
            tokens_out: result.tokens_out,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ProgressEvent::Error {
            message: message.into(),
        }
    }

    /// Whether no further events follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Answer { .. } | ProgressEvent::Error { .. })
    }
}
