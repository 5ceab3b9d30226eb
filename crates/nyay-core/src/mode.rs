//! Answer mode and confidence classification.

use serde::{Deserialize, Serialize};

use crate::record::ToolUsageRecord;
use crate::tool::{ToolData, ToolKind};

/// How an answer was grounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerMode {
    /// Local statutory retrieval alone supported the answer.
    Grounded,
    /// Trusted web search was also consulted.
    Hybrid,
    /// No usable source; general knowledge only.
    Fallback,
    /// The run failed.
    Error,
}

impl AnswerMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AnswerMode::Grounded => "grounded",
            AnswerMode::Hybrid => "hybrid",
            AnswerMode::Fallback => "fallback",
            AnswerMode::Error => "error",
        }
    }

    pub fn confidence(self) -> Confidence {
        match self {
            AnswerMode::Grounded => Confidence::High,
            AnswerMode::Hybrid => Confidence::Medium,
            AnswerMode::Fallback | AnswerMode::Error => Confidence::Low,
        }
    }
}

impl std::fmt::Display for AnswerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn succeeded(usage: &[ToolUsageRecord], kind: ToolKind) -> bool {
    usage
        .iter()
        .any(|record| record.kind() == Some(kind) && record.is_success())
}

/// Mode of a completed agent run, from its tool-usage log alone.
///
/// `hybrid` if any web search succeeded, else `grounded` if any local
/// retrieval succeeded, else `fallback`.
pub fn classify(usage: &[ToolUsageRecord]) -> AnswerMode {
    if succeeded(usage, ToolKind::SearchWeb) {
        AnswerMode::Hybrid
    } else if succeeded(usage, ToolKind::RetrieveLocal) {
        AnswerMode::Grounded
    } else {
        AnswerMode::Fallback
    }
}

/// Top similarity score of the first successful local retrieval.
pub fn top_score(usage: &[ToolUsageRecord]) -> Option<f32> {
    usage
        .iter()
        .filter(|record| record.kind() == Some(ToolKind::RetrieveLocal) && record.is_success())
        .find_map(|record| match &record.data {
            Some(ToolData::Sections(sections)) => sections.first().map(|s| s.score),
            _ => None,
        })
}

/// Prompt routing used by the non-agentic explainer.
pub fn route_by_score(top_score: Option<f32>, has_web: bool, threshold: f32) -> AnswerMode {
    match top_score {
        None if !has_web => AnswerMode::Fallback,
        _ if has_web => AnswerMode::Hybrid,
        Some(score) if score >= threshold => AnswerMode::Grounded,
        _ => AnswerMode::Fallback,
    }
}
