//! Per-run tool log and the terminal result of an agent run.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::mode::{self, AnswerMode, Confidence};
use crate::text::truncate_chars;
use crate::tool::{ToolData, ToolKind, ToolResult, ToolStatus};

/// Characters of section text kept in a source citation.
pub const SOURCE_TEXT_BUDGET: usize = 300;

/// One tool call made during a run, in call order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUsageRecord {
    pub name: String,
    pub arguments: Map<String, Value>,
    pub status: ToolStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ToolData>,
}

impl ToolUsageRecord {
    pub fn new(
        name: impl Into<String>,
        arguments: Map<String, Value>,
        status: ToolStatus,
        data: Option<ToolData>,
    ) -> Self {
        Self {
            name: name.into(),
            arguments,
            status,
            data,
        }
    }

    pub fn from_result(name: impl Into<String>, arguments: Map<String, Value>, result: &ToolResult) -> Self {
        Self::new(name, arguments, result.status, result.data.clone())
    }

    pub fn kind(&self) -> Option<ToolKind> {
        ToolKind::from_name(&self.name)
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalSource {
    pub act: String,
    pub section: String,
    pub text: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSource {
    pub url: String,
    pub title: String,
    pub domain: String,
}

/// Citable sources gathered from successful retrieval and search calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceDigest {
    pub local: Vec<LocalSource>,
    pub web: Vec<WebSource>,
}

impl SourceDigest {
    pub fn from_usage(usage: &[ToolUsageRecord]) -> Self {
        let mut digest = Self::default();

        for record in usage.iter().filter(|r| r.is_success()) {
            match (record.kind(), &record.data) {
                (Some(ToolKind::RetrieveLocal), Some(ToolData::Sections(sections))) => {
                    for s in sections {
                        if digest.local.iter().any(|l| l.act == s.act && l.section == s.section) {
                            continue;
                        }
                        digest.local.push(LocalSource {
                            act: s.act.clone(),
                            section: s.section.clone(),
                            text: truncate_chars(&s.text, SOURCE_TEXT_BUDGET).to_string(),
                            score: s.score,
                        });
                    }
                }
                (Some(ToolKind::SearchWeb), Some(ToolData::Web(results))) => {
                    for r in results {
                        if digest.web.iter().any(|w| w.url == r.url) {
                            continue;
                        }
                        digest.web.push(WebSource {
                            url: r.url.clone(),
                            title: r.title.clone(),
                            domain: r.domain.clone(),
                        });
                    }
                }
                _ => {}
            }
        }

        digest
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.web.is_empty()
    }
}

/// Terminal output of one agent run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRunResult {
    pub answer: String,
    pub mode: AnswerMode,
    pub tool_usage: Vec<ToolUsageRecord>,
    pub tokens_in: u32,
    pub tokens_out: u32,
}

impl AgentRunResult {
    pub fn confidence(&self) -> Confidence {
        self.mode.confidence()
    }

    pub fn sources(&self) -> SourceDigest {
        SourceDigest::from_usage(&self.tool_usage)
    }

    pub fn top_score(&self) -> Option<f32> {
        mode::top_score(&self.tool_usage)
    }

    pub fn tool_calls(&self) -> usize {
        self.tool_usage.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{SectionRecord, WebRecord};

    fn sections(act: &str, section: &str, text: &str) -> Option<ToolData> {
        Some(ToolData::Sections(vec![SectionRecord {
            index: 1,
            act: act.to_string(),
            section: section.to_string(),
            text: text.to_string(),
            score: 0.82,
        }]))
    }

    #[test]
    fn test_digest_collects_successful_sources() {
        let usage = vec![
            ToolUsageRecord::new("rag_search", Map::new(), ToolStatus::Success, sections("IPC", "378", &"x".repeat(500))),
            ToolUsageRecord::new("rag_search", Map::new(), ToolStatus::Success, sections("IPC", "378", "dup")),
            ToolUsageRecord::new(
                "web_search",
                Map::new(),
                ToolStatus::Success,
                Some(ToolData::Web(vec![WebRecord {
                    index: 1,
                    title: "Theft".to_string(),
                    snippet: String::new(),
                    url: "https://indiankanoon.org/doc/1/".to_string(),
                    domain: "indiankanoon.org".to_string(),
                }])),
            ),
            ToolUsageRecord::new("web_search", Map::new(), ToolStatus::Error, None),
        ];

        let digest = SourceDigest::from_usage(&usage);
        assert_eq!(digest.local.len(), 1);
        assert_eq!(digest.local[0].text.len(), SOURCE_TEXT_BUDGET);
        assert_eq!(digest.web.len(), 1);
        assert_eq!(digest.web[0].domain, "indiankanoon.org");
    }

    #[test]
    fn test_digest_skips_failed_calls() {
        let usage = vec![ToolUsageRecord::new("rag_search", Map::new(), ToolStatus::NoResults, Some(ToolData::Sections(vec![])))];
        assert!(SourceDigest::from_usage(&usage).is_empty());
    }

    #[test]
    fn test_run_result_confidence() {
        let result = AgentRunResult {
            answer: "Theft is defined in Section 378 [1].".to_string(),
            mode: AnswerMode::Grounded,
            tool_usage: vec![ToolUsageRecord::new("rag_search", Map::new(), ToolStatus::Success, sections("IPC", "378", "t"))],
            tokens_in: 10,
            tokens_out: 5,
        };
        assert_eq!(result.confidence(), Confidence::High);
        assert_eq!(result.top_score(), Some(0.82));
        assert_eq!(result.sources().local[0].section, "378");
    }
}
