//! Turning a model response into tool invocations.
//!
//! Two strategies are tried in a fixed order: structured calls declared by
//! the provider, then `<tool_name>{...}</tool_name>` pseudo-tags scraped from
//! the response text. The first strategy that finds anything wins.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::message::Message;
use crate::tool::{ToolInvocation, ToolKind};

/// Tool calls found in one model response.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedCalls {
    /// Declared through the provider's tool-calling convention.
    Structured(Vec<ToolInvocation>),
    /// Scraped from inline pseudo-tags in the response text.
    PseudoTag(Vec<ToolInvocation>),
    /// The response is a final answer.
    None,
}

impl ParsedCalls {
    pub fn is_none(&self) -> bool {
        matches!(self, ParsedCalls::None)
    }

    pub fn invocations(&self) -> &[ToolInvocation] {
        match self {
            ParsedCalls::Structured(calls) | ParsedCalls::PseudoTag(calls) => calls,
            ParsedCalls::None => &[],
        }
    }
}

/// One way of extracting tool calls from an assistant message.
pub trait CallStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Invocations found in `message`; empty if this strategy found none.
    fn extract(&self, message: &Message) -> Vec<ToolInvocation>;
}

/// Calls the provider declared in its `tool_calls` field.
pub struct StructuredCalls;

impl CallStrategy for StructuredCalls {
    fn name(&self) -> &'static str {
        "structured"
    }

    fn extract(&self, message: &Message) -> Vec<ToolInvocation> {
        message
            .tool_calls
            .iter()
            .map(|call| {
                ToolInvocation::new(call.name.clone(), parse_structured_arguments(&call.arguments))
                    .with_id(call.id.clone())
            })
            .collect()
    }
}

/// Calls written inline as `<rag_search>{"query": "..."}</rag_search>`.
pub struct PseudoTagCalls;

impl CallStrategy for PseudoTagCalls {
    fn name(&self) -> &'static str {
        "pseudo_tag"
    }

    fn extract(&self, message: &Message) -> Vec<ToolInvocation> {
        let mut found = Vec::new();
        for kind in ToolKind::ALL {
            let Some(pattern) = tag_pattern(kind) else {
                continue;
            };
            for captures in pattern.captures_iter(&message.content) {
                let raw = captures.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
                let (arguments, strategy) = parse_tag_arguments(raw);
                debug!(tool = %kind, strategy = ?strategy, "Parsed pseudo-tag tool call");
                found.push(ToolInvocation::new(kind.wire_name(), arguments));
            }
        }
        found
    }
}

fn tag_pattern(kind: ToolKind) -> Option<&'static Regex> {
    static PATTERNS: OnceLock<Vec<Option<Regex>>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        ToolKind::ALL
            .iter()
            .map(|kind| {
                let names = format!("{}|{}", kind.wire_name(), kind.alias());
                let source = format!(r"(?is)<(?:{names})>(.*?)(?:</(?:{names})>|</function>|$)");
                match Regex::new(&source) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        warn!(tool = %kind, error = %e, "Invalid pseudo-tag pattern");
                        None
                    }
                }
            })
            .collect()
    });
    let position = ToolKind::ALL.iter().position(|k| *k == kind)?;
    patterns.get(position)?.as_ref()
}

/// Tries each strategy in priority order.
pub struct ToolCallParser {
    structured: StructuredCalls,
    pseudo_tag: PseudoTagCalls,
}

impl Default for ToolCallParser {
    fn default() -> Self {
        Self {
            structured: StructuredCalls,
            pseudo_tag: PseudoTagCalls,
        }
    }
}

impl ToolCallParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&self, message: &Message) -> ParsedCalls {
        let structured = self.structured.extract(message);
        if !structured.is_empty() {
            return ParsedCalls::Structured(structured);
        }

        let tagged = self.pseudo_tag.extract(message);
        if !tagged.is_empty() {
            debug!(
                strategy = self.pseudo_tag.name(),
                calls = tagged.len(),
                "Falling back to inline tool calls"
            );
            return ParsedCalls::PseudoTag(tagged);
        }

        ParsedCalls::None
    }
}

/// Arguments of a structured call. Anything that is not a JSON object
/// becomes an empty argument set.
pub fn parse_structured_arguments(raw: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            if !raw.trim().is_empty() {
                warn!(arguments = %raw, "Malformed tool arguments, using empty set");
            }
            Map::new()
        }
    }
}

/// Which fallback produced a pseudo-tag argument set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgStrategy {
    Json,
    QuoteSubstituted,
    RawText,
}

/// Arguments of a pseudo-tag call: JSON, then JSON with single quotes
/// swapped for double quotes, then the raw text as both `query` and `url`.
pub fn parse_tag_arguments(raw: &str) -> (Map<String, Value>, ArgStrategy) {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw) {
        return (map, ArgStrategy::Json);
    }

    let substituted = raw.replace('\'', "\"");
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&substituted) {
        return (map, ArgStrategy::QuoteSubstituted);
    }

    let mut map = Map::new();
    map.insert("query".to_string(), Value::String(raw.to_string()));
    map.insert("url".to_string(), Value::String(raw.to_string()));
    (map, ArgStrategy::RawText)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolCall;
    use serde_json::json;

    #[test]
    fn test_single_quoted_arguments_use_second_strategy() {
        let (args, strategy) = parse_tag_arguments("{'query': 'theft'}");
        assert_eq!(strategy, ArgStrategy::QuoteSubstituted);
        assert_eq!(Value::Object(args), json!({"query": "theft"}));
    }

    #[test]
    fn test_valid_json_uses_first_strategy() {
        let (args, strategy) = parse_tag_arguments(r#"{"url": "https://doj.gov.in"}"#);
        assert_eq!(strategy, ArgStrategy::Json);
        assert_eq!(args["url"], "https://doj.gov.in");
    }

    #[test]
    fn test_raw_text_becomes_query_and_url() {
        let (args, strategy) = parse_tag_arguments("punishment for theft");
        assert_eq!(strategy, ArgStrategy::RawText);
        assert_eq!(args["query"], "punishment for theft");
        assert_eq!(args["url"], "punishment for theft");
    }

    #[test]
    fn test_structured_arguments_fall_back_to_empty() {
        assert!(parse_structured_arguments("{\"query\": ").is_empty());
        assert!(parse_structured_arguments("[1, 2]").is_empty());
        assert_eq!(parse_structured_arguments(r#"{"query":"bail"}"#)["query"], "bail");
    }

    #[test]
    fn test_structured_calls_take_priority() {
        let message = Message::assistant_with_tool_calls(
            "<web_search>{\"query\": \"x\"}</web_search>",
            vec![ToolCall::new("call_1", "rag_search", r#"{"query":"theft"}"#)],
        );
        let parsed = ToolCallParser::new().parse(&message);
        let ParsedCalls::Structured(calls) = parsed else {
            panic!("expected structured calls");
        };
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id.as_deref(), Some("call_1"));
        assert_eq!(calls[0].name, "rag_search");
    }

    #[test]
    fn test_pseudo_tags_with_various_terminators() {
        let text = "Let me check. <rag_search>{\"query\": \"theft\"}</function> \
                    then <WEB_SEARCH>{'query': 'BNS 303'}</WEB_SEARCH>";
        let parsed = ToolCallParser::new().parse(&Message::assistant(text));
        let ParsedCalls::PseudoTag(calls) = parsed else {
            panic!("expected pseudo-tag calls");
        };
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "rag_search");
        assert_eq!(calls[0].arguments["query"], "theft");
        assert_eq!(calls[1].name, "web_search");
        assert_eq!(calls[1].arguments["query"], "BNS 303");
        assert!(calls.iter().all(|c| c.id.is_none()));
    }

    #[test]
    fn test_pseudo_tag_runs_to_end_of_text() {
        let parsed = ToolCallParser::new().parse(&Message::assistant("<read_url>https://indiankanoon.org/doc/1/"));
        let calls = parsed.invocations();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments["url"], "https://indiankanoon.org/doc/1/");
    }

    #[test]
    fn test_spec_style_tag_names_accepted() {
        let parsed = ToolCallParser::new().parse(&Message::assistant("<retrieve_local>{\"query\": \"bail\"}</retrieve_local>"));
        assert_eq!(parsed.invocations()[0].kind(), Some(ToolKind::RetrieveLocal));
    }

    #[test]
    fn test_plain_answer_has_no_calls() {
        let parsed = ToolCallParser::new().parse(&Message::assistant("Theft is punishable under Section 303 [1]."));
        assert!(parsed.is_none());
        assert!(parsed.invocations().is_empty());
    }
}
