//! Single-shot explanations: retrieve, pick a prompt by similarity score,
//! ask the model once. No tool loop.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::agent::AgentContext;
use crate::message::Message;
use crate::mode::{route_by_score, AnswerMode};
use crate::oracle::{SectionHit, WebHit};
use crate::prompts::explainer_prompt;
use crate::provider::CompletionRequest;
use crate::record::{LocalSource, SourceDigest, WebSource, SOURCE_TEXT_BUDGET};
use crate::text::truncate_chars;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.60;

/// Sections below this score never enter the context.
pub const MIN_CONTEXT_SCORE: f32 = 0.5;
const MAX_CONTEXT_SECTIONS: usize = 3;
const MAX_CONTEXT_WEB: usize = 2;
const CONTEXT_SECTION_BUDGET: usize = 800;
const CONTEXT_SNIPPET_BUDGET: usize = 400;

pub const UNAVAILABLE_EXPLANATION: &str = "LLM service not available. Please check API key configuration.\n\n\
Disclaimer: This information is for educational purposes only.";

pub const FAILED_EXPLANATION: &str = "An error occurred while generating the explanation. Please try again later.\n\n\
Disclaimer: This information is for educational purposes only.";

#[derive(Debug, Clone)]
pub struct ExplainerConfig {
    pub confidence_threshold: f32,
    pub top_k: usize,
    /// Consult the web oracle when local retrieval is below threshold.
    pub web_supplement: bool,
    pub temperature: f32,
    pub max_tokens: u32,
    pub model: Option<String>,
}

impl Default for ExplainerConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            top_k: 5,
            web_supplement: false,
            temperature: 0.1,
            max_tokens: 800,
            model: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub mode: AnswerMode,
    pub explanation: String,
    pub top_score: f32,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub sources: SourceDigest,
}

impl Explanation {
    fn degraded(text: &str, sources: SourceDigest) -> Self {
        Self {
            mode: AnswerMode::Fallback,
            explanation: text.to_string(),
            top_score: 0.0,
            tokens_in: 0,
            tokens_out: 0,
            sources,
        }
    }
}

pub struct Explainer {
    context: Arc<AgentContext>,
    config: ExplainerConfig,
}

impl Explainer {
    pub fn new(context: Arc<AgentContext>, config: ExplainerConfig) -> Self {
        Self { context, config }
    }

    pub async fn explain(&self, query: &str) -> Explanation {
        let threshold = self.config.confidence_threshold;
        let dispatcher = &self.context.dispatcher;

        let local = match dispatcher.retrieval().search(query, self.config.top_k).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "Retrieval failed, explaining without local sources");
                Vec::new()
            }
        };
        let top_score = local.first().map(|hit| hit.score);

        let wants_web = self.config.web_supplement && top_score.map_or(true, |s| s < threshold);
        let web = if wants_web {
            dispatcher
                .web()
                .search(query, MAX_CONTEXT_WEB)
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "Web supplement failed");
                    Vec::new()
                })
        } else {
            Vec::new()
        };

        let mode = route_by_score(top_score, !web.is_empty(), threshold);
        debug!(mode = %mode, top_score = top_score.unwrap_or(0.0), web_results = web.len(), "Explainer routed");

        let relevant: Vec<&SectionHit> = local
            .iter()
            .filter(|hit| hit.score >= MIN_CONTEXT_SCORE)
            .take(MAX_CONTEXT_SECTIONS)
            .collect();
        let (context, sources) = build_context(&relevant, &web, mode);

        let Some(provider) = &self.context.provider else {
            warn!("No LLM provider configured for explainer");
            return Explanation::degraded(UNAVAILABLE_EXPLANATION, sources);
        };

        let mut request = CompletionRequest::new(vec![
            Message::system(explainer_prompt(mode)),
            Message::user(format!("USER QUESTION:\n{}\n\nAVAILABLE INFORMATION:\n{}", query, context)),
        ])
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);
        if let Some(model) = &self.config.model {
            request = request.with_model(model.clone());
        }

        match provider.complete(request).await {
            Ok(response) => Explanation {
                mode,
                explanation: response.message.content.trim().to_string(),
                top_score: top_score.unwrap_or(0.0),
                tokens_in: response.usage.prompt_tokens,
                tokens_out: response.usage.completion_tokens,
                sources,
            },
            Err(e) => {
                error!(error = %e, "Explainer LLM call failed");
                Explanation::degraded(FAILED_EXPLANATION, sources)
            }
        }
    }
}

/// Numbered context block plus the sources it cites.
fn build_context(local: &[&SectionHit], web: &[WebHit], mode: AnswerMode) -> (String, SourceDigest) {
    let mut parts = Vec::new();
    let mut sources = SourceDigest::default();

    if !local.is_empty() && matches!(mode, AnswerMode::Grounded | AnswerMode::Hybrid) {
        parts.push("SOURCES:".to_string());
        for (i, hit) in local.iter().enumerate() {
            let act: &str = if hit.act_name.is_empty() { "Unknown" } else { &hit.act_name };
            parts.push(format!(
                "[{}] {} - Section {}\n    {}\n",
                i + 1,
                act,
                hit.section_number,
                truncate_chars(&hit.text, CONTEXT_SECTION_BUDGET)
            ));
            sources.local.push(LocalSource {
                act: act.to_string(),
                section: hit.section_number.clone(),
                text: truncate_chars(&hit.text, SOURCE_TEXT_BUDGET).to_string(),
                score: hit.score,
            });
        }
    }

    if !web.is_empty() && mode == AnswerMode::Hybrid {
        let offset = sources.local.len() + 1;
        for (i, hit) in web.iter().take(MAX_CONTEXT_WEB).enumerate() {
            parts.push(format!(
                "[{}] {} ({})\n    {}\n",
                offset + i,
                hit.title,
                hit.domain,
                truncate_chars(&hit.snippet, CONTEXT_SNIPPET_BUDGET)
            ));
            sources.web.push(WebSource {
                url: hit.url.clone(),
                title: hit.title.clone(),
                domain: hit.domain.clone(),
            });
        }
    }

    let context = if parts.is_empty() {
        "(No relevant sources found)".to_string()
    } else {
        parts.join("\n")
    };
    (context, sources)
}
