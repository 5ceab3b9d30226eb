//! The legal-question agent loop.
//!
//! One run alternates model calls and tool dispatch until the model answers
//! in plain text or the iteration cap is reached. Both the batch and the
//! streaming entry points drive the same loop; streaming only adds an event
//! sink.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use crate::dispatch::ToolDispatcher;
use crate::error::Error;
use crate::event::ProgressEvent;
use crate::message::Message;
use crate::mode::{classify, AnswerMode};
use crate::parse::{ParsedCalls, ToolCallParser};
use crate::prompts::AGENT_SYSTEM_PROMPT;
use crate::provider::{CompletionRequest, Provider, ToolChoice};
use crate::record::{AgentRunResult, ToolUsageRecord};
use crate::text::truncate_for_transcript;
use crate::tool::{tool_menu, ToolInvocation, ToolKind, ToolResult};

pub const MISSING_KEY_ANSWER: &str = "API key not configured.";
pub const MISSING_KEY_EVENT: &str = "API key not configured";
pub const EMPTY_ANSWER: &str = "I couldn't generate a response.";
pub const EXHAUSTED_ANSWER: &str = "I couldn't complete the request within the allowed steps.";

/// Events buffered between a streaming run and its consumer.
const EVENT_BUFFER: usize = 32;

const GREETINGS: &[&str] = &[
    "hi",
    "hello",
    "hey",
    "good morning",
    "good evening",
    "good afternoon",
    "namaste",
    "namaskar",
    "thanks",
    "thank you",
    "bye",
    "goodbye",
];

/// Whether `query` is small talk that should not force a retrieval call.
pub fn is_greeting(query: &str) -> bool {
    let lowered = query.trim().to_lowercase();
    let normalized = lowered.trim_end_matches(['!', '.', ',', '?']);
    GREETINGS.contains(&normalized) || normalized.chars().count() < 4
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub system_prompt: String,
    /// Maximum model calls per run.
    pub max_iterations: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Overrides the provider's default model.
    pub model: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: AGENT_SYSTEM_PROMPT.to_string(),
            max_iterations: 5,
            temperature: 0.1,
            max_tokens: 2048,
            model: None,
        }
    }
}

impl AgentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Shared collaborators, built once at startup and handed to every run.
pub struct AgentContext {
    /// `None` when no LLM credentials are configured.
    pub provider: Option<Arc<dyn Provider>>,
    pub dispatcher: Arc<ToolDispatcher>,
}

impl AgentContext {
    pub fn new(provider: Option<Arc<dyn Provider>>, dispatcher: Arc<ToolDispatcher>) -> Self {
        Self { provider, dispatcher }
    }
}

/// Where a run reports progress. Silent for batch runs.
struct Progress<'a> {
    tx: Option<&'a mpsc::Sender<ProgressEvent>>,
}

impl<'a> Progress<'a> {
    fn silent() -> Self {
        Self { tx: None }
    }

    fn channel(tx: &'a mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Fails with `Cancelled` once the consumer has gone away.
    async fn emit(&self, event: ProgressEvent) -> Result<(), Error> {
        match self.tx {
            Some(tx) => tx.send(event).await.map_err(|_| Error::Cancelled),
            None => Ok(()),
        }
    }
}

/// Mutable state owned by a single run.
struct RunState {
    transcript: Vec<Message>,
    usage: Vec<ToolUsageRecord>,
    tokens_in: u32,
    tokens_out: u32,
}

impl RunState {
    fn new(system_prompt: &str, query: &str) -> Self {
        Self {
            transcript: vec![Message::system(system_prompt), Message::user(query)],
            usage: Vec::new(),
            tokens_in: 0,
            tokens_out: 0,
        }
    }

    fn finish(self, answer: impl Into<String>, mode: AnswerMode) -> AgentRunResult {
        AgentRunResult {
            answer: answer.into(),
            mode,
            tool_usage: self.usage,
            tokens_in: self.tokens_in,
            tokens_out: self.tokens_out,
        }
    }
}

#[derive(Clone)]
pub struct LegalAgent {
    context: Arc<AgentContext>,
    config: Arc<AgentConfig>,
    parser: Arc<ToolCallParser>,
}

impl LegalAgent {
    pub fn new(context: Arc<AgentContext>, config: AgentConfig) -> Self {
        Self {
            context,
            config: Arc::new(config),
            parser: Arc::new(ToolCallParser::new()),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Answer `query`, returning once the run is complete. Never fails:
    /// errors are reported through `AnswerMode::Error`.
    pub async fn run(&self, query: &str) -> AgentRunResult {
        let Some(provider) = self.context.provider.clone() else {
            warn!("No LLM provider configured");
            return RunState::new("", query).finish(MISSING_KEY_ANSWER, AnswerMode::Error);
        };

        let mut state = RunState::new(&self.config.system_prompt, query);
        let outcome = self.drive(provider.as_ref(), query, &Progress::silent(), &mut state).await;

        match outcome {
            Ok(Some(answer)) => {
                let mode = classify(&state.usage);
                info!(mode = %mode, tool_calls = state.usage.len(), tokens_in = state.tokens_in, tokens_out = state.tokens_out, "Agent run complete");
                state.finish(answer, mode)
            }
            Ok(None) => state.finish(EXHAUSTED_ANSWER, AnswerMode::Fallback),
            Err(e) => state.finish(format!("An error occurred: {}", e), AnswerMode::Error),
        }
    }

    /// Answer `query`, yielding progress events as they happen.
    ///
    /// The run executes on its own task. Dropping the stream stops the run
    /// at its next event.
    pub fn run_streaming(&self, query: impl Into<String>) -> ReceiverStream<ProgressEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let agent = self.clone();
        let query = query.into();
        tokio::spawn(async move {
            agent.stream_into(&query, &tx).await;
        });
        ReceiverStream::new(rx)
    }

    async fn stream_into(&self, query: &str, tx: &mpsc::Sender<ProgressEvent>) {
        let progress = Progress::channel(tx);

        let Some(provider) = self.context.provider.clone() else {
            warn!("No LLM provider configured");
            let _ = progress.emit(ProgressEvent::error(MISSING_KEY_EVENT)).await;
            return;
        };

        if progress.emit(ProgressEvent::understanding(query)).await.is_err() {
            return;
        }

        let mut state = RunState::new(&self.config.system_prompt, query);
        let outcome = self.drive(provider.as_ref(), query, &progress, &mut state).await;

        let delivered = match outcome {
            Ok(Some(answer)) => self.finish_stream(&progress, state, answer).await,
            Ok(None) => {
                let result = state.finish(EXHAUSTED_ANSWER, AnswerMode::Fallback);
                progress.emit(ProgressEvent::answer(&result)).await
            }
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => progress.emit(ProgressEvent::error(e.to_string())).await,
        };

        if delivered.is_err() {
            debug!("Progress consumer went away, run abandoned");
        }
    }

    async fn finish_stream(&self, progress: &Progress<'_>, state: RunState, answer: String) -> Result<(), Error> {
        progress.emit(ProgressEvent::generating()).await?;

        let mode = classify(&state.usage);
        let result = state.finish(answer, mode);

        let sources = result.sources();
        if !sources.is_empty() {
            progress.emit(ProgressEvent::sources(sources)).await?;
        }
        progress.emit(ProgressEvent::answer(&result)).await
    }

    /// The shared loop. `Ok(Some(answer))` on a final answer, `Ok(None)`
    /// when the iteration cap is reached.
    async fn drive(
        &self,
        provider: &dyn Provider,
        query: &str,
        progress: &Progress<'_>,
        state: &mut RunState,
    ) -> Result<Option<String>, Error> {
        let greeting = is_greeting(query);
        let max_iterations = self.config.max_iterations;

        for iteration in 0..max_iterations {
            if iteration > 0 {
                progress.emit(ProgressEvent::thinking(iteration)).await?;
            }

            let tool_choice = if iteration == 0 && !greeting {
                ToolChoice::function(ToolKind::RetrieveLocal.wire_name())
            } else {
                ToolChoice::Auto
            };

            debug!(
                iteration = iteration + 1,
                max_iterations,
                messages = state.transcript.len(),
                forced = tool_choice.is_forced(),
                "Agent iteration starting"
            );

            let mut request = CompletionRequest::new(state.transcript.clone())
                .with_tools(tool_menu())
                .with_tool_choice(tool_choice)
                .with_temperature(self.config.temperature)
                .with_max_tokens(self.config.max_tokens);
            if let Some(model) = &self.config.model {
                request = request.with_model(model.clone());
            }

            let response = provider.complete(request).await.map_err(|e| {
                error!(iteration = iteration + 1, error = %e, "LLM call failed");
                e
            })?;

            state.tokens_in += response.usage.prompt_tokens;
            state.tokens_out += response.usage.completion_tokens;

            match self.parser.parse(&response.message) {
                ParsedCalls::Structured(calls) => {
                    state.transcript.push(Message::assistant_with_tool_calls(
                        response.message.content.clone(),
                        response.message.tool_calls.clone(),
                    ));
                    for call in calls {
                        let result = self.execute(&call, progress, state).await?;
                        let serialized = serde_json::to_string(&result)?;
                        state.transcript.push(Message::tool_result(
                            call.id.unwrap_or_default(),
                            truncate_for_transcript(&serialized),
                        ));
                    }
                }
                ParsedCalls::PseudoTag(calls) => {
                    state.transcript.push(Message::assistant(response.message.content.clone()));
                    let mut lines = Vec::with_capacity(calls.len());
                    for call in calls {
                        let result = self.execute(&call, progress, state).await?;
                        lines.push(format!("Result of {}: {}", call.name, serde_json::to_string(&result)?));
                    }
                    state.transcript.push(Message::user(format!(
                        "Tool Output:\n{}\n\nBased on these results, please provide the final answer.",
                        lines.join("\n")
                    )));
                }
                ParsedCalls::None => {
                    let answer = response.message.content.trim();
                    debug!(iterations = iteration + 1, answer_len = answer.len(), "Agent produced final answer");
                    return Ok(Some(if answer.is_empty() {
                        EMPTY_ANSWER.to_string()
                    } else {
                        answer.to_string()
                    }));
                }
            }
        }

        warn!(max_iterations, "Agent exceeded max iterations");
        Ok(None)
    }

    /// Dispatch one call, logging it to the run and reporting progress.
    async fn execute(
        &self,
        call: &ToolInvocation,
        progress: &Progress<'_>,
        state: &mut RunState,
    ) -> Result<ToolResult, Error> {
        progress.emit(ProgressEvent::tool_start(call)).await?;

        let result = self.context.dispatcher.dispatch(&call.name, &call.arguments).await;

        progress.emit(ProgressEvent::tool_result(&call.name, &result)).await?;
        state
            .usage
            .push(ToolUsageRecord::from_result(call.name.clone(), call.arguments.clone(), &result));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Role, ToolCall, Usage};
    use crate::oracle::{SectionHit, WebHit};
    use crate::testing::{MockProvider, MockRetrieval, MockWeb};
    use crate::text::TRUNCATION_SUFFIX;
    use crate::tool::ToolStatus;
    use tokio_stream::StreamExt;

    struct Harness {
        agent: LegalAgent,
        provider: Arc<MockProvider>,
        retrieval: Arc<MockRetrieval>,
        web: Arc<MockWeb>,
    }

    fn harness(retrieval: MockRetrieval, web: MockWeb) -> Harness {
        let provider = Arc::new(MockProvider::new());
        let retrieval = Arc::new(retrieval);
        let web = Arc::new(web);
        let dispatcher = Arc::new(ToolDispatcher::new(retrieval.clone(), web.clone()));
        let context = Arc::new(AgentContext::new(Some(provider.clone() as Arc<dyn Provider>), dispatcher));
        Harness {
            agent: LegalAgent::new(context, AgentConfig::default()),
            provider,
            retrieval,
            web,
        }
    }

    fn theft_hit() -> SectionHit {
        SectionHit {
            text: "Whoever, intending to take dishonestly any movable property...".to_string(),
            act_name: "Indian Penal Code".to_string(),
            section_number: "378".to_string(),
            score: 0.82,
        }
    }

    #[test]
    fn test_is_greeting() {
        assert!(is_greeting("hello"));
        assert!(is_greeting("  Good Morning!! "));
        assert!(is_greeting("Thank you."));
        assert!(is_greeting("ok?"));
        assert!(!is_greeting("What is the punishment for theft?"));
        assert!(!is_greeting("hello, can I be arrested without a warrant?"));
    }

    #[tokio::test]
    async fn test_grounded_end_to_end() {
        let h = harness(MockRetrieval::with_hits(vec![theft_hit()]), MockWeb::new());
        h.provider.queue_raw_response(MockProvider::tool_call_response(
            vec![ToolCall::new("call_1", "rag_search", r#"{"query":"punishment for theft"}"#)],
            Usage::new(120, 20),
        ));
        h.provider.queue_raw_response(MockProvider::text_response(
            "Theft is defined in Section 378 of the Indian Penal Code [1].",
            Usage::new(300, 40),
        ));

        let result = h.agent.run("What is the punishment for theft?").await;

        assert_eq!(result.mode, AnswerMode::Grounded);
        assert_eq!(result.tool_usage.len(), 1);
        assert!(result.answer.contains("[1]"));
        assert_eq!((result.tokens_in, result.tokens_out), (420, 60));
        assert_eq!(h.retrieval.search_count(), 1);
    }

    #[tokio::test]
    async fn test_first_call_is_forced_then_auto() {
        let h = harness(MockRetrieval::with_hits(vec![theft_hit()]), MockWeb::new());
        h.provider.queue_tool_call("call_1", "rag_search", r#"{"query":"theft"}"#);
        h.provider.queue_response("Section 378 [1].");

        h.agent.run("What is the punishment for theft?").await;

        let first = h.provider.request(0).unwrap();
        assert_eq!(first.tool_choice, ToolChoice::function("rag_search"));
        assert_eq!(first.temperature, Some(0.1));
        assert_eq!(first.max_tokens, Some(2048));
        assert_eq!(first.tools.len(), 3);
        assert_eq!(first.messages[0].role, Role::System);

        let second = h.provider.request(1).unwrap();
        assert_eq!(second.tool_choice, ToolChoice::Auto);
        let assistant = &second.messages[2];
        assert_eq!(assistant.tool_calls.len(), 1);
        let tool = &second.messages[3];
        assert_eq!(tool.role, Role::Tool);
        assert_eq!(tool.tool_call_id.as_deref(), Some("call_1"));
        assert!(tool.content.starts_with(r#"{"status":"success""#));
    }

    #[tokio::test]
    async fn test_greeting_skips_forced_retrieval() {
        let h = harness(MockRetrieval::with_hits(vec![theft_hit()]), MockWeb::new());
        h.provider.queue_response("Namaste! How can I help you with Indian law today?");

        let result = h.agent.run("hello").await;

        assert_eq!(h.provider.request(0).unwrap().tool_choice, ToolChoice::Auto);
        assert!(result.tool_usage.is_empty());
        assert_eq!(result.mode, AnswerMode::Fallback);
        assert_eq!(h.retrieval.search_count(), 0);
    }

    #[tokio::test]
    async fn test_iteration_cap() {
        let h = harness(MockRetrieval::new(), MockWeb::new());
        h.provider.repeat_response(MockProvider::tool_call_response(
            vec![ToolCall::new("call_n", "rag_search", r#"{"query":"theft"}"#)],
            Usage::new(10, 5),
        ));

        let result = h.agent.run("What is the punishment for theft?").await;

        assert_eq!(h.provider.request_count(), 5);
        assert_eq!(result.mode, AnswerMode::Fallback);
        assert_eq!(result.answer, EXHAUSTED_ANSWER);
        assert_eq!(result.tool_usage.len(), 5);
        assert_eq!(result.tokens_in, 50);
    }

    #[tokio::test]
    async fn test_tool_results_are_truncated_in_transcript() {
        let hits = (0..3)
            .map(|i| WebHit {
                title: format!("Result {}", i),
                snippet: "s".repeat(2000),
                url: format!("https://indiankanoon.org/doc/{}/", i),
                domain: "indiankanoon.org".to_string(),
            })
            .collect();
        let h = harness(MockRetrieval::new(), MockWeb::new().with_hits(hits));
        h.provider.queue_tool_call("call_1", "web_search", r#"{"query":"theft"}"#);
        h.provider.queue_response("See [1].");

        let result = h.agent.run("What is the punishment for theft?").await;

        let tool = h.provider.request(1).unwrap().messages.last().cloned().unwrap();
        assert_eq!(tool.content.chars().count(), 3000 + TRUNCATION_SUFFIX.len());
        assert!(tool.content.ends_with(TRUNCATION_SUFFIX));
        assert_eq!(result.mode, AnswerMode::Hybrid);
        assert_eq!(h.web.search_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_structured_arguments_do_not_abort() {
        let h = harness(MockRetrieval::with_hits(vec![theft_hit()]), MockWeb::new());
        h.provider.queue_tool_call("call_1", "rag_search", r#"{"query": "theft"#);
        h.provider.queue_response("I could not search the database.");

        let result = h.agent.run("What is the punishment for theft?").await;

        assert_eq!(result.tool_usage.len(), 1);
        assert!(result.tool_usage[0].arguments.is_empty());
        assert_eq!(result.tool_usage[0].status, ToolStatus::Error);
        assert_eq!(result.mode, AnswerMode::Fallback);
        assert_eq!(h.retrieval.search_count(), 0);
    }

    #[tokio::test]
    async fn test_pseudo_tag_calls_feed_back_as_user_turn() {
        let h = harness(MockRetrieval::with_hits(vec![theft_hit()]), MockWeb::new());
        h.provider.queue_response("<rag_search>{'query': 'theft'}</rag_search>");
        h.provider.queue_response("Theft is covered by Section 378 [1].");

        let result = h.agent.run("What is the punishment for theft?").await;

        assert_eq!(result.mode, AnswerMode::Grounded);
        assert_eq!(result.tool_usage[0].arguments["query"], "theft");

        let second = h.provider.request(1).unwrap();
        let feedback = second.messages.last().unwrap();
        assert_eq!(feedback.role, Role::User);
        assert!(feedback.content.starts_with("Tool Output:\nResult of rag_search: {"));
        assert!(feedback.content.ends_with("Based on these results, please provide the final answer."));
        assert_eq!(second.messages[2].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_provider_error_keeps_partial_usage() {
        let h = harness(MockRetrieval::with_hits(vec![theft_hit()]), MockWeb::new());
        h.provider.queue_raw_response(MockProvider::tool_call_response(
            vec![ToolCall::new("call_1", "rag_search", r#"{"query":"theft"}"#)],
            Usage::new(100, 10),
        ));
        h.provider.queue_error(Error::rate_limit("quota exhausted"));

        let result = h.agent.run("What is the punishment for theft?").await;

        assert_eq!(result.mode, AnswerMode::Error);
        assert!(result.answer.starts_with("An error occurred: "));
        assert!(result.answer.contains("quota exhausted"));
        assert_eq!(result.tool_usage.len(), 1);
        assert_eq!(result.tokens_in, 100);
    }

    #[tokio::test]
    async fn test_missing_provider_short_circuits() {
        let retrieval = Arc::new(MockRetrieval::with_hits(vec![theft_hit()]));
        let dispatcher = Arc::new(ToolDispatcher::new(retrieval.clone(), Arc::new(MockWeb::new())));
        let agent = LegalAgent::new(Arc::new(AgentContext::new(None, dispatcher)), AgentConfig::default());

        let result = agent.run("What is the punishment for theft?").await;
        assert_eq!(result.mode, AnswerMode::Error);
        assert_eq!(result.answer, MISSING_KEY_ANSWER);
        assert_eq!(retrieval.search_count(), 0);

        let events: Vec<_> = agent.run_streaming("What is the punishment for theft?").collect().await;
        assert_eq!(events, vec![ProgressEvent::error(MISSING_KEY_EVENT)]);
    }

    #[tokio::test]
    async fn test_streaming_event_order() {
        let h = harness(MockRetrieval::with_hits(vec![theft_hit()]), MockWeb::new());
        h.provider.queue_tool_call("call_1", "rag_search", r#"{"query":"theft"}"#);
        h.provider.queue_response("Section 378 [1].");

        let events: Vec<_> = h.agent.run_streaming("What is the punishment for theft?").collect().await;
        let tags: Vec<_> = events
            .iter()
            .map(|e| serde_json::to_value(e).unwrap()["type"].as_str().unwrap().to_string())
            .collect();

        assert_eq!(
            tags,
            vec!["status", "tool_start", "tool_result", "thinking", "status", "sources", "answer"]
        );
        let ProgressEvent::Answer { mode, confidence, .. } = events.last().unwrap() else {
            panic!("expected answer last");
        };
        assert_eq!(*mode, AnswerMode::Grounded);
        assert_eq!(confidence.as_str(), "high");
    }

    #[tokio::test]
    async fn test_streaming_error_is_terminal() {
        let h = harness(MockRetrieval::new(), MockWeb::new());
        h.provider.queue_error(Error::network("connection reset"));

        let events: Vec<_> = h.agent.run_streaming("What is the punishment for theft?").collect().await;

        assert_eq!(events.len(), 2);
        assert!(events[1].is_terminal());
        let ProgressEvent::Error { message } = &events[1] else {
            panic!("expected error event");
        };
        assert!(message.contains("connection reset"));
    }

    #[tokio::test]
    async fn test_streaming_iteration_cap_answers_fallback() {
        let h = harness(MockRetrieval::new(), MockWeb::new());
        h.provider.repeat_response(MockProvider::tool_call_response(
            vec![ToolCall::new("call_n", "rag_search", r#"{"query":"theft"}"#)],
            Usage::new(1, 1),
        ));

        let events: Vec<_> = h.agent.run_streaming("What is the punishment for theft?").collect().await;

        let thinking = events.iter().filter(|e| matches!(e, ProgressEvent::Thinking { .. })).count();
        assert_eq!(thinking, 4);
        let Some(ProgressEvent::Answer { text, mode, .. }) = events.last() else {
            panic!("expected answer last");
        };
        assert_eq!(text, EXHAUSTED_ANSWER);
        assert_eq!(*mode, AnswerMode::Fallback);
    }
}
