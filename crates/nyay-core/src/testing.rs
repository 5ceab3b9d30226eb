//! Test doubles shared across the workspace.
//! Only compiled when running tests or with the `testing` feature.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::DomainWhitelist;
use crate::error::Error;
use crate::message::{Message, ToolCall, Usage};
use crate::oracle::{PageContent, RetrievalOracle, SectionHit, TrustedWebOracle, WebHit};
use crate::provider::{CompletionRequest, CompletionResponse, FinishReason, Provider};

/// A mock provider that returns pre-configured responses.
pub struct MockProvider {
    responses: Mutex<Vec<Result<CompletionResponse, Error>>>,
    /// Returned once the queue is empty, if set.
    repeating: Mutex<Option<CompletionResponse>>,
    /// Captured requests (for assertion).
    pub captured_requests: Mutex<Vec<CompletionRequest>>,
    pub name: String,
    pub default_model: Option<String>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            repeating: Mutex::new(None),
            captured_requests: Mutex::new(Vec::new()),
            name: "mock".to_string(),
            default_model: None,
        }
    }

    /// Build a plain-text response with the given usage.
    pub fn text_response(content: &str, usage: Usage) -> CompletionResponse {
        CompletionResponse {
            message: Message::assistant(content),
            usage,
            model: "mock-model".to_string(),
            finish_reason: FinishReason::Stop,
        }
    }

    /// Build a response declaring structured tool calls.
    pub fn tool_call_response(calls: Vec<ToolCall>, usage: Usage) -> CompletionResponse {
        CompletionResponse {
            message: Message::assistant_with_tool_calls("", calls),
            usage,
            model: "mock-model".to_string(),
            finish_reason: FinishReason::ToolCalls,
        }
    }

    /// Queue a response to be returned by the next complete() call.
    /// Responses are returned in FIFO order (first queued = first returned).
    pub fn queue_response(&self, content: &str) {
        self.queue_raw_response(Self::text_response(content, Usage::new(0, 0)));
    }

    /// Queue a single structured tool call.
    pub fn queue_tool_call(&self, id: &str, name: &str, arguments: &str) {
        self.queue_raw_response(Self::tool_call_response(
            vec![ToolCall::new(id, name, arguments)],
            Usage::new(0, 0),
        ));
    }

    /// Queue a raw CompletionResponse.
    pub fn queue_raw_response(&self, response: CompletionResponse) {
        self.responses.lock().unwrap().insert(0, Ok(response));
    }

    /// Queue a failure for the next complete() call.
    pub fn queue_error(&self, error: Error) {
        self.responses.lock().unwrap().insert(0, Err(error));
    }

    /// Return `response` for every call once the queue is drained.
    pub fn repeat_response(&self, response: CompletionResponse) {
        *self.repeating.lock().unwrap() = Some(response);
    }

    /// Get the number of captured requests.
    pub fn request_count(&self) -> usize {
        self.captured_requests.lock().unwrap().len()
    }

    /// Get the last captured request.
    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.captured_requests.lock().unwrap().last().cloned()
    }

    /// Get the captured request at `index`.
    pub fn request(&self, index: usize) -> Option<CompletionRequest> {
        self.captured_requests.lock().unwrap().get(index).cloned()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, Error> {
        self.captured_requests.lock().unwrap().push(request);
        if let Some(next) = self.responses.lock().unwrap().pop() {
            return next;
        }
        match self.repeating.lock().unwrap().clone() {
            Some(response) => Ok(response),
            None => Err(Error::Unknown("No mock response queued".to_string())),
        }
    }
}

/// A retrieval oracle returning a fixed hit list.
pub struct MockRetrieval {
    hits: Vec<SectionHit>,
    failure: Option<String>,
    searches: AtomicUsize,
    /// Captured (query, k) pairs.
    pub queries: Mutex<Vec<(String, usize)>>,
}

impl MockRetrieval {
    pub fn new() -> Self {
        Self::with_hits(Vec::new())
    }

    pub fn with_hits(hits: Vec<SectionHit>) -> Self {
        Self {
            hits,
            failure: None,
            searches: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Every search fails with an index error carrying `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new()
        }
    }

    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

impl Default for MockRetrieval {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RetrievalOracle for MockRetrieval {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SectionHit>, Error> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push((query.to_string(), k));
        if let Some(message) = &self.failure {
            return Err(Error::index(message.clone()));
        }
        Ok(self.hits.iter().take(k).cloned().collect())
    }

    fn len(&self) -> usize {
        self.hits.len()
    }
}

/// A whitelist-enforcing web oracle that records every call.
///
/// `fetch_count` only moves when a trusted URL is actually "fetched", so a
/// test can prove untrusted URLs never reach the network.
pub struct MockWeb {
    whitelist: DomainWhitelist,
    hits: Vec<WebHit>,
    pages: HashMap<String, PageContent>,
    searches: AtomicUsize,
    reads: AtomicUsize,
    fetches: AtomicUsize,
}

impl MockWeb {
    pub fn new() -> Self {
        Self {
            whitelist: DomainWhitelist::default(),
            hits: Vec::new(),
            pages: HashMap::new(),
            searches: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_hits(mut self, hits: Vec<WebHit>) -> Self {
        self.hits = hits;
        self
    }

    pub fn with_page(mut self, page: PageContent) -> Self {
        self.pages.insert(page.url.clone(), page);
        self
    }

    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Default for MockWeb {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrustedWebOracle for MockWeb {
    async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<WebHit>, Error> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .hits
            .iter()
            .filter(|hit| self.whitelist.is_trusted_url(&hit.url))
            .take(max_results)
            .cloned()
            .collect())
    }

    async fn read(&self, url: &str) -> Result<Option<PageContent>, Error> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if !self.whitelist.is_trusted_url(url) {
            return Ok(None);
        }
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.pages
            .get(url)
            .cloned()
            .map(Some)
            .ok_or_else(|| Error::network(format!("HTTP 404: {}", url)))
    }
}
