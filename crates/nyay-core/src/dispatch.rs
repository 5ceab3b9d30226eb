//! Maps a requested tool onto an oracle call and normalises the outcome.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::error::Error;
use crate::oracle::{RetrievalOracle, TrustedWebOracle};
use crate::text::{round_score, truncate_chars};
use crate::tool::{PageRecord, SectionRecord, ToolArgs, ToolData, ToolKind, ToolResult, WebRecord};

/// Sections kept from a retrieval call.
pub const MAX_SECTIONS: usize = 3;
/// Characters of section text kept per record.
pub const SECTION_TEXT_BUDGET: usize = 800;
/// Characters of page text kept from a page read.
pub const PAGE_TEXT_BUDGET: usize = 2000;

pub const BLOCKED_REASON: &str = "URL not from trusted domain";

/// Retrieval depth used when none is configured.
pub const DEFAULT_RETRIEVAL_K: usize = 5;
/// Web results requested when none is configured.
pub const DEFAULT_WEB_RESULTS: usize = 3;

pub struct ToolDispatcher {
    retrieval: Arc<dyn RetrievalOracle>,
    web: Arc<dyn TrustedWebOracle>,
    retrieval_k: usize,
    web_max_results: usize,
}

impl ToolDispatcher {
    pub fn new(retrieval: Arc<dyn RetrievalOracle>, web: Arc<dyn TrustedWebOracle>) -> Self {
        Self {
            retrieval,
            web,
            retrieval_k: DEFAULT_RETRIEVAL_K,
            web_max_results: DEFAULT_WEB_RESULTS,
        }
    }

    pub fn with_retrieval_k(mut self, k: usize) -> Self {
        self.retrieval_k = k.max(1);
        self
    }

    pub fn with_web_max_results(mut self, max_results: usize) -> Self {
        self.web_max_results = max_results.max(1);
        self
    }

    pub fn retrieval(&self) -> &Arc<dyn RetrievalOracle> {
        &self.retrieval
    }

    pub fn web(&self) -> &Arc<dyn TrustedWebOracle> {
        &self.web
    }

    /// Run one tool. Never fails: every problem becomes a `ToolResult`.
    pub async fn dispatch(&self, name: &str, arguments: &Map<String, Value>) -> ToolResult {
        let shown = Value::Object(arguments.clone());
        info!(tool = %name, arguments = %shown, "Executing tool");

        let Some(kind) = ToolKind::from_name(name) else {
            return ToolResult::error(format!("Unknown tool: {}", name));
        };

        let args = match ToolArgs::parse(kind, arguments) {
            Ok(args) => args,
            Err(e) => {
                warn!(tool = %name, error = %e, "Rejected tool arguments");
                return ToolResult::error(e.to_string());
            }
        };

        match self.execute(args).await {
            Ok(result) => result,
            Err(e) => {
                error!(tool = %name, error = %e, "Tool execution failed");
                ToolResult::error(e.to_string())
            }
        }
    }

    async fn execute(&self, args: ToolArgs) -> Result<ToolResult, Error> {
        match args {
            ToolArgs::RetrieveLocal { query } => self.retrieve_local(&query).await,
            ToolArgs::SearchWeb { query } => self.search_web(&query).await,
            ToolArgs::ReadPage { url } => self.read_page(&url).await,
        }
    }

    async fn retrieve_local(&self, query: &str) -> Result<ToolResult, Error> {
        let hits = self.retrieval.search(query, self.retrieval_k).await?;
        if hits.is_empty() {
            return Ok(ToolResult::no_results(ToolData::Sections(Vec::new())));
        }

        let records = hits
            .into_iter()
            .take(MAX_SECTIONS)
            .enumerate()
            .map(|(i, hit)| SectionRecord {
                index: i + 1,
                act: if hit.act_name.is_empty() {
                    "Unknown".to_string()
                } else {
                    hit.act_name
                },
                section: hit.section_number,
                text: truncate_chars(&hit.text, SECTION_TEXT_BUDGET).to_string(),
                score: round_score(hit.score),
            })
            .collect();

        Ok(ToolResult::success(ToolData::Sections(records)))
    }

    async fn search_web(&self, query: &str) -> Result<ToolResult, Error> {
        let hits = self.web.search(query, self.web_max_results).await?;
        if hits.is_empty() {
            return Ok(ToolResult::no_results(ToolData::Web(Vec::new())));
        }

        let records = hits
            .into_iter()
            .enumerate()
            .map(|(i, hit)| WebRecord {
                index: i + 1,
                title: hit.title,
                snippet: hit.snippet,
                url: hit.url,
                domain: hit.domain,
            })
            .collect();

        Ok(ToolResult::success(ToolData::Web(records)))
    }

    async fn read_page(&self, url: &str) -> Result<ToolResult, Error> {
        let Some(page) = self.web.read(url).await? else {
            return Ok(ToolResult::blocked(BLOCKED_REASON));
        };

        Ok(ToolResult::success(ToolData::Page(PageRecord {
            title: page.title,
            text: truncate_chars(&page.text, PAGE_TEXT_BUDGET).to_string(),
            domain: page.domain,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{PageContent, SectionHit, WebHit};
    use crate::testing::{MockRetrieval, MockWeb};
    use crate::tool::ToolStatus;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn hit(act: &str, section: &str, score: f32) -> SectionHit {
        SectionHit {
            text: format!("{} text", section),
            act_name: act.to_string(),
            section_number: section.to_string(),
            score,
        }
    }

    fn dispatcher(retrieval: MockRetrieval, web: MockWeb) -> (ToolDispatcher, Arc<MockRetrieval>, Arc<MockWeb>) {
        let retrieval = Arc::new(retrieval);
        let web = Arc::new(web);
        (ToolDispatcher::new(retrieval.clone(), web.clone()), retrieval, web)
    }

    #[tokio::test]
    async fn test_retrieve_local_empty_is_no_results() {
        let (dispatcher, retrieval, _) = dispatcher(MockRetrieval::new(), MockWeb::new());
        let result = dispatcher.dispatch("retrieve_local", &args(json!({"query": "any"}))).await;

        assert_eq!(result.status, ToolStatus::NoResults);
        assert_eq!(result.data, Some(ToolData::Sections(Vec::new())));
        assert_eq!(retrieval.search_count(), 1);
    }

    #[tokio::test]
    async fn test_retrieve_local_keeps_top_three_and_truncates() {
        let mut long = hit("Indian Penal Code", "378", 0.82349);
        long.text = "क".repeat(1000);
        let retrieval = MockRetrieval::with_hits(vec![
            long,
            hit("Indian Penal Code", "379", 0.7),
            hit("Bharatiya Nyaya Sanhita", "303", 0.65),
            hit("Indian Penal Code", "380", 0.6),
        ]);
        let (dispatcher, _, _) = dispatcher(retrieval, MockWeb::new());
        let result = dispatcher.dispatch("rag_search", &args(json!({"query": "theft"}))).await;

        assert!(result.is_success());
        let Some(ToolData::Sections(records)) = result.data else {
            panic!("expected sections");
        };
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].index, 1);
        assert_eq!(records[2].index, 3);
        assert_eq!(records[0].text.chars().count(), SECTION_TEXT_BUDGET);
        assert_eq!(records[0].score, 0.823);
        assert_eq!(records[2].act, "Bharatiya Nyaya Sanhita");
    }

    #[tokio::test]
    async fn test_oracle_failure_becomes_error_status() {
        let (dispatcher, _, _) = dispatcher(MockRetrieval::failing("index offline"), MockWeb::new());
        let result = dispatcher.dispatch("rag_search", &args(json!({"query": "bail"}))).await;

        assert_eq!(result.status, ToolStatus::Error);
        assert!(result.reason.unwrap().contains("index offline"));
    }

    #[tokio::test]
    async fn test_missing_argument_becomes_error_status() {
        let (dispatcher, retrieval, _) = dispatcher(MockRetrieval::new(), MockWeb::new());
        let result = dispatcher.dispatch("rag_search", &Map::new()).await;

        assert_eq!(result.status, ToolStatus::Error);
        assert_eq!(retrieval.search_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let (dispatcher, _, _) = dispatcher(MockRetrieval::new(), MockWeb::new());
        let result = dispatcher.dispatch("run_shell", &args(json!({"cmd": "ls"}))).await;

        assert_eq!(result.status, ToolStatus::Error);
        assert_eq!(result.reason.as_deref(), Some("Unknown tool: run_shell"));
    }

    #[tokio::test]
    async fn test_search_web_indexes_results() {
        let web = MockWeb::new().with_hits(vec![WebHit {
            title: "Theft - India Code".to_string(),
            snippet: "Whoever, intending to take dishonestly...".to_string(),
            url: "https://indiacode.nic.in/theft".to_string(),
            domain: "indiacode.nic.in".to_string(),
        }]);
        let (dispatcher, _, web) = dispatcher(MockRetrieval::new(), web);
        let result = dispatcher.dispatch("web_search", &args(json!({"query": "theft"}))).await;

        assert!(result.is_success());
        assert_eq!(result.count(), 1);
        assert_eq!(web.search_count(), 1);
        let Some(ToolData::Web(records)) = result.data else {
            panic!("expected web records");
        };
        assert_eq!(records[0].index, 1);
        assert_eq!(records[0].domain, "indiacode.nic.in");
    }

    #[tokio::test]
    async fn test_search_web_empty_is_no_results() {
        let (dispatcher, _, _) = dispatcher(MockRetrieval::new(), MockWeb::new());
        let result = dispatcher.dispatch("search_web", &args(json!({"query": "theft"}))).await;
        assert_eq!(result.status, ToolStatus::NoResults);
    }

    #[tokio::test]
    async fn test_read_page_untrusted_is_blocked_without_fetch() {
        let (dispatcher, _, web) = dispatcher(MockRetrieval::new(), MockWeb::new());
        let result = dispatcher
            .dispatch("read_page", &args(json!({"url": "http://untrusted.example"})))
            .await;

        assert_eq!(result.status, ToolStatus::Blocked);
        assert_eq!(result.reason.as_deref(), Some(BLOCKED_REASON));
        assert_eq!(web.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_read_page_truncates_text() {
        let url = "https://indiankanoon.org/doc/1/";
        let web = MockWeb::new().with_page(PageContent {
            url: url.to_string(),
            title: "Section 378".to_string(),
            text: "t".repeat(5000),
            domain: "indiankanoon.org".to_string(),
        });
        let (dispatcher, _, web) = dispatcher(MockRetrieval::new(), web);
        let result = dispatcher.dispatch("read_url", &args(json!({"url": url}))).await;

        assert!(result.is_success());
        assert_eq!(web.fetch_count(), 1);
        let Some(ToolData::Page(page)) = result.data else {
            panic!("expected page");
        };
        assert_eq!(page.text.len(), PAGE_TEXT_BUDGET);
        assert_eq!(page.title, "Section 378");
    }
}
