//! Trusted-web oracle: DuckDuckGo HTML search and page reading, both
//! restricted to the domain whitelist.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use nyay_core::{
    clean_extracted_text, domain_of, run_blocking, DomainWhitelist, Error, PageContent,
    TrustedWebOracle, WebHit,
};

pub const DUCKDUCKGO_HTML_URL: &str = "https://html.duckduckgo.com/html/";

const SITE_FILTER: &str = "site:gov.in OR site:nic.in OR site:indiankanoon.org";
const USER_AGENT: &str = "Mozilla/5.0 (compatible; NyaySathi/0.1; +https://indiacode.nic.in)";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const TITLE_CHARS: usize = 200;
const SNIPPET_CHARS: usize = 400;
const PAGE_CHARS: usize = 3000;

/// Tags whose subtree never contributes page text.
const SKIPPED_TAGS: &[&str] = &["script", "style", "nav", "footer", "header", "aside", "noscript"];

pub struct TrustedWeb {
    client: Client,
    whitelist: DomainWhitelist,
    search_endpoint: String,
}

impl Default for TrustedWeb {
    fn default() -> Self {
        Self::new(DomainWhitelist::default())
    }
}

impl TrustedWeb {
    pub fn new(whitelist: DomainWhitelist) -> Self {
        Self::with_timeout(whitelist, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(whitelist: DomainWhitelist, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            whitelist,
            search_endpoint: DUCKDUCKGO_HTML_URL.to_string(),
        }
    }

    pub fn with_search_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.search_endpoint = endpoint.into();
        self
    }

    async fn fetch_results_page(&self, query: &str) -> Result<String, Error> {
        let full_query = format!("{} {}", query, SITE_FILTER);
        let url = Url::parse_with_params(&self.search_endpoint, &[("q", full_query.as_str())])
            .map_err(|e| Error::config(format!("Invalid search endpoint: {}", e)))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::api(status.as_u16(), "Search request failed"));
        }

        response
            .text()
            .await
            .map_err(|e| Error::network(e.to_string()))
    }
}

#[async_trait]
impl TrustedWebOracle for TrustedWeb {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebHit>, Error> {
        let html = match self.fetch_results_page(query).await {
            Ok(html) => html,
            Err(e) => {
                warn!(error = %e, "Web search failed");
                return Ok(Vec::new());
            }
        };

        let whitelist = self.whitelist.clone();
        let hits = run_blocking(move || parse_search_results(&html, &whitelist, max_results)).await?;
        info!(results = hits.len(), "Web search found trusted results");
        Ok(hits)
    }

    async fn read(&self, url: &str) -> Result<Option<PageContent>, Error> {
        if !self.whitelist.is_trusted_url(url) {
            warn!(url = %url, "Blocked untrusted URL");
            return Ok(None);
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::tool("read_url", format!("Failed to fetch '{}': {}", url, e)))?;

        let final_url = response.url().to_string();
        if !self.whitelist.is_trusted_url(&final_url) {
            warn!(url = %url, redirected_to = %final_url, "Blocked redirect to untrusted URL");
            return Ok(None);
        }

        let status = response.status();
        if !status.is_success() {
            return Err(Error::tool("read_url", format!("HTTP {}: {}", status, url)));
        }

        let html = response
            .text()
            .await
            .map_err(|e| Error::tool("read_url", format!("Failed to read response: {}", e)))?;

        debug!(url = %final_url, bytes = html.len(), "Fetched page");
        let page = run_blocking(move || extract_page(&final_url, &html)).await?;
        Ok(Some(page))
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Pull whitelisted results out of a DuckDuckGo HTML results page.
fn parse_search_results(html: &str, whitelist: &DomainWhitelist, max_results: usize) -> Vec<WebHit> {
    let (Some(result_sel), Some(link_sel), Some(snippet_sel)) = (
        selector(".result"),
        selector("a.result__a"),
        selector(".result__snippet"),
    ) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let mut hits = Vec::new();

    for result in document.select(&result_sel) {
        if hits.len() >= max_results {
            break;
        }

        let Some(link) = result.select(&link_sel).next() else {
            continue;
        };
        let Some(url) = link.value().attr("href").and_then(resolve_result_link) else {
            continue;
        };
        if !whitelist.is_trusted_url(&url) {
            debug!(url = %url, "Skipping untrusted search result");
            continue;
        }
        let domain = domain_of(&url).unwrap_or_default();

        let title = clean_extracted_text(&link.text().collect::<String>(), TITLE_CHARS);
        let snippet = result
            .select(&snippet_sel)
            .next()
            .map(|s| clean_extracted_text(&s.text().collect::<String>(), SNIPPET_CHARS))
            .unwrap_or_default();

        hits.push(WebHit {
            title: if title.is_empty() { domain.clone() } else { title },
            snippet,
            url,
            domain,
        });
    }

    hits
}

/// Result links are either direct or wrapped in a `/l/?uddg=` redirect.
fn resolve_result_link(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else if href.starts_with('/') {
        format!("https://duckduckgo.com{}", href)
    } else {
        href.to_string()
    };

    let parsed = Url::parse(&absolute).ok()?;
    if parsed.path().starts_with("/l/") {
        return parsed
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned());
    }
    Some(parsed.to_string())
}

fn extract_page(url: &str, html: &str) -> PageContent {
    let document = Html::parse_document(html);

    let title = selector("title")
        .and_then(|sel| document.select(&sel).next())
        .map(|t| clean_extracted_text(&t.text().collect::<String>(), TITLE_CHARS))
        .unwrap_or_default();

    let text = ["main", "article", "#content", ".content", "body"]
        .iter()
        .filter_map(|css| selector(css))
        .find_map(|sel| document.select(&sel).next().map(|el| extract_text(&el)))
        .unwrap_or_else(|| extract_text(&document.root_element()));

    PageContent {
        url: url.to_string(),
        title,
        text: clean_extracted_text(&text, PAGE_CHARS),
        domain: domain_of(url).unwrap_or_default(),
    }
}

/// Text of an element, leaving out anything inside a skipped tag.
fn extract_text(element: &ElementRef) -> String {
    let mut text = String::new();

    for node in element.descendants() {
        let Some(t) = node.value().as_text() else {
            continue;
        };
        let skipped = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|el| SKIPPED_TAGS.contains(&el.name()))
        });
        if skipped {
            continue;
        }

        let trimmed = t.trim();
        if !trimmed.is_empty() {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(trimmed);
        }
    }

    text
}
