//! Contracts for the external collaborators the agent consults.
//!
//! Implementations must be safe to share between concurrent runs: the
//! retrieval index is read-only after load, and web oracles hold a pooled
//! HTTP client rather than a single-use handle.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A statutory section returned by the retrieval oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionHit {
    pub text: String,
    pub act_name: String,
    pub section_number: String,
    /// Cosine-like similarity in [-1, 1].
    pub score: f32,
}

/// A search result on a whitelisted domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebHit {
    pub title: String,
    pub snippet: String,
    pub url: String,
    pub domain: String,
}

/// Text extracted from a whitelisted page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageContent {
    pub url: String,
    pub title: String,
    pub text: String,
    pub domain: String,
}

/// Nearest-neighbour search over the statutory corpus.
#[async_trait]
pub trait RetrievalOracle: Send + Sync {
    /// Up to `k` sections ordered by descending score.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SectionHit>, Error>;

    /// Number of indexed sections.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Web access restricted to the trusted-domain whitelist.
#[async_trait]
pub trait TrustedWebOracle: Send + Sync {
    /// Search results, already filtered to trusted domains.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebHit>, Error>;

    /// Fetch a page. Returns `Ok(None)` without any network access when the
    /// URL is not on a trusted domain.
    async fn read(&self, url: &str) -> Result<Option<PageContent>, Error>;
}

/// Text embedding model used to vectorise queries.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model(&self) -> &str;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, Error>;
}
