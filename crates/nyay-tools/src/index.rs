//! Brute-force cosine search over pre-embedded statutory sections.
//!
//! The index file is JSON:
//!
//! ```json
//! {"dimension": 384, "model": "sentence-transformers/all-MiniLM-L6-v2",
//!  "sections": [{"act_name": "...", "section_number": "378", "text": "...", "embedding": [...]}]}
//! ```
//!
//! Embeddings are L2-normalised on load, so a dot product is the cosine.

use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use nyay_core::{run_blocking, Embedder, Error, RetrievalOracle, SectionHit};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedSection {
    #[serde(default)]
    pub act_name: String,
    #[serde(default)]
    pub section_number: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    dimension: usize,
    #[serde(default)]
    model: Option<String>,
    sections: Vec<IndexedSection>,
}

/// Read-only after construction; share it behind an `Arc`.
#[derive(Debug)]
pub struct SectionIndex {
    dimension: usize,
    model: Option<String>,
    sections: Vec<IndexedSection>,
}

impl SectionIndex {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::index(format!("Failed to read {}: {}", path.display(), e)))?;
        let index = Self::from_json(&contents)?;
        info!(path = %path.display(), sections = index.len(), dimension = index.dimension, "Loaded section index");
        Ok(index)
    }

    pub fn from_json(contents: &str) -> Result<Self, Error> {
        let file: IndexFile = serde_json::from_str(contents)
            .map_err(|e| Error::index(format!("Invalid index file: {}", e)))?;
        Self::from_sections(file.dimension, file.model, file.sections)
    }

    pub fn from_sections(
        dimension: usize,
        model: Option<String>,
        mut sections: Vec<IndexedSection>,
    ) -> Result<Self, Error> {
        if dimension == 0 {
            return Err(Error::index("Index dimension must be positive"));
        }
        for (i, section) in sections.iter_mut().enumerate() {
            if section.embedding.len() != dimension {
                return Err(Error::index(format!(
                    "Section {} has dimension {}, expected {}",
                    i,
                    section.embedding.len(),
                    dimension
                )));
            }
            normalize(&mut section.embedding);
        }
        Ok(Self {
            dimension,
            model,
            sections,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embedding model the index was built with, if recorded.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Top `k` sections by cosine similarity to `query`, best first.
    pub fn search_vector(&self, query: &[f32], k: usize) -> Result<Vec<SectionHit>, Error> {
        if query.len() != self.dimension {
            return Err(Error::index(format!(
                "Query has dimension {}, index expects {}",
                query.len(),
                self.dimension
            )));
        }

        let mut query = query.to_vec();
        normalize(&mut query);

        let mut scored: Vec<(usize, f32)> = self
            .sections
            .iter()
            .enumerate()
            .map(|(i, s)| (i, dot(&query, &s.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(i, score)| {
                let section = &self.sections[i];
                SectionHit {
                    text: section.text.clone(),
                    act_name: section.act_name.clone(),
                    section_number: section.section_number.clone(),
                    score,
                }
            })
            .collect())
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Scale to unit length. Zero vectors are left as they are.
fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// The retrieval oracle: embed the query, then scan the index on the
/// blocking pool.
pub struct LocalRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<SectionIndex>,
}

impl LocalRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<SectionIndex>) -> Self {
        if let Some(model) = index.model() {
            if model != embedder.model() {
                warn!(index_model = %model, embedder_model = %embedder.model(), "Index was built with a different embedding model");
            }
        }
        Self { embedder, index }
    }
}

#[async_trait]
impl RetrievalOracle for LocalRetriever {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SectionHit>, Error> {
        if self.index.is_empty() {
            return Ok(Vec::new());
        }

        let vector = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::index("Embedder returned no vector"))?;

        let index = Arc::clone(&self.index);
        let hits = run_blocking(move || index.search_vector(&vector, k)).await??;

        debug!(
            results = hits.len(),
            top_score = hits.first().map(|h| h.score).unwrap_or(0.0),
            "Retrieved sections"
        );
        Ok(hits)
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn section(act: &str, number: &str, embedding: Vec<f32>) -> IndexedSection {
        IndexedSection {
            act_name: act.to_string(),
            section_number: number.to_string(),
            text: format!("{} section {}", act, number),
            embedding,
        }
    }

    fn sample_index() -> SectionIndex {
        SectionIndex::from_sections(
            3,
            Some("test-embedder".to_string()),
            vec![
                section("Indian Penal Code", "378", vec![1.0, 0.0, 0.0]),
                section("Indian Penal Code", "499", vec![0.0, 2.0, 0.0]),
                section("Bharatiya Nyaya Sanhita", "303", vec![0.9, 0.1, 0.0]),
            ],
        )
        .unwrap()
    }

    /// Embeds every text to the same fixed vector.
    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn model(&self) -> &str {
            "test-embedder"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, Error> {
            Ok(texts.iter().map(|_| self.0.clone()).collect())
        }
    }

    #[test]
    fn test_search_vector_ranks_by_cosine() {
        let index = sample_index();
        let hits = index.search_vector(&[2.0, 0.0, 0.0], 2).unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].section_number, "378");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].section_number, "303");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn test_embeddings_are_normalized() {
        let index = sample_index();
        let hits = index.search_vector(&[0.0, 1.0, 0.0], 1).unwrap();
        assert_eq!(hits[0].section_number, "499");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_dimension_mismatch() {
        let err = SectionIndex::from_sections(3, None, vec![section("IPC", "1", vec![1.0, 0.0])]).unwrap_err();
        assert!(matches!(err, Error::Index(_)));

        let err = sample_index().search_vector(&[1.0], 1).unwrap_err();
        assert!(err.to_string().contains("dimension"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"dimension": 2, "sections": [{{"act_name": "Indian Penal Code", "section_number": "378", "text": "Theft.", "embedding": [3.0, 4.0]}}]}}"#
        )
        .unwrap();

        let index = SectionIndex::load(file.path()).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.dimension(), 2);
        assert_eq!(index.model(), None);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = SectionIndex::load(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, Error::Index(_)));
    }

    #[tokio::test]
    async fn test_retriever_embeds_and_searches() {
        let retriever = LocalRetriever::new(
            Arc::new(FixedEmbedder(vec![0.0, 3.0, 0.0])),
            Arc::new(sample_index()),
        );

        let hits = retriever.search("what is defamation", 5).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].section_number, "499");
        assert_eq!(retriever.len(), 3);
    }

    #[tokio::test]
    async fn test_retriever_on_empty_index() {
        let index = SectionIndex::from_sections(3, None, Vec::new()).unwrap();
        let retriever = LocalRetriever::new(Arc::new(FixedEmbedder(vec![1.0, 0.0, 0.0])), Arc::new(index));
        assert!(retriever.search("theft", 5).await.unwrap().is_empty());
        assert!(retriever.is_empty());
    }
}
