//! nyay-tools: concrete oracles for Nyay Sathi
//!
//! - `index`: the statutory section index and the embedding-backed retriever
//! - `web`: whitelisted web search and page reading

pub mod index;
pub mod web;

pub use index::{IndexedSection, LocalRetriever, SectionIndex};
pub use web::TrustedWeb;
