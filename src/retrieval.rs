//! Retrieval and context assembly.
//!
//! A [`Retriever`] embeds a query, asks the [`VectorIndex`] for the top-k
//! chunks, and [`assemble_context`] folds the hits into one string that is
//! cut hard at a character budget. The cut is not word-aware and may land
//! mid-sentence.

use std::sync::Arc;
use tracing::debug;

use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::models::{DocType, RetrievalHit};
use crate::vector_index::{MetadataFilter, VectorIndex};

/// Separator placed between hit texts.
pub const HIT_SEPARATOR: &str = "\n\n";

/// Embedding provider and vector index bound together for querying.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Top-`k` hits for `query`, best first.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalHit>> {
        let vector = self.embedder.embed(query).await?;
        let hits = self.index.query(&vector, k, filter).await?;
        debug!(k, hits = hits.len(), filtered = filter.is_some(), "retrieved");
        Ok(hits)
    }

    /// Retrieve and assemble a bounded context string.
    ///
    /// With `provenance`, each hit is prefixed with `(source=…, page=…)`.
    /// No hits yields an empty string.
    pub async fn retrieve_context(
        &self,
        query: &str,
        k: usize,
        source: Option<DocType>,
        char_budget: usize,
        provenance: bool,
    ) -> Result<String> {
        let filter = source.map(MetadataFilter::source);
        let hits = self.retrieve(query, k, filter.as_ref()).await?;
        Ok(assemble_context(&hits, char_budget, provenance))
    }
}

/// Join hit texts in ranked order and truncate to `char_budget` characters.
/// Hits with empty text are skipped.
pub fn assemble_context(hits: &[RetrievalHit], char_budget: usize, provenance: bool) -> String {
    let parts: Vec<String> = hits
        .iter()
        .filter(|h| !h.text.is_empty())
        .map(|h| {
            if provenance {
                format!(
                    "(source={}, page={}) {}",
                    h.metadata.source, h.metadata.page, h.text
                )
            } else {
                h.text.clone()
            }
        })
        .collect();

    truncate_chars(&parts.join(HIT_SEPARATOR), char_budget)
}

/// First `max` characters of `s`.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((byte, _)) => s[..byte].to_string(),
        None => s.to_string(),
    }
}
