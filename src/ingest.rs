//! Ingestion pipeline and upload entry point.
//!
//! ```text
//! bytes ─▶ extract ─▶ pages ─▶ chunk ─▶ embed ─▶ upsert
//! ```
//!
//! Chunk ids are `{doc_id}_{doc_type}_p{page}_c{index}`, so ingesting the
//! same document again overwrites its chunks. Each upload gets a fresh
//! UUID `doc_id`; there is no update-in-place of an earlier upload.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::chunk::chunk_pages;
use crate::config::ChunkingConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::extract::{sniff, TextExtractor};
use crate::models::{ChunkMetadata, DocType, Page, UploadReceipt};
use crate::vector_index::VectorIndex;

#[derive(Clone)]
pub struct Ingestor {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    extractor: Arc<dyn TextExtractor>,
    chunking: ChunkingConfig,
    uploads_dir: Option<PathBuf>,
}

impl Ingestor {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        extractor: Arc<dyn TextExtractor>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            extractor,
            chunking,
            uploads_dir: None,
        }
    }

    /// Keep raw upload bytes under `dir`.
    pub fn with_uploads_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.uploads_dir = dir;
        self
    }

    /// Chunk, embed, and index `pages`. Returns the number of chunks
    /// written. Pages without text contribute nothing; if no page has text
    /// the index is not touched.
    pub async fn ingest(&self, doc_type: DocType, doc_id: &str, pages: &[Page]) -> Result<usize> {
        let chunks = chunk_pages(
            doc_id,
            doc_type,
            pages,
            self.chunking.chunk_size,
            self.chunking.overlap,
        );
        if chunks.is_empty() {
            debug!(doc_id, %doc_type, "no text to index");
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        let ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
        let metadatas: Vec<ChunkMetadata> = chunks.into_iter().map(|c| c.metadata).collect();

        self.index.upsert(&ids, &vectors, &metadatas, &texts).await?;

        info!(doc_id, %doc_type, chunks = ids.len(), "indexed document");
        Ok(ids.len())
    }

    /// Upload entry point: validate `doc_type`, assign a `doc_id`, keep the
    /// raw bytes if configured, extract pages, and ingest them.
    pub async fn upload(&self, doc_type: &str, bytes: &[u8]) -> Result<UploadReceipt> {
        let doc_type: DocType = doc_type.parse()?;
        let doc_id = Uuid::new_v4().to_string();

        if let Some(dir) = &self.uploads_dir {
            let ext = sniff(bytes).map_or("bin", |f| f.extension());
            tokio::fs::create_dir_all(dir).await?;
            let path = dir.join(format!("{}_{}.{}", doc_id, doc_type, ext));
            tokio::fs::write(&path, bytes).await?;
            debug!(path = %path.display(), "saved upload");
        }

        let extractor = Arc::clone(&self.extractor);
        let raw = bytes.to_vec();
        let pages = tokio::task::spawn_blocking(move || extractor.extract(&raw))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))??;
        let chunk_count = self.ingest(doc_type, &doc_id, &pages).await?;

        Ok(UploadReceipt {
            doc_id,
            doc_type,
            page_count: pages.len(),
            chunk_count,
        })
    }
}
