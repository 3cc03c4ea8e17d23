//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait stores chunk vectors with their text and
//! [`ChunkMetadata`], and answers nearest-neighbour queries with optional
//! exact-match metadata filtering. Two backends:
//!
//! - [`SqliteVectorIndex`]: durable; rows live in the `chunks` table and
//!   similarity is brute-force cosine over the rows that pass the SQL filter.
//! - [`InMemoryVectorIndex`]: `HashMap` behind `std::sync::RwLock`, same
//!   semantics, for tests and ephemeral use.
//!
//! Both are bound to a single dimensionality at construction. The SQLite
//! index also records the embedding model in `index_meta` and refuses to
//! open with a different model or dimensionality.

use async_trait::async_trait;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, warn};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{Error, Result};
use crate::models::{ChunkMetadata, DocType, RetrievalHit};

/// Exact-match restriction on chunk metadata. Every key that is `Some`
/// must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFilter {
    pub source: Option<DocType>,
    pub doc_id: Option<String>,
    pub page: Option<u32>,
}

impl MetadataFilter {
    pub fn source(doc_type: DocType) -> Self {
        Self {
            source: Some(doc_type),
            ..Default::default()
        }
    }

    pub fn matches(&self, meta: &ChunkMetadata) -> bool {
        self.source.map_or(true, |s| s == meta.source)
            && self.doc_id.as_deref().map_or(true, |d| d == meta.doc_id)
            && self.page.map_or(true, |p| p == meta.page)
    }
}

/// Durable store of chunk vectors supporting similarity search.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorIndex::upsert) | Insert or overwrite entries by id |
/// | [`query`](VectorIndex::query) | Top-k by cosine similarity, optional filter |
/// | [`count`](VectorIndex::count) | Number of stored entries |
///
/// Implementations must tolerate concurrent callers.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Dimensionality every stored and queried vector must have.
    fn dims(&self) -> usize;

    /// Insert or overwrite entries. The four slices are parallel and must
    /// have equal length. Empty input is a no-op.
    async fn upsert(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        metadatas: &[ChunkMetadata],
        texts: &[String],
    ) -> Result<()>;

    /// Up to `k` entries ranked by similarity, best first. An empty index
    /// yields an empty result.
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalHit>>;

    async fn count(&self) -> Result<usize>;
}

fn validate_upsert(
    ids: &[String],
    vectors: &[Vec<f32>],
    metadatas: &[ChunkMetadata],
    texts: &[String],
    dims: usize,
) -> Result<()> {
    let n = ids.len();
    if vectors.len() != n || metadatas.len() != n || texts.len() != n {
        return Err(Error::Validation(format!(
            "upsert requires equal lengths: ids={}, vectors={}, metadatas={}, texts={}",
            n,
            vectors.len(),
            metadatas.len(),
            texts.len()
        )));
    }
    if let Some((id, v)) = ids.iter().zip(vectors).find(|(_, v)| v.len() != dims) {
        return Err(Error::Validation(format!(
            "vector for '{}' has {} dimensions, index expects {}",
            id,
            v.len(),
            dims
        )));
    }
    Ok(())
}

fn check_query_dims(vector: &[f32], dims: usize) -> Result<()> {
    if vector.len() != dims {
        return Err(Error::Validation(format!(
            "query vector has {} dimensions, index expects {}",
            vector.len(),
            dims
        )));
    }
    Ok(())
}

/// Sort by score desc, then id asc, and keep the top `k`.
fn rank(mut hits: Vec<RetrievalHit>, k: usize) -> Vec<RetrievalHit> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(k);
    hits
}

// ============ SQLite ============

/// SQLite implementation of [`VectorIndex`].
pub struct SqliteVectorIndex {
    pool: SqlitePool,
    dims: usize,
}

impl SqliteVectorIndex {
    /// Bind to the index in `pool`, recording `model`/`dims` on first use.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] if the index was created with a different
    /// embedding model or dimensionality.
    pub async fn open(pool: SqlitePool, model: &str, dims: usize) -> Result<Self> {
        let existing = sqlx::query("SELECT model, dims FROM index_meta WHERE id = 1")
            .fetch_optional(&pool)
            .await?;

        match existing {
            Some(row) => {
                let stored_model: String = row.get("model");
                let stored_dims: i64 = row.get("dims");
                if stored_model != model || stored_dims as usize != dims {
                    return Err(Error::Validation(format!(
                        "index was built with model '{}' ({} dims); refusing to mix with '{}' ({} dims)",
                        stored_model, stored_dims, model, dims
                    )));
                }
            }
            None => {
                sqlx::query(
                    "INSERT OR IGNORE INTO index_meta (id, model, dims, created_at) VALUES (1, ?, ?, ?)",
                )
                .bind(model)
                .bind(dims as i64)
                .bind(chrono::Utc::now().to_rfc3339())
                .execute(&pool)
                .await?;
            }
        }

        Ok(Self { pool, dims })
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn upsert(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        metadatas: &[ChunkMetadata],
        texts: &[String],
    ) -> Result<()> {
        validate_upsert(ids, vectors, metadatas, texts, self.dims)?;
        if ids.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for (((id, vector), meta), text) in ids.iter().zip(vectors).zip(metadatas).zip(texts) {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, doc_id, source, page, text, embedding)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    doc_id = excluded.doc_id,
                    source = excluded.source,
                    page = excluded.page,
                    text = excluded.text,
                    embedding = excluded.embedding
                "#,
            )
            .bind(id)
            .bind(&meta.doc_id)
            .bind(meta.source.as_str())
            .bind(meta.page as i64)
            .bind(text)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(count = ids.len(), "upserted chunks");
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalHit>> {
        check_query_dims(vector, self.dims)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id, doc_id, source, page, text, embedding FROM chunks");
        if let Some(f) = filter {
            let mut sep = " WHERE ";
            if let Some(source) = f.source {
                qb.push(sep).push("source = ").push_bind(source.as_str());
                sep = " AND ";
            }
            if let Some(ref doc_id) = f.doc_id {
                qb.push(sep).push("doc_id = ").push_bind(doc_id.clone());
                sep = " AND ";
            }
            if let Some(page) = f.page {
                qb.push(sep).push("page = ").push_bind(page as i64);
            }
        }

        let rows = qb.build().fetch_all(&self.pool).await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.get("id");
            let source: String = row.get("source");
            let source = match source.parse::<DocType>() {
                Ok(s) => s,
                Err(_) => {
                    warn!(%id, %source, "skipping chunk with unknown source");
                    continue;
                }
            };
            let page: i64 = row.get("page");
            let blob: Vec<u8> = row.get("embedding");
            let score = cosine_similarity(vector, &blob_to_vec(&blob));
            hits.push(RetrievalHit {
                id,
                text: row.get("text"),
                metadata: ChunkMetadata {
                    source,
                    page: page as u32,
                    doc_id: row.get("doc_id"),
                },
                score,
            });
        }

        Ok(rank(hits, k))
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }
}

// ============ In-memory ============

struct StoredEntry {
    vector: Vec<f32>,
    metadata: ChunkMetadata,
    text: String,
}

/// In-memory [`VectorIndex`] for tests and ephemeral use.
pub struct InMemoryVectorIndex {
    dims: usize,
    entries: RwLock<HashMap<String, StoredEntry>>,
}

impl InMemoryVectorIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            entries: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn upsert(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        metadatas: &[ChunkMetadata],
        texts: &[String],
    ) -> Result<()> {
        validate_upsert(ids, vectors, metadatas, texts, self.dims)?;
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        for (((id, vector), meta), text) in ids.iter().zip(vectors).zip(metadatas).zip(texts) {
            entries.insert(
                id.clone(),
                StoredEntry {
                    vector: vector.clone(),
                    metadata: meta.clone(),
                    text: text.clone(),
                },
            );
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalHit>> {
        check_query_dims(vector, self.dims)?;
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let hits = entries
            .iter()
            .filter(|(_, e)| filter.map_or(true, |f| f.matches(&e.metadata)))
            .map(|(id, e)| RetrievalHit {
                id: id.clone(),
                text: e.text.clone(),
                metadata: e.metadata.clone(),
                score: cosine_similarity(vector, &e.vector),
            })
            .collect();
        Ok(rank(hits, k))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().unwrap_or_else(|e| e.into_inner()).len())
    }
}
