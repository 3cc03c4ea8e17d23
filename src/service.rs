//! The exposed entry points, wired once per process.
//!
//! [`InterviewService::from_config`] is the single place providers, the
//! database pool, and the vector index are constructed. Everything else
//! (CLI commands, HTTP handlers, tests) holds the service and calls its
//! methods; nothing re-creates a client per request.

use std::sync::Arc;
use tracing::info;

use crate::attempts::{AttemptStore, SqliteAttemptStore};
use crate::config::Config;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::extract::{DefaultExtractor, TextExtractor};
use crate::generation::{create_generator, GenerationProvider};
use crate::ingest::Ingestor;
use crate::models::{AttemptSummary, HistoryItem, Question, ScoreResult, UploadReceipt};
use crate::orchestrator::StructuredGenerator;
use crate::questions::QuestionSynthesizer;
use crate::retrieval::Retriever;
use crate::scoring::AnswerScorer;
use crate::vector_index::{InMemoryVectorIndex, SqliteVectorIndex, VectorIndex};
use crate::{db, migrate};

/// Default number of history rows.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Default number of requested questions.
pub const DEFAULT_QUESTION_COUNT: usize = 10;

/// Long-lived collaborators handed to [`InterviewService::from_parts`].
pub struct ServiceParts {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub index: Arc<dyn VectorIndex>,
    pub generator: Arc<dyn GenerationProvider>,
    pub attempts: Arc<dyn AttemptStore>,
    pub extractor: Arc<dyn TextExtractor>,
}

#[derive(Clone)]
pub struct InterviewService {
    ingestor: Ingestor,
    questions: QuestionSynthesizer,
    scorer: AnswerScorer,
    attempts: Arc<dyn AttemptStore>,
    index: Arc<dyn VectorIndex>,
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

impl InterviewService {
    /// Connect, migrate, and build every provider named in `config`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;

        let embedder = create_provider(&config.embedding)?;
        let index: Arc<dyn VectorIndex> = if config.embedding.is_enabled() {
            Arc::new(SqliteVectorIndex::open(pool.clone(), embedder.model_name(), embedder.dims()).await?)
        } else {
            // Recording a disabled provider would lock the index to it.
            Arc::new(InMemoryVectorIndex::new(embedder.dims()))
        };
        let generator = create_generator(&config.generation)?;

        info!(
            db = %config.db.path.display(),
            embedder = embedder.model_name(),
            dims = embedder.dims(),
            generator = generator.model_name(),
            "service ready"
        );

        Ok(Self::from_parts(
            config,
            ServiceParts {
                embedder,
                index,
                generator,
                attempts: Arc::new(SqliteAttemptStore::new(pool)),
                extractor: Arc::new(DefaultExtractor),
            },
        ))
    }

    /// Assemble the service from already-built collaborators.
    pub fn from_parts(config: &Config, parts: ServiceParts) -> Self {
        let retriever = Retriever::new(parts.embedder.clone(), parts.index.clone());
        let generator = StructuredGenerator::new(parts.generator);

        Self {
            ingestor: Ingestor::new(
                parts.embedder,
                parts.index.clone(),
                parts.extractor,
                config.chunking.clone(),
            )
            .with_uploads_dir(config.uploads.dir.clone()),
            questions: QuestionSynthesizer::new(
                retriever.clone(),
                generator.clone(),
                config.retrieval.clone(),
            ),
            scorer: AnswerScorer::new(
                retriever,
                generator,
                parts.attempts.clone(),
                config.retrieval.clone(),
            ),
            attempts: parts.attempts,
            index: parts.index,
        }
    }

    pub async fn upload(&self, doc_type: &str, bytes: &[u8]) -> Result<UploadReceipt> {
        self.ingestor.upload(doc_type, bytes).await
    }

    pub async fn generate_questions(
        &self,
        role: &str,
        company: Option<&str>,
        requested_count: usize,
    ) -> Result<Vec<Question>> {
        require("role", role)?;
        self.questions
            .generate_questions(role.trim(), company, requested_count)
            .await
    }

    pub async fn score_answer(
        &self,
        role: &str,
        company: Option<&str>,
        question: &str,
        answer: &str,
    ) -> Result<ScoreResult> {
        require("role", role)?;
        require("question", question)?;
        require("answer", answer)?;
        self.scorer
            .score_answer(role.trim(), company, question, answer)
            .await
    }

    pub async fn history(&self, limit: usize) -> Result<Vec<HistoryItem>> {
        Ok(self
            .attempts
            .list_recent(limit)
            .await?
            .into_iter()
            .map(HistoryItem::from)
            .collect())
    }

    pub async fn summary(&self) -> Result<AttemptSummary> {
        self.attempts.aggregate().await
    }

    /// Number of indexed chunks.
    pub async fn chunk_count(&self) -> Result<usize> {
        self.index.count().await
    }
}
