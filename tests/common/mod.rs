//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use interview_harness::attempts::SqliteAttemptStore;
use interview_harness::config::Config;
use interview_harness::embedding::{EmbeddingProvider, HashProvider};
use interview_harness::extract::DefaultExtractor;
use interview_harness::generation::{GenerationMode, GenerationProvider};
use interview_harness::retrieval::Retriever;
use interview_harness::service::{InterviewService, ServiceParts};
use interview_harness::vector_index::{SqliteVectorIndex, VectorIndex};
use interview_harness::{db, migrate, Error, Result};

/// Replays canned replies in order and records every prompt it receives.
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn reply(&self, text: &str) {
        self.replies.lock().unwrap().push_back(Ok(text.to_string()));
    }

    pub fn fail(&self, message: &str) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    pub fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl GenerationProvider for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str, _mode: GenerationMode) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(Error::Provider(message)),
            None => Err(Error::Provider("no scripted reply left".to_string())),
        }
    }
}

pub struct Harness {
    pub tmp: TempDir,
    pub service: InterviewService,
    pub generator: Arc<ScriptedGenerator>,
    pub retriever: Retriever,
}

pub async fn harness() -> Harness {
    let tmp = TempDir::new().unwrap();
    let config = Config::with_db_path(tmp.path().join("data/ih.sqlite"));
    let pool = db::connect(&config).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();

    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashProvider::new(384));
    let index: Arc<dyn VectorIndex> = Arc::new(
        SqliteVectorIndex::open(pool.clone(), embedder.model_name(), embedder.dims())
            .await
            .unwrap(),
    );
    let generator = Arc::new(ScriptedGenerator::default());

    let service = InterviewService::from_parts(
        &config,
        ServiceParts {
            embedder: embedder.clone(),
            index: index.clone(),
            generator: generator.clone(),
            attempts: Arc::new(SqliteAttemptStore::new(pool)),
            extractor: Arc::new(DefaultExtractor),
        },
    );

    Harness {
        tmp,
        service,
        generator,
        retriever: Retriever::new(embedder, index),
    }
}

