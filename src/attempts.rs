//! Attempt persistence.
//!
//! Attempts are append-only: the core inserts them and reads them back, it
//! never updates or deletes. "Most recent" means highest id, which is
//! insertion order and stays stable when timestamps collide.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::models::{Attempt, AttemptSummary, NewAttempt, ScoreBreakdown};

#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Append an attempt and return its id.
    async fn insert(&self, attempt: NewAttempt) -> Result<i64>;

    /// Up to `limit` attempts, most recent first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<Attempt>>;

    /// Count and mean total score. An empty store yields `(0, 0.0)`.
    async fn aggregate(&self) -> Result<AttemptSummary>;
}

/// Blank company names are stored as NULL.
fn normalize_company(company: Option<String>) -> Option<String> {
    company
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

// ============ SQLite ============

pub struct SqliteAttemptStore {
    pool: SqlitePool,
}

impl SqliteAttemptStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttemptStore for SqliteAttemptStore {
    async fn insert(&self, attempt: NewAttempt) -> Result<i64> {
        let breakdown_json = serde_json::to_string(&attempt.breakdown)
            .map_err(|e| Error::Validation(format!("unserializable breakdown: {}", e)))?;

        let result = sqlx::query(
            "INSERT INTO attempts (created_at, role, company, question, answer, total_score, breakdown_json) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(now_rfc3339())
        .bind(&attempt.role)
        .bind(normalize_company(attempt.company))
        .bind(&attempt.question)
        .bind(&attempt.answer)
        .bind(attempt.total_score)
        .bind(breakdown_json)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Attempt>> {
        let rows = sqlx::query(
            "SELECT id, created_at, role, company, question, answer, total_score, breakdown_json \
             FROM attempts ORDER BY id DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<Attempt> {
                let breakdown_json: String = row.try_get("breakdown_json")?;
                // Rows written by older tools may hold partial maps.
                let breakdown: ScoreBreakdown =
                    serde_json::from_str(&breakdown_json).unwrap_or_default();
                Ok(Attempt {
                    id: row.try_get("id")?,
                    created_at: row.try_get("created_at")?,
                    role: row.try_get("role")?,
                    company: row.try_get("company")?,
                    question: row.try_get("question")?,
                    answer: row.try_get("answer")?,
                    total_score: row.try_get("total_score")?,
                    breakdown,
                })
            })
            .collect()
    }

    async fn aggregate(&self) -> Result<AttemptSummary> {
        let row = sqlx::query("SELECT COUNT(*) AS n, AVG(total_score) AS avg FROM attempts")
            .fetch_one(&self.pool)
            .await?;
        let attempt_count: i64 = row.try_get("n")?;
        let average_score: Option<f64> = row.try_get("avg")?;
        Ok(AttemptSummary {
            attempt_count,
            average_score: average_score.unwrap_or(0.0),
        })
    }
}

// ============ In-memory ============

/// Vec-backed store with the same ordering semantics.
#[derive(Default)]
pub struct InMemoryAttemptStore {
    rows: Mutex<Vec<Attempt>>,
}

impl InMemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttemptStore for InMemoryAttemptStore {
    async fn insert(&self, attempt: NewAttempt) -> Result<i64> {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let id = rows.len() as i64 + 1;
        rows.push(Attempt {
            id,
            created_at: now_rfc3339(),
            role: attempt.role,
            company: normalize_company(attempt.company),
            question: attempt.question,
            answer: attempt.answer,
            total_score: attempt.total_score,
            breakdown: attempt.breakdown,
        });
        Ok(id)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Attempt>> {
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        Ok(rows.iter().rev().take(limit).cloned().collect())
    }

    async fn aggregate(&self) -> Result<AttemptSummary> {
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let attempt_count = rows.len() as i64;
        let average_score = if rows.is_empty() {
            0.0
        } else {
            rows.iter().map(|a| a.total_score as f64).sum::<f64>() / rows.len() as f64
        };
        Ok(AttemptSummary {
            attempt_count,
            average_score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, migrate};
    use tempfile::TempDir;

    fn attempt(question: &str, total: i64, company: Option<&str>) -> NewAttempt {
        NewAttempt {
            role: "Backend Engineer".to_string(),
            company: company.map(String::from),
            question: question.to_string(),
            answer: "answer".to_string(),
            total_score: total,
            breakdown: ScoreBreakdown {
                relevance: total,
                ..Default::default()
            },
        }
    }

    async fn exercise(store: &dyn AttemptStore) {
        let empty = store.aggregate().await.unwrap();
        assert_eq!(empty.attempt_count, 0);
        assert_eq!(empty.average_score, 0.0);
        assert!(store.list_recent(50).await.unwrap().is_empty());

        let a = store.insert(attempt("first", 10, Some("Acme"))).await.unwrap();
        let b = store.insert(attempt("second", 15, Some("  "))).await.unwrap();
        let c = store.insert(attempt("third", 20, None)).await.unwrap();
        assert!(a < b && b < c);

        let recent = store.list_recent(2).await.unwrap();
        let questions: Vec<_> = recent.iter().map(|r| r.question.as_str()).collect();
        assert_eq!(questions, vec!["third", "second"]);
        assert_eq!(recent[1].company, None);
        assert_eq!(recent[0].breakdown.relevance, 20);

        let all = store.list_recent(50).await.unwrap();
        assert_eq!(all[2].company.as_deref(), Some("Acme"));
        assert!(chrono::DateTime::parse_from_rfc3339(&all[0].created_at).is_ok());

        let summary = store.aggregate().await.unwrap();
        assert_eq!(summary.attempt_count, 3);
        assert!((summary.average_score - 15.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_sqlite_store() {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("ih.sqlite")).await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        exercise(&SqliteAttemptStore::new(pool.clone())).await;
        pool.close().await;
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        exercise(&InMemoryAttemptStore::new()).await;
    }

    #[tokio::test]
    async fn test_sqlite_partial_breakdown_keeps_known_criteria() {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("ih.sqlite")).await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        sqlx::query(
            "INSERT INTO attempts (created_at, role, question, answer, total_score, breakdown_json) \
             VALUES ('2024-01-01T00:00:00Z', 'SRE', 'q', 'a', 7, '{\"clarity\": 4, \"impact\": 3}')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let rows = SqliteAttemptStore::new(pool.clone()).list_recent(10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].breakdown.clarity, 4);
        assert_eq!(rows[0].breakdown.impact, 3);
        assert_eq!(rows[0].breakdown.relevance, 0);
        pool.close().await;
    }

    #[tokio::test]
    async fn test_sqlite_insert_fails_without_schema() {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("bare.sqlite")).await.unwrap();
        let err = SqliteAttemptStore::new(pool.clone())
            .insert(attempt("q", 1, None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "storage");
        pool.close().await;
    }
}
