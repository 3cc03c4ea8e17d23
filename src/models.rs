//! Core data models used throughout the interview harness.
//!
//! These types represent the documents, chunks, questions, and evaluations
//! that flow through the ingestion, retrieval, and scoring pipelines.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Kind of uploaded document. Also used as the `source` metadata key on
/// every indexed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    Resume,
    Jd,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Resume => "resume",
            DocType::Jd => "jd",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "resume" => Ok(DocType::Resume),
            "jd" => Ok(DocType::Jd),
            other => Err(Error::Validation(format!(
                "doc_type must be resume or jd, got '{}'",
                other
            ))),
        }
    }
}

/// One page of extracted document text. `page_number` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub page_number: u32,
    pub text: String,
}

impl Page {
    pub fn new(page_number: u32, text: impl Into<String>) -> Self {
        Self {
            page_number,
            text: text.into(),
        }
    }
}

/// Metadata stored alongside every chunk vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: DocType,
    pub page: u32,
    pub doc_id: String,
}

/// A chunk ready for indexing.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub chunk_index: usize,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A chunk returned from a similarity query, best match first.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalHit {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Cosine similarity against the query vector.
    pub score: f32,
}

/// A generated interview question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Canonically one of `technical`, `behavioral`, `project`, `general`,
    /// but any string the generator produces is kept.
    #[serde(rename = "type")]
    pub kind: String,
    pub question: String,
}

/// Names of the five scoring criteria, in canonical order.
pub const CRITERIA: [&str; 5] = [
    "relevance",
    "clarity",
    "technical_correctness",
    "structure",
    "impact",
];

/// Per-criterion scores. Serializes as a map with exactly the five
/// [`CRITERIA`] keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreBreakdown {
    pub relevance: i64,
    pub clarity: i64,
    pub technical_correctness: i64,
    pub structure: i64,
    pub impact: i64,
}

impl ScoreBreakdown {
    pub fn get(&self, criterion: &str) -> Option<i64> {
        match criterion {
            "relevance" => Some(self.relevance),
            "clarity" => Some(self.clarity),
            "technical_correctness" => Some(self.technical_correctness),
            "structure" => Some(self.structure),
            "impact" => Some(self.impact),
            _ => None,
        }
    }

    fn slot(&mut self, criterion: &str) -> Option<&mut i64> {
        match criterion {
            "relevance" => Some(&mut self.relevance),
            "clarity" => Some(&mut self.clarity),
            "technical_correctness" => Some(&mut self.technical_correctness),
            "structure" => Some(&mut self.structure),
            "impact" => Some(&mut self.impact),
            _ => None,
        }
    }

    /// Sets a criterion by name. Unknown names are ignored.
    pub fn set(&mut self, criterion: &str, value: i64) {
        if let Some(slot) = self.slot(criterion) {
            *slot = value;
        }
    }

    /// Sum of all criteria. Saturates instead of overflowing, since
    /// individual values are not clamped from above.
    pub fn total(&self) -> i64 {
        CRITERIA
            .iter()
            .filter_map(|c| self.get(c))
            .fold(0i64, |acc, v| acc.saturating_add(v))
    }
}

/// Result of scoring one answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResult {
    pub total_score: i64,
    pub breakdown: ScoreBreakdown,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub improved_answer: String,
}

/// An attempt about to be persisted.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub role: String,
    pub company: Option<String>,
    pub question: String,
    pub answer: String,
    pub total_score: i64,
    pub breakdown: ScoreBreakdown,
}

/// A persisted question-answer-evaluation record.
#[derive(Debug, Clone, Serialize)]
pub struct Attempt {
    pub id: i64,
    /// RFC 3339 UTC timestamp.
    pub created_at: String,
    pub role: String,
    pub company: Option<String>,
    pub question: String,
    pub answer: String,
    pub total_score: i64,
    pub breakdown: ScoreBreakdown,
}

/// History view of an attempt (the answer text is omitted).
#[derive(Debug, Clone, Serialize)]
pub struct HistoryItem {
    pub created_at: String,
    pub role: String,
    pub company: Option<String>,
    pub question: String,
    pub total_score: i64,
    pub breakdown: ScoreBreakdown,
}

impl From<Attempt> for HistoryItem {
    fn from(a: Attempt) -> Self {
        Self {
            created_at: a.created_at,
            role: a.role,
            company: a.company,
            question: a.question,
            total_score: a.total_score,
            breakdown: a.breakdown,
        }
    }
}

/// Aggregate over all attempts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AttemptSummary {
    pub attempt_count: i64,
    pub average_score: f64,
}

/// Returned by the upload entry point.
#[derive(Debug, Clone, Serialize)]
pub struct UploadReceipt {
    pub doc_id: String,
    pub doc_type: DocType,
    pub page_count: usize,
    pub chunk_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_type_parse() {
        assert_eq!("resume".parse::<DocType>().unwrap(), DocType::Resume);
        assert_eq!("jd".parse::<DocType>().unwrap(), DocType::Jd);
        let err = "cover-letter".parse::<DocType>().unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_breakdown_serializes_all_criteria() {
        let b = ScoreBreakdown {
            impact: 3,
            ..Default::default()
        };
        let json = serde_json::to_value(b).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 5);
        for c in CRITERIA {
            assert!(obj.contains_key(c), "missing {}", c);
        }
        assert_eq!(obj["impact"], 3);
        assert_eq!(b.total(), 3);
    }

    #[test]
    fn test_breakdown_partial_map_defaults_missing() {
        let b: ScoreBreakdown = serde_json::from_str(r#"{"clarity": 4}"#).unwrap();
        assert_eq!(b.clarity, 4);
        assert_eq!(b.impact, 0);
    }

    #[test]
    fn test_total_saturates() {
        let b = ScoreBreakdown {
            relevance: i64::MAX,
            clarity: i64::MAX,
            ..Default::default()
        };
        assert_eq!(b.total(), i64::MAX);
    }

    #[test]
    fn test_breakdown_set_ignores_unknown() {
        let mut b = ScoreBreakdown::default();
        b.set("clarity", 4);
        b.set("charisma", 5);
        assert_eq!(b.clarity, 4);
        assert_eq!(b.total(), 4);
    }

    #[test]
    fn test_question_type_field_name() {
        let q = Question {
            kind: "technical".into(),
            question: "What is a B-tree?".into(),
        };
        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(json["type"], "technical");
    }
}
