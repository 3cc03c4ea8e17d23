//! Answer scoring.
//!
//! The question and answer together form the retrieval query; the top hits
//! from either document type become provenance-tagged context for
//! [`SCORE_TEMPLATE`]. [`normalize_evaluation`] repairs the response field by
//! field, and the result is appended to the [`AttemptStore`] before it is
//! returned. A failed insert is returned as a storage error, never hidden.

use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::attempts::AttemptStore;
use crate::config::RetrievalConfig;
use crate::error::Result;
use crate::models::{NewAttempt, ScoreBreakdown, ScoreResult, CRITERIA};
use crate::orchestrator::{ResponseSchema, StructuredGenerator};
use crate::prompts::SCORE_TEMPLATE;
use crate::questions::company_or_na;
use crate::retrieval::Retriever;

/// Longest strengths or improvements list kept.
pub const MAX_FEEDBACK_ITEMS: usize = 5;

pub const DEFAULT_STRENGTH: &str = "Good effort and relevant direction.";
pub const DEFAULT_IMPROVEMENT: &str = "Add more concrete examples and measurable impact.";
pub const DEFAULT_IMPROVED_ANSWER: &str =
    "Try structuring your answer using Situation–Task–Action–Result (STAR).";

/// Coerce one criterion value to a non-negative integer.
///
/// Integers pass through, floats truncate toward zero, booleans become 0
/// or 1, and numeric strings are parsed after trimming. Anything else,
/// and any negative result, is 0. There is no upper clamp.
pub fn coerce_score(value: Option<&Value>) -> i64 {
    let n = match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|u| i64::try_from(u).unwrap_or(i64::MAX)))
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Some(Value::Bool(b)) => i64::from(*b),
        Some(Value::String(s)) => s.trim().parse::<i64>().unwrap_or(0),
        _ => 0,
    };
    n.max(0)
}

fn feedback_list(value: Option<&Value>, default: &str) -> Vec<String> {
    let mut items: Vec<String> = match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    };
    if items.is_empty() {
        items.push(default.to_string());
    }
    items.truncate(MAX_FEEDBACK_ITEMS);
    items
}

/// Map a parsed evaluation onto a [`ScoreResult`].
///
/// Every criterion is always present; `total_score` is their sum.
pub fn normalize_evaluation(value: &Value) -> ScoreResult {
    let breakdown_value = value.get("breakdown");
    let mut breakdown = ScoreBreakdown::default();
    for criterion in CRITERIA {
        breakdown.set(
            criterion,
            coerce_score(breakdown_value.and_then(|b| b.get(criterion))),
        );
    }

    let improved_answer = value
        .get("improved_answer")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_IMPROVED_ANSWER)
        .to_string();

    ScoreResult {
        total_score: breakdown.total(),
        breakdown,
        strengths: feedback_list(value.get("strengths"), DEFAULT_STRENGTH),
        improvements: feedback_list(value.get("improvements"), DEFAULT_IMPROVEMENT),
        improved_answer,
    }
}

struct EvaluationSchema;

impl ResponseSchema for EvaluationSchema {
    type Output = ScoreResult;

    fn normalize(&self, value: Value) -> ScoreResult {
        normalize_evaluation(&value)
    }
}

/// Scores answers and records each evaluation as an attempt.
#[derive(Clone)]
pub struct AnswerScorer {
    retriever: Retriever,
    generator: StructuredGenerator,
    store: Arc<dyn AttemptStore>,
    retrieval: RetrievalConfig,
}

impl AnswerScorer {
    pub fn new(
        retriever: Retriever,
        generator: StructuredGenerator,
        store: Arc<dyn AttemptStore>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            retriever,
            generator,
            store,
            retrieval,
        }
    }

    pub async fn score_answer(
        &self,
        role: &str,
        company: Option<&str>,
        question: &str,
        answer: &str,
    ) -> Result<ScoreResult> {
        let context = self
            .retriever
            .retrieve_context(
                &format!("{}\n{}", question, answer),
                self.retrieval.score_k,
                None,
                self.retrieval.char_budget,
                true,
            )
            .await?;

        let result = self
            .generator
            .generate_structured(
                SCORE_TEMPLATE,
                &[
                    ("role", role),
                    ("company", company_or_na(company)),
                    ("question", question),
                    ("answer", answer),
                    ("context", &context),
                ],
                &EvaluationSchema,
            )
            .await?;

        let attempt_id = self
            .store
            .insert(NewAttempt {
                role: role.to_string(),
                company: company.map(String::from),
                question: question.to_string(),
                answer: answer.to_string(),
                total_score: result.total_score,
                breakdown: result.breakdown,
            })
            .await?;

        info!(attempt_id, total_score = result.total_score, "scored answer");
        Ok(result)
    }
}
