//! Interview question synthesis.
//!
//! Context is pulled separately from resume chunks and job description
//! chunks, joined (resume first) and cut to the configured budget, then fed
//! to [`QUESTION_TEMPLATE`]. The response is normalized by
//! [`normalize_questions`]; the caller always gets at least one question
//! and never more than `max(3, requested_count)`.

use serde_json::Value;
use tracing::info;

use crate::config::RetrievalConfig;
use crate::error::Result;
use crate::models::{DocType, Question};
use crate::orchestrator::{ResponseSchema, StructuredGenerator};
use crate::prompts::QUESTION_TEMPLATE;
use crate::retrieval::{assemble_context, Retriever};
use crate::vector_index::MetadataFilter;

/// Smallest question set returned, whatever the request asks for.
pub const MIN_QUESTIONS: usize = 3;

pub const DEFAULT_QUESTION_TYPE: &str = "general";

/// Question used when the generator yields nothing usable.
pub fn fallback_question(role: &str) -> Question {
    Question {
        kind: DEFAULT_QUESTION_TYPE.to_string(),
        question: format!(
            "Tell me about yourself and why you are a good fit for {}.",
            role
        ),
    }
}

/// Value substituted for an absent or blank company in prompts.
pub(crate) fn company_or_na(company: Option<&str>) -> &str {
    company
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or("N/A")
}

/// Keep well-formed entries of `questions` (or of a bare top-level array),
/// in generator order.
///
/// An entry survives if it is an object with non-blank `question` text.
/// A missing or blank `type` becomes `"general"`.
pub fn normalize_questions(value: &Value) -> Vec<Question> {
    let items: &[Value] = match value {
        Value::Array(items) => items.as_slice(),
        other => match other.get("questions") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => &[],
        },
    };

    items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let question = obj.get("question")?.as_str()?.trim();
            if question.is_empty() {
                return None;
            }
            let kind = obj
                .get("type")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(DEFAULT_QUESTION_TYPE);
            Some(Question {
                kind: kind.to_string(),
                question: question.to_string(),
            })
        })
        .collect()
}

struct QuestionSchema<'a> {
    role: &'a str,
    limit: usize,
}

impl ResponseSchema for QuestionSchema<'_> {
    type Output = Vec<Question>;

    fn normalize(&self, value: Value) -> Vec<Question> {
        let mut questions = normalize_questions(&value);
        if questions.is_empty() {
            questions.push(fallback_question(self.role));
        }
        questions.truncate(self.limit);
        questions
    }
}

/// Generates grounded interview questions.
#[derive(Clone)]
pub struct QuestionSynthesizer {
    retriever: Retriever,
    generator: StructuredGenerator,
    retrieval: RetrievalConfig,
}

impl QuestionSynthesizer {
    pub fn new(
        retriever: Retriever,
        generator: StructuredGenerator,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            retriever,
            generator,
            retrieval,
        }
    }

    pub async fn generate_questions(
        &self,
        role: &str,
        company: Option<&str>,
        requested_count: usize,
    ) -> Result<Vec<Question>> {
        let k = self.retrieval.question_k;
        let mut hits = self
            .retriever
            .retrieve(
                &format!("{} skills projects experience", role),
                k,
                Some(&MetadataFilter::source(DocType::Resume)),
            )
            .await?;
        hits.extend(
            self.retriever
                .retrieve(
                    &format!("{} requirements responsibilities tech stack", role),
                    k,
                    Some(&MetadataFilter::source(DocType::Jd)),
                )
                .await?,
        );
        let context = assemble_context(&hits, self.retrieval.char_budget, false);

        let schema = QuestionSchema {
            role,
            limit: MIN_QUESTIONS.max(requested_count),
        };
        let questions = self
            .generator
            .generate_structured(
                QUESTION_TEMPLATE,
                &[
                    ("role", role),
                    ("company", company_or_na(company)),
                    ("context", &context),
                ],
                &schema,
            )
            .await?;

        info!(
            role,
            hits = hits.len(),
            questions = questions.len(),
            "generated questions"
        );
        Ok(questions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_drops_bad_entries_and_defaults_type() {
        let value = json!({
            "questions": [
                {"type": "technical", "question": "  Explain MVCC.  "},
                "not an object",
                {"type": "behavioral", "question": "   "},
                {"question": "Describe your last project."},
                {"type": "", "question": "Why this company?"},
                {"type": "project"}
            ]
        });
        let qs = normalize_questions(&value);
        assert_eq!(
            qs,
            vec![
                Question {
                    kind: "technical".into(),
                    question: "Explain MVCC.".into()
                },
                Question {
                    kind: "general".into(),
                    question: "Describe your last project.".into()
                },
                Question {
                    kind: "general".into(),
                    question: "Why this company?".into()
                },
            ]
        );
    }

    #[test]
    fn test_normalize_accepts_bare_array() {
        let value = json!([{"type": "technical", "question": "What is a mutex?"}]);
        assert_eq!(normalize_questions(&value).len(), 1);
    }

    #[test]
    fn test_normalize_missing_or_wrong_questions_key() {
        assert!(normalize_questions(&json!({})).is_empty());
        assert!(normalize_questions(&json!({"questions": "none"})).is_empty());
    }

    #[test]
    fn test_schema_fallback_and_limit() {
        let schema = QuestionSchema {
            role: "Backend Engineer",
            limit: 3,
        };
        let qs = schema.normalize(json!({"questions": []}));
        assert_eq!(qs, vec![fallback_question("Backend Engineer")]);
        assert_eq!(qs[0].kind, "general");
        assert!(qs[0].question.contains("Backend Engineer"));

        let many: Vec<Value> = (0..6)
            .map(|i| json!({"type": "technical", "question": format!("Q{}", i)}))
            .collect();
        let qs = schema.normalize(json!({ "questions": many }));
        assert_eq!(qs.len(), 3);
        assert_eq!(qs[0].question, "Q0");
        assert_eq!(qs[2].question, "Q2");
    }

    #[test]
    fn test_company_or_na() {
        assert_eq!(company_or_na(None), "N/A");
        assert_eq!(company_or_na(Some("  ")), "N/A");
        assert_eq!(company_or_na(Some("Acme")), "Acme");
    }
}
