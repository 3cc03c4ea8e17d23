//! Structured generation: render a prompt, call the model, recover JSON.
//!
//! The flow for every use case is the same:
//!
//! 1. [`render_template`] substitutes named fields into a prompt template.
//!    An unbound placeholder is an [`Error::Template`] and no model call is
//!    made.
//! 2. The [`GenerationProvider`] is called in
//!    [`GenerationMode::Structured`].
//! 3. [`parse_structured`] turns the raw text into a JSON object or array,
//!    recovering from prose or code fences around the payload. If nothing
//!    parses the result is [`Error::Parse`].
//! 4. The caller's [`ResponseSchema`] maps the value onto its output type.
//!    Normalization never fails; field-level damage is repaired there.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::generation::{GenerationMode, GenerationProvider};

/// Per-use-case normalization of a parsed generator response.
pub trait ResponseSchema {
    type Output;

    /// Map whatever the generator returned onto `Output`, defaulting
    /// missing or malformed fields.
    fn normalize(&self, value: Value) -> Self::Output;
}

/// Substitute `{name}` placeholders from `fields`.
///
/// `{{` and `}}` produce literal braces. Substituted values are inserted
/// verbatim and never rescanned. A `{` that does not open a well-formed
/// placeholder is kept as-is.
pub fn render_template(template: &str, fields: &[(&str, &str)]) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('}') {
            out.push('}');
            rest = &tail[1..];
            continue;
        }

        let name_len = tail[1..]
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(tail.len() - 1);
        let closes = tail[1 + name_len..].starts_with('}');
        if name_len == 0 || !closes {
            out.push('{');
            rest = &tail[1..];
            continue;
        }

        let name = &tail[1..1 + name_len];
        let value = fields
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| *v)
            .ok_or_else(|| Error::Template(name.to_string()))?;
        out.push_str(value);
        rest = &tail[name_len + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Parse a generator response into a JSON object or array.
///
/// Tried in order: the whole trimmed text, the text with a surrounding
/// markdown code fence removed, the span from the first `{` to the last
/// `}`, and the span from the first `[` to the last `]`.
pub fn parse_structured(raw: &str) -> Result<Value> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(Error::Parse("generator returned an empty response".to_string()));
    }

    if let Some(v) = parse_container(text) {
        return Ok(v);
    }

    if let Some(inner) = strip_code_fence(text) {
        if let Some(v) = parse_container(inner) {
            debug!("recovered JSON from code fence");
            return Ok(v);
        }
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let Some(span) = bracket_span(text, open, close) {
            if let Some(v) = parse_container(span) {
                debug!(open = %open, "recovered JSON by bracket scan");
                return Ok(v);
            }
        }
    }

    warn!(len = text.len(), "no JSON structure in generator response");
    Err(Error::Parse(
        "no JSON structure found in generator response".to_string(),
    ))
}

/// Only objects and arrays count as structured output.
fn parse_container(s: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(s.trim()) {
        Ok(v @ (Value::Object(_) | Value::Array(_))) => Some(v),
        _ => None,
    }
}

fn strip_code_fence(text: &str) -> Option<&str> {
    let body = text.strip_prefix("```")?;
    // Drop the info string (e.g. `json`) on the opening line.
    let body = &body[body.find('\n')? + 1..];
    let body = body.trim_end();
    Some(body.strip_suffix("```").unwrap_or(body))
}

fn bracket_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

/// Runs the render → complete → parse → normalize flow against one
/// generation provider.
#[derive(Clone)]
pub struct StructuredGenerator {
    provider: Arc<dyn GenerationProvider>,
}

impl StructuredGenerator {
    pub fn new(provider: Arc<dyn GenerationProvider>) -> Self {
        Self { provider }
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    pub async fn generate_structured<S: ResponseSchema>(
        &self,
        template: &str,
        fields: &[(&str, &str)],
        schema: &S,
    ) -> Result<S::Output> {
        let prompt = render_template(template, fields)?;
        let raw = self
            .provider
            .complete(&prompt, GenerationMode::Structured)
            .await?;
        debug!(
            model = self.provider.model_name(),
            prompt_chars = prompt.len(),
            response_chars = raw.len(),
            "generation complete"
        );
        let value = parse_structured(&raw)?;
        Ok(schema.normalize(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        reply: Result<String>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn ok(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GenerationProvider for Scripted {
        fn model_name(&self) -> &str {
            "scripted"
        }
        async fn complete(&self, _prompt: &str, mode: GenerationMode) -> Result<String> {
            assert_eq!(mode, GenerationMode::Structured);
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(s) => Ok(s.clone()),
                Err(e) => Err(Error::Provider(e.to_string())),
            }
        }
    }

    struct Identity;

    impl ResponseSchema for Identity {
        type Output = Value;
        fn normalize(&self, value: Value) -> Value {
            value
        }
    }

    #[test]
    fn test_render_substitutes_and_escapes() {
        let out = render_template(
            "Role: {role} / {{\"k\": {company}}}",
            &[("role", "SRE"), ("company", "N/A")],
        )
        .unwrap();
        assert_eq!(out, "Role: SRE / {\"k\": N/A}");
    }

    #[test]
    fn test_render_does_not_rescan_values() {
        let out = render_template("A: {answer}", &[("answer", "use {role} and }}")]).unwrap();
        assert_eq!(out, "A: use {role} and }}");
    }

    #[test]
    fn test_render_unbound_placeholder() {
        let err = render_template("{role} at {company}", &[("role", "SRE")]).unwrap_err();
        assert!(matches!(err, Error::Template(ref name) if name == "company"));
    }

    #[test]
    fn test_render_keeps_stray_braces() {
        let out = render_template("a { b } c {", &[]).unwrap();
        assert_eq!(out, "a { b } c {");
    }

    #[test]
    fn test_real_templates_render_with_their_fields() {
        use crate::prompts::{QUESTION_TEMPLATE, SCORE_TEMPLATE};
        let q = render_template(
            QUESTION_TEMPLATE,
            &[("role", "Data Engineer"), ("company", "N/A"), ("context", "")],
        )
        .unwrap();
        assert!(q.contains("ROLE: Data Engineer"));
        assert!(q.contains("\"questions\": ["));

        let s = render_template(
            SCORE_TEMPLATE,
            &[
                ("role", "r"),
                ("company", "c"),
                ("question", "q"),
                ("answer", "a"),
                ("context", "ctx"),
            ],
        )
        .unwrap();
        assert!(s.contains("\"technical_correctness\": 0"));
        assert!(render_template(SCORE_TEMPLATE, &[("role", "r")]).is_err());
    }

    #[test]
    fn test_parse_clean_object() {
        assert_eq!(parse_structured(" {\"a\": 1} ").unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_parse_code_fence() {
        let raw = "```json\n{\"questions\": []}\n```";
        assert_eq!(parse_structured(raw).unwrap(), json!({"questions": []}));
    }

    #[test]
    fn test_parse_object_inside_prose() {
        let raw = "Sure! Here you go: {\"a\": {\"b\": [1, 2]}} Hope it helps.";
        assert_eq!(parse_structured(raw).unwrap(), json!({"a": {"b": [1, 2]}}));
    }

    #[test]
    fn test_parse_array_fallback() {
        let raw = "Questions: [{\"question\": \"Why Rust?\"}, {\"question\": \"Why now?\"}] -- done";
        assert_eq!(
            parse_structured(raw).unwrap(),
            json!([{"question": "Why Rust?"}, {"question": "Why now?"}])
        );
    }

    #[test]
    fn test_parse_failures_are_parse_errors() {
        for raw in ["", "   ", "no json here", "42", "\"just a string\"", "} backwards {"] {
            let err = parse_structured(raw).unwrap_err();
            assert_eq!(err.kind(), "parse", "input {:?}", raw);
        }
    }

    #[tokio::test]
    async fn test_generate_structured_end_to_end() {
        let provider = Arc::new(Scripted::ok("```\n{\"ok\": true}\n```"));
        let generator = StructuredGenerator::new(provider.clone());
        let out = generator
            .generate_structured("Say {x}", &[("x", "hi")], &Identity)
            .await
            .unwrap();
        assert_eq!(out, json!({"ok": true}));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_template_error_skips_provider() {
        let provider = Arc::new(Scripted::ok("{}"));
        let generator = StructuredGenerator::new(provider.clone());
        let err = generator
            .generate_structured("Say {x}", &[], &Identity)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "template");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let provider = Arc::new(Scripted {
            reply: Err(Error::Provider("timeout".into())),
            calls: AtomicUsize::new(0),
        });
        let generator = StructuredGenerator::new(provider);
        let err = generator
            .generate_structured("x", &[], &Identity)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "provider");
    }
}
