//! Generation provider abstraction.
//!
//! A [`GenerationProvider`] completes a prompt. In
//! [`GenerationMode::Structured`] the provider is asked for JSON only
//! (OpenAI `response_format: json_object`, Ollama `format: "json"`), but
//! callers must still treat the returned text as untrusted; parsing and
//! recovery live in [`orchestrator`](crate::orchestrator).
//!
//! Providers impose no retry of their own unless `generation.max_retries`
//! is raised above its default of zero. The HTTP client timeout is the only
//! deadline.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::GenerationConfig;
use crate::embedding::{http_client, post_json_with_retry};
use crate::error::{Error, Result};

/// System message sent with every structured request.
pub const JSON_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. When asked for JSON, reply with valid JSON only and no other text.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    /// Ask the model for a single JSON document.
    Structured,
    /// Free text.
    Text,
}

/// Capability: complete a prompt with a language model.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn model_name(&self) -> &str;

    /// Raw completion text. Provider and transport failures are
    /// [`Error::Provider`].
    async fn complete(&self, prompt: &str, mode: GenerationMode) -> Result<String>;
}

// ============ Disabled ============

pub struct DisabledGenerator;

#[async_trait]
impl GenerationProvider for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _prompt: &str, _mode: GenerationMode) -> Result<String> {
        Err(Error::Provider(
            "generation is disabled; set [generation].provider".to_string(),
        ))
    }
}

// ============ OpenAI ============

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

fn messages<'a>(prompt: &'a str, mode: GenerationMode) -> Vec<ChatMessage<'a>> {
    let mut out = Vec::with_capacity(2);
    if mode == GenerationMode::Structured {
        out.push(ChatMessage {
            role: "system",
            content: JSON_SYSTEM_PROMPT,
        });
    }
    out.push(ChatMessage {
        role: "user",
        content: prompt,
    });
    out
}

/// Chat completions against the OpenAI API (or any compatible base URL).
/// Requires `OPENAI_API_KEY` in the environment.
pub struct OpenAIGenerator {
    model: String,
    temperature: f32,
    endpoint: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            Error::Provider("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        let base = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            endpoint: format!("{}/chat/completions", base.trim_end_matches('/')),
            api_key,
            max_retries: config.max_retries,
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl GenerationProvider for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, mode: GenerationMode) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: messages(prompt, mode),
            response_format: (mode == GenerationMode::Structured).then_some(ResponseFormat {
                kind: "json_object",
            }),
        };
        let body = serde_json::to_value(&request).map_err(Error::provider)?;
        let json = post_json_with_retry(
            &self.client,
            &self.endpoint,
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;
        parse_chat_response(json)
    }
}

fn parse_chat_response(json: serde_json::Value) -> Result<String> {
    let parsed: ChatResponse = serde_json::from_value(json)
        .map_err(|e| Error::Provider(format!("unexpected chat response shape: {}", e)))?;
    Ok(parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default())
}

// ============ Ollama ============

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: AssistantMessage,
}

/// Chat against a local Ollama instance via `POST /api/chat`.
pub struct OllamaGenerator {
    model: String,
    temperature: f32,
    endpoint: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let base = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            endpoint: format!("{}/api/chat", base.trim_end_matches('/')),
            max_retries: config.max_retries,
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl GenerationProvider for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, mode: GenerationMode) -> Result<String> {
        let request = OllamaChatRequest {
            model: &self.model,
            messages: messages(prompt, mode),
            stream: false,
            format: (mode == GenerationMode::Structured).then_some("json"),
            options: OllamaOptions {
                temperature: self.temperature,
            },
        };
        let body = serde_json::to_value(&request).map_err(Error::provider)?;
        let json = post_json_with_retry(
            &self.client,
            &self.endpoint,
            None,
            &body,
            self.max_retries,
            "Ollama",
        )
        .await?;
        let parsed: OllamaChatResponse = serde_json::from_value(json)
            .map_err(|e| Error::Provider(format!("unexpected Ollama response shape: {}", e)))?;
        Ok(parsed.message.content.unwrap_or_default())
    }
}

/// Build the generator named by `generation.provider`.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn GenerationProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => Err(Error::Validation(format!(
            "Unknown generation provider: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_request_shape() {
        let request = ChatRequest {
            model: "gpt-4o-mini",
            temperature: 0.2,
            messages: messages("Say hi", GenerationMode::Structured),
            response_format: Some(ResponseFormat {
                kind: "json_object",
            }),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "Say hi");
    }

    #[test]
    fn test_text_mode_has_no_system_message() {
        let msgs = messages("hello", GenerationMode::Text);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].role, "user");
    }

    #[test]
    fn test_parse_chat_response() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"a\":1}"}}]
        });
        assert_eq!(parse_chat_response(json).unwrap(), "{\"a\":1}");

        let empty = serde_json::json!({"choices": []});
        assert_eq!(parse_chat_response(empty).unwrap(), "");

        let bad = serde_json::json!({"error": "nope"});
        assert_eq!(parse_chat_response(bad).unwrap_err().kind(), "provider");
    }

    #[tokio::test]
    async fn test_disabled_is_provider_error() {
        let err = DisabledGenerator
            .complete("x", GenerationMode::Structured)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "provider");
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config = GenerationConfig {
            provider: "markov".into(),
            ..Default::default()
        };
        assert!(create_generator(&config).is_err());
    }
}
