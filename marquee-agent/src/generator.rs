//! OpenAI-compatible chat-completions text generator.

use std::time::Duration;

use marquee::{
    CatalogKind, ChatMessage, CollaboratorError, PipelineMode, RawAgentOutput, Sender,
    TextGenerator,
};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::http;

const DEFAULT_MAX_TOKENS: u32 = 2000;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// openai, openrouter, google/gemini or local
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// Environment variable holding the API key
    pub api_key_env: Option<String>,
    pub max_tokens: Option<u32>,
    /// Resolved key, from the CLI or `api_key_env`
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            max_tokens: None,
            api_key: None,
        }
    }
}

impl LlmSettings {
    pub fn resolve_api_key(&mut self) {
        if self.api_key.is_none() {
            self.api_key = http::key_from_env(self.api_key_env.as_deref());
        }
    }

    pub fn endpoint(&self) -> Result<String, CollaboratorError> {
        let base = match (self.base_url.as_deref(), self.provider.as_str()) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, "openai") => "https://api.openai.com/v1".to_string(),
            (None, "openrouter") => "https://openrouter.ai/api/v1".to_string(),
            (None, "google") | (None, "gemini") => {
                "https://generativelanguage.googleapis.com/v1beta/openai".to_string()
            }
            (None, other) => {
                return Err(CollaboratorError::Unavailable(format!(
                    "no base_url configured for LLM provider '{}'",
                    other
                )))
            }
        };
        Ok(format!("{}/chat/completions", base))
    }
}

pub struct ChatCompletionsGenerator {
    settings: LlmSettings,
    kind: CatalogKind,
    client: Client,
}

impl ChatCompletionsGenerator {
    pub fn new(settings: LlmSettings, kind: CatalogKind) -> anyhow::Result<Self> {
        let client = Client::builder().build()?;
        info!(
            provider = %settings.provider,
            model = %settings.model,
            "LLM text generator ready"
        );
        Ok(Self {
            settings,
            kind,
            client,
        })
    }

    fn request_body(&self, query: &str, history: &[ChatMessage], mode: PipelineMode) -> Value {
        let mut messages = vec![json!({
            "role": "system",
            "content": system_prompt(self.kind, mode),
        })];
        messages.extend(history.iter().map(|m| {
            let role = match m.sender {
                Sender::User => "user",
                Sender::Assistant => "assistant",
            };
            json!({"role": role, "content": m.content})
        }));
        messages.push(json!({"role": "user", "content": query}));

        json!({
            "model": self.settings.model,
            "messages": messages,
            "temperature": 0.2,
            "max_tokens": self.settings.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        })
    }
}

impl TextGenerator for ChatCompletionsGenerator {
    fn generate(
        &self,
        query: &str,
        history: &[ChatMessage],
        mode: PipelineMode,
        timeout: Duration,
    ) -> Result<RawAgentOutput, CollaboratorError> {
        let url = self.settings.endpoint()?;
        let mut request = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&self.request_body(query, history, mode));
        match (&self.settings.api_key, self.settings.provider.as_str()) {
            (Some(key), _) => request = request.bearer_auth(key),
            (None, "local") => {}
            (None, provider) => {
                return Err(CollaboratorError::Configuration(format!(
                    "no API key for LLM provider '{}' (set {})",
                    provider,
                    self.settings.api_key_env.as_deref().unwrap_or("--llm-api-key")
                )))
            }
        }

        debug!(url = %url, history = history.len(), "Calling chat completions");
        let response = request.send().map_err(|e| http::classify("LLM request", e))?;
        let body = http::body_text("LLM request", response)?;
        extract_content(&body)
    }
}

/// The assistant message of the first choice. Bodies that are not JSON are
/// passed through as text for the recoverer to deal with.
fn extract_content(body: &str) -> Result<RawAgentOutput, CollaboratorError> {
    let parsed: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return Ok(RawAgentOutput::text(body)),
    };
    parsed["choices"][0]["message"]["content"]
        .as_str()
        .map(RawAgentOutput::text)
        .ok_or_else(|| CollaboratorError::Provider("LLM response had no message content".to_string()))
}

fn system_prompt(kind: CatalogKind, mode: PipelineMode) -> String {
    match kind {
        CatalogKind::Movies => {
            let focus = match mode {
                PipelineMode::PrimaryWithSatellites => {
                    "Prefer movies that are playing in theaters right now."
                }
                PipelineMode::PrimaryOnly => "Recommend movies from any year.",
            };
            format!(
                "You are a movie recommendation assistant. {}\n\
                 Answer with a JSON array only, no prose. Each element is an object with:\n\
                 \"title\", \"tmdb_id\" (number), \"release_date\" (YYYY-MM-DD), \"overview\",\n\
                 \"explanation\" (one sentence on why it fits the request) and \"poster_url\".\n\
                 Return between 3 and 6 movies.",
                focus
            )
        }
        CatalogKind::Rentals => "You are a short-term rental search assistant.\n\
             Answer with a JSON array only, no prose. Each element is a listing object with:\n\
             \"url\", \"listing\" {\"id\"}, \"host\" {\"name\", \"isSuperhost\"},\n\
             \"structuredDisplayPrice\" {\"primaryLine\" {\"accessibilityLabel\"}},\n\
             \"avgRatingA11yLabel\", \"beds\", \"city\", \"neighborhood\", \"amenities\" and \"description\".\n\
             Use only listings returned by your search tools."
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_defaults_by_provider() {
        let mut settings = LlmSettings::default();
        assert_eq!(settings.endpoint().unwrap(), "https://api.openai.com/v1/chat/completions");

        settings.base_url = Some("http://localhost:11434/v1/".to_string());
        assert_eq!(settings.endpoint().unwrap(), "http://localhost:11434/v1/chat/completions");

        settings.base_url = None;
        settings.provider = "mystery".to_string();
        assert!(matches!(settings.endpoint(), Err(CollaboratorError::Unavailable(_))));
    }

    #[test]
    fn test_missing_key_is_a_configuration_error() {
        let settings = LlmSettings {
            api_key_env: None,
            ..LlmSettings::default()
        };
        let generator = ChatCompletionsGenerator::new(settings, CatalogKind::Movies).unwrap();
        let err = generator
            .generate("comedies", &[], PipelineMode::PrimaryOnly, Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Configuration(_)));
    }

    #[test]
    fn test_request_body_carries_history_in_order() {
        let generator = ChatCompletionsGenerator::new(LlmSettings::default(), CatalogKind::Rentals).unwrap();
        let history = vec![ChatMessage::user("cabins"), ChatMessage::assistant("Where?")];
        let body = generator.request_body("Lake Tahoe", &history, PipelineMode::PrimaryOnly);
        let roles: Vec<_> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(body["messages"][3]["content"], "Lake Tahoe");
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_extract_content() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "[{\"title\": \"Up\"}]"}}]}"#;
        assert_eq!(
            extract_content(body).unwrap(),
            RawAgentOutput::text(r#"[{"title": "Up"}]"#)
        );
        assert_eq!(extract_content("not json").unwrap(), RawAgentOutput::text("not json"));
        assert!(extract_content(r#"{"choices": []}"#).is_err());
    }
}
