//! HTTP satellite search (e.g. theaters showing a movie).
//!
//! The endpoint receives `{"id": .., "title": ..}` as JSON and answers with
//! whatever text it likes; the pipeline recovers records from the body.

use std::time::Duration;

use marquee::{CollaboratorError, EntityHint, RawAgentOutput, SearchProvider, SearchSession};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::http;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub endpoint: String,
    pub api_key_env: Option<String>,
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl SearchSettings {
    pub fn resolve_api_key(&mut self) {
        if self.api_key.is_none() {
            self.api_key = http::key_from_env(self.api_key_env.as_deref());
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpSearchProvider {
    settings: SearchSettings,
}

impl HttpSearchProvider {
    pub fn new(settings: SearchSettings) -> Self {
        Self { settings }
    }
}

impl SearchProvider for HttpSearchProvider {
    fn open_session(&self) -> Result<Box<dyn SearchSession + '_>, CollaboratorError> {
        if self.settings.endpoint.trim().is_empty() {
            return Err(CollaboratorError::Unavailable(
                "no search endpoint configured".to_string(),
            ));
        }
        let client = Client::builder()
            .build()
            .map_err(|e| http::classify("search client", e))?;
        debug!(endpoint = %self.settings.endpoint, "Search session opened");
        Ok(Box::new(HttpSearchSession {
            settings: &self.settings,
            client,
            searches: 0,
        }))
    }
}

/// Owns the connection pool for one pipeline run.
struct HttpSearchSession<'a> {
    settings: &'a SearchSettings,
    client: Client,
    searches: usize,
}

impl SearchSession for HttpSearchSession<'_> {
    fn search(&mut self, hint: &EntityHint, timeout: Duration) -> Result<RawAgentOutput, CollaboratorError> {
        self.searches += 1;
        let mut request = self
            .client
            .post(&self.settings.endpoint)
            .timeout(timeout)
            .json(&json!({"id": hint.id, "title": hint.title}));
        if let Some(key) = &self.settings.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().map_err(|e| http::classify("search request", e))?;
        http::body_text("search request", response).map(RawAgentOutput::Text)
    }
}

impl Drop for HttpSearchSession<'_> {
    fn drop(&mut self) {
        debug!(searches = self.searches, "Search session closed");
    }
}
