//! Collaborator interfaces consumed by the pipeline.
//!
//! The core never talks to a model SDK or a search API directly. It sees a
//! [`TextGenerator`] that turns a query into raw text and a
//! [`SearchProvider`] that hands out one [`SearchSession`] per pipeline run.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::retry::Transient;
use crate::types::RecordId;

/// Failure reported by a collaborator
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CollaboratorError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    /// No generator/provider could be reached or constructed
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    /// Missing credentials or similar setup problem
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The remote side answered with an error
    #[error("Provider error: {0}")]
    Provider(String),
}

impl Transient for CollaboratorError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            CollaboratorError::Timeout(_) | CollaboratorError::Connection(_)
        )
    }
}

impl CollaboratorError {
    /// Errors that no amount of retrying or per-record isolation can fix
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CollaboratorError::Unavailable(_) | CollaboratorError::Configuration(_)
        )
    }
}

/// Untrusted output of a generator or search call
#[derive(Debug, Clone, PartialEq)]
pub enum RawAgentOutput {
    Text(String),
    /// Output that some adapter already decoded
    Native(Value),
}

impl RawAgentOutput {
    pub fn text(s: impl Into<String>) -> Self {
        RawAgentOutput::Text(s.into())
    }
}

impl From<String> for RawAgentOutput {
    fn from(s: String) -> Self {
        RawAgentOutput::Text(s)
    }
}

impl From<&str> for RawAgentOutput {
    fn from(s: &str) -> Self {
        RawAgentOutput::Text(s.to_string())
    }
}

impl From<Value> for RawAgentOutput {
    fn from(v: Value) -> Self {
        RawAgentOutput::Native(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

/// One turn of prior conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: Sender,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            sender: Sender::Assistant,
            content: content.into(),
        }
    }
}

/// Whether the satellite search stage runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMode {
    PrimaryOnly,
    PrimaryWithSatellites,
}

/// What the satellite search is asked about
#[derive(Debug, Clone, PartialEq)]
pub struct EntityHint {
    pub id: Option<RecordId>,
    pub title: String,
}

/// Turns a user query into raw agent output.
pub trait TextGenerator {
    fn generate(
        &self,
        query: &str,
        history: &[ChatMessage],
        mode: PipelineMode,
        timeout: Duration,
    ) -> Result<RawAgentOutput, CollaboratorError>;
}

/// Source of satellite entities (e.g. theaters showing a movie).
pub trait SearchProvider {
    /// Open a session scoped to one pipeline run. The session releases its
    /// resources when dropped.
    fn open_session(&self) -> Result<Box<dyn SearchSession + '_>, CollaboratorError>;
}

pub trait SearchSession {
    fn search(
        &mut self,
        hint: &EntityHint,
        timeout: Duration,
    ) -> Result<RawAgentOutput, CollaboratorError>;
}
