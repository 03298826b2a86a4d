//! Shared HTTP plumbing for the collaborator adapters.

use marquee::CollaboratorError;
use reqwest::blocking::Response;

/// Map a transport error onto the collaborator failure classes. Only
/// timeouts and connection failures are retried by the pipeline.
pub(crate) fn classify(context: &str, e: reqwest::Error) -> CollaboratorError {
    if e.is_timeout() {
        CollaboratorError::Timeout(format!("{}: {}", context, e))
    } else if e.is_connect() {
        CollaboratorError::Connection(format!("{}: {}", context, e))
    } else if e.is_builder() {
        CollaboratorError::Configuration(format!("{}: {}", context, e))
    } else {
        CollaboratorError::Provider(format!("{}: {}", context, e))
    }
}

/// Body of a successful response, or a provider error carrying the status.
pub(crate) fn body_text(context: &str, response: Response) -> Result<String, CollaboratorError> {
    let status = response.status();
    let body = response.text().map_err(|e| classify(context, e))?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(CollaboratorError::Provider(format!(
            "{} returned {}: {}",
            context,
            status,
            marquee::utils::preview(&body, 200)
        )))
    }
}

/// Read an API key from the named environment variable, ignoring blanks.
pub(crate) fn key_from_env(var: Option<&str>) -> Option<String> {
    var.and_then(|name| std::env::var(name).ok())
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
}
