mod client;
mod inference;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::domain::{MessageContent, SuggestedAction};

pub use client::OpenAiClient;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("OPENAI_API_KEY must be configured for backend requests")]
    NotConfigured,
    #[error("backend responded with status {0}")]
    Status(u16),
    #[error("backend request timed out")]
    Timeout,
    #[error("backend transport error: {0}")]
    Transport(String),
    #[error("backend response did not contain any content")]
    EmptyResponse,
    #[error("backend returned an unrecognized action `{0}`")]
    UnrecognizedAction(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}

/// Latent, unreliable text-generation service.
pub trait GenerativeBackend: Send + Sync {
    fn suggest_action(
        &self,
        content: MessageContent,
    ) -> BoxFuture<'_, Result<SuggestedAction, BackendError>>;

    fn draft_reply(&self, content: MessageContent) -> BoxFuture<'_, Result<String, BackendError>>;
}
