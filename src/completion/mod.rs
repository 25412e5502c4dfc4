//! Chat completion clients.
//!
//! The pipeline only needs one capability from a language model: send a system and a user
//! message, get generated text back. [`CompletionClient`] captures that; the OpenAI-compatible
//! and Ollama adapters issue HTTP requests directly, and [`RetryingClient`] layers bounded
//! exponential backoff over either one.

mod ollama;
mod openai;
mod retry;

use crate::config::{CompletionProvider, Config};
use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

pub use ollama::OllamaCompletionClient;
pub use openai::OpenAiCompletionClient;
pub use retry::{RetryPolicy, RetryingClient};

/// Errors surfaced while requesting a completion.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Provider could not be reached.
    #[error("Completion provider unavailable: {0}")]
    Unavailable(String),
    /// Provider throttled the request.
    #[error("Completion provider rate limited the request: {0}")]
    RateLimited(String),
    /// Provider answered with a non-success status.
    #[error("Completion request rejected ({status}): {message}")]
    Rejected {
        /// HTTP status code returned by the provider.
        status: u16,
        /// Error body or message returned by the provider.
        message: String,
    },
    /// Provider response could not be parsed.
    #[error("Malformed completion response: {0}")]
    InvalidResponse(String),
    /// Client could not be constructed from configuration.
    #[error("Completion client misconfigured: {0}")]
    Misconfigured(String),
}

impl CompletionError {
    /// Whether repeating the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::RateLimited(_) => true,
            Self::Rejected { status, .. } => *status >= 500,
            Self::InvalidResponse(_) | Self::Misconfigured(_) => false,
        }
    }

    pub(crate) fn from_status(status: StatusCode, message: String) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS {
            Self::RateLimited(message)
        } else {
            Self::Rejected {
                status: status.as_u16(),
                message,
            }
        }
    }
}

/// Fixed sampling parameters applied to every call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionSettings {
    /// Model identifier understood by the provider.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens the model may generate.
    pub max_output_tokens: usize,
}

impl CompletionSettings {
    /// Settings for the configured model.
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.completion_model.clone(),
            temperature: config.completion_temperature,
            max_output_tokens: config.completion_max_tokens,
        }
    }
}

/// Interface implemented by chat completion providers.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Generate a reply to `user` under the instructions in `system`.
    async fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError>;
}

/// Build the configured provider wrapped in the configured retry policy.
pub fn build_completion_client(
    config: &Config,
) -> Result<Box<dyn CompletionClient + Send + Sync>, CompletionError> {
    let settings = CompletionSettings::from_config(config);
    let policy = RetryPolicy::new(config.retry_max_attempts, config.retry_base_delay());
    match config.completion_provider {
        CompletionProvider::OpenAI => {
            let api_key = config.openai_api_key.clone().ok_or_else(|| {
                CompletionError::Misconfigured("OPENAI_API_KEY is not set".to_string())
            })?;
            let client =
                OpenAiCompletionClient::new(config.completion_base_url.clone(), api_key, settings)?;
            Ok(Box::new(RetryingClient::new(client, policy)))
        }
        CompletionProvider::Ollama => {
            let client =
                OllamaCompletionClient::new(config.completion_base_url.clone(), settings)?;
            Ok(Box::new(RetryingClient::new(client, policy)))
        }
    }
}

pub(crate) fn http_client(user_agent: &str) -> Result<reqwest::Client, CompletionError> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .build()
        .map_err(|error| {
            CompletionError::Misconfigured(format!("failed to construct HTTP client: {error}"))
        })
}
