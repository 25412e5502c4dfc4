//! OpenAI-compatible chat completions adapter.

use super::{CompletionClient, CompletionError, CompletionSettings, http_client};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Client for any endpoint speaking the `/chat/completions` protocol.
pub struct OpenAiCompletionClient {
    http: Client,
    base_url: String,
    api_key: String,
    settings: CompletionSettings,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: usize,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl OpenAiCompletionClient {
    /// Create a client targeting `base_url` (for example `https://api.openai.com/v1`).
    pub fn new(
        base_url: String,
        api_key: String,
        settings: CompletionSettings,
    ) -> Result<Self, CompletionError> {
        if api_key.trim().is_empty() {
            return Err(CompletionError::Misconfigured(
                "missing OpenAI API key".to_string(),
            ));
        }
        Ok(Self {
            http: http_client("rusty-digest/openai")?,
            base_url,
            api_key,
            settings,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError> {
        let request = ChatRequest {
            model: &self.settings.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_output_tokens,
        };

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|error| {
                CompletionError::Unavailable(format!(
                    "failed to reach {}: {error}",
                    self.base_url
                ))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            CompletionError::Unavailable(format!("failed to read response body: {error}"))
        })?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|api_error| api_error.error.message)
                .unwrap_or(body);
            return Err(CompletionError::from_status(status, message));
        }

        let completion: ChatResponse = serde_json::from_str(&body).map_err(|error| {
            CompletionError::InvalidResponse(format!("failed to decode chat response: {error}"))
        })?;

        let choice = completion.choices.into_iter().next().ok_or_else(|| {
            CompletionError::InvalidResponse("no choices in response".to_string())
        })?;

        Ok(choice.message.content.unwrap_or_default())
    }
}
