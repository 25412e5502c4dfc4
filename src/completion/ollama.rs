//! Ollama chat adapter.

use super::{CompletionClient, CompletionError, CompletionSettings, http_client};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

/// Client for a local Ollama runtime's `/api/chat` endpoint.
pub struct OllamaCompletionClient {
    http: Client,
    base_url: String,
    settings: CompletionSettings,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
    done: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    content: String,
}

impl OllamaCompletionClient {
    /// Create a client targeting `base_url` (for example `http://127.0.0.1:11434`).
    pub fn new(base_url: String, settings: CompletionSettings) -> Result<Self, CompletionError> {
        Ok(Self {
            http: http_client("rusty-digest/ollama")?,
            base_url,
            settings,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl CompletionClient for OllamaCompletionClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError> {
        let payload = json!({
            "model": self.settings.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "stream": false,
            "options": {
                "temperature": self.settings.temperature,
                "num_predict": self.settings.max_output_tokens,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                CompletionError::Unavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(CompletionError::Rejected {
                status: 404,
                message: format!("Ollama endpoint {} returned 404", self.endpoint()),
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::from_status(status, body));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            CompletionError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(CompletionError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn client_for(server: &MockServer) -> OllamaCompletionClient {
        OllamaCompletionClient::new(
            server.base_url(),
            CompletionSettings {
                model: "llama3".into(),
                temperature: 0.2,
                max_output_tokens: 256,
            },
        )
        .expect("client")
    }

    #[tokio::test]
    async fn ollama_client_handles_successful_response() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat").json_body_partial(
                    r#"{ "model": "llama3", "stream": false, "options": { "num_predict": 256 } }"#,
                );
                then.status(200).json_body(json!({
                    "message": { "role": "assistant", "content": "## Topic" },
                    "done": true
                }));
            })
            .await;

        let text = client_for(&server)
            .complete("system", "user")
            .await
            .expect("completion");

        mock.assert_async().await;
        assert_eq!(text, "## Topic");
    }

    #[tokio::test]
    async fn ollama_client_handles_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat");
                then.status(500).body("boom");
            })
            .await;

        let error = client_for(&server)
            .complete("system", "user")
            .await
            .expect_err("error response");

        assert!(matches!(
            error,
            CompletionError::Rejected { status: 500, ref message } if message == "boom"
        ));
        assert!(error.is_transient());
    }

    #[tokio::test]
    async fn ollama_client_rejects_incomplete_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat");
                then.status(200).json_body(json!({
                    "message": { "role": "assistant", "content": "partial" },
                    "done": false
                }));
            })
            .await;

        let error = client_for(&server)
            .complete("system", "user")
            .await
            .expect_err("incomplete");
        assert!(matches!(error, CompletionError::InvalidResponse(_)));
    }
}
