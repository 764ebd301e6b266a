use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    options: ChatOptions,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

/// Thin client over the LLM bridge's `POST /api/chat`. Each pipeline stage
/// (SE, AR, TD, LD) uses this with its own fixed temperature and system
/// prompt; the client itself is stage-agnostic.
pub struct LlmBridgeClient {
    client: Client,
    base_url: String,
    model: String,
    timeout: std::time::Duration,
}

impl LlmBridgeClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            timeout,
        }
    }

    /// Send a single system+user exchange at the given temperature and
    /// return the raw assistant message content.
    pub async fn chat(&self, system_prompt: &str, user_prompt: &str, temperature: f32) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage { role: "system", content: system_prompt.to_string() },
                ChatMessage { role: "user", content: user_prompt.to_string() },
            ],
            options: ChatOptions { temperature },
            stream: false,
        };

        let t0 = std::time::Instant::now();
        let response = timeout(
            self.timeout,
            self.client
                .post(format!("{}/api/chat", self.base_url))
                .json(&request)
                .send(),
        )
        .await
        .map_err(|_| LlmError::Timeout)
        .and_then(|r| r.map_err(LlmError::Request));
        let elapsed_ms = t0.elapsed().as_millis() as u64;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(method = "POST", path = "/api/chat", elapsed_ms, error = %e, "llm bridge call failed");
                return Err(e);
            }
        };

        if !response.status().is_success() {
            let status = response.status().as_u16();
            tracing::warn!(method = "POST", path = "/api/chat", status, elapsed_ms, "llm bridge call failed");
            return Err(LlmError::BadStatus(status));
        }
        tracing::info!(method = "POST", path = "/api/chat", status = response.status().as_u16(), elapsed_ms, "llm bridge call");

        let parsed: ChatResponse = response.json().await.map_err(LlmError::Request)?;
        Ok(parsed.message.content)
    }
}

#[derive(Debug)]
pub enum LlmError {
    Timeout,
    Request(reqwest::Error),
    BadStatus(u16),
    Malformed(String),
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmError::Timeout => write!(f, "LLM bridge request timed out"),
            LlmError::Request(e) => write!(f, "LLM bridge request error: {e}"),
            LlmError::BadStatus(s) => write!(f, "LLM bridge returned status {s}"),
            LlmError::Malformed(s) => write!(f, "LLM bridge returned malformed output: {s}"),
        }
    }
}

impl std::error::Error for LlmError {}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn chat_returns_assistant_content_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": {"content": "{\"ok\": true}"}
            })))
            .mount(&server)
            .await;

        let client = LlmBridgeClient::new(server.uri(), "llama3", std::time::Duration::from_secs(5));
        let content = client.chat("system", "user", 0.7).await.unwrap();
        assert_eq!(content, "{\"ok\": true}");
    }

    #[tokio::test]
    async fn chat_surfaces_bad_status_as_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = LlmBridgeClient::new(server.uri(), "llama3", std::time::Duration::from_secs(5));
        let err = client.chat("system", "user", 0.7).await.unwrap_err();
        assert!(matches!(err, LlmError::BadStatus(500)));
    }
}
