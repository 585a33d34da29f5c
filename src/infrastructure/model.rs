use crate::domain::types::{ChatMessage, MessageRole};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub message: ChatMessage,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("model provider returned invalid response: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    pub fn user_message(&self) -> String {
        match self {
            ModelError::Network(err) => {
                if err.is_connect() {
                    "Could not reach the model provider. Check that it is running and accessible."
                        .to_string()
                } else if err.is_timeout() {
                    "The model provider took too long to respond. Try again shortly.".to_string()
                } else if let Some(status) = err.status() {
                    match status {
                        StatusCode::NOT_FOUND => {
                            "The model endpoint was not found (404). Check the provider base URL."
                                .to_string()
                        }
                        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                            "The model provider rejected the API key.".to_string()
                        }
                        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => {
                            "The model provider is currently unavailable. Try again later."
                                .to_string()
                        }
                        _ => format!(
                            "The model request failed with status {}. Try again later.",
                            status.as_u16()
                        ),
                    }
                } else {
                    "A network error occurred while contacting the model provider.".to_string()
                }
            }
            ModelError::InvalidResponse(_) => {
                "The model provider returned a response that could not be processed.".to_string()
            }
        }
    }
}

/// Chat-completion boundary: ordered messages in, raw completion text out.
/// No particular wire protocol is assumed beyond that.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn chat(&self, request: ModelRequest) -> Result<ModelResponse, ModelError>;
}

fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

fn join_endpoint(base_url: &str, path: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{trimmed}/{path}")
}

#[derive(Clone)]
pub struct OllamaClient {
    http: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self::with_client(base_url, build_client(timeout))
    }

    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            http: client,
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        join_endpoint(&self.base_url, path)
    }
}

#[async_trait]
impl ModelProvider for OllamaClient {
    async fn chat(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let url = self.endpoint("/api/chat");
        let payload = OllamaChatRequest::from(&request);
        info!(
            model = request.model.as_str(),
            url = %url,
            messages = request.messages.len(),
            "Sending request to model provider"
        );
        let response: OllamaChatResponse = self
            .http
            .post(url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!("Received response from model provider");

        let message = response
            .message
            .ok_or_else(|| ModelError::InvalidResponse("missing message field".into()))?;

        let role = MessageRole::from_str(message.role.as_str())
            .ok_or_else(|| ModelError::InvalidResponse("unknown role in response".into()))?;

        Ok(ModelResponse {
            message: ChatMessage::new(role, message.content),
        })
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f64,
}

impl From<&ModelRequest> for OllamaChatRequest {
    fn from(value: &ModelRequest) -> Self {
        Self {
            model: value.model.clone(),
            messages: value.messages.iter().map(WireMessage::from).collect(),
            stream: false,
            options: value
                .temperature
                .map(|temperature| OllamaOptions { temperature }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

impl From<&ChatMessage> for WireMessage {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role.as_str().to_string(),
            content: message.content.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: Option<WireMessage>,
}

/// Client for OpenAI-compatible chat completion endpoints (OpenRouter,
/// OpenAI, Groq, ...). Bearer auth is optional for keyless gateways.
#[derive(Clone)]
pub struct OpenAiCompatClient {
    http: Client,
    base_url: String,
    api_path: String,
    api_key: Option<String>,
}

impl OpenAiCompatClient {
    pub fn new(
        base_url: impl Into<String>,
        api_path: Option<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self::with_client(base_url, api_path, api_key, build_client(timeout))
    }

    pub fn with_client(
        base_url: impl Into<String>,
        api_path: Option<String>,
        api_key: Option<String>,
        client: Client,
    ) -> Self {
        Self {
            http: client,
            base_url: base_url.into(),
            api_path: api_path.unwrap_or_else(|| "/v1/chat/completions".to_string()),
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        join_endpoint(&self.base_url, &self.api_path)
    }
}

#[async_trait]
impl ModelProvider for OpenAiCompatClient {
    async fn chat(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let url = self.endpoint();
        let payload = OpenAiChatRequest::from(&request);
        info!(
            model = request.model.as_str(),
            url = %url,
            messages = request.messages.len(),
            "Sending request to model provider"
        );

        let mut builder = self.http.post(url).json(&payload);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response: OpenAiChatResponse = builder
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!("Received response from model provider");

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .map(|message| message.content)
            .ok_or_else(|| ModelError::InvalidResponse("empty choices in response".into()))?;

        Ok(ModelResponse {
            message: ChatMessage::new(MessageRole::Assistant, content),
        })
    }
}

#[derive(Debug, Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

impl From<&ModelRequest> for OpenAiChatRequest {
    fn from(value: &ModelRequest) -> Self {
        Self {
            model: value.model.clone(),
            messages: value.messages.iter().map(WireMessage::from).collect(),
            stream: false,
            temperature: value.temperature,
            max_tokens: value.max_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: Option<WireMessage>,
}

/// Provider selected from configuration at startup.
#[derive(Clone)]
pub enum AnyProvider {
    Ollama(OllamaClient),
    OpenAi(OpenAiCompatClient),
}

#[async_trait]
impl ModelProvider for AnyProvider {
    async fn chat(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        match self {
            AnyProvider::Ollama(client) => client.chat(request).await,
            AnyProvider::OpenAi(client) => client.chat(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_paths_correctly() {
        let client = OllamaClient::new("http://localhost:11434/", Duration::from_secs(1));
        assert_eq!(
            client.endpoint("/api/chat"),
            "http://localhost:11434/api/chat"
        );

        let openai = OpenAiCompatClient::new(
            "https://openrouter.ai/api/",
            None,
            None,
            Duration::from_secs(1),
        );
        assert_eq!(
            openai.endpoint(),
            "https://openrouter.ai/api/v1/chat/completions"
        );
    }

    #[test]
    fn request_conversion_preserves_roles() {
        let request = ModelRequest {
            model: "gemma3:4b".into(),
            messages: vec![
                ChatMessage::new(MessageRole::System, "stay concise"),
                ChatMessage::new(MessageRole::User, "hi"),
                ChatMessage::new(MessageRole::Tool, "TOOL_RESULT add_numbers: 3"),
            ],
            temperature: None,
            max_tokens: None,
        };
        let payload = OllamaChatRequest::from(&request);
        let roles: Vec<_> = payload.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "tool"]);
        assert!(payload.options.is_none());
    }

    #[test]
    fn temperature_is_forwarded_when_set() {
        let request = ModelRequest {
            model: "llama3".into(),
            messages: vec![ChatMessage::new(MessageRole::User, "hi")],
            temperature: Some(0.3),
            max_tokens: Some(512),
        };

        let ollama = OllamaChatRequest::from(&request);
        assert_eq!(ollama.options.as_ref().map(|o| o.temperature), Some(0.3));

        let openai = OpenAiChatRequest::from(&request);
        assert_eq!(openai.temperature, Some(0.3));
        assert_eq!(openai.max_tokens, Some(512));

        let encoded = serde_json::to_value(&openai).expect("serializes");
        assert_eq!(encoded["temperature"], 0.3);
        assert_eq!(encoded["stream"], false);
    }
}
