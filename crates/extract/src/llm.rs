use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::retry::{AttemptError, RetryError, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub temperature: f32,
    /// JSON schema the response must follow, if the backend supports it.
    pub schema: Option<serde_json::Value>,
}

/// Chat completion transport.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a serde_json::Value>,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
}

impl OllamaClient {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            base_url,
            model,
            client: reqwest::Client::new(),
        }
    }

    pub fn default() -> Self {
        Self::new(
            "http://localhost:11434".to_string(),
            "llama3".to_string(),
        )
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);

        let body = OllamaChatRequest {
            model: &self.model,
            messages: &request.messages,
            stream: false,
            format: request.schema.as_ref(),
            options: OllamaOptions {
                temperature: request.temperature,
            },
        };

        let response = self.client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        if !response.status().is_success() {
            anyhow::bail!("Ollama request failed: {}", response.status());
        }

        let chat: OllamaChatResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        Ok(chat.message.content)
    }
}

/// Strip a markdown code fence around a JSON payload, if present.
pub fn strip_json_fence(content: &str) -> &str {
    for fence in ["```json", "```"] {
        if let Some(start) = content.find(fence) {
            let rest = &content[start + fence.len()..];
            let inner = match rest.find("```") {
                Some(end) => &rest[..end],
                None => rest,
            };
            return inner.trim();
        }
    }
    content.trim()
}

/// Ask the model for a JSON document of type `T`, retrying under `policy`.
///
/// JSON syntax errors count as malformed responses; well-formed JSON that does
/// not fit `T` is retried like a transport failure.
pub async fn extract_structured<T>(
    llm: &dyn LanguageModel,
    request: &CompletionRequest,
    policy: &RetryPolicy,
    operation_name: &str,
) -> Result<T, RetryError>
where
    T: DeserializeOwned,
{
    policy
        .retry(operation_name, || async {
            let content = llm
                .complete(request)
                .await
                .map_err(AttemptError::Transient)?;

            serde_json::from_str::<T>(strip_json_fence(&content)).map_err(|e| {
                if e.is_syntax() || e.is_eof() {
                    AttemptError::Malformed(e.to_string())
                } else {
                    AttemptError::Transient(anyhow::Error::new(e).context("Response did not match schema"))
                }
            })
        })
        .await
}
