//! Language-model collaborator.
//!
//! Both pipeline stages talk to the model through [`LanguageModel`]: structured prompt in,
//! JSON value out. Schema checks happen in the stages, not here.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::LlmConfig;

/// Inline document handed to the model alongside the prompt text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPart {
    pub label: String,
    pub data_uri: String,
}

/// One structured call: rendered instructions, attached media, and the declared output schema.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptRequest {
    pub name: &'static str,
    pub instructions: String,
    pub media: Vec<MediaPart>,
    pub output_schema: Value,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, request: PromptRequest) -> Result<Value, LlmError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("language model is not configured: {0}")]
    NotConfigured(String),
    #[error("language model request failed: {0}")]
    Transport(String),
    #[error("language model returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("language model reply was empty")]
    EmptyReply,
    #[error("language model reply is not JSON: {0}")]
    NotJson(String),
}

/// Client for an OpenAI-compatible chat-completions endpoint with JSON response mode.
#[derive(Debug, Clone)]
pub struct OpenAiChatModel {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiChatModel {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout + Duration::from_secs(5))
            .build()
            .map_err(|err| LlmError::Transport(err.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f64,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<Content>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Content {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
    File { file: FileData },
}

#[derive(Debug, Serialize)]
struct FileData {
    filename: String,
    file_data: String,
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
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
    content: Option<String>,
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn generate(&self, request: PromptRequest) -> Result<Value, LlmError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::NotConfigured("LLM_API_KEY is not set".to_string()))?;
        let started = Instant::now();

        let schema = serde_json::to_string_pretty(&request.output_schema)
            .map_err(|err| LlmError::Transport(err.to_string()))?;
        let mut content = vec![Content::Text {
            text: format!(
                "{}\n\nRespond with a single JSON object matching this JSON schema:\n{schema}",
                request.instructions
            ),
        }];
        for part in request.media {
            content.push(Content::Text {
                text: format!("{}:", part.label),
            });
            content.push(media_content(part));
        }

        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user",
                content,
            }],
            temperature: 0.0,
            response_format: ResponseFormat {
                r#type: "json_object",
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| LlmError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|err| LlmError::Transport(err.to_string()))?;
        let text = reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(LlmError::EmptyReply)?;

        debug!(
            prompt = request.name,
            latency_ms = started.elapsed().as_millis() as u64,
            "language model replied"
        );

        parse_reply(&text)
    }
}

/// Images go through `image_url`; PDFs and text files are attached as inline files.
fn media_content(part: MediaPart) -> Content {
    if part.data_uri.starts_with("data:image/") {
        Content::ImageUrl {
            image_url: ImageUrl { url: part.data_uri },
        }
    } else {
        Content::File {
            file: FileData {
                filename: part.label.to_ascii_lowercase().replace(' ', "_"),
                file_data: part.data_uri,
            },
        }
    }
}

/// Replies sometimes arrive wrapped in a markdown fence. Anything else must be bare JSON.
pub(crate) fn parse_reply(text: &str) -> Result<Value, LlmError> {
    let json = strip_json_fence(text);
    if json.is_empty() {
        return Err(LlmError::EmptyReply);
    }
    serde_json::from_str(json).map_err(|err| LlmError::NotJson(err.to_string()))
}

fn strip_json_fence(text: &str) -> &str {
    let text = text.trim();

    if text.starts_with("```") && text.ends_with("```") {
        if let Some(start) = text.find('\n') {
            let after_first_line = &text[start + 1..];
            if let Some(end) = after_first_line.rfind("```") {
                return after_first_line[..end].trim();
            }
        }
    }
    text
}
