//! Anthropic messages API client used by the content generation features.

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, StatusCode};
use schemars::JsonSchema;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::{error, warn};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone, Error)]
pub enum ClaudeApiError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("rate limited")]
    RateLimited,
    #[error("invalid api key")]
    InvalidApiKey,
    #[error("unusable model output: {0}")]
    InvalidOutput(String),
}

impl ClaudeApiError {
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout | Self::RateLimited => true,
            Self::Http { status, .. } => (500..=599).contains(status) || *status == 529,
            _ => false,
        }
    }
}

/// Text completion backend. Implemented by [`ClaudeApiClient`]; tests swap in canned responses.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete_text(
        &self,
        prompt: &str,
        system: Option<&str>,
        max_tokens: u32,
    ) -> Result<String, ClaudeApiError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

impl MessagesResponse {
    fn text(&self) -> Option<&str> {
        self.content.iter().find_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            ContentBlock::Other => None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ClaudeApiClient {
    http: Client,
    api_key: SecretString,
    model: String,
}

impl ClaudeApiClient {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

    pub fn new(api_key: SecretString, model: Option<String>) -> Result<Self, ClaudeApiError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("vibefunder/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClaudeApiError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    async fn send(&self, request: &MessagesRequest<'_>) -> Result<MessagesResponse, ClaudeApiError> {
        let res = self
            .http
            .post(MESSAGES_URL)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match res.status() {
            s if s.is_success() => res
                .json::<MessagesResponse>()
                .await
                .map_err(|e| ClaudeApiError::InvalidOutput(e.to_string())),
            StatusCode::UNAUTHORIZED => Err(ClaudeApiError::InvalidApiKey),
            StatusCode::TOO_MANY_REQUESTS => Err(ClaudeApiError::RateLimited),
            s => {
                let status = s.as_u16();
                let body = res.text().await.unwrap_or_default();
                Err(ClaudeApiError::Http { status, body })
            }
        }
    }
}

#[async_trait]
impl CompletionModel for ClaudeApiClient {
    async fn complete_text(
        &self,
        prompt: &str,
        system: Option<&str>,
        max_tokens: u32,
    ) -> Result<String, ClaudeApiError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens,
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            system,
        };

        let response = (|| async { self.send(&request).await })
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_secs(1))
                    .with_max_delay(Duration::from_secs(30))
                    .with_max_times(3)
                    .with_jitter(),
            )
            .when(|e: &ClaudeApiError| e.should_retry())
            .notify(|e, dur| {
                warn!(
                    "Claude API call failed, retrying after {:.2}s: {}",
                    dur.as_secs_f64(),
                    e
                )
            })
            .await?;

        if response.stop_reason.as_deref() == Some("max_tokens") {
            warn!(max_tokens, "Claude response was truncated");
        }

        response
            .text()
            .map(str::to_string)
            .ok_or_else(|| ClaudeApiError::InvalidOutput("no text content in response".to_string()))
    }
}

/// Ask for a JSON value of type `T`. The prompt carries `T`'s JSON Schema and
/// the reply is parsed against it.
pub async fn ask_structured<T>(
    model: &dyn CompletionModel,
    prompt: &str,
    system: Option<&str>,
    max_tokens: u32,
) -> Result<T, ClaudeApiError>
where
    T: JsonSchema + DeserializeOwned,
{
    let schema = serde_json::to_string_pretty(&schemars::schema_for!(T))
        .map_err(|e| ClaudeApiError::InvalidOutput(e.to_string()))?;
    let prompt = format!(
        "{prompt}\n\nRespond with a single JSON object that validates against this JSON Schema. \
         Do not include any prose outside the JSON.\n\n```json\n{schema}\n```"
    );

    let response = model.complete_text(&prompt, system, max_tokens).await?;
    parse_json_response(&response)
}

pub fn parse_json_response<T: DeserializeOwned>(response: &str) -> Result<T, ClaudeApiError> {
    let json_str = extract_json(response);
    if json_str.is_empty() {
        error!("Claude returned an empty response");
        return Err(ClaudeApiError::InvalidOutput("empty response".to_string()));
    }

    serde_json::from_str(json_str).map_err(|e| {
        let preview: String = json_str.chars().take(500).collect();
        error!(
            json_error = %e,
            response_length = response.len(),
            preview = %preview,
            "Failed to parse JSON response from Claude"
        );
        ClaudeApiError::InvalidOutput(e.to_string())
    })
}

fn map_reqwest_error(e: reqwest::Error) -> ClaudeApiError {
    if e.is_timeout() {
        ClaudeApiError::Timeout
    } else {
        ClaudeApiError::Transport(e.to_string())
    }
}

/// Strip a surrounding markdown code fence, if any.
fn extract_json(text: &str) -> &str {
    let text = text.trim();

    if let Some(start) = text.find("```json") {
        let body = start + "```json".len();
        if let Some(end) = text[body..].find("```") {
            return text[body..body + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let fence = start + 3;
        // Skip a language tag on the fence line
        let body = text[fence..]
            .find('\n')
            .map(|i| fence + i + 1)
            .unwrap_or(fence);
        if let Some(end) = text[body..].find("```") {
            return text[body..body + end].trim();
        }
    }

    // Prose around a bare object
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            return &text[start..=end];
        }
    }

    text
}
