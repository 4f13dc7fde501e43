//! Provider client - OpenAI-compatible chat completions
//!
//! Performs exactly one HTTP exchange per call and classifies every failure
//! into a [`FailureKind`]. Retrying, caching and tracing live in the gateway.

use async_trait::async_trait;
use llm_leaderboard_domain::{
    FailureKind, GenerationFailure, GenerationRequest, ResponseFormat, TokenUsage,
};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::{Error, Result};

/// Raw provider output of a single successful call
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    pub text: String,
    pub usage: TokenUsage,
}

/// Anything that can turn a request into text with one provider call.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<ProviderResponse, GenerationFailure>;
}

/// Provider connection settings
#[derive(Debug, Clone)]
pub struct ProviderClientConfig {
    /// API root, e.g. `https://openrouter.ai/api/v1`
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub user_agent: String,
}

impl ProviderClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_secs(120),
            user_agent: format!("llm-leaderboard/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Client for `POST {base_url}/chat/completions`
#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    endpoint: String,
}

impl OpenAiCompatibleClient {
    pub fn new(config: ProviderClientConfig) -> Result<Self> {
        let base = url::Url::parse(&config.base_url)
            .map_err(|e| Error::Configuration(format!("invalid provider base URL: {}", e)))?;
        let endpoint = format!("{}/chat/completions", base.as_str().trim_end_matches('/'));

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .unwrap_or_else(|_| HeaderValue::from_static("llm-leaderboard")),
        );

        if let Some(key) = &config.api_key {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", key))
                    .map_err(|_| Error::Configuration("Invalid API key header".to_string()))?,
            );
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl std::fmt::Debug for OpenAiCompatibleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleClient")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatibleClient {
    #[instrument(skip(self, request), fields(slug = %request.slug))]
    async fn complete(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<ProviderResponse, GenerationFailure> {
        let body = ChatRequest::from_request(request);

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(classify_transport_error)?;

        if !(200..300).contains(&status) {
            debug!(status, "Provider returned error status");
            return Err(GenerationFailure::new(
                classify_status(status, &text),
                truncate(&text, 500),
            ));
        }

        parse_chat_response(&text)
    }
}

/// Classify a non-success HTTP status.
///
/// A body mentioning `content_filter` wins over the status code.
pub fn classify_status(status: u16, body: &str) -> FailureKind {
    if body.contains("content_filter") {
        return FailureKind::ContentPolicy;
    }
    match status {
        401 | 403 => FailureKind::InvalidCredential,
        408 => FailureKind::Timeout,
        429 => FailureKind::RateLimited,
        500..=599 => FailureKind::ServerError(status),
        _ => FailureKind::BadRequest(status),
    }
}

fn classify_transport_error(err: reqwest::Error) -> GenerationFailure {
    let kind = if err.is_timeout() {
        FailureKind::Timeout
    } else if err.is_decode() || err.is_body() {
        FailureKind::MalformedResponse
    } else {
        FailureKind::Network
    };
    GenerationFailure::new(kind, err.to_string())
}

/// Parse a 2xx chat completion body
pub fn parse_chat_response(body: &str) -> std::result::Result<ProviderResponse, GenerationFailure> {
    let parsed: ChatResponse = serde_json::from_str(body).map_err(|e| {
        GenerationFailure::new(
            FailureKind::MalformedResponse,
            format!("unparseable response body: {}", e),
        )
    })?;

    // Some gateways report upstream errors inside a 200 body
    if let Some(error) = parsed.error {
        let kind = match (error.code_str(), error.code_status()) {
            (Some("content_filter"), _) => FailureKind::ContentPolicy,
            (_, Some(status)) => classify_status(status, ""),
            _ => FailureKind::ServerError(502),
        };
        return Err(GenerationFailure::new(kind, error.message));
    }

    let choice = parsed.choices.into_iter().next().ok_or_else(|| {
        GenerationFailure::new(FailureKind::MalformedResponse, "response contained no choices")
    })?;

    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Err(GenerationFailure::new(
            FailureKind::ContentPolicy,
            "generation stopped by content filter",
        ));
    }

    let text = choice
        .message
        .and_then(|m| m.content)
        .ok_or_else(|| GenerationFailure::new(FailureKind::MalformedResponse, "choice had no content"))?;

    let usage = parsed
        .usage
        .map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
            total_tokens: u.total_tokens.unwrap_or(u.prompt_tokens + u.completion_tokens),
        })
        .unwrap_or_default();

    Ok(ProviderResponse { text, usage })
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> ChatRequest<'a> {
    fn from_request(request: &'a GenerationRequest) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let response_format = request.response_format.as_ref().map(|format| match format {
            ResponseFormat::JsonSchema { name, schema } => serde_json::json!({
                "type": "json_schema",
                "json_schema": { "name": name, "strict": true, "schema": schema },
            }),
        });

        Self {
            model: &request.slug,
            messages,
            temperature: request.parameters.temperature,
            top_p: request.parameters.top_p,
            max_tokens: request.parameters.max_tokens,
            seed: request.parameters.seed,
            response_format,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
    #[serde(default)]
    error: Option<ChatError>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChatChoiceMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ChatError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl ChatError {
    fn code_str(&self) -> Option<&str> {
        self.code.as_ref().and_then(|c| c.as_str())
    }

    fn code_status(&self) -> Option<u16> {
        self.code
            .as_ref()
            .and_then(|c| c.as_u64())
            .and_then(|c| u16::try_from(c).ok())
    }
}
