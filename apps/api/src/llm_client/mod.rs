/// LLM Client — the single point of entry for all Gemini API calls.
///
/// ARCHITECTURAL RULE: No other module may call the generative-AI API directly.
/// All model interactions MUST go through this module, and every request MUST go
/// through `retry::execute` so transient failures are retried before they surface.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::retry::{self, ClassifiedError, RetryHint};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const API_VERSION: &str = "v1beta";
/// Upper bound for a single attempt; the executor never waits on a hung socket forever.
const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api {
        status: u16,
        message: String,
        details: Vec<RetryHint>,
    },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned empty content")]
    EmptyContent,
}

impl ClassifiedError for LlmError {
    fn status(&self) -> Option<u16> {
        match self {
            LlmError::Api { status, .. } => Some(*status),
            LlmError::Http(e) => e.status().map(|s| s.as_u16()),
            LlmError::Parse(_) | LlmError::EmptyContent => None,
        }
    }

    fn message(&self) -> Option<&str> {
        match self {
            LlmError::Api { message, .. } => Some(message.as_str()),
            _ => None,
        }
    }

    fn retry_hints(&self) -> &[RetryHint] {
        match self {
            LlmError::Api { details, .. } => details.as_slice(),
            _ => &[],
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Request model
// ────────────────────────────────────────────────────────────────────────────

/// One piece of user content: prompt text or an inline base64 document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

/// A single generateContent call. Built with the chained helpers below.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub model: &'static str,
    pub parts: Vec<Part>,
    /// When set, the model is asked for `application/json` matching this schema.
    pub response_schema: Option<Value>,
}

impl GenerateRequest {
    pub fn new(model: &'static str) -> Self {
        Self {
            model,
            parts: Vec::new(),
            response_schema: None,
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.parts.push(Part::Text { text: text.into() });
        self
    }

    pub fn inline_data(mut self, mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        self.parts.push(Part::InlineData {
            inline_data: InlineData {
                mime_type: mime_type.into(),
                data: data.into(),
            },
        });
        self
    }

    pub fn json_schema(mut self, schema: Value) -> Self {
        self.response_schema = Some(schema);
        self
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: [GeminiContent<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: &'a [Part],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'static str,
    response_schema: &'a Value,
}

impl<'a> From<&'a GenerateRequest> for GeminiRequest<'a> {
    fn from(request: &'a GenerateRequest) -> Self {
        GeminiRequest {
            contents: [GeminiContent {
                role: "user",
                parts: &request.parts,
            }],
            generation_config: request
                .response_schema
                .as_ref()
                .map(|schema| GenerationConfig {
                    response_mime_type: "application/json",
                    response_schema: schema,
                }),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Response model
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    pub content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
pub struct ResponsePart {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
}

impl GeminiResponse {
    /// Concatenated text of the first candidate, if it produced any.
    pub fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
        (!text.is_empty()).then_some(text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorEnvelope {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    #[serde(rename = "@type", default)]
    type_tag: String,
    #[serde(rename = "retryDelay")]
    retry_delay: Option<Value>,
}

/// Builds an `LlmError::Api` from a non-success response body.
/// Falls back to the raw body as the message if it is not the usual error envelope.
fn api_error(status: u16, body: String) -> LlmError {
    match serde_json::from_str::<GeminiErrorEnvelope>(&body) {
        Ok(envelope) => LlmError::Api {
            status,
            message: envelope.error.message,
            details: envelope
                .error
                .details
                .into_iter()
                .map(|d| RetryHint::new(d.type_tag, d.retry_delay.as_ref().and_then(Value::as_str)))
                .collect(),
        },
        Err(_) => LlmError::Api {
            status,
            message: body,
            details: vec![],
        },
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

/// The generative model abstraction used by the AI handlers.
///
/// Carried in `AppState` as `Arc<dyn GenerativeModel>` so tests can swap in a fake.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Runs a generateContent call and returns the model's text output.
    async fn generate(&self, request: &GenerateRequest) -> Result<String, LlmError>;

    async fn list_models(&self) -> Result<Vec<ModelInfo>, LlmError>;
}

/// Gemini REST client. Every request is retried through `retry::execute`.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    max_attempts: u32,
}

impl GeminiClient {
    pub fn new(api_key: String, base_url: &str, max_attempts: u32) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_attempts,
        })
    }

    async fn post_once(&self, url: &str, body: &GeminiRequest<'_>) -> Result<GeminiResponse, LlmError> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        read_json(response).await
    }

    async fn get_once<T: DeserializeOwned>(&self, url: &str) -> Result<T, LlmError> {
        let response = self
            .client
            .get(url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;

        read_json(response).await
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, LlmError> {
        let url = format!(
            "{}/{API_VERSION}/models/{}:generateContent",
            self.base_url, request.model
        );
        let url = url.as_str();
        let body = GeminiRequest::from(request);
        let body = &body;

        let response = retry::execute(move || self.post_once(url, body), self.max_attempts).await?;

        if let Some(usage) = &response.usage_metadata {
            debug!(
                "Gemini call succeeded: model={}, prompt_tokens={}, output_tokens={}",
                request.model, usage.prompt_token_count, usage.candidates_token_count
            );
        }

        response.text().ok_or(LlmError::EmptyContent)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, LlmError> {
        let url = format!("{}/{API_VERSION}/models", self.base_url);
        let url = url.as_str();

        let listing: ModelList =
            retry::execute(move || self.get_once(url), self.max_attempts).await?;

        Ok(listing.models)
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, LlmError> {
    let status = response.status();

    if !status.is_success() {
        // Keep the status even if the body cannot be read; it drives retry classification.
        let body = response.text().await.unwrap_or_default();
        return Err(api_error(status.as_u16(), body));
    }

    let body = response.text().await?;
    Ok(serde_json::from_str(&body)?)
}

/// Calls the model and deserializes its text output as JSON.
/// The request should carry a response schema so the model answers in JSON.
pub async fn generate_json<T: DeserializeOwned>(
    model: &dyn GenerativeModel,
    request: &GenerateRequest,
) -> Result<T, LlmError> {
    let text = model.generate(request).await?;
    serde_json::from_str(strip_code_fences(&text)).map_err(LlmError::Parse)
}

/// Strips ```json / ```html / ``` fences the model sometimes wraps output in.
pub fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop an optional language tag on the opening fence line.
    let rest = match rest.find('\n') {
        Some(newline) if rest[..newline].chars().all(|c| c.is_ascii_alphanumeric()) => {
            &rest[newline + 1..]
        }
        _ => rest,
    };
    rest.trim_end()
        .strip_suffix("```")
        .map(str::trim)
        .unwrap_or(rest.trim())
}
