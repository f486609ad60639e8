//! Summary provider port and the live HTTP implementation.
//!
//! Errors are classified at this boundary: `permanent` (HTTP 4xx except
//! 429), `transient` (429, 5xx), `timeout`, `configuration` (missing api key
//! env var). The retry schedule in `crate::retry` keys off the
//! classification and retries only transient/timeout.

use async_trait::async_trait;
use explainmd_core::config::ModelProviderConfig;
use explainmd_core::summarize::ProviderErrorCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// One chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Request against the summarizer port.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub temperature: f64,
    pub max_output_tokens: u32,
}

/// Finish reasons we distinguish; everything else is carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    Stop,
    Length,
    Other(String),
}

impl FinishReason {
    pub fn parse(s: &str) -> Self {
        match s {
            "stop" => Self::Stop,
            "length" => Self::Length,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Response from the summarizer port.
#[derive(Debug, Clone)]
pub struct GenerateResponse {
    pub text: String,
    pub model: String,
    pub finish_reason: FinishReason,
    pub raw: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("permanent provider error (status {status}): {message}")]
    Permanent { status: u16, message: String },

    #[error("transient provider error (status {status}): {message}")]
    Transient { status: u16, message: String },

    #[error("provider request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("provider configuration error: {0}")]
    Configuration(String),

    #[error("provider response malformed: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    pub fn code(&self) -> ProviderErrorCode {
        match self {
            Self::Permanent { .. } | Self::MalformedResponse(_) => ProviderErrorCode::Permanent,
            Self::Transient { .. } => ProviderErrorCode::Transient,
            Self::Timeout { .. } => ProviderErrorCode::Timeout,
            Self::Configuration(_) => ProviderErrorCode::Configuration,
        }
    }

    /// Classify an HTTP status into the error taxonomy.
    pub fn from_status(status: u16, message: String) -> Self {
        if status == 429 || status >= 500 {
            Self::Transient { status, message }
        } else {
            Self::Permanent { status, message }
        }
    }
}

/// Abstract request/response summarizer port.
#[async_trait]
pub trait SummaryProvider: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, ProviderError>;
}

// ---------------------------------------------------------------------------
// Live HTTP provider (OpenAI-style chat completions)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    model: Option<String>,
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

pub struct HttpSummaryProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout_ms: u64,
}

impl HttpSummaryProvider {
    /// Build from provider config; the api key is read from the configured
    /// env var and its absence is a `configuration` error.
    pub fn from_env(cfg: &ModelProviderConfig) -> Result<Self, ProviderError> {
        let api_key = std::env::var(&cfg.api_key_env_var).map_err(|_| {
            ProviderError::Configuration(format!(
                "api key env var {} is not set",
                cfg.api_key_env_var
            ))
        })?;
        Ok(Self::new(&cfg.endpoint, api_key, cfg.timeout_ms))
    }

    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            timeout_ms,
        }
    }

    async fn send(
        &self,
        request: &GenerateRequest,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let body = ChatCompletionBody {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_output_tokens,
            stream,
        };
        debug!(model = %request.model, stream, "summary provider request");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify_transport(e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "summary provider error response");
            return Err(ProviderError::from_status(status.as_u16(), message));
        }
        Ok(response)
    }

    fn classify_transport(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout {
                timeout_ms: self.timeout_ms,
            }
        } else {
            // Connection-level failures are worth retrying.
            ProviderError::Transient {
                status: 0,
                message: err.to_string(),
            }
        }
    }

    /// Streaming variant: accumulate SSE deltas into the final text.
    pub async fn generate_streaming(
        &self,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, ProviderError> {
        let response = self.send(request, true).await?;
        let text = crate::stream::collect_streamed_text(response).await?;
        Ok(GenerateResponse {
            text,
            model: request.model.clone(),
            finish_reason: FinishReason::Stop,
            raw: serde_json::Value::Null,
        })
    }
}

#[async_trait]
impl SummaryProvider for HttpSummaryProvider {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        let response = self.send(request, false).await?;
        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        let parsed: ChatCompletionResponse = serde_json::from_value(raw.clone())
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedResponse("response has no choices".into()))?;
        Ok(GenerateResponse {
            text: choice.message.content.unwrap_or_default(),
            model: parsed.model.unwrap_or_else(|| request.model.clone()),
            finish_reason: choice
                .finish_reason
                .as_deref()
                .map(FinishReason::parse)
                .unwrap_or(FinishReason::Stop),
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(matches!(
            ProviderError::from_status(401, String::new()),
            ProviderError::Permanent { .. }
        ));
        assert!(matches!(
            ProviderError::from_status(429, String::new()),
            ProviderError::Transient { .. }
        ));
        assert!(matches!(
            ProviderError::from_status(503, String::new()),
            ProviderError::Transient { .. }
        ));
        assert_eq!(
            ProviderError::from_status(400, String::new()).code(),
            ProviderErrorCode::Permanent
        );
    }

    #[test]
    fn finish_reason_parse() {
        assert_eq!(FinishReason::parse("stop"), FinishReason::Stop);
        assert_eq!(FinishReason::parse("length"), FinishReason::Length);
        assert_eq!(
            FinishReason::parse("content_filter"),
            FinishReason::Other("content_filter".to_string())
        );
    }

    #[test]
    fn missing_api_key_is_configuration_error() {
        let mut cfg = ModelProviderConfig::default();
        cfg.api_key_env_var = "EXPLAIN_MD_TEST_KEY_THAT_DOES_NOT_EXIST".to_string();
        let err = HttpSummaryProvider::from_env(&cfg).err().unwrap();
        assert_eq!(err.code(), ProviderErrorCode::Configuration);
    }
}
