//! HTTP client for the Bedrock Converse API
//!
//! The labeling call sends the conversation snippet with a single `classify`
//! tool and forces the model to answer with a tool call. The tool input is the
//! structured output handed back to [`super::Classifier`] for validation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};

use crate::config::ClassifierConfig;
use crate::error::{Error, Result};
use crate::types::TaskCategory;

/// Fixed instruction sent as the system prompt
pub const SYSTEM_PROMPT: &str =
    "You are a strict classifier. Select exactly one label. Output only a tool call.";

/// Name of the forced tool
pub const TOOL_NAME: &str = "classify";

const MAX_TOKENS: u32 = 60;
const INITIAL_BACKOFF: Duration = Duration::from_millis(200);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Something that can label a snippet.
///
/// Returns the structured tool input, or `None` when the response carried no
/// tool call. Transport and decoding failures are errors.
#[async_trait]
pub trait LabelingBackend: Send + Sync {
    async fn label(&self, snippet: &str) -> Result<Option<Value>>;
}

/// [`LabelingBackend`] calling Bedrock Converse over HTTPS with a bearer API key.
pub struct ConverseBackend {
    config: ClassifierConfig,
    http_client: reqwest::Client,
    url: String,
}

impl ConverseBackend {
    /// Create a backend from configuration
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: ClassifierConfig) -> Result<Self> {
        config.validate()?;

        let url = format!(
            "{}/model/{}/converse",
            config.endpoint_url(),
            urlencoding::encode(&config.model_id)
        );

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        match config.resolve_api_key() {
            Some(api_key) => {
                let auth_value = format!("Bearer {}", api_key);
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&auth_value)
                        .map_err(|e| Error::Config(format!("invalid api_key: {}", e)))?,
                );
            }
            None => {
                tracing::warn!("No classifier API key configured; requests will be unauthenticated");
            }
        }

        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.read_timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
            url,
        })
    }

    /// Endpoint URL for the configured model
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send one Converse request
    pub async fn converse(&self, snippet: &str) -> Result<Value> {
        let response = self
            .http_client
            .post(&self.url)
            .json(&request_body(snippet))
            .send()
            .await
            .map_err(describe_transport_error)?;

        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| Error::Classifier(format!("failed to parse response: {}", e)))
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(Error::Classifier(format!(
                "API error ({}): {}",
                status.as_u16(),
                error_text
            )))
        }
    }

    /// Send a request with retry logic
    ///
    /// Retries transient failures (5xx, 429, timeouts, connect errors) with
    /// exponential backoff.
    pub async fn converse_with_retry(&self, snippet: &str) -> Result<Value> {
        let mut last_error = None;
        let mut delay = INITIAL_BACKOFF;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::debug!(
                    "Retrying converse (attempt {}/{}), waiting {:?}",
                    attempt + 1,
                    self.config.max_retries + 1,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, MAX_BACKOFF);
            }

            match self.converse(snippet).await {
                Ok(response) => return Ok(response),
                Err(e) if is_retryable_error(&e) => {
                    tracing::warn!("Transient error calling classifier: {}", e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Classifier("max retries exceeded".to_string())))
    }
}

#[async_trait]
impl LabelingBackend for ConverseBackend {
    async fn label(&self, snippet: &str) -> Result<Option<Value>> {
        let response = self.converse_with_retry(snippet).await?;
        Ok(extract_tool_input(&response))
    }
}

/// Request body with the snippet, the forced tool and deterministic sampling.
pub fn request_body(snippet: &str) -> Value {
    json!({
        "messages": [{
            "role": "user",
            "content": [{ "text": format!("Classify this snippet into one label. Snippet:\n{}", snippet) }],
        }],
        "system": [{ "text": SYSTEM_PROMPT }],
        "toolConfig": {
            "tools": [tool_spec()],
            "toolChoice": { "any": {} },
        },
        "inferenceConfig": {
            "temperature": 0.0,
            "maxTokens": MAX_TOKENS,
        },
    })
}

/// Tool whose input schema constrains label, confidence and reason.
fn tool_spec() -> Value {
    let labels: Vec<&str> = TaskCategory::CLASSIFIER_LABELS
        .iter()
        .map(TaskCategory::as_str)
        .collect();

    json!({
        "toolSpec": {
            "name": TOOL_NAME,
            "description": "Classify the conversation snippet into exactly one category",
            "inputSchema": {
                "json": {
                    "type": "object",
                    "properties": {
                        "label": {
                            "type": "string",
                            "description": "The classification label",
                            "enum": labels,
                        },
                        "confidence": {
                            "type": "number",
                            "description": "Confidence score between 0 and 1",
                            "minimum": 0.0,
                            "maximum": 1.0,
                        },
                        "reason": {
                            "type": "string",
                            "description": "Brief reason for classification (max 12 words)",
                            "maxLength": 100,
                        },
                    },
                    "required": ["label", "confidence", "reason"],
                }
            }
        }
    })
}

/// Input of the first `toolUse` block in `output.message.content`.
pub fn extract_tool_input(response: &Value) -> Option<Value> {
    response
        .pointer("/output/message/content")?
        .as_array()?
        .iter()
        .find_map(|block| block.get("toolUse"))
        .map(|tool_use| tool_use.get("input").cloned().unwrap_or_else(|| json!({})))
}

fn describe_transport_error(error: reqwest::Error) -> Error {
    if error.is_timeout() {
        Error::Classifier(format!("request timeout: {}", error))
    } else if error.is_connect() {
        Error::Classifier(format!("connection failed: {}", error))
    } else {
        Error::Classifier(format!("HTTP request failed: {}", error))
    }
}

/// Check if an error is retryable (transient)
fn is_retryable_error(error: &Error) -> bool {
    match error {
        Error::Classifier(msg) => {
            msg.starts_with("API error (5")
                || msg.starts_with("API error (429)")
                || msg.contains("timeout")
                || msg.contains("connection failed")
        }
        _ => false,
    }
}
