//! Anthropic HTTP backend.
//!
//! Talks to the Anthropic Messages API. System messages are folded into
//! the API's dedicated `system` field; everything else is sent as the
//! conversation body.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crewforge_config::Config;
use crewforge_utils::error::GeneratorError;

use crate::http_client::HttpClient;
use crate::types::{GeneratorBackend, GeneratorInvocation, GeneratorResult, Message, Role};

/// Default Anthropic API endpoint.
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1/messages";

/// Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// HTTP generator backend for Anthropic's Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicBackend {
    client: HttpClient,
    base_url: String,
    api_key: String,
    default_model: String,
    max_tokens: u32,
    temperature: f32,
}

impl AnthropicBackend {
    /// Construct the backend from configuration.
    ///
    /// The API key is read from the environment variable named by
    /// `api_key_env` and never appears in configuration or logs.
    ///
    /// # Errors
    ///
    /// Returns `GeneratorError::Misconfiguration` when the key variable is
    /// unset, no model is configured, or the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, GeneratorError> {
        let api_key_env = &config.generator.api_key_env;
        let api_key = std::env::var(api_key_env).map_err(|_| {
            GeneratorError::Misconfiguration(format!(
                "Anthropic API key not found in environment variable '{api_key_env}'. \
                 Set this variable or configure a different api_key_env in [generator]."
            ))
        })?;

        let default_model = config.generator.model.clone().ok_or_else(|| {
            GeneratorError::Misconfiguration(
                "Anthropic model not specified in configuration. \
                 Set [generator] model = \"model-name\"."
                    .to_string(),
            )
        })?;

        Ok(Self {
            client: HttpClient::new()?,
            base_url: config
                .generator
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            default_model,
            max_tokens: config.generator.max_tokens,
            temperature: config.generator.temperature,
        })
    }

    /// Model for an invocation: the invocation's own model when set,
    /// otherwise the configured default.
    fn resolve_model(&self, inv: &GeneratorInvocation) -> String {
        if inv.model.is_empty() {
            self.default_model.clone()
        } else {
            inv.model.clone()
        }
    }

    /// Split messages into the API's `system` field and conversation body.
    /// Multiple system messages are concatenated.
    fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<ApiMessage>) {
        let mut system: Option<String> = None;
        let mut body = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => {
                    if let Some(existing) = system.as_mut() {
                        existing.push_str("\n\n");
                        existing.push_str(&msg.content);
                    } else {
                        system = Some(msg.content.clone());
                    }
                }
                Role::User => body.push(ApiMessage {
                    role: "user".to_string(),
                    content: msg.content.clone(),
                }),
            }
        }

        (system, body)
    }
}

#[async_trait]
impl GeneratorBackend for AnthropicBackend {
    async fn invoke(&self, inv: GeneratorInvocation) -> Result<GeneratorResult, GeneratorError> {
        let model = self.resolve_model(&inv);

        debug!(
            provider = "anthropic",
            stage = %inv.stage,
            model = %model,
            timeout_secs = inv.timeout.as_secs(),
            "invoking generator"
        );

        let (system, messages) = Self::convert_messages(&inv.messages);

        let request_body = ApiRequest {
            model: model.clone(),
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system,
        };

        let request = reqwest::Client::new()
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body);

        let response = self.client.execute(request, inv.timeout, "anthropic").await?;

        let response_body: ApiResponse = response.json().await.map_err(|e| {
            GeneratorError::Transport(format!("failed to parse Anthropic response: {e}"))
        })?;

        let text: String = response_body
            .content
            .iter()
            .filter(|block| block.content_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();

        if text.is_empty() {
            return Err(GeneratorError::Transport(
                "Anthropic response missing text content".to_string(),
            ));
        }

        let mut result = GeneratorResult::new(text, "anthropic", model);
        if let Some(usage) = response_body.usage {
            result.tokens_input = Some(usage.input_tokens);
            result.tokens_output = Some(usage.output_tokens);
        }

        debug!(
            provider = "anthropic",
            tokens_input = ?result.tokens_input,
            tokens_output = ?result.tokens_output,
            "generator invocation completed"
        );

        Ok(result)
    }
}

/// Message format for requests.
#[derive(Debug, Clone, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

/// Request body.
#[derive(Debug, Clone, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

/// Response body.
#[derive(Debug, Clone, Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

/// Content block in a response.
#[derive(Debug, Clone, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

/// Token usage information.
#[derive(Debug, Clone, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}
