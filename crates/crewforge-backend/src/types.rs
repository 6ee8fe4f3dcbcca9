//! Core types for the content generator abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crewforge_utils::error::GeneratorError;

/// Role of a message in a generator conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions (worker narrative and objective).
    System,
    /// User input (stage instructions, context, feedback).
    User,
}

/// A single message in a generator conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Input to one generator invocation.
#[derive(Debug, Clone)]
pub struct GeneratorInvocation {
    /// Stage identity, for tracing.
    pub stage: String,
    /// Model for this invocation; empty string uses the backend default.
    pub model: String,
    /// Upper bound on this call.
    pub timeout: Duration,
    /// Ordered conversation messages.
    pub messages: Vec<Message>,
}

impl GeneratorInvocation {
    /// Create a new invocation.
    #[must_use]
    pub fn new(
        stage: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
        messages: Vec<Message>,
    ) -> Self {
        Self {
            stage: stage.into(),
            model: model.into(),
            timeout,
            messages,
        }
    }
}

/// Result of a successful generator invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorResult {
    /// Raw response text.
    pub text: String,
    /// Provider that produced the response.
    pub provider: String,
    /// Model actually used.
    pub model_used: String,
    /// Input tokens consumed, when the provider reports them.
    pub tokens_input: Option<u64>,
    /// Output tokens generated, when the provider reports them.
    pub tokens_output: Option<u64>,
}

impl GeneratorResult {
    /// Create a result with no token accounting.
    #[must_use]
    pub fn new(
        text: impl Into<String>,
        provider: impl Into<String>,
        model_used: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            provider: provider.into(),
            model_used: model_used.into(),
            tokens_input: None,
            tokens_output: None,
        }
    }
}

/// Trait implemented by every content generator backend.
///
/// The engine works against this trait and never learns provider details.
/// Backends are treated as black boxes that return text or fail with a
/// [`GeneratorError`]; transient-failure classification lives on the error
/// type itself.
#[async_trait]
pub trait GeneratorBackend: Send + Sync {
    /// Invoke the generator.
    ///
    /// # Errors
    ///
    /// Returns [`GeneratorError`] on transport failures, provider errors,
    /// timeouts, and misconfiguration.
    async fn invoke(&self, inv: GeneratorInvocation) -> Result<GeneratorResult, GeneratorError>;
}
