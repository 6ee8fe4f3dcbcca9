//! Content generator backends for crewforge.
//!
//! This crate provides a trait-based abstraction over generative
//! reasoning backends. The engine works against [`GeneratorBackend`] and
//! never learns provider details; providers return text or fail with a
//! classified [`GeneratorError`](crewforge_utils::error::GeneratorError).
//!
//! Production builds ship the Anthropic Messages API provider. Every
//! provider is wrapped in [`RetryingBackend`], which enforces the per-call
//! timeout and retries transient failures with exponential backoff under
//! the run-level retry budget.

mod anthropic;
mod http_client;
mod retry;
mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod stub;

pub use anthropic::AnthropicBackend;
pub use retry::{RetryPolicy, RetryingBackend};
pub use types::{GeneratorBackend, GeneratorInvocation, GeneratorResult, Message, Role};

use crewforge_config::Config;
use crewforge_utils::error::GeneratorError;

/// Construct the configured generator backend, wrapped with the run-level
/// retry policy.
///
/// # Errors
///
/// Returns `GeneratorError::Unsupported` for unknown providers and
/// `GeneratorError::Misconfiguration` when provider configuration is
/// invalid (missing credential, missing model).
pub fn from_config(config: &Config) -> Result<Box<dyn GeneratorBackend>, GeneratorError> {
    let policy = RetryPolicy {
        max_retries: config.run.backend_retry_budget,
        base_backoff: config.run.backend_backoff(),
    };

    let inner: Box<dyn GeneratorBackend> = match config.generator.provider.as_str() {
        "anthropic" => Box::new(AnthropicBackend::from_config(config)?),
        #[cfg(feature = "test-utils")]
        "stub" => Box::new(stub::StubBackend::with_script(Vec::new())),
        unknown => {
            return Err(GeneratorError::Unsupported(format!(
                "unknown generator provider '{unknown}'. Supported providers: anthropic."
            )));
        }
    };

    Ok(Box::new(RetryingBackend::new(inner, policy)))
}
