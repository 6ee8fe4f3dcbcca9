//! Error taxonomy for crewforge.
//!
//! Every concern gets its own `thiserror` enum; `CrewforgeError` is the
//! umbrella type returned at crate boundaries and mapped to exit codes by
//! the CLI. Library code returns `CrewforgeError` (or a concern enum) and
//! never calls `std::process::exit()`.
//!
//! # Error Categories
//!
//! | Category | Description |
//! |----------|-------------|
//! | `Config` | Configuration file, credential, or validation errors |
//! | `Graph` | Dependency graph construction failures |
//! | `Context` | Context store invariant violations |
//! | `Generator` | Content generator (backend) failures |
//! | `Sink` | Artifact persistence failures |
//! | `Stage` | Terminal per-stage execution failures |

use std::time::Duration;
use thiserror::Error;

use crate::exit_codes::ExitCode;
use crate::types::StageId;

/// Umbrella error type for crewforge library operations.
#[derive(Error, Debug)]
pub enum CrewforgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Dependency graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Context store error: {0}")]
    Context(#[from] ContextError),

    #[error("Generator backend error: {0}")]
    Generator(#[from] GeneratorError),

    #[error("Artifact sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Stage execution error: {0}")]
    Stage(#[from] StageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CrewforgeError {
    /// Map this error to a CLI exit code.
    ///
    /// Configuration and graph errors happen before any stage executes and
    /// map to [`ExitCode::CLI_ARGS`]; terminal stage failures map to
    /// [`ExitCode::RUN_FAILED`]; everything else is internal.
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) | Self::Graph(_) => ExitCode::CLI_ARGS,
            Self::Stage(_) => ExitCode::RUN_FAILED,
            Self::Context(_) | Self::Generator(_) | Self::Sink(_) | Self::Io(_) => {
                ExitCode::INTERNAL
            }
        }
    }
}

/// Configuration-related errors.
///
/// All of these are fatal before any stage executes; the run does not
/// start.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },

    #[error("Configuration validation failed: {error_count} error(s): {}", errors.join("; "))]
    ValidationFailed {
        errors: Vec<String>,
        error_count: usize,
    },

    #[error(
        "Backend credential not found in environment variable '{env_var}'. \
         Set the variable or configure a different api_key_env in [generator]."
    )]
    MissingCredential { env_var: String },
}

impl ConfigError {
    /// Build a `ValidationFailed` from collected messages.
    #[must_use]
    pub fn validation(errors: Vec<String>) -> Self {
        let error_count = errors.len();
        Self::ValidationFailed {
            errors,
            error_count,
        }
    }
}

/// Dependency graph construction failures.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum GraphError {
    /// The stage set contains a dependency cycle. `stages` names every
    /// stage on the detected cycle, in cycle order.
    #[error("dependency cycle detected among stages: {}", stages.iter().map(StageId::as_str).collect::<Vec<_>>().join(" -> "))]
    CycleDetected { stages: Vec<StageId> },

    /// A stage references a dependency identity not present in the stage set.
    #[error("stage '{stage}' depends on unknown stage '{dependency}'")]
    UnknownDependency { stage: StageId, dependency: String },
}

/// Context store invariant violations.
///
/// With a correct execution order these never occur; the checks exist as
/// defensive invariants.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ContextError {
    /// A second `record` call for a stage that already has an output.
    #[error("output for stage '{stage}' was already recorded")]
    DuplicateRecord { stage: StageId },

    /// A snapshot requested a dependency that has not succeeded.
    #[error("snapshot for stage '{stage}' requested dependency '{dependency}' which has not succeeded")]
    MissingDependency { stage: StageId, dependency: StageId },
}

/// Content generator (backend) failures.
#[derive(Error, Debug)]
pub enum GeneratorError {
    /// Transport-level failure (HTTP connectivity, malformed response).
    #[error("transport error: {0}")]
    Transport(String),

    /// Provider authentication failure (401, 403, missing API key).
    #[error("provider authentication error: {0}")]
    ProviderAuth(String),

    /// Provider rate limit exceeded (429).
    #[error("provider rate limit exceeded: {0}")]
    ProviderQuota(String),

    /// Provider service outage (5xx errors).
    #[error("provider outage: {0}")]
    ProviderOutage(String),

    /// Invocation exceeded its call timeout.
    #[error("timeout after {duration:?}")]
    Timeout { duration: Duration },

    /// Configuration error (bad credentials config, unknown model).
    #[error("misconfiguration: {0}")]
    Misconfiguration(String),

    /// Unsupported provider or feature.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl GeneratorError {
    /// Whether this failure is transient and eligible for retry with
    /// backoff. Timeouts, rate limits, outages, and transport errors are
    /// transient; auth and configuration problems are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::ProviderQuota(_) | Self::ProviderOutage(_) | Self::Timeout { .. }
        )
    }
}

/// Artifact persistence failures.
#[derive(Error, Debug)]
pub enum SinkError {
    /// Declared artifact path failed sandbox validation.
    #[error("invalid artifact path '{path}': {reason}")]
    InvalidArtifactPath { path: String, reason: String },

    /// An artifact could not be durably written.
    #[error("failed to write artifact '{path}': {reason}")]
    WriteFailed { path: String, reason: String },

    /// The run report could not be written.
    #[error("failed to write run report at '{path}': {reason}")]
    ReportWriteFailed { path: String, reason: String },
}

/// Terminal per-stage execution failures.
///
/// Each variant carries the attempt count at the time of failure so the
/// execution record and the run report can account for it.
#[derive(Error, Debug)]
pub enum StageError {
    /// The backend retry budget was exhausted by transient failures.
    #[error("stage '{stage}' backend unavailable after {attempts} attempt(s): {source}")]
    BackendUnavailable {
        stage: StageId,
        attempts: u32,
        source: GeneratorError,
    },

    /// Every refinement attempt produced output that failed validation.
    #[error("stage '{stage}' output validation failed after {attempts} attempt(s): {}", issues.join("; "))]
    ValidationExhausted {
        stage: StageId,
        attempts: u32,
        issues: Vec<String>,
    },

    /// The computed output could not be durably stored. Not retried: the
    /// content was generated correctly, re-invoking the backend would be
    /// wasted work.
    #[error("stage '{stage}' output could not be persisted: {source}")]
    Persistence { stage: StageId, source: SinkError },

    /// The run was cancelled while this stage was in flight.
    #[error("stage '{stage}' was cancelled after {attempts} attempt(s)")]
    Cancelled { stage: StageId, attempts: u32 },
}

impl StageError {
    /// The stage this failure belongs to.
    #[must_use]
    pub fn stage(&self) -> &StageId {
        match self {
            Self::BackendUnavailable { stage, .. }
            | Self::ValidationExhausted { stage, .. }
            | Self::Persistence { stage, .. }
            | Self::Cancelled { stage, .. } => stage,
        }
    }

    /// Attempts consumed before the failure became terminal.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::BackendUnavailable { attempts, .. }
            | Self::ValidationExhausted { attempts, .. }
            | Self::Cancelled { attempts, .. } => *attempts,
            Self::Persistence { .. } => 0,
        }
    }
}
