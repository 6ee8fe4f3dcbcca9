//! crewforge - staged generative pipeline orchestrator.
//!
//! crewforge drives a dependency-ordered pipeline of worker stages, each
//! fulfilled by a generative reasoning backend, to synthesize a multi-file
//! software artifact. This crate is the CLI entry point and re-exports the
//! workspace's public surface for embedding:
//!
//! - [`Config`]: TOML pipeline configuration
//! - [`Pipeline`]: validated workers and stages
//! - [`PipelineRunner`] / [`RunReport`]: execution and reporting
//! - [`GeneratorBackend`]: the content generator abstraction
//! - [`ArtifactSink`] / [`FsSink`]: artifact persistence
//!
//! # Example
//!
//! ```rust,no_run
//! use crewforge::{Config, FsSink, PipelineRunner};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("crewforge.toml")?;
//! config.check_credential()?;
//! let pipeline = config.pipeline()?;
//!
//! let backend = crewforge::backend_from_config(&config)?;
//! let sink = FsSink::new(config.run.output_dir.clone());
//!
//! let runner = PipelineRunner::new(
//!     &pipeline,
//!     backend.as_ref(),
//!     &sink,
//!     config.run.failure_policy,
//!     config.generator.model.clone().unwrap_or_default(),
//! );
//! let report = runner.run().await?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

pub mod cli;

pub use crewforge_backend::{
    from_config as backend_from_config, GeneratorBackend, GeneratorInvocation, GeneratorResult,
    Message, RetryPolicy, RetryingBackend, Role,
};
pub use crewforge_config::Config;
pub use crewforge_context::{ContextSnapshot, ContextStore};
pub use crewforge_engine::{
    CancelToken, ExecutionRecord, PipelineRunner, ProgressEvent, RunReport, SkipReason,
    StageExecutor, StageStatus,
};
pub use crewforge_graph::resolve_order;
pub use crewforge_pipeline::{
    Artifact, ArtifactSpec, OutputDescriptor, Pipeline, StageOutput, StageSpec, WorkerSpec,
};
pub use crewforge_sink::{ArtifactSink, FsSink};
pub use crewforge_utils::error::{self, CrewforgeError};
pub use crewforge_utils::types::{FailurePolicy, StageId};
pub use crewforge_utils::ExitCode;
