//! Orchestration core for crewforge.
//!
//! This crate wires the pipeline data model, dependency resolver, context
//! store, generator backend, and artifact sink into an explicit state
//! machine over execution records:
//!
//! - [`StageExecutor`] executes one stage with bounded self-refinement,
//!   timeout-guarded backend calls, output validation, and sink handoff.
//! - [`PipelineRunner`] drives the resolved stage order, applies the
//!   failure policy, honors cancellation, and produces the final
//!   [`RunReport`].
//!
//! Only the runner (and the executor it delegates to, for the currently
//! running stage) mutates run-scoped state; no other component holds a
//! mutable reference to it.

mod cancel;
mod compose;
mod extract;
mod record;
mod report;
mod runner;
mod stage_exec;

pub use cancel::CancelToken;
pub use compose::compose_request;
pub use extract::{extract_artifacts, validate_output, ExtractedOutput, ValidatedOutput};
pub use record::{ExecutionRecord, SkipReason, StageStatus};
pub use report::{RunReport, StageReport, Totals};
pub use runner::{PipelineRunner, ProgressEvent, ProgressObserver};
pub use stage_exec::StageExecutor;
