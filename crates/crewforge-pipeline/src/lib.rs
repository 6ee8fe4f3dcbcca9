//! Declarative pipeline data model.
//!
//! This crate provides the shared contract between configuration loading
//! and the execution engine. It contains plain immutable data types with
//! no behavior beyond assembly-time validation, so engine logic stays
//! parameterized by data rather than hidden in type hierarchies.
//!
//! - [`WorkerSpec`]: a reusable capability descriptor (role, objective,
//!   narrative, iteration/timeout bounds).
//! - [`StageSpec`]: one unit of pipeline work, mapped to exactly one
//!   worker, with declared dependencies and expected outputs.
//! - [`Pipeline`]: the assembled, validated set of workers and stages.
//! - [`StageOutput`]: the finalized payload a succeeded stage leaves in
//!   the context store.

mod output;
mod pipeline;
mod stage;
mod worker;

pub use output::{Artifact, StageOutput};
pub use pipeline::Pipeline;
pub use stage::{ArtifactSpec, OutputDescriptor, StageSpec};
pub use worker::{OP_READ_FILE, OP_WRITE_FILE, WorkerSpec};
