//! Shared primitives for the crewforge workspace.
//!
//! This crate holds the pieces every other crate needs without pulling in
//! pipeline or engine logic: the error taxonomy, the `StageId` identifier,
//! exit-code mapping for the CLI, atomic file writes, and relative-path
//! validation for artifact output.

pub mod atomic_write;
pub mod error;
pub mod exit_codes;
pub mod paths;
pub mod types;

pub use error::CrewforgeError;
pub use exit_codes::ExitCode;
pub use types::{FailurePolicy, StageId};
