//! Artifact persistence.
//!
//! The [`ArtifactSink`] trait is the engine's only way to make stage
//! output durable. [`FsSink`] writes each stage's declared outputs under
//! a deterministic path derived from stage identity,
//! `<root>/<stage_id>/<artifact path>`, using atomic writes, with every
//! path re-validated against the sandbox rules before any IO. The run
//! report is the only other file the orchestrator owns; it is written once
//! at run completion, next to the stage directories.

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crewforge_pipeline::Artifact;
use crewforge_utils::atomic_write::write_file_atomic;
use crewforge_utils::error::SinkError;
use crewforge_utils::paths::validate_artifact_path;
use crewforge_utils::types::StageId;

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

/// Persists a stage's produced artifacts to durable storage.
pub trait ArtifactSink: Send + Sync {
    /// Persist `artifacts` for `stage`. Called exactly once per succeeded
    /// stage attempt, after validation and before the stage is recorded
    /// as succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when any artifact cannot be durably stored;
    /// the engine treats that as terminal for the stage.
    fn persist(&self, stage: &StageId, artifacts: &[Artifact]) -> Result<(), SinkError>;
}

/// Filesystem sink rooted at the run's output directory.
#[derive(Debug, Clone)]
pub struct FsSink {
    root: Utf8PathBuf,
}

impl FsSink {
    /// File name of the run report within the output root.
    pub const REPORT_FILE: &'static str = "run-report.json";

    /// Create a sink rooted at `root`. The directory is created lazily on
    /// first write.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The output root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Deterministic directory for one stage's outputs.
    #[must_use]
    pub fn stage_dir(&self, stage: &StageId) -> Utf8PathBuf {
        self.root.join(stage.as_str())
    }

    /// Write the serialized run report to `<root>/run-report.json`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::ReportWriteFailed`] when the write fails.
    pub fn write_report(&self, json: &str) -> Result<Utf8PathBuf, SinkError> {
        let path = self.root.join(Self::REPORT_FILE);
        write_file_atomic(&path, json).map_err(|reason| SinkError::ReportWriteFailed {
            path: path.to_string(),
            reason,
        })?;
        Ok(path)
    }
}

impl ArtifactSink for FsSink {
    fn persist(&self, stage: &StageId, artifacts: &[Artifact]) -> Result<(), SinkError> {
        let stage_dir = self.stage_dir(stage);

        for artifact in artifacts {
            // Paths were validated at configuration load; re-validate here
            // so the sink upholds its own sandbox regardless of caller.
            let relative = validate_artifact_path(artifact.path.as_str()).map_err(|reason| {
                SinkError::InvalidArtifactPath {
                    path: artifact.path.to_string(),
                    reason,
                }
            })?;

            let target = stage_dir.join(relative);
            write_file_atomic(&target, &artifact.content).map_err(|reason| {
                SinkError::WriteFailed {
                    path: target.to_string(),
                    reason,
                }
            })?;

            debug!(stage = %stage, path = %target, bytes = artifact.content.len(), "persisted artifact");
        }

        Ok(())
    }
}
