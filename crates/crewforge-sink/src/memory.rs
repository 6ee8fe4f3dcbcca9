//! In-memory sink for tests.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crewforge_pipeline::Artifact;
use crewforge_utils::error::SinkError;
use crewforge_utils::types::StageId;

use crate::ArtifactSink;

/// Sink that keeps persisted artifacts in memory and can be switched into
/// a failing mode to exercise persistence-error paths.
#[derive(Debug, Default)]
pub struct MemorySink {
    stored: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
    fail: AtomicBool,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `persist` call fail.
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    /// Content of one persisted artifact, if present.
    #[must_use]
    pub fn content(&self, stage: &StageId, path: &str) -> Option<String> {
        self.stored
            .lock()
            .unwrap()
            .get(stage.as_str())
            .and_then(|files| files.get(path))
            .cloned()
    }

    /// Artifact paths persisted for a stage.
    #[must_use]
    pub fn paths_for(&self, stage: &StageId) -> Vec<String> {
        self.stored
            .lock()
            .unwrap()
            .get(stage.as_str())
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Stages that have persisted artifacts.
    #[must_use]
    pub fn stages(&self) -> Vec<String> {
        self.stored.lock().unwrap().keys().cloned().collect()
    }
}

impl ArtifactSink for MemorySink {
    fn persist(&self, stage: &StageId, artifacts: &[Artifact]) -> Result<(), SinkError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SinkError::WriteFailed {
                path: stage.to_string(),
                reason: "memory sink set to failing mode".to_string(),
            });
        }

        let mut stored = self.stored.lock().unwrap();
        let files = stored.entry(stage.to_string()).or_default();
        for artifact in artifacts {
            files.insert(artifact.path.to_string(), artifact.content.clone());
        }
        Ok(())
    }
}
