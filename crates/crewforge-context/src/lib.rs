//! Write-once store for completed stage outputs.
//!
//! The [`ContextStore`] maps stage identity to that stage's finalized
//! output payload. Entries are set exactly once, when a stage succeeds,
//! and never mutated afterward. Downstream stages see only the subset of
//! entries corresponding to their declared dependencies, handed to them as
//! an immutable [`ContextSnapshot`]. There is no implicit global
//! visibility, which keeps the data flow between stages auditable and
//! testable in isolation.

use std::collections::HashMap;
use std::sync::Arc;

use crewforge_pipeline::StageOutput;
use crewforge_utils::error::ContextError;
use crewforge_utils::types::StageId;

/// Run-scoped store of finalized stage outputs.
#[derive(Debug, Default)]
pub struct ContextStore {
    outputs: HashMap<StageId, Arc<StageOutput>>,
}

impl ContextStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a stage's finalized output. Write-once: a second call for
    /// the same stage fails.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::DuplicateRecord`] when an output for
    /// `stage` was already recorded.
    pub fn record(&mut self, stage: &StageId, output: StageOutput) -> Result<(), ContextError> {
        if self.outputs.contains_key(stage) {
            return Err(ContextError::DuplicateRecord {
                stage: stage.clone(),
            });
        }
        self.outputs.insert(stage.clone(), Arc::new(output));
        Ok(())
    }

    /// Whether a stage has a recorded output.
    #[must_use]
    pub fn contains(&self, stage: &StageId) -> bool {
        self.outputs.contains_key(stage)
    }

    /// Build the read-only snapshot a stage receives: exactly the entries
    /// for `deps`, in the given (declared) order.
    ///
    /// With a correct execution order every requested dependency has
    /// already succeeded; the missing-dependency check is a defensive
    /// invariant, not a normal-path error.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::MissingDependency`] when any requested
    /// dependency has no recorded output.
    pub fn snapshot_for(
        &self,
        stage: &StageId,
        deps: &[StageId],
    ) -> Result<ContextSnapshot, ContextError> {
        let mut entries = Vec::with_capacity(deps.len());
        for dep in deps {
            let Some(output) = self.outputs.get(dep) else {
                return Err(ContextError::MissingDependency {
                    stage: stage.clone(),
                    dependency: dep.clone(),
                });
            };
            entries.push((dep.clone(), Arc::clone(output)));
        }
        Ok(ContextSnapshot { entries })
    }
}

/// Immutable view of upstream outputs visible to one stage.
///
/// Entries keep the stage's declared dependency order so that rendering
/// the snapshot into a request is deterministic: identical inputs always
/// produce identical requests.
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    entries: Vec<(StageId, Arc<StageOutput>)>,
}

impl ContextSnapshot {
    /// An empty snapshot, for stages without dependencies.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Iterate entries in declared dependency order.
    pub fn iter(&self) -> impl Iterator<Item = (&StageId, &StageOutput)> {
        self.entries.iter().map(|(id, out)| (id, out.as_ref()))
    }

    /// Look up one dependency's output.
    #[must_use]
    pub fn get(&self, stage: &StageId) -> Option<&StageOutput> {
        self.entries
            .iter()
            .find(|(id, _)| id == stage)
            .map(|(_, out)| out.as_ref())
    }

    /// Number of entries in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crewforge_pipeline::Artifact;
    use camino::Utf8PathBuf;

    fn id(raw: &str) -> StageId {
        StageId::new(raw).unwrap()
    }

    fn output(summary: &str) -> StageOutput {
        StageOutput {
            artifacts: vec![Artifact {
                path: Utf8PathBuf::from("file.md"),
                content: format!("{summary} content"),
            }],
            summary: summary.to_string(),
        }
    }

    #[test]
    fn record_is_write_once() {
        let mut store = ContextStore::new();
        store.record(&id("a"), output("first")).unwrap();

        let err = store.record(&id("a"), output("second")).unwrap_err();
        assert_eq!(
            err,
            ContextError::DuplicateRecord { stage: id("a") }
        );

        // The original entry is untouched.
        let snapshot = store.snapshot_for(&id("b"), &[id("a")]).unwrap();
        assert_eq!(snapshot.get(&id("a")).unwrap().summary, "first");
    }

    #[test]
    fn snapshot_contains_exactly_requested_deps() {
        let mut store = ContextStore::new();
        store.record(&id("a"), output("a")).unwrap();
        store.record(&id("b"), output("b")).unwrap();
        store.record(&id("c"), output("c")).unwrap();

        let snapshot = store.snapshot_for(&id("d"), &[id("a"), id("c")]).unwrap();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.get(&id("a")).is_some());
        assert!(snapshot.get(&id("b")).is_none());
        assert!(snapshot.get(&id("c")).is_some());
    }

    #[test]
    fn snapshot_preserves_declared_order() {
        let mut store = ContextStore::new();
        store.record(&id("a"), output("a")).unwrap();
        store.record(&id("b"), output("b")).unwrap();

        let snapshot = store.snapshot_for(&id("c"), &[id("b"), id("a")]).unwrap();
        let order: Vec<&str> = snapshot.iter().map(|(sid, _)| sid.as_str()).collect();
        assert_eq!(order, ["b", "a"]);
    }

    #[test]
    fn missing_dependency_is_an_error() {
        let store = ContextStore::new();
        let err = store.snapshot_for(&id("b"), &[id("a")]).unwrap_err();
        assert_eq!(
            err,
            ContextError::MissingDependency {
                stage: id("b"),
                dependency: id("a"),
            }
        );
    }

    #[test]
    fn repeated_snapshots_are_identical() {
        let mut store = ContextStore::new();
        store.record(&id("a"), output("stable")).unwrap();

        let first = store.snapshot_for(&id("b"), &[id("a")]).unwrap();
        let second = store.snapshot_for(&id("b"), &[id("a")]).unwrap();

        assert_eq!(
            first.get(&id("a")).unwrap(),
            second.get(&id("a")).unwrap()
        );
    }
}
