use std::collections::{HashMap, HashSet};

use crewforge_utils::error::ConfigError;
use crewforge_utils::types::StageId;

use crate::stage::StageSpec;
use crate::worker::WorkerSpec;

/// The assembled, validated pipeline: ordered workers and stages.
///
/// `Pipeline::new` is the single place where cross-references are checked,
/// so everything downstream (resolver, engine) can index into the pipeline
/// without re-validating. Assembly enforces:
///
/// - worker names and stage identities are unique and well-formed
/// - every stage references an existing worker
/// - dependencies reference previously defined stages only (no forward
///   references, no self-references)
/// - `max_iterations >= 1` and a non-zero call timeout per worker
/// - a stage that declares outputs uses a worker permitted to write files
#[derive(Debug, Clone)]
pub struct Pipeline {
    workers: Vec<WorkerSpec>,
    stages: Vec<StageSpec>,
    worker_index: HashMap<String, usize>,
}

impl Pipeline {
    /// Assemble and validate a pipeline.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` carrying every violation
    /// found, not just the first one.
    pub fn new(workers: Vec<WorkerSpec>, stages: Vec<StageSpec>) -> Result<Self, ConfigError> {
        let mut errors = Vec::new();

        if stages.is_empty() {
            errors.push("pipeline must declare at least one stage".to_string());
        }

        let mut worker_index = HashMap::new();
        for (idx, worker) in workers.iter().enumerate() {
            if let Err(reason) = StageId::new(worker.name.clone()) {
                errors.push(format!("worker name invalid: {reason}"));
            }
            if worker_index.insert(worker.name.clone(), idx).is_some() {
                errors.push(format!("duplicate worker name '{}'", worker.name));
            }
            if worker.max_iterations == 0 {
                errors.push(format!(
                    "worker '{}' has max_iterations 0; at least 1 is required",
                    worker.name
                ));
            }
            if worker.call_timeout.is_zero() {
                errors.push(format!("worker '{}' has a zero call timeout", worker.name));
            }
        }

        let mut seen_stages: HashSet<&StageId> = HashSet::new();
        for (idx, stage) in stages.iter().enumerate() {
            if !seen_stages.insert(&stage.id) {
                errors.push(format!("duplicate stage identity '{}'", stage.id));
            }

            match worker_index.get(&stage.worker) {
                Some(widx) => {
                    let worker = &workers[*widx];
                    if !stage.outputs.is_empty() && !worker.may_write() {
                        errors.push(format!(
                            "stage '{}' declares outputs but worker '{}' lacks the \
                             'write_file' operation",
                            stage.id, stage.worker
                        ));
                    }
                }
                None => errors.push(format!(
                    "stage '{}' references unknown worker '{}'",
                    stage.id, stage.worker
                )),
            }

            // Dependencies must point at stages declared earlier.
            let earlier: HashSet<&StageId> = stages[..idx].iter().map(|s| &s.id).collect();
            for dep in &stage.deps {
                if dep == &stage.id {
                    errors.push(format!("stage '{}' depends on itself", stage.id));
                } else if !earlier.contains(dep) {
                    errors.push(format!(
                        "stage '{}' depends on '{}' which is not a previously defined stage",
                        stage.id, dep
                    ));
                }
            }

            let mut seen_paths = HashSet::new();
            for artifact in &stage.outputs.artifacts {
                if !seen_paths.insert(artifact.path.as_str()) {
                    errors.push(format!(
                        "stage '{}' declares artifact '{}' more than once",
                        stage.id, artifact.path
                    ));
                }
            }
        }

        if !errors.is_empty() {
            return Err(ConfigError::validation(errors));
        }

        Ok(Self {
            workers,
            stages,
            worker_index,
        })
    }

    /// Stages in declaration order.
    #[must_use]
    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// Workers in declaration order.
    #[must_use]
    pub fn workers(&self) -> &[WorkerSpec] {
        &self.workers
    }

    /// The worker assigned to a stage.
    ///
    /// # Panics
    ///
    /// Never panics for stages of this pipeline: assembly validated the
    /// reference.
    #[must_use]
    pub fn worker_for(&self, stage: &StageSpec) -> &WorkerSpec {
        let idx = self.worker_index[&stage.worker];
        &self.workers[idx]
    }

    /// Look up a stage by identity.
    #[must_use]
    pub fn stage(&self, id: &StageId) -> Option<&StageSpec> {
        self.stages.iter().find(|s| &s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{ArtifactSpec, OutputDescriptor};
    use crate::worker::OP_WRITE_FILE;
    use camino::Utf8PathBuf;
    use std::collections::BTreeSet;
    use std::time::Duration;

    fn worker(name: &str, ops: &[&str]) -> WorkerSpec {
        WorkerSpec {
            name: name.to_string(),
            objective: format!("{name} objective"),
            narrative: String::new(),
            permitted_ops: ops.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
            max_iterations: 3,
            call_timeout: Duration::from_secs(60),
            model: None,
        }
    }

    fn stage(id: &str, worker: &str, deps: &[&str]) -> StageSpec {
        StageSpec {
            id: StageId::new(id).unwrap(),
            instructions: format!("{id} instructions"),
            worker: worker.to_string(),
            deps: deps.iter().map(|d| StageId::new(*d).unwrap()).collect(),
            outputs: OutputDescriptor::default(),
            optional: false,
        }
    }

    #[test]
    fn assembles_valid_pipeline() {
        let pipeline = Pipeline::new(
            vec![worker("writer", &[OP_WRITE_FILE])],
            vec![stage("a", "writer", &[]), stage("b", "writer", &["a"])],
        )
        .unwrap();

        assert_eq!(pipeline.stages().len(), 2);
        assert_eq!(pipeline.worker_for(&pipeline.stages()[0]).name, "writer");
    }

    #[test]
    fn rejects_forward_reference() {
        let err = Pipeline::new(
            vec![worker("writer", &[])],
            vec![stage("a", "writer", &["b"]), stage("b", "writer", &[])],
        )
        .unwrap_err();

        assert!(err.to_string().contains("not a previously defined stage"));
    }

    #[test]
    fn rejects_self_reference() {
        let err = Pipeline::new(
            vec![worker("writer", &[])],
            vec![stage("a", "writer", &["a"])],
        )
        .unwrap_err();

        assert!(err.to_string().contains("depends on itself"));
    }

    #[test]
    fn rejects_unknown_worker_and_duplicate_stage() {
        let err = Pipeline::new(
            vec![worker("writer", &[])],
            vec![stage("a", "ghost", &[]), stage("a", "writer", &[])],
        )
        .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("unknown worker 'ghost'"));
        assert!(message.contains("duplicate stage identity 'a'"));
    }

    #[test]
    fn rejects_outputs_without_write_permission() {
        let mut output_stage = stage("a", "reader", &[]);
        output_stage.outputs = OutputDescriptor {
            artifacts: vec![ArtifactSpec {
                path: Utf8PathBuf::from("docs/readme.md"),
                required: true,
            }],
        };

        let err = Pipeline::new(vec![worker("reader", &[])], vec![output_stage]).unwrap_err();
        assert!(err.to_string().contains("lacks the 'write_file' operation"));
    }

    #[test]
    fn rejects_zero_iterations() {
        let mut bad = worker("writer", &[]);
        bad.max_iterations = 0;

        let err = Pipeline::new(vec![bad], vec![stage("a", "writer", &[])]).unwrap_err();
        assert!(err.to_string().contains("max_iterations 0"));
    }
}
