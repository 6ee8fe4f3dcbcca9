//! Pipeline execution.
//!
//! [`PipelineRunner`] drives the topological order produced by the
//! dependency resolver through the stage executor, one stage at a time.
//! It owns the run-scoped shared state (the context store and the
//! execution records) and applies the configured failure policy:
//!
//! - **strict** (default): the first stage failure marks every remaining
//!   unexecuted stage as skipped and the run ends in failure;
//! - **degrade**: only stages whose (non-optional) dependencies did not
//!   succeed are skipped; independent stages still execute.
//!
//! Cancellation is honored between stages and raced against the in-flight
//! backend call; an aborted stage's partial output never reaches the
//! context store or the report's artifact inventory.

use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn};

use crewforge_backend::GeneratorBackend;
use crewforge_context::ContextStore;
use crewforge_graph::resolve_order;
use crewforge_pipeline::Pipeline;
use crewforge_sink::ArtifactSink;
use crewforge_utils::error::{CrewforgeError, StageError};
use crewforge_utils::types::{FailurePolicy, StageId};

use crate::cancel::CancelToken;
use crate::record::{ExecutionRecord, SkipReason, StageStatus};
use crate::report::{RunReport, StageReport, Totals};
use crate::stage_exec::StageExecutor;

/// Progress notification emitted while the run advances.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    StageStarted {
        stage: StageId,
        index: usize,
        total: usize,
    },
    StageFinished {
        stage: StageId,
        index: usize,
        status: StageStatus,
        attempts: u32,
        duration_ms: u64,
    },
    StageSkipped {
        stage: StageId,
        index: usize,
        reason: SkipReason,
    },
}

/// Callback receiving progress events.
pub type ProgressObserver = Box<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Drives a validated pipeline to completion or terminal failure.
pub struct PipelineRunner<'a> {
    pipeline: &'a Pipeline,
    backend: &'a dyn GeneratorBackend,
    sink: &'a dyn ArtifactSink,
    policy: FailurePolicy,
    default_model: String,
    cancel: CancelToken,
    observer: Option<ProgressObserver>,
}

impl<'a> PipelineRunner<'a> {
    /// Create a runner over the given collaborators.
    #[must_use]
    pub fn new(
        pipeline: &'a Pipeline,
        backend: &'a dyn GeneratorBackend,
        sink: &'a dyn ArtifactSink,
        policy: FailurePolicy,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            pipeline,
            backend,
            sink,
            policy,
            default_model: default_model.into(),
            cancel: CancelToken::new(),
            observer: None,
        }
    }

    /// Use an externally owned cancellation token (e.g. wired to Ctrl-C).
    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Receive progress events as stages start and finish.
    #[must_use]
    pub fn with_observer(mut self, observer: ProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    fn emit(&self, event: &ProgressEvent) {
        if let Some(observer) = &self.observer {
            observer(event);
        }
    }

    /// Run every stage in dependency order and produce the final report.
    ///
    /// Stage failures do not abort this function; they are applied to the
    /// failure policy and accounted for in the report. An error return
    /// means the run could not be driven at all (dependency resolution or
    /// a context-store invariant violation).
    ///
    /// # Errors
    ///
    /// Returns `CrewforgeError::Graph` when the stage set has a cycle or
    /// unknown dependency, and `CrewforgeError::Context` on store
    /// invariant violations.
    pub async fn run(&self) -> Result<RunReport, CrewforgeError> {
        let order = resolve_order(self.pipeline.stages())?;
        let total = order.len();
        let started_at = Utc::now();
        let run_start = Instant::now();

        let mut store = ContextStore::new();
        let mut records: Vec<ExecutionRecord> =
            order.iter().map(|id| ExecutionRecord::new(id.clone())).collect();
        let mut statuses: HashMap<StageId, StageStatus> = order
            .iter()
            .map(|id| (id.clone(), StageStatus::Pending))
            .collect();

        let executor = StageExecutor::new(
            self.backend,
            self.sink,
            self.default_model.clone(),
            self.cancel.clone(),
        );

        let mut strict_failure: Option<StageId> = None;
        let mut cancelled = false;

        for (index, stage_id) in order.iter().enumerate() {
            let stage = self
                .pipeline
                .stage(stage_id)
                .expect("resolver yields identities from this stage set");
            let record = &mut records[index];

            if cancelled || self.cancel.is_cancelled() {
                cancelled = true;
                record.mark_skipped(SkipReason::Cancelled);
                statuses.insert(stage_id.clone(), StageStatus::Skipped);
                self.emit(&ProgressEvent::StageSkipped {
                    stage: stage_id.clone(),
                    index,
                    reason: SkipReason::Cancelled,
                });
                continue;
            }

            if let Some(failed) = &strict_failure {
                let reason = SkipReason::RunFailed(failed.clone());
                record.mark_skipped(reason.clone());
                statuses.insert(stage_id.clone(), StageStatus::Skipped);
                self.emit(&ProgressEvent::StageSkipped {
                    stage: stage_id.clone(),
                    index,
                    reason,
                });
                continue;
            }

            // Partition dependencies: succeeded ones feed the snapshot;
            // a non-succeeded, non-optional dependency blocks the stage.
            let mut succeeded_deps = Vec::with_capacity(stage.deps.len());
            let mut blocking: Option<StageId> = None;
            for dep in &stage.deps {
                if statuses.get(dep) == Some(&StageStatus::Succeeded) {
                    succeeded_deps.push(dep.clone());
                    continue;
                }
                let dep_optional = self
                    .pipeline
                    .stage(dep)
                    .is_some_and(|dep_spec| dep_spec.optional);
                if !dep_optional {
                    blocking = Some(dep.clone());
                    break;
                }
            }

            if let Some(blocking) = blocking {
                let reason = SkipReason::UpstreamFailed(blocking);
                record.mark_skipped(reason.clone());
                statuses.insert(stage_id.clone(), StageStatus::Skipped);
                warn!(stage = %stage_id, "skipping stage: {}", reason);
                self.emit(&ProgressEvent::StageSkipped {
                    stage: stage_id.clone(),
                    index,
                    reason,
                });
                continue;
            }

            let snapshot = store.snapshot_for(stage_id, &succeeded_deps)?;

            record.mark_running();
            statuses.insert(stage_id.clone(), StageStatus::Running);
            self.emit(&ProgressEvent::StageStarted {
                stage: stage_id.clone(),
                index,
                total,
            });

            let stage_start = Instant::now();
            let worker = self.pipeline.worker_for(stage);
            let result = executor.execute(stage, worker, &snapshot, record).await;
            let duration_ms = stage_start.elapsed().as_millis() as u64;
            record.duration_ms = Some(duration_ms);

            match result {
                Ok(output) => {
                    store.record(stage_id, output.clone())?;
                    record.mark_succeeded(output);
                    statuses.insert(stage_id.clone(), StageStatus::Succeeded);
                    info!(stage = %stage_id, attempts = record.attempts, "stage succeeded");
                }
                Err(error) => {
                    let was_cancelled = matches!(error, StageError::Cancelled { .. });
                    warn!(stage = %stage_id, attempts = record.attempts, "stage failed: {error}");
                    record.mark_failed(error.to_string());
                    statuses.insert(stage_id.clone(), StageStatus::Failed);

                    if was_cancelled {
                        cancelled = true;
                    } else if self.policy == FailurePolicy::Strict {
                        strict_failure = Some(stage_id.clone());
                    }
                }
            }

            self.emit(&ProgressEvent::StageFinished {
                stage: stage_id.clone(),
                index,
                status: record.status,
                attempts: record.attempts,
                duration_ms,
            });
        }

        let totals = Totals {
            stages: records.len(),
            succeeded: records
                .iter()
                .filter(|r| r.status == StageStatus::Succeeded)
                .count(),
            failed: records
                .iter()
                .filter(|r| r.status == StageStatus::Failed)
                .count(),
            skipped: records
                .iter()
                .filter(|r| r.status == StageStatus::Skipped)
                .count(),
        };

        let stages = order
            .iter()
            .zip(&records)
            .map(|(id, record)| {
                let spec = self
                    .pipeline
                    .stage(id)
                    .expect("resolver yields identities from this stage set");
                StageReport::from_record(record, spec)
            })
            .collect();

        Ok(RunReport {
            started_at,
            policy: self.policy,
            cancelled,
            elapsed_ms: run_start.elapsed().as_millis() as u64,
            totals,
            stages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use crewforge_backend::stub::StubBackend;
    use crewforge_pipeline::{ArtifactSpec, OutputDescriptor, StageSpec, WorkerSpec};
    use crewforge_sink::memory::MemorySink;
    use std::collections::BTreeSet;
    use std::time::Duration;

    fn worker(max_iterations: u32) -> WorkerSpec {
        WorkerSpec {
            name: "writer".to_string(),
            objective: "write".to_string(),
            narrative: String::new(),
            permitted_ops: BTreeSet::from(["write_file".to_string()]),
            max_iterations,
            call_timeout: Duration::from_secs(5),
            model: None,
        }
    }

    fn stage(id: &str, deps: &[&str], output: &str) -> StageSpec {
        StageSpec {
            id: StageId::new(id).unwrap(),
            instructions: format!("produce {output}"),
            worker: "writer".to_string(),
            deps: deps.iter().map(|d| StageId::new(*d).unwrap()).collect(),
            outputs: OutputDescriptor {
                artifacts: vec![ArtifactSpec {
                    path: Utf8PathBuf::from(output),
                    required: true,
                }],
            },
            optional: false,
        }
    }

    fn valid(path: &str) -> Result<String, crewforge_utils::error::GeneratorError> {
        Ok(format!("```file:{path}\ncontent of {path}\n```"))
    }

    fn invalid() -> Result<String, crewforge_utils::error::GeneratorError> {
        Ok("no file blocks".to_string())
    }

    /// Pipeline [a, b(dep a), c(dep a)] with one-iteration workers so a
    /// validation failure is immediately terminal.
    fn fan_out_pipeline() -> Pipeline {
        Pipeline::new(
            vec![worker(1)],
            vec![
                stage("a", &[], "a.md"),
                stage("b", &["a"], "b.md"),
                stage("c", &["a"], "c.md"),
            ],
        )
        .unwrap()
    }

    fn id(raw: &str) -> StageId {
        StageId::new(raw).unwrap()
    }

    #[tokio::test]
    async fn strict_policy_skips_all_after_failure() {
        let backend = StubBackend::with_script(vec![valid("a.md"), invalid()]);
        let calls = backend.call_log();
        let sink = MemorySink::new();
        let pipeline = fan_out_pipeline();

        let runner =
            PipelineRunner::new(&pipeline, &backend, &sink, FailurePolicy::Strict, "model");
        let report = runner.run().await.unwrap();

        // Only a and b were attempted; c was never invoked.
        assert_eq!(calls.lock().unwrap().len(), 2);

        assert_eq!(report.stages[0].status, StageStatus::Succeeded);
        assert_eq!(report.stages[1].status, StageStatus::Failed);
        assert_eq!(report.stages[2].status, StageStatus::Skipped);
        assert_eq!(
            report.stages[2].skip_reason,
            Some(SkipReason::RunFailed(id("b")))
        );
        assert!(!report.success());
        assert_eq!(report.totals.failed, 1);
        assert_eq!(report.totals.skipped, 1);
    }

    #[tokio::test]
    async fn degrade_policy_runs_independent_stages() {
        let backend = StubBackend::with_script(vec![valid("a.md"), invalid(), valid("c.md")]);
        let calls = backend.call_log();
        let sink = MemorySink::new();
        let pipeline = fan_out_pipeline();

        let runner =
            PipelineRunner::new(&pipeline, &backend, &sink, FailurePolicy::Degrade, "model");
        let report = runner.run().await.unwrap();

        // All three attempted in order.
        assert_eq!(calls.lock().unwrap().len(), 3);
        assert_eq!(report.stages[2].status, StageStatus::Succeeded);

        // Run fails overall, but c's artifacts are present.
        assert!(!report.success());
        assert_eq!(
            sink.content(&id("c"), "c.md").unwrap(),
            "content of c.md\n"
        );
    }

    #[tokio::test]
    async fn degrade_policy_skips_transitive_dependents() {
        let pipeline = Pipeline::new(
            vec![worker(1)],
            vec![
                stage("a", &[], "a.md"),
                stage("b", &["a"], "b.md"),
                stage("c", &["b"], "c.md"),
                stage("d", &[], "d.md"),
            ],
        )
        .unwrap();

        // a fails; b depends on a; c depends on b; d is independent.
        let backend = StubBackend::with_script(vec![invalid(), valid("d.md")]);
        let sink = MemorySink::new();

        let runner =
            PipelineRunner::new(&pipeline, &backend, &sink, FailurePolicy::Degrade, "model");
        let report = runner.run().await.unwrap();

        assert_eq!(report.stages[0].status, StageStatus::Failed);
        assert_eq!(report.stages[1].status, StageStatus::Skipped);
        assert_eq!(
            report.stages[1].skip_reason,
            Some(SkipReason::UpstreamFailed(id("a")))
        );
        assert_eq!(report.stages[2].status, StageStatus::Skipped);
        assert_eq!(
            report.stages[2].skip_reason,
            Some(SkipReason::UpstreamFailed(id("b")))
        );
        assert_eq!(report.stages[3].status, StageStatus::Succeeded);
    }

    #[tokio::test]
    async fn optional_stage_failure_does_not_block_dependents_under_degrade() {
        let mut optional_stage = stage("a", &[], "a.md");
        optional_stage.optional = true;

        let pipeline = Pipeline::new(
            vec![worker(1)],
            vec![optional_stage, stage("b", &["a"], "b.md")],
        )
        .unwrap();

        let backend = StubBackend::with_script(vec![invalid(), valid("b.md")]);
        let calls = backend.call_log();
        let sink = MemorySink::new();

        let runner =
            PipelineRunner::new(&pipeline, &backend, &sink, FailurePolicy::Degrade, "model");
        let report = runner.run().await.unwrap();

        assert_eq!(report.stages[0].status, StageStatus::Failed);
        assert_eq!(report.stages[1].status, StageStatus::Succeeded);

        // b ran with an empty snapshot: its request carries no context
        // section for the failed optional dependency.
        let recorded = calls.lock().unwrap();
        assert!(!recorded[1].messages[1].content.contains("## a"));
    }

    #[tokio::test]
    async fn snapshot_carries_exactly_declared_dependencies() {
        let pipeline = Pipeline::new(
            vec![worker(1)],
            vec![
                stage("a", &[], "a.md"),
                stage("b", &[], "b.md"),
                stage("c", &["a"], "c.md"),
            ],
        )
        .unwrap();

        let backend =
            StubBackend::with_script(vec![valid("a.md"), valid("b.md"), valid("c.md")]);
        let calls = backend.call_log();
        let sink = MemorySink::new();

        let runner =
            PipelineRunner::new(&pipeline, &backend, &sink, FailurePolicy::Strict, "model");
        let report = runner.run().await.unwrap();
        assert!(report.success());

        let recorded = calls.lock().unwrap();
        let c_request = &recorded[2].messages[1].content;
        assert!(c_request.contains("## a"));
        assert!(c_request.contains("content of a.md"));
        assert!(!c_request.contains("## b"));
    }

    #[tokio::test]
    async fn self_refinement_success_is_reported_with_attempt_count() {
        let pipeline =
            Pipeline::new(vec![worker(3)], vec![stage("d", &[], "d.md")]).unwrap();

        let backend =
            StubBackend::with_script(vec![invalid(), invalid(), valid("d.md")]);
        let sink = MemorySink::new();

        let runner =
            PipelineRunner::new(&pipeline, &backend, &sink, FailurePolicy::Strict, "model");
        let report = runner.run().await.unwrap();

        assert_eq!(report.stages[0].status, StageStatus::Succeeded);
        assert_eq!(report.stages[0].attempts, 3);
        assert!(report.success());
    }

    #[tokio::test]
    async fn cancellation_between_stages_skips_the_rest() {
        let backend = StubBackend::with_script(vec![valid("a.md"), valid("b.md"), valid("c.md")]);
        let calls = backend.call_log();
        let sink = MemorySink::new();
        let pipeline = fan_out_pipeline();

        let cancel = CancelToken::new();
        let cancel_after_first = cancel.clone();
        let runner =
            PipelineRunner::new(&pipeline, &backend, &sink, FailurePolicy::Strict, "model")
                .with_cancel_token(cancel)
                .with_observer(Box::new(move |event| {
                    if matches!(event, ProgressEvent::StageFinished { .. }) {
                        cancel_after_first.cancel();
                    }
                }));

        let report = runner.run().await.unwrap();

        assert_eq!(calls.lock().unwrap().len(), 1);
        assert_eq!(report.stages[0].status, StageStatus::Succeeded);
        assert_eq!(report.stages[1].status, StageStatus::Skipped);
        assert_eq!(report.stages[1].skip_reason, Some(SkipReason::Cancelled));
        assert_eq!(report.stages[2].status, StageStatus::Skipped);
        assert!(report.cancelled);
        assert!(!report.success());
    }

    #[tokio::test]
    async fn report_accounts_for_every_stage() {
        let backend = StubBackend::with_script(vec![valid("a.md"), invalid()]);
        let sink = MemorySink::new();
        let pipeline = fan_out_pipeline();

        let runner =
            PipelineRunner::new(&pipeline, &backend, &sink, FailurePolicy::Strict, "model");
        let report = runner.run().await.unwrap();

        assert_eq!(report.stages.len(), 3);
        assert_eq!(
            report.totals.succeeded + report.totals.failed + report.totals.skipped,
            3
        );

        // Failed and skipped stages list their declared artifacts as missing.
        assert_eq!(report.stages[1].missing, vec!["b.md".to_string()]);
        assert_eq!(report.stages[2].missing, vec!["c.md".to_string()]);
    }
}
