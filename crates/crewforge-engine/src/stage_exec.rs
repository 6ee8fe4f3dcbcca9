//! Single-stage execution with bounded self-refinement.
//!
//! [`StageExecutor`] drives one stage's unit of work against the
//! generator backend:
//!
//! 1. compose the request from worker, stage, context snapshot, and any
//!    accumulated validation feedback;
//! 2. invoke the backend under the worker's call timeout (transient
//!    failures are retried inside the backend's retry wrapper, under a
//!    budget independent of the iteration bound);
//! 3. validate the response against the stage's expected outputs; on
//!    failure, loop back with the failure description while attempts
//!    remain under `max_iterations`;
//! 4. hand the validated output to the artifact sink before returning it.
//!
//! A persistence failure is terminal regardless of remaining iterations:
//! the content was computed correctly, re-invoking the backend would not
//! help. A cancelled in-flight call counts toward the attempt budget and
//! is terminal for the stage.

use tracing::{debug, info, warn};

use crewforge_backend::{GeneratorBackend, GeneratorInvocation};
use crewforge_context::ContextSnapshot;
use crewforge_pipeline::{StageOutput, StageSpec, WorkerSpec};
use crewforge_sink::ArtifactSink;
use crewforge_utils::error::StageError;

use crate::cancel::CancelToken;
use crate::compose::compose_request;
use crate::extract::{extract_artifacts, validate_output};
use crate::record::ExecutionRecord;

/// Executes one stage at a time against the backend and sink.
pub struct StageExecutor<'a> {
    backend: &'a dyn GeneratorBackend,
    sink: &'a dyn ArtifactSink,
    /// Model used when the worker declares no override.
    default_model: String,
    cancel: CancelToken,
}

impl<'a> StageExecutor<'a> {
    /// Create an executor over the given collaborators.
    #[must_use]
    pub fn new(
        backend: &'a dyn GeneratorBackend,
        sink: &'a dyn ArtifactSink,
        default_model: impl Into<String>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            backend,
            sink,
            default_model: default_model.into(),
            cancel,
        }
    }

    /// Execute `stage` to a finalized output or a terminal failure,
    /// updating `record`'s attempt count and error list as it goes.
    ///
    /// # Errors
    ///
    /// Returns a [`StageError`] naming the failure class: backend
    /// unavailable, validation exhausted, persistence failure, or
    /// cancellation.
    pub async fn execute(
        &self,
        stage: &StageSpec,
        worker: &WorkerSpec,
        snapshot: &ContextSnapshot,
        record: &mut ExecutionRecord,
    ) -> Result<StageOutput, StageError> {
        let model = worker
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        let mut feedback: Vec<String> = Vec::new();

        for attempt in 1..=worker.max_iterations {
            record.attempts = attempt;

            debug!(
                stage = %stage.id,
                worker = %worker.name,
                attempt,
                max_iterations = worker.max_iterations,
                "starting stage attempt"
            );

            let messages = compose_request(worker, stage, snapshot, &feedback);
            let invocation = GeneratorInvocation::new(
                stage.id.as_str(),
                model.clone(),
                worker.call_timeout,
                messages,
            );

            let result = tokio::select! {
                result = self.backend.invoke(invocation) => result,
                () = self.cancel.cancelled() => {
                    return Err(StageError::Cancelled {
                        stage: stage.id.clone(),
                        attempts: attempt,
                    });
                }
            };

            let response = match result {
                Ok(response) => response,
                Err(source) => {
                    // The backend already spent its transient-retry budget;
                    // whatever comes back here is terminal for this stage.
                    record.errors.push(source.to_string());
                    return Err(StageError::BackendUnavailable {
                        stage: stage.id.clone(),
                        attempts: attempt,
                        source,
                    });
                }
            };

            let extracted = extract_artifacts(&response.text);
            match validate_output(&stage.outputs, extracted) {
                Ok(validated) => {
                    for warning in &validated.warnings {
                        warn!(stage = %stage.id, "{warning}");
                    }

                    self.sink
                        .persist(&stage.id, &validated.output.artifacts)
                        .map_err(|source| {
                            record.errors.push(source.to_string());
                            StageError::Persistence {
                                stage: stage.id.clone(),
                                source,
                            }
                        })?;

                    info!(
                        stage = %stage.id,
                        attempt,
                        artifacts = validated.output.artifacts.len(),
                        "stage output validated and persisted"
                    );
                    return Ok(validated.output);
                }
                Err(issues) => {
                    for issue in &issues {
                        record.errors.push(format!("attempt {attempt}: {issue}"));
                    }

                    if attempt < worker.max_iterations {
                        debug!(
                            stage = %stage.id,
                            attempt,
                            issues = issues.len(),
                            "validation failed, refining"
                        );
                        feedback = issues;
                    } else {
                        return Err(StageError::ValidationExhausted {
                            stage: stage.id.clone(),
                            attempts: attempt,
                            issues,
                        });
                    }
                }
            }
        }

        // max_iterations >= 1 is enforced at assembly, so the loop always
        // returns from within.
        unreachable!("stage execution loop exited without a terminal result")
    }
}
