//! Per-stage runtime state.
//!
//! Each scheduled stage gets one [`ExecutionRecord`], mutated only by the
//! runner and the stage executor for that stage and retained for the life
//! of the run for reporting. The status state machine is:
//!
//! ```text
//! Pending → Running → {Succeeded, Failed}
//! Pending → Skipped
//! ```
//!
//! `Succeeded`, `Failed`, and `Skipped` are terminal; no stage re-enters
//! `Running` after reaching one of them.

use serde::Serialize;
use std::fmt;

use crewforge_pipeline::StageOutput;
use crewforge_utils::types::StageId;

/// Stage lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl StageStatus {
    /// Whether the status is terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Why a stage was skipped without entering `Running`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "stage")]
pub enum SkipReason {
    /// A dependency did not succeed; names the blocking stage.
    UpstreamFailed(StageId),
    /// Strict policy: an earlier stage failed; names the triggering stage.
    RunFailed(StageId),
    /// The operator cancelled the run before this stage started.
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpstreamFailed(stage) => write!(f, "dependency '{stage}' did not succeed"),
            Self::RunFailed(stage) => write!(f, "stage '{stage}' failed under strict policy"),
            Self::Cancelled => f.write_str("run cancelled"),
        }
    }
}

/// Runtime state of one stage, created when the stage is scheduled.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub stage: StageId,
    pub status: StageStatus,
    /// Self-refinement attempts consumed. Never exceeds the worker's
    /// `max_iterations`.
    pub attempts: u32,
    /// Accumulated error descriptions across attempts.
    pub errors: Vec<String>,
    /// Finalized output, set exactly when the stage succeeds.
    pub output: Option<StageOutput>,
    /// Set when status is `Skipped`.
    pub skip_reason: Option<SkipReason>,
    /// Wall-clock duration of the `Running` phase.
    pub duration_ms: Option<u64>,
}

impl ExecutionRecord {
    /// Create a pending record for `stage`.
    #[must_use]
    pub fn new(stage: StageId) -> Self {
        Self {
            stage,
            status: StageStatus::Pending,
            attempts: 0,
            errors: Vec::new(),
            output: None,
            skip_reason: None,
            duration_ms: None,
        }
    }

    /// Transition `Pending → Running`.
    pub fn mark_running(&mut self) {
        debug_assert_eq!(self.status, StageStatus::Pending, "stage {}", self.stage);
        self.status = StageStatus::Running;
    }

    /// Transition `Running → Succeeded`, recording the finalized output.
    pub fn mark_succeeded(&mut self, output: StageOutput) {
        debug_assert_eq!(self.status, StageStatus::Running, "stage {}", self.stage);
        self.status = StageStatus::Succeeded;
        self.output = Some(output);
    }

    /// Transition `Running → Failed`, recording the terminal error.
    pub fn mark_failed(&mut self, error: String) {
        debug_assert_eq!(self.status, StageStatus::Running, "stage {}", self.stage);
        self.status = StageStatus::Failed;
        self.errors.push(error);
    }

    /// Transition `Pending → Skipped`, bypassing `Running`.
    pub fn mark_skipped(&mut self, reason: SkipReason) {
        debug_assert_eq!(self.status, StageStatus::Pending, "stage {}", self.stage);
        self.status = StageStatus::Skipped;
        self.skip_reason = Some(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ExecutionRecord {
        ExecutionRecord::new(StageId::new("stage").unwrap())
    }

    #[test]
    fn follows_success_path() {
        let mut rec = record();
        assert_eq!(rec.status, StageStatus::Pending);

        rec.mark_running();
        assert_eq!(rec.status, StageStatus::Running);
        assert!(!rec.status.is_terminal());

        rec.mark_succeeded(StageOutput::default());
        assert_eq!(rec.status, StageStatus::Succeeded);
        assert!(rec.status.is_terminal());
        assert!(rec.output.is_some());
    }

    #[test]
    fn follows_failure_path() {
        let mut rec = record();
        rec.mark_running();
        rec.mark_failed("backend unavailable".to_string());

        assert_eq!(rec.status, StageStatus::Failed);
        assert_eq!(rec.errors, vec!["backend unavailable".to_string()]);
        assert!(rec.output.is_none());
    }

    #[test]
    fn skip_bypasses_running() {
        let mut rec = record();
        let because = StageId::new("upstream").unwrap();
        rec.mark_skipped(SkipReason::UpstreamFailed(because.clone()));

        assert_eq!(rec.status, StageStatus::Skipped);
        assert_eq!(rec.skip_reason, Some(SkipReason::UpstreamFailed(because)));
        assert_eq!(rec.attempts, 0);
    }

    #[test]
    fn skip_reason_renders_trigger() {
        let reason = SkipReason::RunFailed(StageId::new("backend").unwrap());
        assert_eq!(
            reason.to_string(),
            "stage 'backend' failed under strict policy"
        );
    }
}
