use std::collections::BTreeSet;
use std::time::Duration;

/// Operation name permitting a worker to produce files.
pub const OP_WRITE_FILE: &str = "write_file";

/// Operation name permitting a worker to read upstream artifacts.
pub const OP_READ_FILE: &str = "read_file";

/// A reusable capability descriptor invoked to execute stages.
///
/// `WorkerSpec` is configuration data, not a polymorphic object: behavior
/// lives in the engine, parameterized by these fields. Instances are
/// immutable once the pipeline is assembled and shared read-only by every
/// stage that references them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
    /// Worker name, referenced by stages. Follows stage-identifier rules.
    pub name: String,
    /// What this worker is for, stated as a goal.
    pub objective: String,
    /// Narrative context establishing the worker's role and constraints.
    pub narrative: String,
    /// Side-effecting operations this worker may request.
    pub permitted_ops: BTreeSet<String>,
    /// Upper bound on self-refinement attempts per stage. At least 1.
    pub max_iterations: u32,
    /// Upper bound on a single backend call.
    pub call_timeout: Duration,
    /// Optional model override for this worker; `None` uses the
    /// generator's default model.
    pub model: Option<String>,
}

impl WorkerSpec {
    /// Whether this worker may produce files.
    #[must_use]
    pub fn may_write(&self) -> bool {
        self.permitted_ops.contains(OP_WRITE_FILE)
    }
}
