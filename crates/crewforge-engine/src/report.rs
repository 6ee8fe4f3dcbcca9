//! Final run report.
//!
//! The report is the only orchestrator-owned persisted state: per-stage
//! status, attempt counts, durations, produced and missing artifacts, and
//! run totals. It accounts for every declared stage, so nothing is
//! silently swallowed, and is written once at run completion.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crewforge_pipeline::StageSpec;
use crewforge_utils::types::FailurePolicy;

use crate::record::{ExecutionRecord, SkipReason, StageStatus};

/// Per-stage entry in the run report.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: String,
    pub status: StageStatus,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    /// Paths of artifacts this stage produced and persisted.
    pub produced: Vec<String>,
    /// Declared artifact paths that were not produced. For skipped and
    /// failed stages this is every declared artifact.
    pub missing: Vec<String>,
}

impl StageReport {
    /// Build the report entry for one stage from its execution record.
    #[must_use]
    pub fn from_record(record: &ExecutionRecord, spec: &StageSpec) -> Self {
        let produced: Vec<String> = record
            .output
            .as_ref()
            .map(|output| {
                output
                    .artifacts
                    .iter()
                    .map(|a| a.path.to_string())
                    .collect()
            })
            .unwrap_or_default();

        let missing: Vec<String> = spec
            .outputs
            .artifacts
            .iter()
            .map(|a| a.path.to_string())
            .filter(|path| !produced.contains(path))
            .collect();

        Self {
            stage: record.stage.to_string(),
            status: record.status,
            attempts: record.attempts,
            duration_ms: record.duration_ms,
            errors: record.errors.clone(),
            skip_reason: record.skip_reason.clone(),
            produced,
            missing,
        }
    }
}

/// Run totals.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Totals {
    pub stages: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// The final run report.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub policy: FailurePolicy,
    pub cancelled: bool,
    pub elapsed_ms: u64,
    pub totals: Totals,
    pub stages: Vec<StageReport>,
}

impl RunReport {
    /// Whether the run as a whole succeeded: no stage failed and the run
    /// was not cancelled.
    #[must_use]
    pub fn success(&self) -> bool {
        self.totals.failed == 0 && !self.cancelled
    }

    /// Serialize to pretty JSON for persistence.
    ///
    /// # Errors
    ///
    /// Returns a serialization error; report types only contain
    /// serializable data, so this does not fail in practice.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable end-of-run summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();

        for stage in &self.stages {
            let mut line = format!("  {:<24} {}", stage.stage, stage.status);
            if stage.attempts > 0 {
                line.push_str(&format!(" (attempts: {})", stage.attempts));
            }
            if let Some(reason) = &stage.skip_reason {
                line.push_str(&format!(" [{reason}]"));
            }
            lines.push(line);

            for path in &stage.produced {
                lines.push(format!("      + {path}"));
            }
            for path in &stage.missing {
                lines.push(format!("      - {path} (missing)"));
            }
        }

        lines.push(String::new());
        lines.push(format!(
            "{} stages: {} succeeded, {} failed, {} skipped in {:.1}s{}",
            self.totals.stages,
            self.totals.succeeded,
            self.totals.failed,
            self.totals.skipped,
            self.elapsed_ms as f64 / 1000.0,
            if self.cancelled { " (cancelled)" } else { "" },
        ));

        lines.join("\n")
    }
}
