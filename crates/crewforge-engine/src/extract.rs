//! Generator-output parsing and validation.
//!
//! The generator returns plain text containing fenced file blocks:
//!
//! ````text
//! ```file:docs/requirements.md
//! # Requirements
//! ...
//! ```
//! ````
//!
//! [`extract_artifacts`] scans for these markers and splits the response
//! into produced artifacts plus the surrounding free text, which becomes
//! the stage summary. [`validate_output`] then checks the extraction
//! against the stage's declared output descriptor: required artifacts
//! must be present and non-empty; missing optional artifacts and
//! undeclared extras only produce warnings.

use once_cell::sync::Lazy;
use regex::Regex;

use camino::Utf8PathBuf;
use crewforge_pipeline::{Artifact, OutputDescriptor, StageOutput};

/// Opening fence of a file block: ```file:<path>
static FILE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```file:(\S+)\s*$").unwrap());

/// Raw extraction result before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedOutput {
    /// File blocks in response order.
    pub artifacts: Vec<Artifact>,
    /// Text outside file blocks, trimmed.
    pub summary: String,
}

/// Validated output plus non-fatal observations.
#[derive(Debug, Clone)]
pub struct ValidatedOutput {
    pub output: StageOutput,
    /// Missing optional artifacts, empty optional artifacts, undeclared
    /// extras. Logged, not failed.
    pub warnings: Vec<String>,
}

/// Split a generator response into file blocks and summary text.
#[must_use]
pub fn extract_artifacts(raw: &str) -> ExtractedOutput {
    let mut artifacts = Vec::new();
    let mut summary_parts: Vec<&str> = Vec::new();

    let mut current: Option<(String, Vec<&str>)> = None;

    for line in raw.lines() {
        match current.take() {
            Some((path, mut content)) => {
                if line.trim_end() == "```" {
                    let mut body = content.join("\n");
                    if !body.is_empty() {
                        body.push('\n');
                    }
                    artifacts.push(Artifact {
                        path: Utf8PathBuf::from(path),
                        content: body,
                    });
                } else {
                    content.push(line);
                    current = Some((path, content));
                }
            }
            None => {
                if let Some(captures) = FILE_FENCE.captures(line) {
                    current = Some((captures[1].to_string(), Vec::new()));
                } else {
                    summary_parts.push(line);
                }
            }
        }
    }

    // An unterminated block keeps its content rather than dropping it; the
    // validator decides whether the artifact is usable.
    if let Some((path, content)) = current {
        let mut body = content.join("\n");
        if !body.is_empty() {
            body.push('\n');
        }
        artifacts.push(Artifact {
            path: Utf8PathBuf::from(path),
            content: body,
        });
    }

    ExtractedOutput {
        artifacts,
        summary: summary_parts.join("\n").trim().to_string(),
    }
}

/// Validate an extraction against the stage's output descriptor.
///
/// The returned output carries declared artifacts in descriptor order;
/// undeclared blocks are dropped (only declared outputs are persisted).
///
/// # Errors
///
/// Returns the list of validation issues when any required artifact is
/// missing or empty. The issues feed the self-refinement loop.
pub fn validate_output(
    descriptor: &OutputDescriptor,
    extracted: ExtractedOutput,
) -> Result<ValidatedOutput, Vec<String>> {
    let mut issues = Vec::new();
    let mut warnings = Vec::new();
    let mut artifacts = Vec::new();

    for spec in &descriptor.artifacts {
        let found = extracted
            .artifacts
            .iter()
            .find(|a| a.path == spec.path);

        match found {
            Some(artifact) if artifact.content.trim().is_empty() => {
                if spec.required {
                    issues.push(format!("required artifact '{}' is empty", spec.path));
                } else {
                    warnings.push(format!("optional artifact '{}' is empty; dropped", spec.path));
                }
            }
            Some(artifact) => artifacts.push(artifact.clone()),
            None => {
                if spec.required {
                    issues.push(format!(
                        "required artifact '{}' missing from response",
                        spec.path
                    ));
                } else {
                    warnings.push(format!("optional artifact '{}' not produced", spec.path));
                }
            }
        }
    }

    for artifact in &extracted.artifacts {
        if !descriptor.artifacts.iter().any(|s| s.path == artifact.path) {
            warnings.push(format!(
                "undeclared artifact '{}' ignored (not in the stage's expected outputs)",
                artifact.path
            ));
        }
    }

    if !issues.is_empty() {
        return Err(issues);
    }

    Ok(ValidatedOutput {
        output: StageOutput {
            artifacts,
            summary: extracted.summary,
        },
        warnings,
    })
}
