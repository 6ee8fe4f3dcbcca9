//! Relative-path validation for declared artifacts.
//!
//! Artifact paths come from pipeline configuration and, indirectly, from
//! generator output. Before any file IO they are validated against a small
//! sandbox rule set: relative only, no parent traversal, no empty
//! components. Validation happens on the declared path alone so it can run
//! at configuration-load time, before any output directory exists.

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use std::fs;

/// Validate a declared artifact path and return it in normalized form.
///
/// Rules:
/// - must be non-empty and relative (no leading `/`, no drive prefix)
/// - must not contain `..` components
/// - must not contain `.` components or empty segments
/// - backslashes are rejected rather than interpreted as separators
///
/// # Errors
///
/// Returns the violated rule as a message; callers wrap it into
/// `SinkError::InvalidArtifactPath` or a configuration error.
pub fn validate_artifact_path(raw: &str) -> Result<Utf8PathBuf, String> {
    if raw.is_empty() {
        return Err("path must not be empty".to_string());
    }
    if raw.contains('\\') {
        return Err("path must use '/' separators".to_string());
    }

    let path = Utf8Path::new(raw);
    if path.is_absolute() {
        return Err("absolute paths are not allowed".to_string());
    }

    let mut normalized = Utf8PathBuf::new();
    for component in path.components() {
        match component {
            Utf8Component::Normal(part) => normalized.push(part),
            Utf8Component::ParentDir => {
                return Err("parent directory traversal ('..') is not allowed".to_string());
            }
            Utf8Component::CurDir => {
                return Err("'.' components are not allowed".to_string());
            }
            Utf8Component::RootDir | Utf8Component::Prefix(_) => {
                return Err("absolute paths are not allowed".to_string());
            }
        }
    }

    if normalized.as_str().is_empty() {
        return Err("path must contain at least one component".to_string());
    }

    Ok(normalized)
}

/// Create a directory and all parents, tolerating concurrent creation.
///
/// # Errors
///
/// Returns the underlying IO error message when creation fails for a
/// reason other than the directory already existing.
pub fn ensure_dir_all(path: &Utf8Path) -> Result<(), String> {
    match fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(format!("failed to create directory '{path}': {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_relative_paths() {
        assert_eq!(
            validate_artifact_path("docs/requirements.md").unwrap(),
            Utf8PathBuf::from("docs/requirements.md")
        );
        assert_eq!(
            validate_artifact_path("main.py").unwrap(),
            Utf8PathBuf::from("main.py")
        );
    }

    #[test]
    fn rejects_absolute_paths() {
        assert!(validate_artifact_path("/etc/passwd").is_err());
    }

    #[test]
    fn rejects_parent_traversal() {
        assert!(validate_artifact_path("../outside.md").is_err());
        assert!(validate_artifact_path("docs/../../outside.md").is_err());
    }

    #[test]
    fn rejects_backslashes_and_empties() {
        assert!(validate_artifact_path("docs\\file.md").is_err());
        assert!(validate_artifact_path("").is_err());
        assert!(validate_artifact_path("./docs/file.md").is_err());
    }
}
