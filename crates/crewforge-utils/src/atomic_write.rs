//! Atomic file writes.
//!
//! Artifacts and the run report are written via temporary file + fsync +
//! rename so a crash mid-write never leaves a truncated file at the target
//! path. Content is normalized to UTF-8 with LF line endings.

use camino::Utf8Path;
use std::fs;
use std::io::Write;

use tempfile::NamedTempFile;

/// Atomically write `content` to `path`.
///
/// Creates the parent directory when missing, writes to a temporary file in
/// the same directory, fsyncs it, then renames it over the target. The
/// rename is atomic on the same filesystem.
///
/// # Errors
///
/// Returns an IO-level error message when any step fails; the caller wraps
/// it into its own error type.
pub fn write_file_atomic(path: &Utf8Path, content: &str) -> Result<(), String> {
    let normalized = normalize_line_endings(content);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("failed to create parent directory '{parent}': {e}"))?;
    }

    let temp_dir = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let mut temp_file = NamedTempFile::new_in(temp_dir)
        .map_err(|e| format!("failed to create temporary file in '{temp_dir}': {e}"))?;

    temp_file
        .write_all(normalized.as_bytes())
        .map_err(|e| format!("failed to write temporary file: {e}"))?;

    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| format!("failed to fsync temporary file: {e}"))?;

    temp_file
        .persist(path.as_std_path())
        .map_err(|e| format!("failed to rename temporary file into place: {e}"))?;

    Ok(())
}

/// Normalize CRLF and lone CR to LF.
fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}
