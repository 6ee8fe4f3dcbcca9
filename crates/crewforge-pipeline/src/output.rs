use camino::Utf8PathBuf;

/// A single produced artifact: a relative path and its full content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: Utf8PathBuf,
    pub content: String,
}

/// The finalized output payload of a succeeded stage.
///
/// Recorded write-once in the context store and exposed read-only to
/// downstream stages.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StageOutput {
    /// Produced artifacts in declaration order of the stage's descriptor.
    pub artifacts: Vec<Artifact>,
    /// Free-text summary the generator produced alongside the artifacts.
    pub summary: String,
}

impl StageOutput {
    /// Look up a produced artifact by path.
    #[must_use]
    pub fn artifact(&self, path: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.path.as_str() == path)
    }
}
