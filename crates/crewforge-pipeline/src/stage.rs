use camino::Utf8PathBuf;

use crewforge_utils::StageId;

/// One declared output file of a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSpec {
    /// Relative path of the artifact, validated against the path sandbox
    /// at assembly time.
    pub path: Utf8PathBuf,
    /// Whether a missing or empty artifact fails validation. Artifacts
    /// with `required: false` only produce a warning when absent.
    pub required: bool,
}

/// The set of artifacts a stage must produce.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutputDescriptor {
    /// Declared artifacts in declaration order.
    pub artifacts: Vec<ArtifactSpec>,
}

impl OutputDescriptor {
    /// Paths of all required artifacts.
    pub fn required_paths(&self) -> impl Iterator<Item = &Utf8PathBuf> {
        self.artifacts
            .iter()
            .filter(|a| a.required)
            .map(|a| &a.path)
    }

    /// Whether the stage declares any outputs at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

/// Declarative description of one pipeline stage.
///
/// Immutable once the pipeline is assembled. Dependencies reference
/// previously defined stages only; forward references and self-references
/// are rejected at assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    /// Stage identity, unique within the pipeline.
    pub id: StageId,
    /// Free-text instructions for this stage's unit of work.
    pub instructions: String,
    /// Name of the worker executing this stage.
    pub worker: String,
    /// Identities of upstream stages whose outputs this stage reads.
    pub deps: Vec<StageId>,
    /// Artifacts this stage must produce.
    pub outputs: OutputDescriptor,
    /// Under the `degrade` failure policy, dependents of a failed
    /// optional stage may still execute.
    pub optional: bool,
}
