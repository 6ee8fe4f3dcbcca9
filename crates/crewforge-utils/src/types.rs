use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a stage identifier in characters.
pub const STAGE_ID_MAX_LEN: usize = 64;

/// Identifier for a pipeline stage.
///
/// `StageId` is a validated string: lowercase alphanumerics, `-` and `_`,
/// non-empty, at most [`STAGE_ID_MAX_LEN`] characters. The same rules apply
/// to worker names so both can appear in artifact paths and report keys
/// without escaping.
///
/// # Example
///
/// ```rust
/// use crewforge_utils::types::StageId;
///
/// let id = StageId::new("backend-development").unwrap();
/// assert_eq!(id.as_str(), "backend-development");
///
/// assert!(StageId::new("").is_err());
/// assert!(StageId::new("No Spaces Allowed").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StageId(String);

impl StageId {
    /// Validate and construct a stage identifier.
    ///
    /// # Errors
    ///
    /// Returns a description of the violated rule when the identifier is
    /// empty, too long, or contains characters outside `[a-z0-9_-]`.
    pub fn new(raw: impl Into<String>) -> Result<Self, String> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err("stage identifier must not be empty".to_string());
        }
        if raw.len() > STAGE_ID_MAX_LEN {
            return Err(format!(
                "stage identifier '{raw}' exceeds {STAGE_ID_MAX_LEN} characters"
            ));
        }
        if let Some(bad) = raw
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '_'))
        {
            return Err(format!(
                "stage identifier '{raw}' contains invalid character '{bad}' \
                 (allowed: lowercase letters, digits, '-', '_')"
            ));
        }
        Ok(Self(raw))
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for StageId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StageId> for String {
    fn from(value: StageId) -> Self {
        value.0
    }
}

/// Run-level rule for what a stage failure does to the rest of the run.
///
/// - `Strict` (default): a failed stage marks every remaining unexecuted
///   stage as skipped and the run ends in failure.
/// - `Degrade`: only stages that transitively depend on the failed stage
///   are skipped; independent stages still execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    #[default]
    Strict,
    Degrade,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => f.write_str("strict"),
            Self::Degrade => f.write_str("degrade"),
        }
    }
}
