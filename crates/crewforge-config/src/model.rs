use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

use crewforge_pipeline::{ArtifactSpec, OutputDescriptor, Pipeline, StageSpec, WorkerSpec};
use crewforge_utils::error::ConfigError;
use crewforge_utils::paths::validate_artifact_path;
use crewforge_utils::types::{FailurePolicy, StageId};

/// Default configuration file name, looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = "crewforge.toml";

/// Default environment variable holding the backend credential.
pub const DEFAULT_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

const DEFAULT_RETRY_BUDGET: u32 = 2;
const DEFAULT_BACKOFF_MS: u64 = 1_000;
const DEFAULT_OUTPUT_DIR: &str = "out";
const DEFAULT_PROVIDER: &str = "anthropic";
const DEFAULT_MAX_TOKENS: u32 = 8_192;
const DEFAULT_TEMPERATURE: f32 = 0.1;
const DEFAULT_MAX_ITERATIONS: u32 = 3;
const DEFAULT_CALL_TIMEOUT_SECS: u64 = 300;

/// Run-level options from the `[run]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// What a stage failure does to the rest of the run.
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Maximum transient-error retries per backend call, independent of
    /// worker iteration bounds.
    #[serde(default = "default_retry_budget")]
    pub backend_retry_budget: u32,
    /// Base delay between transient-error retries; doubles per retry.
    #[serde(default = "default_backoff_ms")]
    pub backend_backoff_ms: u64,
    /// Directory stage outputs and the run report are written under.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            backend_retry_budget: DEFAULT_RETRY_BUDGET,
            backend_backoff_ms: DEFAULT_BACKOFF_MS,
            output_dir: DEFAULT_OUTPUT_DIR.to_string(),
        }
    }
}

impl RunConfig {
    /// Base backoff as a duration.
    #[must_use]
    pub fn backend_backoff(&self) -> Duration {
        Duration::from_millis(self.backend_backoff_ms)
    }
}

fn default_retry_budget() -> u32 {
    DEFAULT_RETRY_BUDGET
}

fn default_backoff_ms() -> u64 {
    DEFAULT_BACKOFF_MS
}

fn default_output_dir() -> String {
    DEFAULT_OUTPUT_DIR.to_string()
}

/// Generator backend options from the `[generator]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Provider name. `anthropic` is the production provider; `stub` is
    /// available in builds with the `test-utils` feature.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Default model; workers may override per stage.
    #[serde(default)]
    pub model: Option<String>,
    /// Environment variable the API key is read from. The key itself is
    /// never stored in configuration.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Custom API endpoint; `None` uses the provider default.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            model: None,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            base_url: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

fn default_provider() -> String {
    DEFAULT_PROVIDER.to_string()
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

/// One `[[workers]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub name: String,
    pub objective: String,
    #[serde(default)]
    pub narrative: String,
    #[serde(default)]
    pub permitted_ops: Vec<String>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default)]
    pub model: Option<String>,
}

fn default_max_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}

fn default_call_timeout_secs() -> u64 {
    DEFAULT_CALL_TIMEOUT_SECS
}

/// One `[[stages]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub id: String,
    pub worker: String,
    pub instructions: String,
    #[serde(default)]
    pub deps: Vec<String>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub outputs: Vec<ArtifactConfig>,
}

/// One `[[stages.outputs]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    pub path: String,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

/// The full configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub workers: Vec<WorkerConfig>,
    #[serde(default)]
    pub stages: Vec<StageConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` when the file does not exist and
    /// `ConfigError::InvalidFile` when it fails to parse.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound {
                    path: path.to_string(),
                }
            } else {
                ConfigError::InvalidFile(format!("failed to read '{path}': {e}"))
            }
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidFile` on TOML syntax or shape errors.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::InvalidFile(e.to_string()))
    }

    /// Verify the backend credential is present in the environment.
    ///
    /// The `stub` provider needs no credential.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingCredential` naming the environment
    /// variable when it is unset or empty.
    pub fn check_credential(&self) -> Result<(), ConfigError> {
        if self.generator.provider == "stub" {
            return Ok(());
        }
        match std::env::var(&self.generator.api_key_env) {
            Ok(value) if !value.is_empty() => Ok(()),
            _ => Err(ConfigError::MissingCredential {
                env_var: self.generator.api_key_env.clone(),
            }),
        }
    }

    /// Convert the parsed configuration into a validated [`Pipeline`].
    ///
    /// Collects every conversion problem (bad identifiers, bad artifact
    /// paths) before handing off to [`Pipeline::new`], which performs the
    /// cross-reference checks.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` listing all violations.
    pub fn pipeline(&self) -> Result<Pipeline, ConfigError> {
        let mut errors = Vec::new();

        let workers: Vec<WorkerSpec> = self
            .workers
            .iter()
            .map(|w| WorkerSpec {
                name: w.name.clone(),
                objective: w.objective.clone(),
                narrative: w.narrative.clone(),
                permitted_ops: w.permitted_ops.iter().cloned().collect::<BTreeSet<_>>(),
                max_iterations: w.max_iterations,
                call_timeout: Duration::from_secs(w.call_timeout_secs),
                model: w.model.clone(),
            })
            .collect();

        let mut stages = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            let id = match StageId::new(stage.id.clone()) {
                Ok(id) => id,
                Err(reason) => {
                    errors.push(format!("stage '{}': {reason}", stage.id));
                    continue;
                }
            };

            let mut deps = Vec::with_capacity(stage.deps.len());
            for dep in &stage.deps {
                match StageId::new(dep.clone()) {
                    Ok(dep) => deps.push(dep),
                    Err(reason) => errors.push(format!("stage '{id}' dependency: {reason}")),
                }
            }

            let mut artifacts = Vec::with_capacity(stage.outputs.len());
            for artifact in &stage.outputs {
                match validate_artifact_path(&artifact.path) {
                    Ok(path) => artifacts.push(ArtifactSpec {
                        path,
                        required: artifact.required,
                    }),
                    Err(reason) => errors.push(format!(
                        "stage '{id}' artifact '{}': {reason}",
                        artifact.path
                    )),
                }
            }

            stages.push(StageSpec {
                id,
                instructions: stage.instructions.clone(),
                worker: stage.worker.clone(),
                deps,
                outputs: OutputDescriptor { artifacts },
                optional: stage.optional,
            });
        }

        if !errors.is_empty() {
            return Err(ConfigError::validation(errors));
        }

        Pipeline::new(workers, stages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [[workers]]
        name = "writer"
        objective = "write documents"
        permitted_ops = ["write_file"]

        [[stages]]
        id = "draft"
        worker = "writer"
        instructions = "Write the draft."

        [[stages.outputs]]
        path = "docs/draft.md"
    "#;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let config = Config::parse(MINIMAL).unwrap();

        assert_eq!(config.run.failure_policy, FailurePolicy::Strict);
        assert_eq!(config.run.backend_retry_budget, 2);
        assert_eq!(config.run.output_dir, "out");
        assert_eq!(config.generator.provider, "anthropic");
        assert_eq!(config.generator.api_key_env, DEFAULT_API_KEY_ENV);
        assert_eq!(config.workers[0].max_iterations, 3);
        assert_eq!(config.workers[0].call_timeout_secs, 300);
        assert!(config.stages[0].outputs[0].required);
    }

    #[test]
    fn builds_pipeline_from_config() {
        let config = Config::parse(MINIMAL).unwrap();
        let pipeline = config.pipeline().unwrap();

        assert_eq!(pipeline.stages().len(), 1);
        let stage = &pipeline.stages()[0];
        assert_eq!(stage.id.as_str(), "draft");
        assert_eq!(stage.outputs.artifacts[0].path.as_str(), "docs/draft.md");
        assert_eq!(
            pipeline.worker_for(stage).call_timeout,
            Duration::from_secs(300)
        );
    }

    #[test]
    fn rejects_bad_identifiers_and_paths_together() {
        let config = Config::parse(
            r#"
            [[workers]]
            name = "writer"
            objective = "write"
            permitted_ops = ["write_file"]

            [[stages]]
            id = "Bad Stage"
            worker = "writer"
            instructions = "x"

            [[stages]]
            id = "ok"
            worker = "writer"
            instructions = "x"

            [[stages.outputs]]
            path = "../escape.md"
            "#,
        )
        .unwrap();

        let err = config.pipeline().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("invalid character"));
        assert!(message.contains("parent directory traversal"));
    }

    #[test]
    fn run_options_parse() {
        let config = Config::parse(
            r#"
            [run]
            failure_policy = "degrade"
            backend_retry_budget = 5
            backend_backoff_ms = 250
            output_dir = "generated"

            [[workers]]
            name = "writer"
            objective = "write"

            [[stages]]
            id = "a"
            worker = "writer"
            instructions = "x"
            "#,
        )
        .unwrap();

        assert_eq!(config.run.failure_policy, FailurePolicy::Degrade);
        assert_eq!(config.run.backend_retry_budget, 5);
        assert_eq!(config.run.backend_backoff(), Duration::from_millis(250));
        assert_eq!(config.run.output_dir, "generated");
    }

    #[test]
    fn missing_credential_is_reported() {
        let mut config = Config::parse(MINIMAL).unwrap();
        config.generator.api_key_env = "CREWFORGE_TEST_KEY_THAT_IS_UNSET".to_string();

        let err = config.check_credential().unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential { .. }));
        assert!(err.to_string().contains("CREWFORGE_TEST_KEY_THAT_IS_UNSET"));
    }

    #[test]
    fn stub_provider_needs_no_credential() {
        let mut config = Config::parse(MINIMAL).unwrap();
        config.generator.provider = "stub".to_string();
        config.generator.api_key_env = "CREWFORGE_TEST_KEY_THAT_IS_UNSET".to_string();

        assert!(config.check_credential().is_ok());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load("/nonexistent/crewforge.toml").unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn shipped_demo_config_is_valid() {
        let content = include_str!("../../../demos/crewforge.toml");
        let config = Config::parse(content).unwrap();
        let pipeline = config.pipeline().unwrap();

        assert_eq!(pipeline.stages().len(), 6);
        // The demo wires the classic team: every later stage reads the
        // requirements produced by the first one.
        assert!(pipeline.stages()[1..]
            .iter()
            .all(|s| s.deps.iter().any(|d| d.as_str() == "requirements")));
    }
}
