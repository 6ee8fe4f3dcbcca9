//! Configuration loading for crewforge.
//!
//! A single TOML file defines the whole pipeline: run-level options
//! (`[run]`), the generator backend (`[generator]`), worker capability
//! descriptors (`[[workers]]`), and the stage list (`[[stages]]`).
//! Loading is split from validation: [`Config::load`] only parses;
//! [`Config::pipeline`] performs the cross-reference checks and produces
//! the immutable pipeline the engine runs.
//!
//! The backend credential is never part of the configuration file. The
//! file names an environment variable (`api_key_env`) and
//! [`Config::check_credential`] verifies its presence before any stage
//! executes.

mod model;

pub use model::{
    ArtifactConfig, Config, GeneratorConfig, RunConfig, StageConfig, WorkerConfig,
    DEFAULT_API_KEY_ENV, DEFAULT_CONFIG_FILE,
};
