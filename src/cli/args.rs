//! CLI argument definitions.

use clap::{Parser, Subcommand};

use crewforge_config::DEFAULT_CONFIG_FILE;

/// crewforge - staged generative pipeline orchestrator
#[derive(Parser)]
#[command(name = "crewforge")]
#[command(about = "Runs a dependency-ordered pipeline of generative worker stages")]
#[command(long_about = r#"
crewforge drives a fixed pipeline of specialized worker stages, each stage
fulfilled by a generative reasoning backend, to synthesize a multi-file
software artifact. Stages declare dependencies on earlier stages and the
outputs they must produce; the engine orders them, feeds each stage the
outputs of its dependencies, validates what comes back, and retries with
feedback inside each worker's iteration budget.

EXAMPLES:
  # Run the full pipeline
  ANTHROPIC_API_KEY=... crewforge run --config demos/crewforge.toml

  # See the resolved execution order without invoking the backend
  crewforge plan --config demos/crewforge.toml

  # Check configuration and credential presence
  crewforge validate --config demos/crewforge.toml

CONFIGURATION:
  A single TOML file defines the pipeline: [run] options, the [generator]
  backend, [[workers]] capability descriptors, and [[stages]]. The backend
  credential is environment-sourced (api_key_env) and never part of the
  configuration file.

EXIT CODES:
  0  every stage succeeded
  2  invalid configuration; nothing executed
  3  the pipeline ran but at least one stage failed
  130  run cancelled by the operator
"#)]
#[command(version)]
pub struct Cli {
    /// Path to the pipeline configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,

    /// Enable debug-level diagnostics on stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline to completion or terminal failure
    Run {
        /// Resolve and print the plan without invoking the backend
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the resolved execution order
    Plan,
    /// Validate configuration and credential presence without running
    Validate,
}
