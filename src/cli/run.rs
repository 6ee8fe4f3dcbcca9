//! Command dispatch.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crewforge_backend::GeneratorBackend;
use crewforge_config::Config;
use crewforge_engine::{CancelToken, PipelineRunner, ProgressEvent};
use crewforge_graph::resolve_order;
use crewforge_pipeline::Pipeline;
use crewforge_sink::FsSink;
use crewforge_utils::error::CrewforgeError;
use crewforge_utils::types::StageId;
use crewforge_utils::ExitCode;

use super::args::{Cli, Commands};

/// Parse arguments, set up tracing, and execute the chosen command.
///
/// # Errors
///
/// Returns the exit code to terminate with. All error output has already
/// been printed when this returns.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let runtime = tokio::runtime::Runtime::new().map_err(|e| {
        eprintln!("error: failed to start async runtime: {e}");
        ExitCode::INTERNAL
    })?;

    runtime.block_on(execute(cli))
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn execute(cli: Cli) -> Result<(), ExitCode> {
    let config = Config::load(&cli.config).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::CLI_ARGS
    })?;

    let pipeline = config.pipeline().map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::CLI_ARGS
    })?;

    match cli.command {
        Commands::Validate => validate(&config, &pipeline),
        Commands::Plan => plan(&pipeline),
        Commands::Run { dry_run } => {
            if dry_run {
                println!("dry run: no backend calls will be made\n");
                return plan(&pipeline);
            }
            run_pipeline(&config, &pipeline).await
        }
    }
}

fn resolved_order(pipeline: &Pipeline) -> Result<Vec<StageId>, ExitCode> {
    resolve_order(pipeline.stages()).map_err(|e| {
        eprintln!("error: {}", CrewforgeError::from(e));
        ExitCode::CLI_ARGS
    })
}

fn validate(config: &Config, pipeline: &Pipeline) -> Result<(), ExitCode> {
    resolved_order(pipeline)?;

    config.check_credential().map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::CLI_ARGS
    })?;

    println!(
        "configuration valid: {} worker(s), {} stage(s), policy {}",
        pipeline.workers().len(),
        pipeline.stages().len(),
        config.run.failure_policy,
    );
    Ok(())
}

fn plan(pipeline: &Pipeline) -> Result<(), ExitCode> {
    let order = resolved_order(pipeline)?;
    let total = order.len();

    println!("execution order ({total} stages):");
    for (index, stage_id) in order.iter().enumerate() {
        let stage = pipeline
            .stage(stage_id)
            .expect("resolver yields identities from this stage set");
        let deps = if stage.deps.is_empty() {
            "no dependencies".to_string()
        } else {
            let names: Vec<&str> = stage.deps.iter().map(StageId::as_str).collect();
            format!("after {}", names.join(", "))
        };
        println!(
            "  {:>2}. {:<24} worker={:<20} {}",
            index + 1,
            stage_id,
            stage.worker,
            deps
        );
    }
    Ok(())
}

async fn run_pipeline(config: &Config, pipeline: &Pipeline) -> Result<(), ExitCode> {
    config.check_credential().map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::CLI_ARGS
    })?;

    let backend: Box<dyn GeneratorBackend> = crewforge_backend::from_config(config).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::CLI_ARGS
    })?;

    let sink = FsSink::new(config.run.output_dir.clone());

    let cancel = CancelToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ncancellation requested, stopping after the current call...");
            signal_token.cancel();
        }
    });

    let total = pipeline.stages().len();
    let default_model = config.generator.model.clone().unwrap_or_default();

    let runner = PipelineRunner::new(
        pipeline,
        backend.as_ref(),
        &sink,
        config.run.failure_policy,
        default_model,
    )
    .with_cancel_token(cancel)
    .with_observer(Box::new(move |event| match event {
        ProgressEvent::StageStarted { stage, index, .. } => {
            println!("[{}/{}] {stage}: running...", index + 1, total);
        }
        ProgressEvent::StageFinished {
            stage,
            index,
            status,
            attempts,
            duration_ms,
        } => {
            println!(
                "[{}/{}] {stage}: {status} (attempts: {attempts}, {:.1}s)",
                index + 1,
                total,
                *duration_ms as f64 / 1000.0
            );
        }
        ProgressEvent::StageSkipped { stage, index, reason } => {
            println!("[{}/{}] {stage}: skipped ({reason})", index + 1, total);
        }
    }));

    let report = runner.run().await.map_err(|e| {
        eprintln!("error: {e}");
        e.to_exit_code()
    })?;

    let json = report.to_json().map_err(|e| {
        eprintln!("error: failed to serialize run report: {e}");
        ExitCode::INTERNAL
    })?;
    let report_path = sink.write_report(&json).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::INTERNAL
    })?;

    println!("\n{}", report.summary());
    println!("\nrun report written to {report_path}");

    if report.cancelled {
        Err(ExitCode::INTERRUPTED)
    } else if report.success() {
        Ok(())
    } else {
        Err(ExitCode::RUN_FAILED)
    }
}
