//! engine-dispatch CLI entry point.
//!
//! Runs compiled artifacts on configured engines, prints the command lines
//! the dispatcher would use, and health-checks engines.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use engine_dispatch_common::{ConfigFile, DispatchError, LoggingConfig};
use engine_dispatch_core::{Dispatcher, EngineSpec, ExecuteOptions, OutputMode, StdinMode};

#[derive(Parser)]
#[command(name = "engine-dispatch", version)]
#[command(about = "Run compiled JS/Wasm artifacts on external engines.", long_about = None)]
struct Cli {
    /// Configuration file (TOML).
    #[arg(long, global = true, env = "ENGINE_DISPATCH_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an artifact and print its output.
    Run(RunArgs),
    /// Print the command line that runs an artifact.
    Command(CommandArgs),
    /// Health-check engines.
    Check {
        /// Engine ids or executable paths. Defaults to every configured engine.
        #[arg(value_name = "ENGINE")]
        engines: Vec<String>,
    },
}

#[derive(Args)]
struct RunArgs {
    artifact: PathBuf,

    /// Engine id from the config file, or an executable path.
    #[arg(long, value_name = "ID|PATH")]
    engine: Option<String>,

    /// Exit code the artifact must return.
    #[arg(long, value_name = "N", allow_negative_numbers = true, conflicts_with = "no_exit_check")]
    expect_exit: Option<i32>,

    /// Accept any exit code.
    #[arg(long)]
    no_exit_check: bool,

    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Working directory for the engine.
    #[arg(long, value_name = "DIR")]
    cwd: Option<PathBuf>,

    /// Forward stdin to the engine.
    #[arg(long)]
    stdin: bool,

    /// Append the engine's stderr to the printed output.
    #[arg(long)]
    full_output: bool,

    /// Pass the engine's stdout through as it runs instead of capturing it.
    #[arg(long, conflicts_with = "full_output")]
    stream: bool,

    /// Report failures without health-checking the engine.
    #[arg(long)]
    skip_health_check: bool,

    /// Arguments passed to the script.
    #[arg(last = true)]
    args: Vec<String>,
}

#[derive(Args)]
struct CommandArgs {
    artifact: PathBuf,

    /// Engine id from the config file, or an executable path.
    #[arg(long, value_name = "ID|PATH")]
    engine: Option<String>,

    /// Arguments passed to the script.
    #[arg(last = true)]
    args: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let file = load_config(cli.config.as_deref())?;
    init_tracing(&file.logging);

    let dispatcher = Dispatcher::from_config_file(&file).context("Invalid engine configuration")?;
    debug!(
        engines = dispatcher.engines().len(),
        aot_compiler = ?dispatcher.config().aot_compiler,
        timeout = ?dispatcher.config().execution.timeout(),
        "Dispatcher ready"
    );

    match dispatch(cli.command, &file, &dispatcher).await {
        Ok(code) => Ok(code),
        Err(err) => match err.downcast_ref::<DispatchError>() {
            // Already logged by the dispatcher.
            Some(fatal) if fatal.is_fatal() => {
                eprintln!("{fatal}");
                Ok(ExitCode::FAILURE)
            }
            _ => Err(err),
        },
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ConfigFile> {
    match path {
        Some(path) => ConfigFile::from_file(path)
            .with_context(|| format!("Failed to load config file {}", path.display())),
        None => Ok(ConfigFile::default()),
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    let registry = tracing_subscriber::registry().with(filter);

    // Stdout belongs to the artifact's output.
    if logging.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn dispatch(
    command: Commands,
    file: &ConfigFile,
    dispatcher: &Dispatcher,
) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Run(args) => run(args, file, dispatcher).await,
        Commands::Command(args) => {
            let engine = select_engine(file, dispatcher, args.engine.as_deref())?;
            let command = dispatcher
                .build_command(&args.artifact, &engine, &args.args)
                .await
                .context("Failed to build command")?;
            println!("{command}");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check { engines } => check(&engines, file, dispatcher).await,
    }
}

async fn run(args: RunArgs, file: &ConfigFile, dispatcher: &Dispatcher) -> anyhow::Result<ExitCode> {
    let engine = select_engine(file, dispatcher, args.engine.as_deref())?;

    let mut options = ExecuteOptions::new()
        .with_engine(engine)
        .with_args(args.args);
    if let Some(code) = args.expect_exit {
        options = options.expect_exit_code(code);
    }
    if args.no_exit_check {
        options = options.without_exit_code_check();
    }
    if let Some(ms) = args.timeout_ms {
        options = options.with_timeout(Duration::from_millis(ms));
    }
    if let Some(dir) = args.cwd {
        options = options.with_working_dir(dir);
    }
    if args.stdin {
        options = options.with_stdin(StdinMode::Inherit);
    }
    if args.full_output {
        options = options
            .with_stderr(OutputMode::Capture)
            .with_full_output();
    }
    if args.stream {
        options = options.with_stdout(OutputMode::Inherit);
    }
    if args.skip_health_check {
        options = options.skip_health_gate();
    }

    let result = dispatcher
        .execute(&args.artifact, options)
        .await
        .with_context(|| format!("Failed to run {}", args.artifact.display()))?;

    print!("{}", result.output);
    info!(
        exit_code = result.exit_code,
        duration_ms = result.duration.as_millis(),
        "Artifact finished"
    );

    Ok(ExitCode::from(exit_status(result.exit_code, !args.no_exit_check)))
}

async fn check(
    names: &[String],
    file: &ConfigFile,
    dispatcher: &Dispatcher,
) -> anyhow::Result<ExitCode> {
    let engines = if names.is_empty() {
        dispatcher.engines().to_vec()
    } else {
        names
            .iter()
            .map(|name| resolve_engine(file, name))
            .collect::<Result<Vec<_>, _>>()?
    };

    if engines.is_empty() {
        anyhow::bail!("No engine configured");
    }

    for engine in &engines {
        let status = dispatcher.check_health(engine).await;
        debug!(
            engine = %engine,
            profile = %dispatcher.profile(engine),
            %status,
            "Engine checked"
        );
    }

    // One line per executable; engines sharing one share a result.
    let report = dispatcher.health_cache().snapshot();
    for (executable, status) in &report {
        println!("{executable}\t{status}");
    }

    if report.iter().all(|(_, status)| status.is_working()) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Process exit status for a finished `run`.
///
/// A checked run only gets here when the exit code matched, so it succeeded.
/// Unchecked runs report the artifact's own exit code.
fn exit_status(exit_code: i32, checked: bool) -> u8 {
    if checked {
        return 0;
    }
    u8::try_from(exit_code).unwrap_or(1)
}

/// The engine named on the command line, or the default engine.
fn select_engine(
    file: &ConfigFile,
    dispatcher: &Dispatcher,
    name: Option<&str>,
) -> Result<EngineSpec, DispatchError> {
    match name {
        Some(name) => resolve_engine(file, name),
        None => dispatcher.default_engine().cloned(),
    }
}

/// A configured engine id, falling back to a bare executable path.
fn resolve_engine(file: &ConfigFile, name: &str) -> Result<EngineSpec, DispatchError> {
    match file.find_engine(name) {
        Some(entry) => EngineSpec::try_from(entry),
        None => EngineSpec::executable_only(name),
    }
}
