//! Running artifacts on engines, with health-checked diagnostics.
//!
//! [`Dispatcher`] is the entry point of this crate. It:
//!
//! 1. Builds the command for the chosen engine (see [`CommandBuilder`])
//! 2. Spawns it with the requested stdio policy and waits, with a timeout
//! 3. Checks the exit code against the expected one
//!
//! When the engine cannot be spawned, fails mid-run, or times out, the
//! dispatcher first makes sure the engine itself works by running the
//! canonical hello-world artifact through it (once per executable, cached).
//! A broken engine turns into the fatal [`DispatchError::EngineBroken`];
//! otherwise the original error is returned unchanged. Successful calls never
//! pay for a health check.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use engine_dispatch_common::{ConfigFile, DispatchConfig, DispatchError};

use crate::command::{CommandBuilder, CommandLine, duration_ms};
use crate::engine::{EngineProfile, EngineSpec};
use crate::health::{EngineHealthCache, HealthStatus};
use crate::process::{
    ExitOutcome, OutputMode, ProcessLauncher, ProcessRequest, StdinMode, TokioLauncher,
};

/// Per-call options for [`Dispatcher::execute`].
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Engine to use. `None` selects the dispatcher's default engine.
    pub engine: Option<EngineSpec>,
    /// Arguments passed to the script.
    pub args: Vec<String>,
    /// Stdin source.
    pub stdin: StdinMode,
    /// Stdout handling.
    pub stdout: OutputMode,
    /// Stderr handling.
    pub stderr: OutputMode,
    /// Working directory for the engine process.
    pub working_dir: Option<PathBuf>,
    /// Append captured stderr to [`ExecutionResult::output`].
    pub full_output: bool,
    /// Exit code the process must return. `None` disables the check.
    pub expected_exit_code: Option<i32>,
    /// Do not health-check the engine when the call fails.
    pub skip_health_gate: bool,
    /// Overrides the configured timeout for this call.
    pub timeout: Option<Duration>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            engine: None,
            args: Vec::new(),
            stdin: StdinMode::Null,
            stdout: OutputMode::Capture,
            stderr: OutputMode::Inherit,
            working_dir: None,
            full_output: false,
            expected_exit_code: Some(0),
            skip_health_gate: false,
            timeout: None,
        }
    }
}

impl ExecuteOptions {
    /// Options with the defaults: capture stdout, inherit stderr, no stdin,
    /// expect exit code 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run on this engine instead of the default one.
    pub fn with_engine(mut self, engine: EngineSpec) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Pass these arguments to the script.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the stdin source.
    pub fn with_stdin(mut self, stdin: StdinMode) -> Self {
        self.stdin = stdin;
        self
    }

    /// Set stdout handling.
    pub fn with_stdout(mut self, stdout: OutputMode) -> Self {
        self.stdout = stdout;
        self
    }

    /// Set stderr handling.
    pub fn with_stderr(mut self, stderr: OutputMode) -> Self {
        self.stderr = stderr;
        self
    }

    /// Run the engine in `dir`.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Include captured stderr in the returned output.
    pub fn with_full_output(mut self) -> Self {
        self.full_output = true;
        self
    }

    /// Require this exit code.
    pub fn expect_exit_code(mut self, code: i32) -> Self {
        self.expected_exit_code = Some(code);
        self
    }

    /// Accept any exit code.
    pub fn without_exit_code_check(mut self) -> Self {
        self.expected_exit_code = None;
        self
    }

    /// Surface failures without health-checking the engine.
    pub fn skip_health_gate(mut self) -> Self {
        self.skip_health_gate = true;
        self
    }

    /// Kill the process after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Result of a completed execution.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// The command that ran.
    pub command: CommandLine,
    /// Captured stdout, followed by captured stderr when full output was
    /// requested.
    pub output: String,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
    /// Exit code; a process killed by signal `n` reports `128 + n`.
    pub exit_code: i32,
    /// Terminating signal, if any.
    pub signal: Option<i32>,
    /// Wall-clock run time.
    pub duration: Duration,
}

impl ExecutionResult {
    /// Returns `true` if the process exited with code 0.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs artifacts on engines and validates engine health.
pub struct Dispatcher {
    config: DispatchConfig,
    engines: Vec<EngineSpec>,
    builder: CommandBuilder,
    health: EngineHealthCache,
    launcher: Arc<dyn ProcessLauncher>,
}

impl Dispatcher {
    /// Create a dispatcher that spawns real processes.
    ///
    /// The first of `engines` is the default engine.
    pub fn new(config: DispatchConfig, engines: Vec<EngineSpec>) -> Self {
        Self::with_launcher(config, engines, Arc::new(TokioLauncher))
    }

    /// Create a dispatcher on top of a custom process launcher.
    pub fn with_launcher(
        config: DispatchConfig,
        engines: Vec<EngineSpec>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        let builder = CommandBuilder::new(config.aot_compiler.clone());
        Self {
            config,
            engines,
            builder,
            health: EngineHealthCache::new(),
            launcher,
        }
    }

    /// Create a dispatcher from a loaded configuration file.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if an engine entry has an empty command.
    pub fn from_config_file(file: &ConfigFile) -> Result<Self, DispatchError> {
        let engines = file
            .engines
            .iter()
            .map(EngineSpec::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(file.runtime.clone(), engines))
    }

    /// Get the dispatch configuration.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Get the configured engines.
    pub fn engines(&self) -> &[EngineSpec] {
        &self.engines
    }

    /// Get the health cache.
    pub fn health_cache(&self) -> &EngineHealthCache {
        &self.health
    }

    /// The default engine (the first configured one).
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if no engine is configured.
    pub fn default_engine(&self) -> Result<&EngineSpec, DispatchError> {
        self.engines
            .first()
            .ok_or_else(|| DispatchError::invalid_config("no engine configured"))
    }

    /// Classify `engine` using the configured AOT compiler identity.
    pub fn profile(&self, engine: &EngineSpec) -> EngineProfile {
        self.builder.profile(engine)
    }

    /// Build the command that would run `artifact` on `engine`.
    ///
    /// For the AOT compiler this performs the build step.
    pub async fn build_command(
        &self,
        artifact: &Path,
        engine: &EngineSpec,
        args: &[String],
    ) -> Result<CommandLine, DispatchError> {
        self.builder
            .build(
                self.launcher.as_ref(),
                artifact,
                engine,
                args,
                self.config.execution.timeout(),
            )
            .await
    }

    /// Run `artifact` and return its output.
    ///
    /// # Errors
    ///
    /// - `ArtifactNotFound` if `artifact` does not exist (nothing is spawned)
    /// - `StdinUnavailable` if the stdin file cannot be opened (nothing is
    ///   spawned)
    /// - `BuildFailed` if the AOT build step fails
    /// - `SpawnFailed`, `RuntimeFailure`, `Timeout` if the engine process
    ///   fails; the engine is health-checked first
    /// - `EngineBroken` if that health check fails
    /// - `ExitCodeMismatch` if the exit code is not the expected one
    pub async fn execute(
        &self,
        artifact: impl AsRef<Path>,
        options: ExecuteOptions,
    ) -> Result<ExecutionResult, DispatchError> {
        let artifact = artifact.as_ref();
        let span = info_span!(
            "execute",
            run_id = %Uuid::new_v4(),
            artifact = %artifact.display()
        );

        self.execute_gated(artifact, &options).instrument(span).await
    }

    async fn execute_gated(
        &self,
        artifact: &Path,
        options: &ExecuteOptions,
    ) -> Result<ExecutionResult, DispatchError> {
        let engine = match &options.engine {
            Some(engine) => engine.clone(),
            None => self.default_engine()?.clone(),
        };

        match self.run(artifact, &engine, options).await {
            Err(err) if err.is_engine_failure() && !options.skip_health_gate => {
                warn!(engine = %engine, error = %err, "Execution failed, checking engine");
                // A broken engine replaces the original error.
                self.require_health(&engine).await?;
                Err(err)
            }
            other => other,
        }
    }

    /// Check whether `engine` works, using the cached result if there is one.
    ///
    /// Runs the configured hello-world artifact through the engine, without
    /// health gating or exit-code checking, and requires its stdout to contain
    /// the expected greeting. The result is cached by executable path.
    pub async fn check_health(&self, engine: &EngineSpec) -> HealthStatus {
        let key = engine.executable();
        if let Some(status) = self.health.get(key) {
            return status;
        }

        debug!(engine = %engine, "Checking engine");

        let health = &self.config.health;
        let options = ExecuteOptions::new()
            .with_engine(engine.clone())
            .without_exit_code_check()
            .skip_health_gate();

        let status = match self.run(&health.artifact, engine, &options).await {
            Ok(result) if result.output.contains(&health.expected_output) => HealthStatus::Working,
            Ok(result) => {
                info!(
                    engine = %engine,
                    output = %result.output,
                    "Checking engine failed: unexpected output. Check your config file"
                );
                HealthStatus::Broken
            }
            Err(err) => {
                info!(
                    engine = %engine,
                    error = %err,
                    "Checking engine failed. Check your config file"
                );
                HealthStatus::Broken
            }
        };

        self.health.record(key, status)
    }

    /// Require `engine` to be healthy.
    ///
    /// The AOT compiler pseudo-engine is never checked.
    ///
    /// # Errors
    ///
    /// Returns the fatal `EngineBroken` if the engine failed its health check.
    pub async fn require_health(&self, engine: &EngineSpec) -> Result<(), DispatchError> {
        if self.profile(engine).is_compiler() {
            return Ok(());
        }

        if self.check_health(engine).await.is_working() {
            return Ok(());
        }

        error!(
            engine = %engine,
            path = engine.executable(),
            "The engine does not seem to work, check the paths in the config file"
        );
        Err(DispatchError::engine_broken(
            engine.to_string(),
            engine.executable(),
        ))
    }

    /// Build, spawn, wait and check the exit code, without health gating.
    async fn run(
        &self,
        artifact: &Path,
        engine: &EngineSpec,
        options: &ExecuteOptions,
    ) -> Result<ExecutionResult, DispatchError> {
        if !artifact.exists() {
            return Err(DispatchError::artifact_not_found(
                artifact.display().to_string(),
            ));
        }

        if let StdinMode::File(path) = &options.stdin {
            std::fs::File::open(path).map_err(|e| {
                DispatchError::stdin_unavailable(path.display().to_string(), e)
            })?;
        }

        let timeout = options.timeout.or_else(|| self.config.execution.timeout());
        let command = self
            .builder
            .build(
                self.launcher.as_ref(),
                artifact,
                engine,
                &options.args,
                timeout,
            )
            .await?;

        let request = ProcessRequest {
            command: command.clone(),
            stdin: options.stdin.clone(),
            stdout: options.stdout,
            stderr: options.stderr,
            working_dir: options.working_dir.clone(),
        };

        let mut process = self
            .launcher
            .spawn(&request)
            .await
            .map_err(|e| DispatchError::spawn_failed(command.to_string(), e))?;

        let output = process
            .wait(timeout)
            .await
            .map_err(|e| DispatchError::runtime_failure(command.to_string(), e))?;

        let exit_code = match output.outcome.code() {
            Some(code) => code,
            None => {
                return Err(DispatchError::Timeout {
                    command: command.to_string(),
                    duration_ms: timeout.map_or(0, duration_ms),
                });
            }
        };
        let signal = match output.outcome {
            ExitOutcome::Signaled(signal) => Some(signal),
            _ => None,
        };

        let stdout = output.stdout_text();
        let stderr = output.stderr_text();
        let combined = if options.full_output {
            format!("{stdout}{stderr}")
        } else {
            stdout.clone()
        };

        let result = ExecutionResult {
            command,
            output: combined,
            stdout,
            stderr,
            exit_code,
            signal,
            duration: output.duration,
        };

        debug!(
            exit_code,
            duration_ms = result.duration.as_millis(),
            "Execution finished"
        );

        match options.expected_exit_code {
            Some(expected) if expected != exit_code => Err(DispatchError::ExitCodeMismatch {
                command: result.command.to_string(),
                expected,
                actual: exit_code,
                output: result.output,
            }),
            _ => Ok(result),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("engines", &self.engines.len())
            .field("aot_compiler", &self.config.aot_compiler)
            .field("checked_engines", &self.health.len())
            .finish_non_exhaustive()
    }
}
