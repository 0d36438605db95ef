//! Per-engine command construction.
//!
//! [`CommandBuilder`] turns an artifact path, an [`EngineSpec`] and script
//! arguments into the argument vector that runs the artifact on that engine:
//!
//! ```text
//! [engine tokens] [subcommand] [artifact] [shell flags] [--] [script args]
//! ```
//!
//! # Artifact rewriting
//!
//! - **Wasm runtimes** run `<base>.wasm` instead of the named script.
//! - **AOT compiler**: `<base>.wasm.c` is compiled to `<base>.exe` first,
//!   then the executable runs on its own, without any engine prefix.
//!
//! `<base>` is the artifact path with its last extension removed.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, instrument};

use engine_dispatch_common::DispatchError;

use crate::engine::{ARG_SEPARATOR, EngineProfile, EngineSpec};
use crate::process::{ProcessLauncher, ProcessRequest};

/// A final argument vector, ready for direct execution.
///
/// No shell quoting or interpretation is implied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLine {
    tokens: Vec<String>,
}

impl CommandLine {
    /// Create a command line from its tokens.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    /// All tokens, program first.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// The program to execute.
    pub fn program(&self) -> Option<&str> {
        self.tokens.first().map(String::as_str)
    }

    /// Arguments after the program.
    pub fn args(&self) -> &[String] {
        self.tokens.get(1..).unwrap_or_default()
    }

    /// Split into program and arguments.
    pub fn split_program(&self) -> Option<(&str, &[String])> {
        self.tokens
            .split_first()
            .map(|(program, args)| (program.as_str(), args))
    }

    /// Number of tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns `true` if there are no tokens.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Consume into the token vector.
    pub fn into_tokens(self) -> Vec<String> {
        self.tokens
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tokens.join(" "))
    }
}

/// What has to happen before an artifact can run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandPlan {
    /// The command can run as is.
    Ready(CommandLine),
    /// A native executable must be built first.
    BuildThenRun {
        /// Compiler invocation producing `executable`.
        build: CommandLine,
        /// Path the build step writes.
        executable: PathBuf,
        /// Command to run once the build succeeded.
        run: CommandLine,
    },
}

/// Builds engine command lines.
#[derive(Debug, Clone, Default)]
pub struct CommandBuilder {
    aot_compiler: Option<String>,
}

impl CommandBuilder {
    /// Create a builder. `aot_compiler` is the executable identity of the
    /// ahead-of-time compiler pseudo-engine, if one is configured.
    pub fn new(aot_compiler: Option<String>) -> Self {
        Self { aot_compiler }
    }

    /// The configured ahead-of-time compiler identity.
    pub fn aot_compiler(&self) -> Option<&str> {
        self.aot_compiler.as_deref()
    }

    /// Classify `engine` with this builder's compiler identity.
    pub fn profile(&self, engine: &EngineSpec) -> EngineProfile {
        EngineProfile::classify(engine, self.aot_compiler())
    }

    /// Plan the command for `artifact` without running anything.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the built executable's absolute path cannot
    /// be resolved.
    pub fn plan(
        &self,
        artifact: &Path,
        engine: &EngineSpec,
        args: &[String],
    ) -> Result<CommandPlan, DispatchError> {
        let profile = self.profile(engine);

        if profile.is_compiler() {
            let source = artifact.with_extension("wasm.c");
            let executable = artifact.with_extension("exe");

            let mut build = engine.tokens().to_vec();
            build.push(path_token(&source));
            build.push("-o".to_string());
            build.push(path_token(&executable));

            let absolute = std::path::absolute(&executable).map_err(|e| {
                DispatchError::invalid_config(format!(
                    "cannot resolve built executable {}: {e}",
                    executable.display()
                ))
            })?;

            let mut run = vec![path_token(&absolute)];
            run.extend(args.iter().cloned());

            return Ok(CommandPlan::BuildThenRun {
                build: CommandLine::from_tokens(build),
                executable: absolute,
                run: CommandLine::from_tokens(run),
            });
        }

        let target = if profile.runs_wasm_binary() {
            artifact.with_extension("wasm")
        } else {
            artifact.to_path_buf()
        };

        let mut tokens = engine.tokens().to_vec();
        tokens.extend(profile.subcommand().map(String::from));
        tokens.push(path_token(&target));
        tokens.extend(profile.shell_flags().iter().map(|f| (*f).to_string()));
        if profile.needs_separator() {
            tokens.push(ARG_SEPARATOR.to_string());
        }
        tokens.extend(args.iter().cloned());

        Ok(CommandPlan::Ready(CommandLine::from_tokens(tokens)))
    }

    /// Build the command for `artifact`, running the AOT build step if needed.
    ///
    /// The build step is a nested, synchronous spawn-and-wait through
    /// `launcher`; it must exit with code 0.
    ///
    /// # Errors
    ///
    /// Returns `BuildFailed` wrapping the underlying failure if the build
    /// step cannot spawn, fails, times out, or exits non-zero.
    #[instrument(skip_all, fields(artifact = %artifact.display(), engine = %engine))]
    pub async fn build(
        &self,
        launcher: &dyn ProcessLauncher,
        artifact: &Path,
        engine: &EngineSpec,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<CommandLine, DispatchError> {
        match self.plan(artifact, engine, args)? {
            CommandPlan::Ready(command) => {
                debug!(command = %command, "Command built");
                Ok(command)
            }
            CommandPlan::BuildThenRun {
                build,
                executable,
                run,
            } => {
                info!(command = %build, "Building native executable");
                run_build_step(launcher, &build, timeout)
                    .await
                    .map_err(DispatchError::build_failed)?;
                debug!(executable = %executable.display(), "Native executable built");
                Ok(run)
            }
        }
    }
}

async fn run_build_step(
    launcher: &dyn ProcessLauncher,
    build: &CommandLine,
    timeout: Option<Duration>,
) -> Result<(), DispatchError> {
    let request = ProcessRequest::captured(build.clone());

    let mut process = launcher
        .spawn(&request)
        .await
        .map_err(|e| DispatchError::spawn_failed(build.to_string(), e))?;

    let output = process
        .wait(timeout)
        .await
        .map_err(|e| DispatchError::runtime_failure(build.to_string(), e))?;

    match output.outcome.code() {
        Some(0) => Ok(()),
        Some(actual) => Err(DispatchError::ExitCodeMismatch {
            command: build.to_string(),
            expected: 0,
            actual,
            output: format!("{}{}", output.stdout_text(), output.stderr_text()),
        }),
        None => Err(DispatchError::Timeout {
            command: build.to_string(),
            duration_ms: timeout.map_or(0, duration_ms),
        }),
    }
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn path_token(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(tokens: &[&str]) -> EngineSpec {
        EngineSpec::new(tokens.iter().copied()).unwrap()
    }

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| (*s).to_string()).collect()
    }

    fn ready(plan: CommandPlan) -> Vec<String> {
        match plan {
            CommandPlan::Ready(command) => command.into_tokens(),
            other => panic!("expected a ready command, got {other:?}"),
        }
    }

    #[test]
    fn test_generic_engine() {
        let builder = CommandBuilder::default();
        let plan = builder
            .plan(Path::new("hello_world.js"), &spec(&["node"]), &[])
            .unwrap();

        assert_eq!(ready(plan), vec!["node", "hello_world.js"]);
    }

    #[test]
    fn test_generic_engine_passes_args_without_separator() {
        let builder = CommandBuilder::default();
        let plan = builder
            .plan(
                Path::new("t.js"),
                &spec(&["node", "--stack-size=8192"]),
                &args(&["a", "b"]),
            )
            .unwrap();

        assert_eq!(ready(plan), vec!["node", "--stack-size=8192", "t.js", "a", "b"]);
    }

    #[test]
    fn test_v8_engine() {
        let builder = CommandBuilder::default();
        let plan = builder
            .plan(Path::new("t.js"), &spec(&["d8"]), &args(&["--flag"]))
            .unwrap();

        assert_eq!(
            ready(plan),
            vec!["d8", "t.js", "--no-wasm-async-compilation", "--", "--flag"]
        );
    }

    #[test]
    fn test_v8_engine_separator_without_args() {
        let builder = CommandBuilder::default();
        let plan = builder
            .plan(Path::new("t.js"), &spec(&["/opt/v8/d8_g"]), &[])
            .unwrap();

        let tokens = ready(plan);
        assert!(tokens.contains(&"--no-wasm-async-compilation".to_string()));
        assert_eq!(tokens.last().map(String::as_str), Some("--"));
    }

    #[test]
    fn test_jsc_engine() {
        let builder = CommandBuilder::default();
        let plan = builder
            .plan(Path::new("t.js"), &spec(&["jsc"]), &args(&["x"]))
            .unwrap();

        let tokens = ready(plan);
        assert_eq!(tokens, vec!["jsc", "t.js", "--", "x"]);
        assert!(!tokens.contains(&"--no-wasm-async-compilation".to_string()));
    }

    #[test]
    fn test_wasmtime_engine() {
        let builder = CommandBuilder::default();
        let plan = builder
            .plan(Path::new("out/t.js"), &spec(&["wasmtime"]), &args(&["x"]))
            .unwrap();

        assert_eq!(ready(plan), vec!["wasmtime", "out/t.wasm", "x"]);
    }

    #[test]
    fn test_wasmer_engine() {
        let builder = CommandBuilder::default();
        let plan = builder
            .plan(Path::new("t.js"), &spec(&["/usr/bin/wasmer"]), &args(&["x"]))
            .unwrap();

        assert_eq!(ready(plan), vec!["/usr/bin/wasmer", "run", "t.wasm", "x"]);
    }

    #[test]
    fn test_wasm_rewrite_strips_only_last_extension() {
        let builder = CommandBuilder::default();
        let plan = builder
            .plan(Path::new("a.b.js"), &spec(&["wasmtime"]), &[])
            .unwrap();

        assert_eq!(ready(plan), vec!["wasmtime", "a.b.wasm"]);
    }

    #[test]
    fn test_aot_compiler_plan() {
        let builder = CommandBuilder::new(Some("/usr/bin/clang".into()));
        let plan = builder
            .plan(Path::new("/tmp/out/t.js"), &spec(&["/usr/bin/clang", "-O2"]), &[])
            .unwrap();

        let CommandPlan::BuildThenRun {
            build,
            executable,
            run,
        } = plan
        else {
            panic!("expected a build step");
        };

        assert_eq!(
            build.tokens(),
            ["/usr/bin/clang", "-O2", "/tmp/out/t.wasm.c", "-o", "/tmp/out/t.exe"]
        );
        assert_eq!(executable, PathBuf::from("/tmp/out/t.exe"));
        assert_eq!(run.tokens(), ["/tmp/out/t.exe"]);
    }

    #[test]
    fn test_aot_compiler_relative_artifact_runs_absolute_path() {
        let builder = CommandBuilder::new(Some("cc".into()));
        let plan = builder
            .plan(Path::new("t.js"), &spec(&["cc"]), &args(&["x"]))
            .unwrap();

        let CommandPlan::BuildThenRun { run, .. } = plan else {
            panic!("expected a build step");
        };

        let program = Path::new(run.program().unwrap());
        assert!(program.is_absolute());
        assert!(program.ends_with("t.exe"));
        assert_eq!(run.args(), ["x"]);
    }

    #[test]
    fn test_command_line_display() {
        let command = CommandLine::from_tokens(["d8", "t.js", "--"]);

        assert_eq!(command.to_string(), "d8 t.js --");
        assert_eq!(command.program(), Some("d8"));
        assert_eq!(command.len(), 3);
        assert!(!command.is_empty());
        assert!(CommandLine::default().split_program().is_none());
    }
}
