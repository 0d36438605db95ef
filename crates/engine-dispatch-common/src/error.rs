//! Error types for engine-dispatch.
//!
//! [`DispatchError`] covers every failure of the dispatch layer, from a
//! missing artifact to a configured engine that turned out to be broken.
//! Only [`DispatchError::EngineBroken`] is fatal; everything else is a
//! local, recoverable error for the immediate caller.

use std::io;

use thiserror::Error;

/// Errors raised while building commands for, and running, external engines.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The artifact to execute does not exist. No process was spawned.
    #[error("Artifact not found: {path}")]
    ArtifactNotFound {
        /// The path that was requested.
        path: String,
    },

    /// The file requested as the process's stdin could not be opened.
    /// No process was spawned.
    #[error("Stdin file unavailable: {path}: {source}")]
    StdinUnavailable {
        /// The path that was requested.
        path: String,
        #[source]
        source: io::Error,
    },

    /// The engine process could not be started.
    #[error("Failed to spawn `{command}`: {source}")]
    SpawnFailed {
        /// The command line that was attempted.
        command: String,
        #[source]
        source: io::Error,
    },

    /// The engine process started, but waiting on it failed.
    #[error("Engine failed while running `{command}`: {source}")]
    RuntimeFailure {
        /// The command line that was running.
        command: String,
        #[source]
        source: io::Error,
    },

    /// The engine process exceeded its wall-clock limit and was killed.
    #[error("Execution timeout after {duration_ms}ms: `{command}`")]
    Timeout {
        /// The command line that was running.
        command: String,
        /// The timeout that was enforced, in milliseconds.
        duration_ms: u64,
    },

    /// The process completed with an unexpected exit code.
    #[error("Command `{command}` returned exit code {actual} (expected {expected}):\n{output}")]
    ExitCodeMismatch {
        /// The command line that ran.
        command: String,
        /// The exit code that was required.
        expected: i32,
        /// The exit code the process returned.
        actual: i32,
        /// Captured output, for diagnosis.
        output: String,
    },

    /// The ahead-of-time build step failed before any engine was run.
    #[error("Build step failed: {source}")]
    BuildFailed {
        #[source]
        source: Box<DispatchError>,
    },

    /// A health check confirmed the engine does not work.
    ///
    /// Every later result produced with this engine would be meaningless,
    /// so callers are expected to stop the whole run.
    #[error("The engine ({engine}) does not seem to work, check the paths in the config file ({path})")]
    EngineBroken {
        /// The full engine command, as configured.
        engine: String,
        /// The engine executable path (the health-cache key).
        path: String,
    },

    /// Invalid configuration was provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },
}

impl DispatchError {
    /// Create a new `ArtifactNotFound` error.
    pub fn artifact_not_found(path: impl Into<String>) -> Self {
        Self::ArtifactNotFound { path: path.into() }
    }

    /// Create a new `StdinUnavailable` error.
    pub fn stdin_unavailable(path: impl Into<String>, source: io::Error) -> Self {
        Self::StdinUnavailable {
            path: path.into(),
            source,
        }
    }

    /// Create a new `SpawnFailed` error.
    pub fn spawn_failed(command: impl Into<String>, source: io::Error) -> Self {
        Self::SpawnFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a new `RuntimeFailure` error.
    pub fn runtime_failure(command: impl Into<String>, source: io::Error) -> Self {
        Self::RuntimeFailure {
            command: command.into(),
            source,
        }
    }

    /// Wrap a failure of the nested build invocation.
    pub fn build_failed(source: DispatchError) -> Self {
        Self::BuildFailed {
            source: Box::new(source),
        }
    }

    /// Create a new `EngineBroken` error.
    pub fn engine_broken(engine: impl Into<String>, path: impl Into<String>) -> Self {
        Self::EngineBroken {
            engine: engine.into(),
            path: path.into(),
        }
    }

    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error invalidates the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::EngineBroken { .. })
    }

    /// Returns `true` if the engine itself may be at fault.
    ///
    /// These are the failures that trigger a health check before they are
    /// surfaced to the caller.
    pub fn is_engine_failure(&self) -> bool {
        matches!(
            self,
            Self::SpawnFailed { .. } | Self::RuntimeFailure { .. } | Self::Timeout { .. }
        )
    }

    /// Returns `true` if this error indicates the artifact was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ArtifactNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DispatchError::artifact_not_found("missing.js");
        assert_eq!(err.to_string(), "Artifact not found: missing.js");

        let err = DispatchError::engine_broken("[\"d8\"]", "d8");
        assert!(err.to_string().contains("does not seem to work"));
        assert!(err.to_string().contains("d8"));
    }

    #[test]
    fn test_exit_code_mismatch_carries_output() {
        let err = DispatchError::ExitCodeMismatch {
            command: "node t.js".into(),
            expected: 0,
            actual: 1,
            output: "boom".into(),
        };
        let message = err.to_string();

        assert!(message.contains("node t.js"));
        assert!(message.contains("exit code 1"));
        assert!(message.ends_with("boom"));
    }

    #[test]
    fn test_build_failed_keeps_source() {
        let inner = DispatchError::spawn_failed(
            "clang t.wasm.c -o t.exe",
            io::Error::new(io::ErrorKind::NotFound, "no clang"),
        );
        let err = DispatchError::build_failed(inner);

        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("clang t.wasm.c"));
    }

    #[test]
    fn test_is_fatal() {
        assert!(DispatchError::engine_broken("node", "node").is_fatal());
        assert!(!DispatchError::artifact_not_found("x").is_fatal());
        assert!(!DispatchError::invalid_config("x").is_fatal());
    }

    #[test]
    fn test_is_engine_failure() {
        let spawn = DispatchError::spawn_failed("d8", io::Error::other("x"));
        let timeout = DispatchError::Timeout {
            command: "d8".into(),
            duration_ms: 10,
        };

        assert!(spawn.is_engine_failure());
        assert!(timeout.is_engine_failure());
        assert!(!DispatchError::artifact_not_found("x").is_engine_failure());
    }

    #[test]
    fn test_stdin_unavailable_is_not_engine_failure() {
        let err = DispatchError::stdin_unavailable(
            "input.txt",
            io::Error::new(io::ErrorKind::NotFound, "no such file"),
        );

        assert!(err.to_string().starts_with("Stdin file unavailable: input.txt"));
        assert!(!err.is_engine_failure());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_is_not_found() {
        assert!(DispatchError::artifact_not_found("x").is_not_found());
        assert!(!DispatchError::invalid_config("x").is_not_found());
    }
}
