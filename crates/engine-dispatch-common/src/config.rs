//! Configuration structures for engine-dispatch.
//!
//! - [`DispatchConfig`]: Top-level settings for the dispatch layer
//! - [`ExecutionConfig`]: Per-call execution limits
//! - [`HealthCheckConfig`]: The canonical artifact used to validate engines

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level dispatch configuration.
///
/// Engine commands themselves are listed separately (see
/// [`ConfigFile`](crate::ConfigFile)); this holds the settings shared by all
/// engines.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DispatchConfig {
    /// Executable used as the ahead-of-time compiler pseudo-engine.
    ///
    /// An engine whose executable equals this string exactly is treated as a
    /// C compiler: the artifact's `.wasm.c` companion is built into a native
    /// executable, which is then run directly.
    #[serde(default)]
    pub aot_compiler: Option<String>,

    /// Per-call execution configuration.
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Engine health-check configuration.
    #[serde(default)]
    pub health: HealthCheckConfig,
}

/// Per-call execution configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Wall-clock timeout in milliseconds.
    ///
    /// `None` waits for the process indefinitely.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ExecutionConfig {
    /// Get the timeout as a `Duration`.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Health-check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthCheckConfig {
    /// Minimal known-good program run through an engine to validate it.
    #[serde(default = "defaults::health_artifact")]
    pub artifact: PathBuf,

    /// Substring the program's stdout must contain.
    #[serde(default = "defaults::expected_output")]
    pub expected_output: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            artifact: defaults::health_artifact(),
            expected_output: defaults::expected_output(),
        }
    }
}

/// Default value functions for serde.
mod defaults {
    use std::path::PathBuf;

    pub fn health_artifact() -> PathBuf {
        PathBuf::from("tests/hello_world.js")
    }

    pub fn expected_output() -> String {
        "hello, world!".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DispatchConfig::default();

        assert!(config.aot_compiler.is_none());
        assert!(config.execution.timeout_ms.is_none());
        assert_eq!(
            config.health.artifact,
            PathBuf::from("tests/hello_world.js")
        );
        assert_eq!(config.health.expected_output, "hello, world!");
    }

    #[test]
    fn test_config_serialization() {
        let config = DispatchConfig {
            aot_compiler: Some("/usr/bin/clang".into()),
            execution: ExecutionConfig {
                timeout_ms: Some(250),
            },
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: DispatchConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.aot_compiler.as_deref(), Some("/usr/bin/clang"));
        assert_eq!(deserialized.execution.timeout_ms, Some(250));
    }

    #[test]
    fn test_execution_timeout() {
        let config = ExecutionConfig {
            timeout_ms: Some(500),
        };
        assert_eq!(config.timeout(), Some(Duration::from_millis(500)));
        assert_eq!(ExecutionConfig::default().timeout(), None);
    }

    #[test]
    fn test_partial_deserialization() {
        let json = r#"{"health": {"expected_output": "hi"}}"#;
        let config: DispatchConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.health.expected_output, "hi");
        // Default values for unspecified fields
        assert_eq!(
            config.health.artifact,
            PathBuf::from("tests/hello_world.js")
        );
        assert!(config.execution.timeout_ms.is_none());
    }
}
