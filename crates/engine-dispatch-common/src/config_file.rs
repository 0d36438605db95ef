//! Configuration file structures for engine-dispatch.
//!
//! - [`ConfigFile`]: Top-level configuration file structure
//! - [`LoggingConfig`]: Log filter and format
//! - [`EngineEntry`]: A configured engine command

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::DispatchConfig;

/// Top-level configuration file structure.
///
/// # Example
///
/// ```toml
/// [runtime]
/// aot_compiler = "/usr/bin/clang"
///
/// [runtime.execution]
/// timeout_ms = 60_000
///
/// [runtime.health]
/// artifact = "tests/hello_world.js"
/// expected_output = "hello, world!"
///
/// [logging]
/// filter = "info,engine_dispatch=debug"
/// json = false
///
/// [[engines]]
/// id = "node"
/// command = ["node", "--stack-size=8192"]
///
/// [[engines]]
/// id = "d8"
/// command = ["/opt/v8/d8"]
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    /// Dispatch configuration (AOT compiler, execution, health check).
    #[serde(default)]
    pub runtime: DispatchConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Configured engines. The first one is the default engine.
    #[serde(default)]
    pub engines: Vec<EngineEntry>,
}

impl ConfigFile {
    /// Load configuration from a TOML file.
    ///
    /// A relative health-check artifact path is resolved against the
    /// directory containing the configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigFileError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        let mut config = Self::from_toml(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        debug!(
            path = %path.display(),
            engines = config.engines.len(),
            "Config file loaded"
        );
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed as TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        toml::from_str(content).map_err(|e| ConfigFileError::Parse {
            message: e.to_string(),
        })
    }

    /// Find a configured engine by its id.
    pub fn find_engine(&self, id: &str) -> Option<&EngineEntry> {
        self.engines.iter().find(|e| e.id == id)
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        let artifact = &self.runtime.health.artifact;
        if artifact.is_relative() && !base.as_os_str().is_empty() {
            self.runtime.health.artifact = base.join(artifact);
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// `tracing-subscriber` filter directive. `RUST_LOG` takes precedence.
    #[serde(default = "defaults::log_filter")]
    pub filter: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: defaults::log_filter(),
            json: false,
        }
    }
}

/// An engine entry from the configuration file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineEntry {
    /// Name used to select the engine on the command line.
    pub id: String,

    /// Executable path followed by fixed leading arguments.
    pub command: Vec<String>,
}

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("Failed to parse config file: {message}")]
    Parse { message: String },
}

/// Default value functions for serde.
mod defaults {
    pub fn log_filter() -> String {
        "info,engine_dispatch=debug".to_string()
    }
}
