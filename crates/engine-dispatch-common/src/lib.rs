//! Common errors and configuration for engine-dispatch.
//!
//! This crate provides shared functionality used across the engine-dispatch workspace:
//! - Error types using `thiserror` for type-safe error handling
//! - Configuration structures for dispatch settings and config files

pub mod config;
pub mod config_file;
pub mod error;

pub use config::{DispatchConfig, ExecutionConfig, HealthCheckConfig};
pub use config_file::{ConfigFile, ConfigFileError, EngineEntry, LoggingConfig};
pub use error::DispatchError;
