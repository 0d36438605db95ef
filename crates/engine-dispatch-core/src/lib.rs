//! Engine dispatch for compiled JS and Wasm artifacts.
//!
//! This crate runs an artifact on one of several interchangeable external
//! engines and decides whether the engine's answer can be trusted:
//! - [`EngineSpec`] and [`EngineProfile`]: what an engine is and which
//!   command-line conventions it follows
//! - [`CommandBuilder`]: per-engine argument vectors, including the
//!   ahead-of-time build step
//! - [`EngineHealthCache`]: cached results of engine smoke tests
//! - [`Dispatcher`]: execution with timeout, exit-code checks and
//!   health-checked diagnostics
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      Dispatcher                         │
//! │  execute() → on engine failure → require_health()       │
//! └─────────────────────────────────────────────────────────┘
//!          │                                   │
//!          ▼                                   ▼
//! ┌──────────────────────────┐   ┌──────────────────────────┐
//! │      CommandBuilder      │   │    EngineHealthCache     │
//! │  EngineProfile::classify │   │  executable → status     │
//! └──────────────────────────┘   └──────────────────────────┘
//!          │
//!          ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                   ProcessLauncher                       │
//! │  spawn → wait(timeout) → ProcessOutput                  │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod command;
pub mod dispatcher;
pub mod engine;
pub mod health;
pub mod process;

pub use command::{CommandBuilder, CommandLine, CommandPlan};
pub use dispatcher::{Dispatcher, ExecuteOptions, ExecutionResult};
pub use engine::{EngineProfile, EngineSpec};
pub use health::{EngineHealthCache, HealthStatus};
pub use process::{
    ExitOutcome, OutputMode, ProcessLauncher, ProcessOutput, ProcessRequest, RunningProcess,
    StdinMode, TokioLauncher,
};
