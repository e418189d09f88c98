#![forbid(unsafe_code)]

//! Supervision of a CLIProxyAPI server process: config materialization,
//! port selection, launch, readiness probing, log relay, and teardown, plus
//! the one-shot interactive login flow.

pub mod binary;
pub mod config;
pub mod errors;
pub mod models;
pub mod process;
pub mod supervisor;

pub use config::RunnerConfig;
pub use errors::{AppError, ReadinessTimeout, Result};
pub use models::event::{EventSink, LifecycleStatus, LogLine, LogSource, SupervisorEvent};
pub use supervisor::{login, start, RunningProxy, StartRequest};
