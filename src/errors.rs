//! Error types shared across the crate.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use crate::supervisor::lifecycle::RunningProxy;

/// Shared crate result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Crate error enumeration covering every supervision failure mode.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing, validation, or rendering failure.
    Config(String),
    /// The proxy binary is missing, not executable, or could not be started.
    Spawn(String),
    /// Neither the preferred port nor an ephemeral port could be bound.
    PortAllocation(String),
    /// The proxy exited before it answered a readiness probe.
    PrematureExit {
        /// Exit code reported for the process (`-1` when unknown).
        code: i32,
    },
    /// Readiness probing ran out of attempts or time.
    ReadinessTimeout(Box<ReadinessTimeout>),
    /// The interactive login process exited with a non-zero code.
    LoginFailed {
        /// Exit code reported for the login process (`-1` when unknown).
        code: i32,
    },
    /// Release download or archive extraction failure.
    Download(String),
    /// File-system or I/O operation failure.
    Io(String),
}

/// Context for a proxy that never answered its readiness probe.
///
/// The proxy process is not stopped on this path. It travels with the error
/// so the caller can decide: keep it via [`ReadinessTimeout::take_proxy`], or
/// drop the error, which terminates the process and removes its config.
#[derive(Debug)]
pub struct ReadinessTimeout {
    /// URL that was probed.
    pub url: String,
    /// Number of probe requests issued.
    pub attempts: u32,
    /// Time spent probing.
    pub elapsed: Duration,
    /// The still-running proxy, when the failure came out of `start`.
    pub proxy: Option<RunningProxy>,
}

impl ReadinessTimeout {
    /// Take ownership of the running proxy left behind by the failed start.
    pub fn take_proxy(&mut self) -> Option<RunningProxy> {
        self.proxy.take()
    }
}

impl AppError {
    /// Build a [`AppError::ReadinessTimeout`] without an attached proxy.
    #[must_use]
    pub fn readiness_timeout(url: String, attempts: u32, elapsed: Duration) -> Self {
        Self::ReadinessTimeout(Box::new(ReadinessTimeout {
            url,
            attempts,
            elapsed,
            proxy: None,
        }))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::PortAllocation(msg) => write!(f, "port allocation: {msg}"),
            Self::PrematureExit { code } => {
                write!(f, "premature exit: proxy exited before ready (code {code})")
            }
            Self::ReadinessTimeout(timeout) => write!(
                f,
                "readiness timeout: {} did not become ready after {} attempts in {:?}",
                timeout.url, timeout.attempts, timeout.elapsed
            ),
            Self::LoginFailed { code } => {
                write!(f, "login failed: login flow exited with code {code}")
            }
            Self::Download(msg) => write!(f, "download: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(format!("failed to render proxy config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
