//! Proxy binary acquisition.
//!
//! The supervisor only needs a path to an executable. [`BinarySource`]
//! decouples where that path comes from: a fixed local file
//! ([`LocalBinary`]) or a release archive downloaded into a cache
//! ([`downloader::ReleaseDownloader`]).

pub mod downloader;
pub mod platform;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use crate::{AppError, Result};

pub use downloader::ReleaseDownloader;
pub use platform::{asset_info, AssetInfo, Platform};

/// Executable names a release archive may contain.
pub const BINARY_NAMES: &[&str] = &[
    "cliproxyapi",
    "cliproxyapi.exe",
    "CLIProxyAPI",
    "CLIProxyAPI.exe",
    "cli-proxy-api",
    "cli-proxy-api.exe",
];

/// Release version used when none is configured.
pub const LATEST_VERSION: &str = "latest";

/// Resolves a proxy version to an executable on disk.
pub trait BinarySource: Send + Sync {
    /// Return the path of an executable for `version`, fetching it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Download`] or [`AppError::Io`] when no executable
    /// can be produced.
    fn ensure_binary<'a>(
        &'a self,
        version: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<PathBuf>> + Send + 'a>>;
}

/// A binary that is already installed at a known path.
#[derive(Debug, Clone)]
pub struct LocalBinary {
    path: PathBuf,
}

impl LocalBinary {
    /// Use the executable at `path` for every version.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl BinarySource for LocalBinary {
    fn ensure_binary<'a>(
        &'a self,
        _version: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<PathBuf>> + Send + 'a>> {
        Box::pin(async move {
            match tokio::fs::metadata(&self.path).await {
                Ok(meta) if meta.is_file() => Ok(self.path.clone()),
                Ok(_) => Err(AppError::Io(format!(
                    "proxy binary is not a file: {}",
                    self.path.display()
                ))),
                Err(err) => Err(AppError::Io(format!(
                    "proxy binary unavailable at {}: {err}",
                    self.path.display()
                ))),
            }
        })
    }
}
