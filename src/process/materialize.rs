//! Per-run config materialization.
//!
//! Each supervised run writes its rendered config into a fresh private temp
//! directory. The directory lives exactly as long as the
//! [`MaterializedConfig`]: it is removed by [`MaterializedConfig::remove`]
//! or, failing that, on drop.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::{AppError, Result};

/// File name of the rendered config inside its temp directory.
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Temp-directory prefix for server runs.
pub const SERVER_PREFIX: &str = "cliproxyapi-";

/// Temp-directory prefix for login runs.
pub const LOGIN_PREFIX: &str = "cliproxyapi-login-";

/// A rendered config file on disk, owned by one supervised run.
#[derive(Debug)]
pub struct MaterializedConfig {
    dir: TempDir,
    path: PathBuf,
}

impl MaterializedConfig {
    /// Create a temp directory named `{prefix}XXXXXX` and write `contents`
    /// to [`CONFIG_FILE_NAME`] inside it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the directory or file cannot be created.
    pub async fn write(prefix: &str, contents: &str) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir()
            .map_err(|err| AppError::Io(format!("failed to create config dir: {err}")))?;
        let path = dir.path().join(CONFIG_FILE_NAME);

        tokio::fs::write(&path, contents).await.map_err(|err| {
            AppError::Io(format!("failed to write config {}: {err}", path.display()))
        })?;

        debug!(path = %path.display(), "config materialized");
        Ok(Self { dir, path })
    }

    /// Path of the config file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory containing the config file.
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the config file and its directory. Failures are logged and
    /// swallowed so they never mask the outcome of the run.
    pub fn remove(self) {
        let dir = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!(dir = %dir.display(), "config dir removed"),
            Err(err) => debug!(dir = %dir.display(), %err, "ignoring config cleanup failure"),
        }
    }
}
