//! Release download and on-disk cache.
//!
//! Layout: `{cache_dir}/{version}/{os}-{arch}/` holds the archive and an
//! `extracted/` directory. A binary already present there is reused without
//! touching the network.

use std::ffi::OsStr;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::binary::platform::{asset_info, Platform, RELEASE_BASE_URL};
use crate::binary::{BinarySource, BINARY_NAMES};
use crate::{AppError, Result};

/// Name of the extraction directory inside a platform cache directory.
pub const EXTRACTED_DIR: &str = "extracted";

/// Downloads release archives into a local cache.
#[derive(Debug, Clone)]
pub struct ReleaseDownloader {
    client: reqwest::Client,
    cache_dir: PathBuf,
    base_url: String,
    platform: Platform,
}

impl ReleaseDownloader {
    /// Cache under `cache_dir`, downloading from the public releases.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Download` if the HTTP client cannot be built.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| AppError::Download(format!("failed to build http client: {err}")))?;
        Ok(Self {
            client,
            cache_dir: cache_dir.into(),
            base_url: RELEASE_BASE_URL.to_owned(),
            platform: Platform::current(),
        })
    }

    /// Download from `base_url` instead of the public releases.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Resolve assets for `platform` instead of the host platform.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Cache directory for `version` on the configured platform.
    #[must_use]
    pub fn platform_dir(&self, version: &str) -> PathBuf {
        self.cache_dir.join(version).join(self.platform.slug())
    }

    /// Binary already present in the cache for `version`, if any.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the cache cannot be read.
    pub async fn cached(&self, version: &str) -> Result<Option<PathBuf>> {
        let base = self.platform_dir(version);
        if !tokio::fs::try_exists(&base).await.unwrap_or(false) {
            return Ok(None);
        }
        if let Some(found) = find_binary(&base.join(EXTRACTED_DIR)).await? {
            return Ok(Some(found));
        }
        // Archives that unpack outside `extracted/`.
        find_binary(&base).await
    }

    async fn fetch(&self, version: &str) -> Result<PathBuf> {
        if let Some(existing) = self.cached(version).await? {
            debug!(path = %existing.display(), version, "using cached proxy binary");
            return Ok(existing);
        }

        let base = self.platform_dir(version);
        let asset = asset_info(&self.base_url, version, self.platform);
        let archive = base.join(&asset.archive_name);

        info!(url = %asset.url, version, "downloading proxy release");
        self.download_to_file(&asset.url, &archive).await?;

        let dest = base.join(EXTRACTED_DIR);
        extract_archive(&archive, &dest, asset.is_zip).await?;

        let binary = find_binary(&dest).await?.ok_or_else(|| {
            AppError::Download(format!(
                "no proxy binary found after extracting {}",
                asset.archive_name
            ))
        })?;
        mark_executable(&binary).await?;

        info!(path = %binary.display(), version, "proxy binary installed");
        Ok(binary)
    }

    async fn download_to_file(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| AppError::Download(format!("failed to download {url}: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Download(format!(
                "failed to download {url}: {status}"
            )));
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let write_error =
            |err: io::Error| AppError::Io(format!("failed to write {}: {err}", dest.display()));
        let mut file = tokio::fs::File::create(dest).await.map_err(write_error)?;

        let mut body = std::pin::pin!(response.bytes_stream());
        let mut written = 0_usize;
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(dest).await;
                    return Err(AppError::Download(format!("failed to read {url}: {err}")));
                }
            };
            file.write_all(&chunk).await.map_err(write_error)?;
            written += chunk.len();
        }
        file.flush().await.map_err(write_error)?;

        debug!(path = %dest.display(), bytes = written, "archive downloaded");
        Ok(())
    }
}

impl BinarySource for ReleaseDownloader {
    fn ensure_binary<'a>(
        &'a self,
        version: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<PathBuf>> + Send + 'a>> {
        Box::pin(self.fetch(version))
    }
}

/// Depth-first search under `root` for one of [`BINARY_NAMES`].
///
/// A missing `root` yields `Ok(None)`.
///
/// # Errors
///
/// Returns `AppError::Io` if a directory cannot be listed.
pub async fn find_binary(root: &Path) -> Result<Option<PathBuf>> {
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => {
                return Err(AppError::Io(format!(
                    "failed to list {}: {err}",
                    dir.display()
                )))
            }
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                stack.push(path);
            } else if entry
                .file_name()
                .to_str()
                .is_some_and(|name| BINARY_NAMES.contains(&name))
            {
                return Ok(Some(path));
            }
        }
    }
    Ok(None)
}

async fn extract_archive(archive: &Path, dest: &Path, is_zip: bool) -> Result<()> {
    tokio::fs::create_dir_all(dest).await?;
    if is_zip {
        let script = format!(
            "Expand-Archive -Path \"{}\" -DestinationPath \"{}\" -Force",
            archive.display(),
            dest.display()
        );
        run_command("powershell", ["-NoProfile", "-Command", script.as_str()]).await
    } else {
        run_command(
            "tar",
            [
                OsStr::new("-xzf"),
                archive.as_os_str(),
                OsStr::new("-C"),
                dest.as_os_str(),
            ],
        )
        .await
    }
}

async fn run_command<I, S>(program: &str, args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .status()
        .await
        .map_err(|err| AppError::Download(format!("failed to run {program}: {err}")))?;
    if status.success() {
        Ok(())
    } else {
        Err(AppError::Download(format!(
            "{program} exited with code {}",
            status.code().unwrap_or(-1)
        )))
    }
}

#[cfg(unix)]
async fn mark_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .await
        .map_err(|err| AppError::Io(format!("failed to chmod {}: {err}", path.display())))
}

#[cfg(not(unix))]
async fn mark_executable(_path: &Path) -> Result<()> {
    Ok(())
}
