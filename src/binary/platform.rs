//! Release asset naming per platform.

/// Default release download base.
pub const RELEASE_BASE_URL: &str = "https://github.com/router-for-me/CLIProxyAPI/releases/download";

/// OS/arch pair in the release naming scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    /// `linux`, `darwin`, or `windows`.
    pub os: &'static str,
    /// `amd64`, `arm64`, or `386`.
    pub arch: &'static str,
}

impl Platform {
    /// The platform this process runs on.
    #[must_use]
    pub fn current() -> Self {
        Self::from_rust(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Map Rust target names onto release names. Unknown values fall back to
    /// `linux` / `amd64`.
    #[must_use]
    pub fn from_rust(os: &str, arch: &str) -> Self {
        let os = match os {
            "macos" => "darwin",
            "windows" => "windows",
            _ => "linux",
        };
        let arch = match arch {
            "aarch64" => "arm64",
            "x86" => "386",
            _ => "amd64",
        };
        Self { os, arch }
    }

    /// Whether releases for this platform ship as `.zip`.
    #[must_use]
    pub fn uses_zip(self) -> bool {
        self.os == "windows"
    }

    /// `{os}-{arch}`, the cache directory name.
    #[must_use]
    pub fn slug(self) -> String {
        format!("{}-{}", self.os, self.arch)
    }
}

/// Download coordinates of one release archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetInfo {
    /// Full download URL.
    pub url: String,
    /// Archive file name.
    pub archive_name: String,
    /// `.zip` rather than `.tar.gz`.
    pub is_zip: bool,
}

/// Asset for `version` on `platform` under `base_url`.
///
/// A leading `v` is stripped from the version inside the archive name but
/// kept in the tag.
#[must_use]
pub fn asset_info(base_url: &str, version: &str, platform: Platform) -> AssetInfo {
    let is_zip = platform.uses_zip();
    let bare = version.strip_prefix('v').unwrap_or(version);
    let ext = if is_zip { "zip" } else { "tar.gz" };
    let archive_name = format!("CLIProxyAPI_{bare}_{}_{}.{ext}", platform.os, platform.arch);
    let url = format!("{}/{version}/{archive_name}", base_url.trim_end_matches('/'));
    AssetInfo {
        url,
        archive_name,
        is_zip,
    }
}
