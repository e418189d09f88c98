//! Unit tests for release asset naming.

use cliproxy_runner::binary::platform::RELEASE_BASE_URL;
use cliproxy_runner::binary::{asset_info, Platform};

/// Rust target names map onto release names.
#[test]
fn maps_rust_targets() {
    assert_eq!(
        Platform::from_rust("macos", "aarch64"),
        Platform {
            os: "darwin",
            arch: "arm64"
        }
    );
    assert_eq!(
        Platform::from_rust("windows", "x86"),
        Platform {
            os: "windows",
            arch: "386"
        }
    );
    assert_eq!(
        Platform::from_rust("linux", "x86_64"),
        Platform {
            os: "linux",
            arch: "amd64"
        }
    );
}

/// Unknown targets fall back to linux/amd64.
#[test]
fn unknown_targets_fall_back() {
    assert_eq!(Platform::from_rust("freebsd", "riscv64").slug(), "linux-amd64");
}

/// Tarballs everywhere except Windows; the `v` is stripped from the file name
/// but kept in the tag.
#[test]
fn tarball_asset() {
    let asset = asset_info(RELEASE_BASE_URL, "v6.3.0", Platform::from_rust("linux", "x86_64"));

    assert_eq!(asset.archive_name, "CLIProxyAPI_6.3.0_linux_amd64.tar.gz");
    assert!(!asset.is_zip);
    assert_eq!(
        asset.url,
        "https://github.com/router-for-me/CLIProxyAPI/releases/download/v6.3.0/CLIProxyAPI_6.3.0_linux_amd64.tar.gz"
    );
}

/// Windows ships zips.
#[test]
fn windows_zip_asset() {
    let asset = asset_info(
        "http://mirror.local/releases/",
        "6.3.0",
        Platform::from_rust("windows", "aarch64"),
    );

    assert_eq!(asset.archive_name, "CLIProxyAPI_6.3.0_windows_arm64.zip");
    assert!(asset.is_zip);
    assert_eq!(
        asset.url,
        "http://mirror.local/releases/6.3.0/CLIProxyAPI_6.3.0_windows_arm64.zip"
    );
}
