//! Unit tests for binary resolution: local paths, cache lookup, and release
//! download from an in-process server.

use std::net::Ipv4Addr;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

use cliproxy_runner::binary::downloader::{find_binary, EXTRACTED_DIR};
use cliproxy_runner::binary::{BinarySource, LocalBinary, Platform, ReleaseDownloader};
use cliproxy_runner::AppError;

fn linux_amd64() -> Platform {
    Platform::from_rust("linux", "x86_64")
}

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://127.0.0.1:{port}")
}

// ── LocalBinary ─────────────────────────────────────────────────────────────

/// An existing file is returned for any version.
#[tokio::test]
async fn local_binary_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cliproxyapi");
    std::fs::write(&path, b"#!/bin/sh\n").unwrap();

    let resolved = LocalBinary::new(&path).ensure_binary("latest").await.unwrap();

    assert_eq!(resolved, path);
}

/// A missing path or a directory is rejected.
#[tokio::test]
async fn local_binary_rejects_missing_and_directories() {
    let dir = tempfile::tempdir().unwrap();

    let missing = LocalBinary::new(dir.path().join("nope"))
        .ensure_binary("latest")
        .await
        .expect_err("missing file");
    assert!(matches!(missing, AppError::Io(_)));

    let directory = LocalBinary::new(dir.path())
        .ensure_binary("latest")
        .await
        .expect_err("directory");
    assert!(directory.to_string().contains("not a file"));
}

// ── find_binary ─────────────────────────────────────────────────────────────

/// Known executable names are found in nested directories.
#[tokio::test]
async fn finds_nested_binary() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("CLIProxyAPI_6.3.0").join("bin");
    std::fs::create_dir_all(&nested).unwrap();
    std::fs::write(nested.join("README.md"), b"docs").unwrap();
    std::fs::write(nested.join("cli-proxy-api"), b"bin").unwrap();

    let found = find_binary(dir.path()).await.unwrap();

    assert_eq!(found, Some(nested.join("cli-proxy-api")));
}

/// Unrelated files and missing roots yield nothing.
#[tokio::test]
async fn nothing_found() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("LICENSE"), b"mit").unwrap();

    assert_eq!(find_binary(dir.path()).await.unwrap(), None);
    assert_eq!(find_binary(&dir.path().join("absent")).await.unwrap(), None);
}

// ── ReleaseDownloader ───────────────────────────────────────────────────────

/// A binary already in the cache is reused without any request.
#[tokio::test]
async fn cached_binary_is_reused() {
    let cache = tempfile::tempdir().unwrap();
    let downloader = ReleaseDownloader::new(cache.path())
        .unwrap()
        .with_base_url("http://127.0.0.1:9")
        .with_platform(linux_amd64());
    let extracted = downloader.platform_dir("v1.0.0").join(EXTRACTED_DIR);
    std::fs::create_dir_all(&extracted).unwrap();
    std::fs::write(extracted.join("cliproxyapi"), b"bin").unwrap();

    let path = downloader.ensure_binary("v1.0.0").await.unwrap();

    assert_eq!(path, extracted.join("cliproxyapi"));
    assert!(path.starts_with(cache.path().join("v1.0.0").join("linux-amd64")));
}

/// A missing release surfaces as a download error.
#[tokio::test]
async fn missing_release_is_download_error() {
    let base = serve(Router::new()).await;
    let cache = tempfile::tempdir().unwrap();
    let downloader = ReleaseDownloader::new(cache.path())
        .unwrap()
        .with_base_url(base)
        .with_platform(linux_amd64());

    let err = downloader
        .ensure_binary("v0.0.1")
        .await
        .expect_err("server has no releases");

    assert!(matches!(err, AppError::Download(_)));
    assert!(err.to_string().contains("404"));
}

#[cfg(unix)]
fn build_tarball(staging: &std::path::Path, archive: &std::path::Path) {
    let inner = staging.join("CLIProxyAPI");
    std::fs::create_dir_all(&inner).unwrap();
    std::fs::write(inner.join("cliproxyapi"), b"#!/bin/sh\nexit 0\n").unwrap();
    let status = std::process::Command::new("tar")
        .arg("-czf")
        .arg(archive)
        .arg("-C")
        .arg(staging)
        .arg("CLIProxyAPI")
        .status()
        .unwrap();
    assert!(status.success());
}

/// A release archive is downloaded, extracted, located, and made executable.
#[cfg(unix)]
#[tokio::test]
async fn downloads_and_extracts_release() {
    use std::os::unix::fs::PermissionsExt;

    let staging = tempfile::tempdir().unwrap();
    let archive = staging.path().join("release.tar.gz");
    build_tarball(&staging.path().join("src"), &archive);
    let body = std::fs::read(&archive).unwrap();
    let served = body.clone();

    let base = serve(Router::new().route(
        "/v6.3.0/CLIProxyAPI_6.3.0_linux_amd64.tar.gz",
        get(move || {
            let body = served.clone();
            async move { (StatusCode::OK, body) }
        }),
    ))
    .await;

    let cache = tempfile::tempdir().unwrap();
    let downloader = ReleaseDownloader::new(cache.path())
        .unwrap()
        .with_base_url(base)
        .with_platform(linux_amd64());

    let path = downloader.ensure_binary("v6.3.0").await.expect("download");

    assert!(path.ends_with("CLIProxyAPI/cliproxyapi"));
    assert!(path.starts_with(downloader.platform_dir("v6.3.0").join(EXTRACTED_DIR)));
    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o111, 0o111, "binary must be executable");

    let saved = downloader
        .platform_dir("v6.3.0")
        .join("CLIProxyAPI_6.3.0_linux_amd64.tar.gz");
    assert_eq!(std::fs::read(saved).unwrap(), body, "archive written in full");

    assert_eq!(downloader.cached("v6.3.0").await.unwrap(), Some(path));
}
