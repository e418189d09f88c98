//! Graceful and forced termination.

use std::time::Duration;

use tokio::time::Instant;

use cliproxy_runner::{start, LifecycleStatus};

use super::test_helpers::{drain, stub_request, WAIT};

/// Two proxies alive at the same time get distinct ports and config dirs,
/// and stopping both removes both dirs.
#[tokio::test]
async fn overlapping_runs_are_isolated() {
    let auth = tempfile::tempdir().unwrap();

    let (first, _rx1) = stub_request(auth.path());
    let first = start(first).await.expect("first run ready");
    let (second, _rx2) = stub_request(auth.path());
    let second = start(second).await.expect("second run ready");

    assert_ne!(first.port(), second.port());
    assert_ne!(first.config_path(), second.config_path());

    let paths = [
        first.config_path().to_path_buf(),
        second.config_path().to_path_buf(),
    ];
    first.stop().await;
    second.stop().await;

    assert!(paths.iter().all(|path| !path.exists()));
}

/// A proxy that ignores `SIGTERM` is killed after the grace period and
/// reports an unknown exit code.
#[cfg(unix)]
#[tokio::test]
async fn ignored_sigterm_is_escalated_to_kill() {
    let auth = tempfile::tempdir().unwrap();
    let (request, rx) = stub_request(auth.path());

    let proxy = start(
        request
            .with_env("STUB_IGNORE_SIGTERM", "1")
            .with_stop_grace(Duration::from_millis(300)),
    )
    .await
    .expect("stub becomes ready");

    let started = Instant::now();
    let code = tokio::time::timeout(WAIT, proxy.stop())
        .await
        .expect("stop escalates to kill");

    assert_eq!(code, -1);
    assert!(started.elapsed() >= Duration::from_millis(300));

    let collected = drain(rx).await;
    assert_eq!(collected.exits(), 1);
    assert_eq!(
        collected.statuses.last(),
        Some(&LifecycleStatus::Exited { code: -1 })
    );
    assert!(collected.has_log("ignoring SIGTERM"));
}
