//! A proxy that dies after becoming ready.

use cliproxy_runner::{start, LifecycleStatus};

use super::test_helpers::{drain, stub_request, take_pending, WAIT};

/// A crash after `Ready` is reported once, visible through `wait` and
/// `state`, and `stop` does not report it again.
#[tokio::test]
async fn crash_after_ready_is_reported_once() {
    let auth = tempfile::tempdir().unwrap();
    let (request, mut rx) = stub_request(auth.path());

    let proxy = start(request.with_env("STUB_CRASH_AFTER_MS", "1000"))
        .await
        .expect("ready before the crash");
    assert_eq!(
        take_pending(&mut rx).statuses,
        vec![LifecycleStatus::Starting, LifecycleStatus::Ready]
    );

    let code = tokio::time::timeout(WAIT, proxy.wait())
        .await
        .expect("stub crashes on its own");
    assert_eq!(code, 3);
    assert_eq!(proxy.exit_code(), Some(3));
    assert_eq!(proxy.state(), LifecycleStatus::Exited { code: 3 });

    let config_path = proxy.config_path().to_path_buf();
    assert_eq!(proxy.stop().await, 3);
    assert!(!config_path.exists());

    let collected = drain(rx).await;
    assert_eq!(collected.statuses, vec![LifecycleStatus::Exited { code: 3 }]);
    assert!(collected.has_log("stub crashing"));
}
