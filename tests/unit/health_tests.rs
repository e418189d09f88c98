//! Unit tests for health-check parameters and the readiness predicate.

use std::time::Duration;

use cliproxy_runner::models::health::{is_ready, HealthCheck, ReadyPolicy, DEFAULT_HEALTH_PATH};

/// Dispatched responses count as ready; gateway failures do not.
#[test]
fn readiness_predicate_grid() {
    for status in [101, 200, 204, 301, 401, 403, 404, 499] {
        assert!(is_ready(status), "{status} should be ready");
    }
    for status in [100, 102, 199, 500, 502, 503, 599] {
        assert!(!is_ready(status), "{status} should not be ready");
    }
}

/// The success policy only accepts 2xx.
#[test]
fn success_policy_accepts_only_2xx() {
    assert!(ReadyPolicy::Success.accepts(200));
    assert!(ReadyPolicy::Success.accepts(299));
    assert!(!ReadyPolicy::Success.accepts(101));
    assert!(!ReadyPolicy::Success.accepts(401));
    assert!(ReadyPolicy::Listening.accepts(401));
}

/// Defaults: `/v1/models`, 60 attempts, 200 ms apart, 2 s per request.
#[test]
fn defaults() {
    let health = HealthCheck::default();

    assert_eq!(health.path, DEFAULT_HEALTH_PATH);
    assert_eq!(health.retries, 60);
    assert_eq!(health.interval(), Duration::from_millis(200));
    assert_eq!(health.request_timeout(), Duration::from_secs(2));
    assert_eq!(health.timeout(), None);
    assert_eq!(health.policy, ReadyPolicy::Listening);
    assert!(health.api_key.is_none());
}

/// Paths are normalized to start with a slash.
#[test]
fn path_normalization() {
    let mut health = HealthCheck::default();
    assert_eq!(health.normalized_path(), "/v1/models");

    health.path = "status".into();
    assert_eq!(health.normalized_path(), "/status");
}
