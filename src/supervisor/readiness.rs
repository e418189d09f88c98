//! Readiness prober.
//!
//! Polls `GET http://127.0.0.1:{port}{path}` until the proxy answers with a
//! status accepted by the configured [`ReadyPolicy`](crate::models::health::ReadyPolicy).
//! Connection failures, request timeouts, and rejected statuses are all "not
//! yet" and only cost an attempt; the caller sees a single
//! `AppError::ReadinessTimeout` once attempts or time run out.
//!
//! # Cancellation
//!
//! The `cancel` token aborts an in-flight request and interrupts the sleep
//! between attempts. The overall timeout drops the poll future outright,
//! which has the same effect.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::models::health::{HealthCheck, ReadyPolicy};
use crate::{AppError, Result};

/// Header carrying the raw API key, next to the bearer token.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Loopback base URL of a proxy listening on `port`.
#[must_use]
pub fn base_url(port: u16) -> String {
    format!("http://127.0.0.1:{port}")
}

/// Sleep for `duration` unless `cancel` fires first.
///
/// Returns `true` if the full duration elapsed, `false` if cancelled.
pub async fn cancellable_sleep(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = tokio::time::sleep(duration) => true,
        () = cancel.cancelled() => false,
    }
}

/// A configured readiness poll against one port.
#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
    policy: ReadyPolicy,
    interval: Duration,
    retries: u32,
    timeout: Option<Duration>,
}

impl ReadinessProbe {
    /// Build a probe for `port` from `health`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the API key is not a valid header value
    /// or the HTTP client cannot be built.
    pub fn new(port: u16, health: &HealthCheck) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(health.request_timeout())
            .no_proxy()
            .build()
            .map_err(|err| AppError::Config(format!("failed to build probe client: {err}")))?;

        Ok(Self {
            client,
            url: format!("{}{}", base_url(port), health.normalized_path()),
            headers: auth_headers(health.api_key.as_deref())?,
            policy: health.policy,
            interval: health.interval(),
            retries: health.retries,
            timeout: health.timeout(),
        })
    }

    /// URL being probed.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Headers attached to every probe request.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Poll until ready, out of attempts, past the overall timeout, or
    /// cancelled.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ReadinessTimeout` with the URL, the attempts made,
    /// and the elapsed time when the proxy never became ready.
    pub async fn wait_until_ready(&self, cancel: &CancellationToken) -> Result<()> {
        let started = Instant::now();
        let attempts = AtomicU32::new(0);

        let polled = self.poll(&attempts, cancel);
        let ready = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, polled).await.unwrap_or(false),
            None => polled.await,
        };

        let attempts = attempts.load(Ordering::Relaxed);
        let elapsed = started.elapsed();
        if ready {
            info!(url = %self.url, attempts, ?elapsed, "proxy is ready");
            Ok(())
        } else {
            debug!(url = %self.url, attempts, ?elapsed, "proxy did not become ready");
            Err(AppError::readiness_timeout(self.url.clone(), attempts, elapsed))
        }
    }

    async fn poll(&self, attempts: &AtomicU32, cancel: &CancellationToken) -> bool {
        for attempt in 1..=self.retries {
            attempts.store(attempt, Ordering::Relaxed);

            let outcome = tokio::select! {
                outcome = self.probe_once() => outcome,
                () = cancel.cancelled() => return false,
            };

            match outcome {
                Ok(status) if self.policy.accepts(status) => return true,
                Ok(status) => trace!(attempt, status, "probe answered, not ready yet"),
                Err(err) => trace!(attempt, %err, "probe failed, not ready yet"),
            }

            if attempt < self.retries && !cancellable_sleep(self.interval, cancel).await {
                return false;
            }
        }
        false
    }

    async fn probe_once(&self) -> std::result::Result<u16, reqwest::Error> {
        let response = self
            .client
            .get(&self.url)
            .headers(self.headers.clone())
            .send()
            .await?;
        Ok(response.status().as_u16())
    }
}

/// Build the probe headers for an optional API key: `Authorization: Bearer`
/// plus [`API_KEY_HEADER`], so either server convention is satisfied.
///
/// # Errors
///
/// Returns `AppError::Config` if the key contains characters not allowed in
/// a header value.
pub fn auth_headers(api_key: Option<&str>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let Some(key) = api_key.filter(|key| !key.is_empty()) else {
        return Ok(headers);
    };

    let invalid = |_| AppError::Config("api key is not a valid header value".into());
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {key}")).map_err(invalid)?,
    );
    headers.insert(API_KEY_HEADER, HeaderValue::from_str(key).map_err(invalid)?);
    Ok(headers)
}

/// Probe `port` once per `health.interval_ms` until it answers.
///
/// # Errors
///
/// Returns `AppError::Config` for an unusable API key and
/// `AppError::ReadinessTimeout` when the proxy never became ready.
pub async fn wait_until_ready(
    port: u16,
    health: &HealthCheck,
    cancel: &CancellationToken,
) -> Result<()> {
    ReadinessProbe::new(port, health)?
        .wait_until_ready(cancel)
        .await
}
