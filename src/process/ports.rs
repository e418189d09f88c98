//! Listen-port selection.
//!
//! Availability is proven by binding a throwaway listener and releasing it
//! straight away. Nothing stays reserved, so another process can still take
//! the port before the proxy binds it; that surfaces as a premature exit.

use std::net::Ipv4Addr;

use tokio::net::TcpListener;
use tracing::debug;

use crate::{AppError, Result};

/// Pick a listen port, preferring `preferred` when it is free.
///
/// A preferred port of `0` is treated as "no preference".
///
/// # Errors
///
/// Returns `AppError::PortAllocation` if the preferred port is unusable and
/// no ephemeral port can be bound either.
pub async fn allocate_port(preferred: Option<u16>) -> Result<u16> {
    if let Some(port) = preferred.filter(|port| *port != 0) {
        if is_port_free(port).await {
            debug!(port, "preferred port is free");
            return Ok(port);
        }
        debug!(port, "preferred port is busy, falling back to an ephemeral port");
    }

    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .await
        .map_err(|err| AppError::PortAllocation(format!("failed to bind ephemeral port: {err}")))?;
    let port = listener
        .local_addr()
        .map_err(|err| AppError::PortAllocation(format!("failed to read ephemeral port: {err}")))?
        .port();
    drop(listener);

    debug!(port, "allocated ephemeral port");
    Ok(port)
}

/// Whether `port` can currently be bound on both loopback and the wildcard
/// address.
///
/// Checking the wildcard too catches servers bound on `0.0.0.0`, which a
/// loopback-only bind would not always conflict with.
pub async fn is_port_free(port: u16) -> bool {
    for host in [Ipv4Addr::LOCALHOST, Ipv4Addr::UNSPECIFIED] {
        match TcpListener::bind((host, port)).await {
            Ok(listener) => drop(listener),
            Err(err) => {
                debug!(port, %host, %err, "port probe bind failed");
                return false;
            }
        }
    }
    true
}
