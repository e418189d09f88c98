//! Supervision of the proxy process.
//!
//! Covers the readiness probe, the start/stop lifecycle of a server run, and
//! the one-shot login flow.

pub mod lifecycle;
pub mod login;
pub mod readiness;

pub use lifecycle::{start, RunningProxy, StartRequest};
pub use login::{login, LoginProvider, LoginRequest};
pub use readiness::{wait_until_ready, ReadinessProbe};
