//! Child process plumbing.
//!
//! Everything needed to put a proxy process on the wire and take it down
//! again, without any notion of readiness:
//! - `ports`: transient bind probes to pick a listen port.
//! - `materialize`: the per-run temp directory holding the rendered config.
//! - `launcher`: spawning, exit observation, and graceful termination.
//! - `codec` / `lines`: line framing of stdout/stderr into log events.

pub mod codec;
pub mod launcher;
pub mod lines;
pub mod materialize;
pub mod ports;
