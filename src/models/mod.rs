//! Domain model module declarations.

pub mod event;
pub mod health;
pub mod proxy_config;
