// src/health/mod.rs
mod checker;

pub use checker::{HealthChecker, PROBE_PAYLOAD, PROBE_TIMEOUT};
