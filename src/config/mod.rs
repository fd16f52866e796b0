// src/config/mod.rs
//! Environment-driven settings. Every knob is a plain env var
//! (`LISTEN`, `BACKENDS`, `LB_MODE`, ...) with a default, collected
//! through the `config` crate and converted into one immutable,
//! fully-typed `Settings` value at startup.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

/// String-typed view of the environment, before validation.
#[derive(Debug, Deserialize)]
struct RawSettings {
    listen: String,
    backends: String,
    lb_mode: String,
    proxy_v1: String,
    dial_timeout: String,
    idle_timeout: String,
    io_timeout: String,
    pool_size: String,
    health_every: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalancerMode {
    RoundRobin,
    Sticky,
}

/// Immutable process configuration, built once in `main`.
#[derive(Debug, Clone)]
pub struct Settings {
    pub listen: SocketAddr,
    pub backends: Vec<SocketAddr>,
    pub mode: BalancerMode,
    /// Emit a PROXY protocol v1 header before relaying payload bytes.
    pub proxy_v1: bool,
    pub dial_timeout: Duration,
    pub idle_timeout: Duration,
    /// `None` means the relay runs without a deadline (`IO_TIMEOUT=0`).
    pub io_timeout: Option<Duration>,
    /// Per-backend cap on pooled connections.
    pub pool_size: usize,
    pub health_every: Duration,
}

/// Read settings from the process environment, falling back to defaults.
pub fn load_settings() -> Result<Settings> {
    let raw: RawSettings = config::Config::builder()
        .set_default("listen", "0.0.0.0:4000")?
        .set_default("backends", "127.0.0.1:5001,127.0.0.1:5002")?
        .set_default("lb_mode", "rr")?
        .set_default("proxy_v1", "false")?
        .set_default("dial_timeout", "1s")?
        .set_default("idle_timeout", "3m")?
        .set_default("io_timeout", "0")?
        .set_default("pool_size", "10")?
        .set_default("health_every", "5s")?
        .add_source(config::Environment::default())
        .build()
        .context("failed to read environment configuration")?
        .try_deserialize()
        .context("failed to deserialize settings")?;

    Settings::try_from(raw)
}

impl TryFrom<RawSettings> for Settings {
    type Error = anyhow::Error;

    fn try_from(raw: RawSettings) -> Result<Self> {
        let listen: SocketAddr = raw
            .listen
            .parse()
            .with_context(|| format!("LISTEN is not a valid socket address: {:?}", raw.listen))?;

        let mut backends = Vec::new();
        for part in raw.backends.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let addr: SocketAddr = part
                .parse()
                .with_context(|| format!("BACKENDS entry is not a valid address: {part:?}"))?;
            backends.push(addr);
        }
        if backends.is_empty() {
            bail!("BACKENDS must name at least one endpoint");
        }

        let mode = match raw.lb_mode.trim() {
            "rr" => BalancerMode::RoundRobin,
            "sticky" => BalancerMode::Sticky,
            other => bail!("LB_MODE must be \"rr\" or \"sticky\", got {other:?}"),
        };

        let dial_timeout = parse_duration(&raw.dial_timeout).context("DIAL_TIMEOUT")?;
        if dial_timeout.is_zero() {
            bail!("DIAL_TIMEOUT must be positive");
        }
        let idle_timeout = parse_duration(&raw.idle_timeout).context("IDLE_TIMEOUT")?;
        if idle_timeout.is_zero() {
            bail!("IDLE_TIMEOUT must be positive");
        }
        let io_timeout = parse_duration(&raw.io_timeout).context("IO_TIMEOUT")?;
        let health_every = parse_duration(&raw.health_every).context("HEALTH_EVERY")?;
        if health_every.is_zero() {
            bail!("HEALTH_EVERY must be positive");
        }

        let pool_size: usize = raw
            .pool_size
            .parse()
            .with_context(|| format!("POOL_SIZE is not a number: {:?}", raw.pool_size))?;
        if pool_size == 0 {
            bail!("POOL_SIZE must be positive");
        }

        Ok(Settings {
            listen,
            backends,
            mode,
            proxy_v1: parse_bool(&raw.proxy_v1).context("PROXY_V1")?,
            dial_timeout,
            idle_timeout,
            io_timeout: (!io_timeout.is_zero()).then_some(io_timeout),
            pool_size,
            health_every,
        })
    }
}

/// Parse a Go-style duration: one or more `<number><unit>` terms, where
/// the number may be fractional and the unit is one of `ns`, `us`, `µs`,
/// `ms`, `s`, `m` or `h` (so `250ms`, `1.5s` and `1m30s` all work). A
/// bare `0` disables the timeout it configures.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        bail!("duration string is empty");
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .with_context(|| format!("duration {s:?} is missing a unit suffix"))?;
        if num_end == 0 {
            bail!("duration {s:?} has a malformed numeric part");
        }
        let number = &rest[..num_end];
        let unit_len = rest[num_end..]
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len() - num_end);
        let unit = &rest[num_end..num_end + unit_len];

        let term = if number.contains('.') {
            parse_fractional_term(s, number, unit)?
        } else {
            parse_integer_term(s, number, unit)?
        };
        total = total
            .checked_add(term)
            .with_context(|| format!("duration {s:?} is out of range"))?;
        rest = &rest[num_end + unit_len..];
    }
    Ok(total)
}

fn parse_integer_term(whole: &str, number: &str, unit: &str) -> Result<Duration> {
    let value: u64 = number
        .parse()
        .with_context(|| format!("duration {whole:?} has an invalid numeric part"))?;
    let dur = match unit {
        "ns" => Duration::from_nanos(value),
        "us" | "µs" => Duration::from_micros(value),
        "ms" => Duration::from_millis(value),
        "s" => Duration::from_secs(value),
        "m" | "h" => {
            let per_unit = if unit == "m" { 60 } else { 3600 };
            let secs = value
                .checked_mul(per_unit)
                .with_context(|| format!("duration {whole:?} is out of range"))?;
            Duration::from_secs(secs)
        }
        other => bail!("duration {whole:?} has an unknown unit {other:?}"),
    };
    Ok(dur)
}

fn parse_fractional_term(whole: &str, number: &str, unit: &str) -> Result<Duration> {
    let value: f64 = number
        .parse()
        .with_context(|| format!("duration {whole:?} has an invalid numeric part"))?;
    let scale = match unit {
        "ns" => 1e-9,
        "us" | "µs" => 1e-6,
        "ms" => 1e-3,
        "s" => 1.0,
        "m" => 60.0,
        "h" => 3600.0,
        other => bail!("duration {whole:?} has an unknown unit {other:?}"),
    };
    let secs = value * scale;
    if !secs.is_finite() || secs > u64::MAX as f64 {
        bail!("duration {whole:?} is out of range");
    }
    Ok(Duration::from_secs_f64(secs))
}

/// Booleans accept the usual spellings: 1/true/yes/on and 0/false/no/off.
pub fn parse_bool(s: &str) -> Result<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got {other:?}"),
    }
}
