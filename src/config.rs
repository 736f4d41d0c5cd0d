//! # Configuration
//!
//! Environment-driven settings. Everything has a default; the controller
//! starts without any configuration in place.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;

use crate::constants::{
    DEFAULT_JANITOR_INTERVAL_SECS, DEFAULT_MAX_CONCURRENT_RECONCILES, DEFAULT_METRICS_PORT,
};

#[derive(Debug, Clone)]
pub struct Config {
    /// Port the metrics and probe server listens on (`METRICS_PORT`)
    pub metrics_port: u16,
    /// Interval between cluster-wide janitor sweeps (`JANITOR_INTERVAL_SECS`)
    pub janitor_interval: Duration,
    /// Upper bound on simultaneous reconciliations (`MAX_CONCURRENT_RECONCILES`)
    pub max_concurrent_reconciles: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            metrics_port: env_or("METRICS_PORT", DEFAULT_METRICS_PORT)?,
            janitor_interval: Duration::from_secs(env_or(
                "JANITOR_INTERVAL_SECS",
                DEFAULT_JANITOR_INTERVAL_SECS,
            )?),
            max_concurrent_reconciles: env_or(
                "MAX_CONCURRENT_RECONCILES",
                DEFAULT_MAX_CONCURRENT_RECONCILES,
            )?,
        })
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|err| anyhow::anyhow!("invalid {key} {raw:?}: {err}")),
        Err(std::env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(anyhow::anyhow!("reading {key}: {err}")),
    }
}
