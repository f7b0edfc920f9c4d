//! Session tuning.
//!
//! Defaults match the device's expectations; every field can be overridden
//! from JSON/YAML through serde or from `STRMCTRL_*` environment variables.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

const COMMAND_TIMEOUT_ENV: &str = "STRMCTRL_COMMAND_TIMEOUT_MS";
const KEEP_ALIVE_INTERVAL_ENV: &str = "STRMCTRL_KEEP_ALIVE_INTERVAL_MS";
const MIN_POLL_INTERVAL_ENV: &str = "STRMCTRL_MIN_POLL_INTERVAL_MS";
const EVENT_CHANNEL_CAPACITY_ENV: &str = "STRMCTRL_EVENT_CHANNEL_CAPACITY";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Timeout for handshake, keep-alive and close-time commands.
    pub command_timeout_ms: u64,
    /// Period of the `CONNECT` heartbeat.
    pub keep_alive_interval_ms: u64,
    /// Lower bound on the inbound poll interval.
    pub min_poll_interval_ms: u64,
    /// Buffered events between poller and consumer; 0 hands each event over directly.
    pub event_channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: 100,
            keep_alive_interval_ms: 5_000,
            min_poll_interval_ms: 1,
            event_channel_capacity: 0,
        }
    }
}

impl SessionConfig {
    /// Defaults overlaid with any `STRMCTRL_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`; unparsable values are
    /// ignored with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            command_timeout_ms: parse_var(&lookup, COMMAND_TIMEOUT_ENV)
                .unwrap_or(defaults.command_timeout_ms),
            keep_alive_interval_ms: parse_var(&lookup, KEEP_ALIVE_INTERVAL_ENV)
                .filter(|ms| *ms > 0)
                .unwrap_or(defaults.keep_alive_interval_ms),
            min_poll_interval_ms: parse_var(&lookup, MIN_POLL_INTERVAL_ENV)
                .unwrap_or(defaults.min_poll_interval_ms),
            event_channel_capacity: parse_var(&lookup, EVENT_CHANNEL_CAPACITY_ENV)
                .unwrap_or(defaults.event_channel_capacity),
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms.max(1))
    }

    pub fn min_poll_interval(&self) -> Duration {
        Duration::from_millis(self.min_poll_interval_ms)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid value {:?} for {}", raw, key);
            None
        }
    }
}
