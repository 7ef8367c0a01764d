// crates/jobs/src/config.rs
//! Tracker timing configuration.

use std::time::Duration;

use thiserror::Error;

pub const POLL_INTERVAL_ENV: &str = "DATADICT_POLL_INTERVAL_SECS";
pub const STALE_THRESHOLD_ENV: &str = "DATADICT_STALE_THRESHOLD_SECS";
pub const GRACE_PERIOD_ENV: &str = "DATADICT_GRACE_PERIOD_SECS";
pub const MAX_POLLING_ENV: &str = "DATADICT_MAX_POLLING_SECS";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: expected a positive number of seconds")]
    InvalidDuration { key: &'static str, value: String },
}

/// Timing policy for one tracker instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Delay between the end of one poll and the start of the next.
    pub poll_interval: Duration,
    /// How long `updated_at` may stand still before a job counts as stale.
    pub stale_threshold: Duration,
    /// Window after the stale warning before the job is auto-cancelled.
    pub grace_period: Duration,
    /// Hard ceiling on how long a single job is watched.
    pub max_polling_duration: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            stale_threshold: Duration::from_secs(2 * 60 * 60),
            grace_period: Duration::from_secs(15 * 60),
            max_polling_duration: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl TrackerConfig {
    /// Defaults overridden by `DATADICT_*_SECS` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            poll_interval: seconds(&lookup, POLL_INTERVAL_ENV, defaults.poll_interval)?,
            stale_threshold: seconds(&lookup, STALE_THRESHOLD_ENV, defaults.stale_threshold)?,
            grace_period: seconds(&lookup, GRACE_PERIOD_ENV, defaults.grace_period)?,
            max_polling_duration: seconds(&lookup, MAX_POLLING_ENV, defaults.max_polling_duration)?,
        })
    }
}

fn seconds<F>(lookup: &F, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidDuration { key, value: raw }),
    }
}
