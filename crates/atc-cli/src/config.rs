//! CLI configuration from environment.

use atc_core::DEFAULT_TIME_THRESHOLD;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Seconds under which two passages over a waypoint conflict.
    pub time_threshold: f64,
    pub clock_period: Duration,
    pub speed_factor: u32,
    /// Wall-clock budget for an optimization run.
    pub timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            time_threshold: DEFAULT_TIME_THRESHOLD,
            clock_period: Duration::from_millis(100),
            speed_factor: 1,
            timeout: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Unset or unparsable values keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            time_threshold: lookup("ATC_TIME_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .filter(|t: &f64| t.is_finite() && *t >= 0.0)
                .unwrap_or(defaults.time_threshold),
            clock_period: lookup("ATC_CLOCK_PERIOD_MS")
                .and_then(|s| s.parse().ok())
                .filter(|ms: &u64| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.clock_period),
            speed_factor: lookup("ATC_SPEED_FACTOR")
                .and_then(|s| s.parse().ok())
                .filter(|f: &u32| *f > 0)
                .unwrap_or(defaults.speed_factor),
            timeout: lookup("ATC_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .filter(|secs: &f64| secs.is_finite() && *secs >= 0.0)
                .map(Duration::from_secs_f64),
        }
    }
}
