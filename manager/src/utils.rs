//! Version metadata and reconnect backoff

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Build metadata reported by `/version` and `--version`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// `User-Agent` sent to the scheduler
pub fn user_agent() -> String {
    format!("deploy-manager/{}", env!("CARGO_PKG_VERSION"))
}

/// Delay policy between broker reconnect attempts
#[derive(Debug, Clone)]
pub struct CooldownOptions {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for CooldownOptions {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

/// Delay before the next attempt after `failures` consecutive failures.
/// The first failure waits `base_delay`.
pub fn calc_exp_backoff(options: &CooldownOptions, failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
    let delay = options.base_delay.as_secs_f64() * options.multiplier.powi(exponent);
    if !delay.is_finite() {
        return options.max_delay;
    }
    Duration::from_secs_f64(delay.min(options.max_delay.as_secs_f64()))
}
