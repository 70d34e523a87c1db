//! Per-instance configuration for the tracker connection and share tuning.
//!
//! Credentials are explicit values carried by the config struct and passed by
//! value to whoever needs them. There is no global mutable credential or
//! header state anywhere in the workspace.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tdk_shares::ShareConfig;

pub const ENV_TRACKER_URL: &str = "TDK_TRACKER_URL";
pub const ENV_TRACKER_API_KEY: &str = "TDK_TRACKER_API_KEY";
pub const ENV_MIN_SHARE_PERCENT: &str = "TDK_MIN_SHARE_PERCENT";

/// Default remote-call timeout in seconds. Every tracker call is bounded;
/// a timeout surfaces as a retryable connection error to the caller.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings for one tracker instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Base URL of the tracker, without the admin API path suffix.
    pub base_url: String,
    /// Admin API key sent as the `Api-Key` header.
    pub api_key: String,
    /// Remote-call timeout in seconds.
    pub timeout_secs: u64,
}

impl TrackerConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            api_key: api_key.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Read `TDK_TRACKER_URL` and `TDK_TRACKER_API_KEY` from the environment.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var(ENV_TRACKER_URL)
            .with_context(|| format!("missing env var {ENV_TRACKER_URL}"))?;
        let api_key = std::env::var(ENV_TRACKER_API_KEY)
            .with_context(|| format!("missing env var {ENV_TRACKER_API_KEY}"))?;
        if base_url.trim().is_empty() {
            bail!("{ENV_TRACKER_URL} must not be empty");
        }
        if api_key.trim().is_empty() {
            bail!("{ENV_TRACKER_API_KEY} must not be empty");
        }
        Ok(Self::new(base_url, api_key))
    }
}

/// Share tuning: `TDK_MIN_SHARE_PERCENT` overrides the default minimum floor.
pub fn share_config_from_env() -> Result<ShareConfig> {
    match std::env::var(ENV_MIN_SHARE_PERCENT) {
        Ok(raw) => {
            let min_share_percent: i32 = raw
                .parse()
                .with_context(|| format!("{ENV_MIN_SHARE_PERCENT} must be an integer, got {raw:?}"))?;
            if !(0..=100).contains(&min_share_percent) {
                bail!("{ENV_MIN_SHARE_PERCENT} must be in 0..=100, got {min_share_percent}");
            }
            Ok(ShareConfig { min_share_percent })
        }
        Err(_) => Ok(ShareConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slashes_are_trimmed_from_base_url() {
        let cfg = TrackerConfig::new("https://trk.example.com///", "key");
        assert_eq!(cfg.base_url, "https://trk.example.com");
    }

    #[test]
    fn default_timeout_is_bounded() {
        let cfg = TrackerConfig::new("https://trk.example.com", "key");
        assert_eq!(cfg.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }
}
