//! Client configuration.

use std::time::Duration;

use crate::error::Error;

/// Default production endpoint of the Double-O service.
pub const DEFAULT_BASE_URL: &str = "https://double-o-539191849800.europe-west1.run.app";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_BACKOFF_FACTOR: f64 = 0.5;

/// Immutable client configuration.
///
/// Constructed once per client and validated up front; per-call knobs
/// (cache TTL, proxy method/payload/headers) live on the individual calls.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the service.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Maximum retry attempts for transient failures; 0 disables retry.
    pub retries: u32,
    /// Multiplier for exponential backoff between retries.
    pub backoff_factor: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            retries: 0,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
        }
    }
}

impl Config {
    /// Validates the configuration and normalizes the base URL.
    pub(crate) fn validated(mut self) -> Result<Self, Error> {
        let url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("invalid base_url {:?}: {}", self.base_url, e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(Error::Config(format!(
                "base_url must use http or https, got {:?}",
                self.base_url
            )));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor <= 0.0 {
            return Err(Error::Config(format!(
                "backoff_factor must be a positive number, got {}",
                self.backoff_factor
            )));
        }
        if self.timeout.is_zero() {
            return Err(Error::Config("timeout must be non-zero".to_string()));
        }
        self.base_url = self.base_url.trim_end_matches('/').to_string();
        Ok(self)
    }
}
