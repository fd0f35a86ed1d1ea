//! Proxy GeoTZ - Proxy Checker with Timezone Matching
//!
//! Tests a list of HTTP proxies one by one against an IP-geolocation service
//! and maps each working proxy's timezone onto the host's timezone catalog.

pub mod batch;
pub mod proxy;
pub mod timezone;
pub mod tui;

#[cfg(test)]
mod test_support;

pub use batch::*;
pub use proxy::*;
pub use timezone::*;

use std::time::Duration;

/// Application result type
pub type Result<T> = anyhow::Result<T>;

/// Application configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Geolocation probe settings
    pub probe: ProbeConfig,
    /// Bulk proxy-list provider settings
    pub provider: ProviderConfig,
    /// Per-run options
    pub run: RunOptions,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.probe = self.probe.with_endpoint(endpoint);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.run = self.run.with_timeout(timeout);
        self
    }

    pub fn with_stop_on_first_success(mut self, stop: bool) -> Self {
        self.run = self.run.with_stop_on_first_success(stop);
        self
    }
}
