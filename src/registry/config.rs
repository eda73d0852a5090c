//! Registry configuration

use std::time::Duration;

use crate::session::SessionConfig;

/// Configuration for the camera registry and its idle reaper
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Evict sessions with no frame or viewer activity for this long
    pub idle_timeout: Duration,

    /// How often the reaper scans the registry
    pub reap_interval: Duration,

    /// Options applied to every session the registry creates
    pub session: SessionConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            reap_interval: Duration::from_secs(30),
            session: SessionConfig::default(),
        }
    }
}

impl RegistryConfig {
    /// Set the idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the reaper scan interval (never zero)
    pub fn reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Set the per-session options
    pub fn session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }
}
