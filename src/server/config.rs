//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::codec::DEFAULT_JPEG_QUALITY;
use crate::stream::StreamPacing;

/// HTTP server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Source used by `/video_feed` when the request names none
    pub default_source: Option<String>,

    /// HTTP worker threads (None = one per core)
    pub workers: Option<usize>,

    /// Viewer pacing for every stream endpoint
    pub pacing: StreamPacing,

    /// JPEG quality for the synthetic test stream
    pub test_pattern_quality: u8,

    /// How long open viewer connections get to drain on shutdown
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            default_source: None,
            workers: None,
            pacing: StreamPacing::default(),
            test_pattern_quality: DEFAULT_JPEG_QUALITY,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the fallback source; blank values are ignored
    pub fn default_source(mut self, source: impl Into<String>) -> Self {
        let source = source.into();
        self.default_source = (!source.trim().is_empty()).then_some(source);
        self
    }

    /// Set the number of HTTP workers
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers.max(1));
        self
    }

    /// Set viewer pacing
    pub fn pacing(mut self, pacing: StreamPacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Set the test-pattern JPEG quality (clamped to 1..=100)
    pub fn test_pattern_quality(mut self, quality: u8) -> Self {
        self.test_pattern_quality = quality.clamp(1, 100);
        self
    }

    /// Set the graceful shutdown timeout
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), 5000);
        assert!(config.bind_addr.ip().is_unspecified());
        assert!(config.default_source.is_none());
        assert!(config.workers.is_none());
        assert_eq!(config.test_pattern_quality, 80);
        assert_eq!(config.pacing.frame_interval, Duration::from_millis(33));
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let config = ServerConfig::with_addr(addr);

        assert_eq!(config.bind_addr, addr);
    }

    #[test]
    fn test_blank_default_source_is_ignored() {
        let config = ServerConfig::default().default_source("   ");
        assert!(config.default_source.is_none());

        let config = ServerConfig::default().default_source("rtsp://cam/main");
        assert_eq!(config.default_source.as_deref(), Some("rtsp://cam/main"));
    }

    #[test]
    fn test_builder_quality_clamped() {
        assert_eq!(ServerConfig::default().test_pattern_quality(0).test_pattern_quality, 1);
        assert_eq!(ServerConfig::default().test_pattern_quality(255).test_pattern_quality, 100);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:5001".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .workers(0)
            .default_source("0")
            .shutdown_timeout(Duration::from_secs(1))
            .pacing(StreamPacing::default().frame_interval(Duration::from_millis(50)));

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.workers, Some(1));
        assert_eq!(config.default_source.as_deref(), Some("0"));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.pacing.frame_interval, Duration::from_millis(50));
    }
}
