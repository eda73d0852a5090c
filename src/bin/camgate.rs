//! camgate server binary
//!
//! Run with: cargo run --features opencv -- --port 5000
//!
//! Then open in a browser:
//!   http://localhost:5000/video_feed?rtsp_url=rtsp://camera.local/stream
//!   http://localhost:5000/video_feed/test

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use camgate::capture::{default_opener, ffmpeg_options_override, FFMPEG_OPTIONS_VAR};
use camgate::stream::StreamPacing;
use camgate::{GatewayServer, RegistryConfig, ServerConfig, SessionConfig};

#[derive(Debug, Parser)]
#[command(name = "camgate", version, about = "Serve camera sources as browser-friendly MJPEG streams")]
struct Args {
    /// Interface to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 5000)]
    port: u16,

    /// Source served by /video_feed when no rtsp_url is given
    #[arg(long = "default-source", env = "RTSP_URL", value_name = "URL")]
    default_source: Option<String>,

    /// Evict streams idle for this many seconds
    #[arg(long, env = "CAMGATE_IDLE_TIMEOUT_SECS", default_value_t = 300, value_name = "SECS")]
    idle_timeout: u64,

    /// Seconds between idle sweeps
    #[arg(long, env = "CAMGATE_REAP_INTERVAL_SECS", default_value_t = 30, value_name = "SECS")]
    reap_interval: u64,

    /// Consecutive missed reads before a stream is marked failed
    #[arg(long, env = "CAMGATE_MAX_FAILURES", default_value_t = 3, value_name = "N")]
    max_failures: u32,

    /// Milliseconds to wait before reopening a stalled source
    #[arg(long, env = "CAMGATE_RECONNECT_BACKOFF_MS", default_value_t = 1000, value_name = "MS")]
    reconnect_backoff_ms: u64,

    /// Cap on reconnects over a stream's lifetime (unlimited if unset)
    #[arg(long, env = "CAMGATE_MAX_RECONNECTS", value_name = "N")]
    max_reconnects: Option<u32>,

    /// JPEG quality for served frames (1-100)
    #[arg(long = "jpeg-quality", env = "CAMGATE_JPEG_QUALITY", default_value_t = 80, value_name = "QUALITY")]
    jpeg_quality: u8,

    /// Target frames per second per viewer
    #[arg(long, env = "CAMGATE_FPS", default_value_t = 30, value_name = "FPS")]
    fps: u32,

    /// HTTP worker threads (defaults to one per core)
    #[arg(long, env = "CAMGATE_WORKERS", value_name = "N")]
    workers: Option<usize>,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        let frame_interval = Duration::from_millis(1000 / u64::from(self.fps.clamp(1, 120)));
        let mut config = ServerConfig::with_addr(SocketAddr::new(self.host, self.port))
            .pacing(StreamPacing::default().frame_interval(frame_interval))
            .test_pattern_quality(self.jpeg_quality);

        if let Some(source) = &self.default_source {
            config = config.default_source(source.clone());
        }
        if let Some(workers) = self.workers {
            config = config.workers(workers);
        }
        config
    }

    fn registry_config(&self) -> RegistryConfig {
        let mut session = SessionConfig::default()
            .max_consecutive_failures(self.max_failures)
            .reconnect_backoff(Duration::from_millis(self.reconnect_backoff_ms))
            .jpeg_quality(self.jpeg_quality);
        if let Some(cap) = self.max_reconnects {
            session = session.max_total_reconnects(cap);
        }

        RegistryConfig::default()
            .idle_timeout(Duration::from_secs(self.idle_timeout))
            .reap_interval(Duration::from_secs(self.reap_interval))
            .session(session)
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Process environment is only written here, before any runtime thread exists
    if let Some(options) = ffmpeg_options_override(std::env::var_os(FFMPEG_OPTIONS_VAR).as_deref()) {
        std::env::set_var(FFMPEG_OPTIONS_VAR, options);
    }

    actix_web::rt::System::new().block_on(serve(args))
}

async fn serve(args: Args) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = args.server_config();
    let server = GatewayServer::with_registry_config(config, default_opener(), args.registry_config());

    tracing::info!(
        addr = %server.config().bind_addr,
        default_source = server.config().default_source.as_deref().unwrap_or("-"),
        idle_timeout_secs = args.idle_timeout,
        backend = if cfg!(feature = "opencv") { "opencv" } else { "none" },
        "Starting camgate"
    );

    server
        .run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "Failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await
        .with_context(|| format!("gateway on {} failed", server.config().bind_addr))?;

    Ok(())
}
