//! HTTP gateway server
//!
//! Wraps an actix-web `HttpServer` around a shared [`CameraRegistry`] and runs
//! the idle reaper next to it.

pub mod config;
pub(crate) mod routes;

use std::future::Future;
use std::sync::Arc;

use actix_web::http::header;
use actix_web::{middleware, web, App, HttpServer};
use tokio_util::sync::CancellationToken;

use crate::capture::SourceOpener;
use crate::error::Result;
use crate::registry::{CameraRegistry, RegistryConfig};

pub use config::ServerConfig;
use routes::AppState;

/// HTTP gateway
pub struct GatewayServer {
    config: ServerConfig,
    registry: Arc<CameraRegistry>,
}

impl GatewayServer {
    /// Create a server with default registry configuration
    pub fn new(config: ServerConfig, opener: Arc<dyn SourceOpener>) -> Self {
        Self::with_registry_config(config, opener, RegistryConfig::default())
    }

    /// Create a server with custom registry configuration
    pub fn with_registry_config(
        config: ServerConfig,
        opener: Arc<dyn SourceOpener>,
        registry_config: RegistryConfig,
    ) -> Self {
        Self {
            config,
            registry: Arc::new(CameraRegistry::with_config(opener, registry_config)),
        }
    }

    /// Get a reference to the camera registry
    pub fn registry(&self) -> &Arc<CameraRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Run the server until the process is killed
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    ///
    /// Must be called from an actix system runtime (`#[actix_web::main]`).
    /// When `shutdown` resolves the listener stops, the reaper is cancelled
    /// and every session is stopped.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let state = web::Data::new(AppState {
            registry: Arc::clone(&self.registry),
            default_source: self.config.default_source.clone(),
            pacing: self.config.pacing,
            test_pattern_quality: self.config.test_pattern_quality,
        });

        let mut http = HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .wrap(
                    middleware::DefaultHeaders::new()
                        .add((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")),
                )
                .configure(routes::configure)
        })
        .disable_signals()
        .shutdown_timeout(self.config.shutdown_timeout.as_secs());

        if let Some(workers) = self.config.workers {
            http = http.workers(workers);
        }

        let server = http.bind(self.config.bind_addr)?.run();
        let handle = server.handle();
        tracing::info!(addr = %self.config.bind_addr, "Gateway listening");

        let cancel = CancellationToken::new();
        let reaper = self.registry.spawn_reaper(cancel.clone());
        let mut serving = actix_web::rt::spawn(server);

        let result = tokio::select! {
            joined = &mut serving => joined.unwrap_or_else(|err| Err(std::io::Error::other(err))),
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                handle.stop(true).await;
                serving.await.unwrap_or_else(|err| Err(std::io::Error::other(err)))
            }
        };

        cancel.cancel();
        if let Err(err) = reaper.await {
            tracing::warn!(error = %err, "Reaper task ended abnormally");
        }

        let stopped = self.registry.shutdown().await;
        tracing::info!(sessions = stopped, "Gateway stopped");

        result.map_err(Into::into)
    }
}
