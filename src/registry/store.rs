//! Camera registry implementation

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::capture::SourceOpener;
use crate::error::{Error, Result};
use crate::session::{CameraSession, SourceId, StreamStatus};

use super::config::RegistryConfig;

/// Attempts `get_or_start` makes when the session it found is removed mid-start
const START_ATTEMPTS: usize = 3;

/// Registry of all camera sessions, keyed by source identifier
///
/// Thread-safe via `RwLock`. The lock is held only for map operations;
/// opening, reading and releasing capture handles happen outside it.
pub struct CameraRegistry {
    sessions: RwLock<HashMap<SourceId, Arc<CameraSession>>>,

    /// Backend used to open every session's source
    opener: Arc<dyn SourceOpener>,

    config: RegistryConfig,
}

impl CameraRegistry {
    /// Create a registry with default configuration
    pub fn new(opener: Arc<dyn SourceOpener>) -> Self {
        Self::with_config(opener, RegistryConfig::default())
    }

    /// Create a registry with custom configuration
    pub fn with_config(opener: Arc<dyn SourceOpener>, config: RegistryConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            opener,
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Return the session for `id`, creating an unstarted one if absent.
    ///
    /// Concurrent callers for the same id always receive the same session.
    pub async fn get_or_create(&self, id: impl Into<SourceId>) -> Arc<CameraSession> {
        let id = id.into();

        if let Some(session) = self.sessions.read().await.get(&id) {
            return Arc::clone(session);
        }

        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(id.clone()).or_insert_with(|| {
            tracing::info!(source = %id, "Session created");
            Arc::new(CameraSession::new(
                id.clone(),
                Arc::clone(&self.opener),
                self.config.session.clone(),
            ))
        });

        Arc::clone(session)
    }

    /// Return a started session for `id`, creating it if absent.
    ///
    /// If the session is removed from the registry while this call is starting
    /// it, a fresh session is created in its place.
    pub async fn get_or_start(&self, id: impl Into<SourceId>) -> Result<Arc<CameraSession>> {
        let id = id.into();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let session = self.get_or_create(id.clone()).await;
            match session.start().await {
                Ok(()) => return Ok(session),
                Err(_) if session.is_retired() && attempt < START_ATTEMPTS => {
                    tracing::debug!(source = %id, attempt = attempt, "Session removed while starting, retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Look up a session without creating it
    pub async fn get(&self, id: &SourceId) -> Option<Arc<CameraSession>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Stop a session and remove it from the registry
    ///
    /// Removed sessions are retired: callers still holding one cannot restart
    /// it outside the registry.
    pub async fn stop(&self, id: &SourceId) -> Result<()> {
        let session = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .remove(id)
                .ok_or_else(|| Error::NotFound(id.clone()))?;
            session.retire();
            session
        };

        session.shutdown().await;
        tracing::info!(source = %id, "Session removed");
        Ok(())
    }

    /// Stop every session and empty the registry. Returns the number stopped.
    pub async fn stop_all(&self) -> usize {
        let drained: Vec<Arc<CameraSession>> = {
            let mut sessions = self.sessions.write().await;
            sessions
                .drain()
                .map(|(_, session)| {
                    session.retire();
                    session
                })
                .collect()
        };

        let count = drained.len();
        join_all(drained.iter().map(|session| session.shutdown())).await;

        if count > 0 {
            tracing::info!(count = count, "All sessions stopped");
        }
        count
    }

    /// Status of every session in the registry, including failed ones
    pub async fn list_active(&self) -> Vec<StreamStatus> {
        let sessions: Vec<Arc<CameraSession>> =
            self.sessions.read().await.values().cloned().collect();

        let mut statuses: Vec<StreamStatus> =
            sessions.iter().map(|session| session.status()).collect();
        statuses.sort_by(|a, b| a.url.cmp(&b.url));
        statuses
    }

    /// Number of sessions in the registry
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Evict sessions idle for longer than the configured timeout, measured at
    /// `now`. Returns the ids that were evicted.
    pub async fn reap_idle_at(&self, now: Instant) -> Vec<SourceId> {
        let timeout = self.config.idle_timeout;

        let evicted: Vec<Arc<CameraSession>> = {
            let mut sessions = self.sessions.write().await;
            let idle: Vec<SourceId> = sessions
                .iter()
                .filter(|(_, session)| session.idle_for(now) > timeout)
                .map(|(id, _)| id.clone())
                .collect();

            idle.iter()
                .filter_map(|id| sessions.remove(id))
                .inspect(|session| session.retire())
                .collect()
        };

        for session in &evicted {
            tracing::info!(
                source = %session.id(),
                idle_secs = session.idle_for(now).as_secs(),
                "Session evicted after idle timeout"
            );
        }
        join_all(evicted.iter().map(|session| session.shutdown())).await;

        evicted.iter().map(|session| session.id().clone()).collect()
    }

    /// Run one eviction pass against the current time
    pub async fn reap_idle(&self) -> Vec<SourceId> {
        self.reap_idle_at(Instant::now()).await
    }

    /// Spawn the background idle reaper
    ///
    /// The task runs until `cancel` fires.
    pub fn spawn_reaper(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let period = registry.config.reap_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = registry.reap_idle().await;
                        if !evicted.is_empty() {
                            tracing::debug!(count = evicted.len(), "Reaper pass complete");
                        }
                    }
                }
            }

            tracing::debug!("Reaper stopped");
        })
    }

    /// Stop every session; used on process shutdown
    pub async fn shutdown(&self) -> usize {
        self.stop_all().await
    }
}
