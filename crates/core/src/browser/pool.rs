//! Session pool implementation.
//!
//! The pool enforces a hard ceiling on concurrent sessions with a semaphore.
//! `acquire` waits a bounded time for a permit, then hands out an idle
//! session (health-checked) or creates a fresh one. `release` returns a
//! session for reuse only when it passes the health check; unhealthy
//! sessions are retired so one poisoned context cannot cascade failures
//! across jobs. Dropping a handle without releasing it (a cancelled job)
//! frees the permit immediately and discards the session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

use crate::config::{PoolConfig, PortalConfig};
use crate::error::LookupError;

/// A session type the pool can create and health-check.
#[async_trait]
pub trait PoolableSession: Send + Sized + 'static {
    /// Create a fresh session.
    async fn create(portal: &PortalConfig) -> Result<Self, LookupError>;

    /// Returns true if the session can still be driven.
    async fn healthy(&self, budget: Duration) -> bool;
}

/// Exclusive-use handle to a pooled session.
///
/// The permit is tied to the handle, so the pool slot frees as soon as the
/// handle is dropped, whether or not the session was returned for reuse.
pub struct SessionHandle<S: PoolableSession> {
    session: Option<S>,
    _permit: OwnedSemaphorePermit,
}

impl<S: PoolableSession> SessionHandle<S> {
    /// Access the underlying session.
    pub fn session(&self) -> &S {
        self.session
            .as_ref()
            .expect("session taken before handle drop")
    }

    fn take(&mut self) -> Option<S> {
        self.session.take()
    }
}

/// Bounded pool of reusable sessions.
pub struct SessionPool<S: PoolableSession> {
    config: PoolConfig,
    portal: PortalConfig,
    semaphore: Arc<Semaphore>,
    idle: Mutex<Vec<S>>,
}

impl<S: PoolableSession> SessionPool<S> {
    pub fn new(config: PoolConfig, portal: PortalConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_sessions));
        Self {
            config,
            portal,
            semaphore,
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Number of sessions that could be acquired right now without waiting.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Acquire an exclusive-use session, waiting a bounded time for a free
    /// slot. Idle sessions are reused when healthy, otherwise retired and
    /// replaced with a fresh one.
    pub async fn acquire(&self) -> Result<SessionHandle<S>, LookupError> {
        let wait = Duration::from_secs(self.config.acquire_timeout_secs);
        let permit = tokio::time::timeout(wait, Arc::clone(&self.semaphore).acquire_owned())
            .await
            .map_err(|_| {
                LookupError::SiteUnavailable(format!(
                    "no browser session free within {}s",
                    self.config.acquire_timeout_secs
                ))
            })?
            .map_err(|_| LookupError::Browser("session pool closed".to_string()))?;

        let health_budget = Duration::from_secs(self.config.health_check_timeout_secs);

        loop {
            let candidate = self.idle.lock().await.pop();
            match candidate {
                Some(session) => {
                    if session.healthy(health_budget).await {
                        debug!("Reusing idle browser session");
                        return Ok(SessionHandle {
                            session: Some(session),
                            _permit: permit,
                        });
                    }
                    // Retire and try the next idle session.
                    info!("Retiring unhealthy idle session");
                    drop(session);
                }
                None => break,
            }
        }

        let session = S::create(&self.portal).await?;
        Ok(SessionHandle {
            session: Some(session),
            _permit: permit,
        })
    }

    /// Return a session to the pool. Unhealthy sessions are discarded; the
    /// replacement is created lazily on the next acquire.
    pub async fn release(&self, mut handle: SessionHandle<S>) {
        let health_budget = Duration::from_secs(self.config.health_check_timeout_secs);

        if let Some(session) = handle.take() {
            if session.healthy(health_budget).await {
                self.idle.lock().await.push(session);
            } else {
                info!("Discarding session that failed post-use health check");
                drop(session);
            }
        }
        // Permit frees when `handle` drops here.
    }
}
