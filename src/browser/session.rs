//! Per-request browser sessions.
//!
//! Every scrape gets a fresh page in its own browser context. Concurrency is
//! capped by a semaphore; a session that is dropped without `release` (the
//! request was cancelled) still closes its page and gives back its permit.

use super::{BrowserDriver, PageDriver};
use crate::config::CapacityPolicy;
use crate::model::{ScrapeError, SessionError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tracing::{debug, info, warn};

pub struct SessionManager {
    driver: Arc<dyn BrowserDriver>,
    permits: Arc<Semaphore>,
    max_sessions: usize,
    policy: CapacityPolicy,
    active: Arc<AtomicUsize>,
    next_id: AtomicU64,
}

impl SessionManager {
    pub fn new(driver: Arc<dyn BrowserDriver>, max_sessions: usize, policy: CapacityPolicy) -> Self {
        let max_sessions = max_sessions.max(1);
        Self {
            driver,
            permits: Arc::new(Semaphore::new(max_sessions)),
            max_sessions,
            policy,
            active: Arc::new(AtomicUsize::new(0)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Opens a fresh page. Waits for or refuses a free slot depending on the
    /// capacity policy.
    pub async fn acquire(&self) -> Result<Session, SessionError> {
        let permit = match self.policy {
            CapacityPolicy::Block => self
                .permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| SessionError::Open("session pool is closed".into()))?,
            CapacityPolicy::Fail => self
                .permits
                .clone()
                .try_acquire_owned()
                .map_err(|_| SessionError::CapacityExceeded(self.max_sessions))?,
        };

        let page = self
            .driver
            .open_page()
            .await
            .map_err(|e| SessionError::Open(e.to_string()))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Session #{} acquired ({} active)", id, active);

        Ok(Session {
            id,
            page: Some(page),
            active: Arc::clone(&self.active),
            _permit: permit,
        })
    }

    /// Closes the session's page and context. Never fails: close errors are logged.
    pub async fn release(&self, mut session: Session) {
        if let Some(page) = session.page.take() {
            if let Err(e) = page.close().await {
                warn!("Session #{} close failed: {}", session.id, e);
            }
        }
        info!("Session #{} released", session.id);
    }

    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

/// Exclusive handle to one open page.
pub struct Session {
    id: u64,
    page: Option<Box<dyn PageDriver>>,
    active: Arc<AtomicUsize>,
    _permit: OwnedSemaphorePermit,
}

impl Session {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn page(&self) -> Result<&dyn PageDriver, SessionError> {
        self.page.as_deref().ok_or(SessionError::Released)
    }

    /// Navigates, bounded by `limit`. Slow and failed loads are both navigation errors.
    pub async fn navigate(&self, url: &str, limit: Duration) -> Result<(), ScrapeError> {
        let page = self.page()?;
        info!("Session #{} navigating to {}", self.id, url);

        match timeout(limit, page.navigate(url)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ScrapeError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(ScrapeError::Navigation {
                url: url.to_string(),
                reason: format!("timed out after {}s", limit.as_secs()),
            }),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(page) = self.page.take() {
            warn!("Session #{} dropped without release, closing in background", self.id);
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let id = self.id;
                    handle.spawn(async move {
                        if let Err(e) = page.close().await {
                            warn!("Session #{} background close failed: {}", id, e);
                        }
                    });
                }
                Err(_) => warn!("Session #{} dropped outside a runtime, page not closed", self.id),
            }
        }
        let remaining = self.active.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        debug!("Session #{} gone ({} active)", self.id, remaining);
    }
}
