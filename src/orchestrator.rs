//! Entry point for scrape requests.
//!
//! Resolves the request to a scraper, runs it inside a session and turns
//! every outcome into a `ScrapeResponse`. Only request validation errors are
//! returned as `Err`; nothing a scraper does escapes as a raw failure.

use crate::browser::{Session, SessionManager};
use crate::model::{RequestError, ScrapeError, ScrapeItem, ScrapeRequest, ScrapeResponse, ScrapeTarget};
use crate::scraper::{GenericScraper, ScraperRegistry, SiteScraper};
use futures::FutureExt;
use std::collections::BTreeMap;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

enum Job {
    Site {
        scraper: Box<dyn SiteScraper>,
        params: BTreeMap<String, String>,
    },
    Url {
        url: String,
        params: BTreeMap<String, String>,
    },
}

impl Job {
    fn label(&self) -> String {
        match self {
            Job::Site { scraper, .. } => scraper.site_id().to_string(),
            Job::Url { url, .. } => url.clone(),
        }
    }
}

pub struct Orchestrator {
    registry: Arc<ScraperRegistry>,
    sessions: SessionManager,
    generic: GenericScraper,
    request_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<ScraperRegistry>,
        sessions: SessionManager,
        generic: GenericScraper,
        request_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            sessions,
            generic,
            request_timeout,
        }
    }

    pub fn list_sites(&self) -> Vec<String> {
        self.registry.list_sites()
    }

    #[cfg(test)]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub async fn handle(&self, request: ScrapeRequest) -> Result<ScrapeResponse, RequestError> {
        let job = match request.validate()? {
            ScrapeTarget::Site { site_id, params } => {
                let factory = match self.registry.resolve(&site_id) {
                    Ok(factory) => factory,
                    Err(e) => {
                        warn!("Rejected scrape: {}", e);
                        return Ok(ScrapeResponse::error(format!("UnknownSiteError: {}", e)));
                    }
                };
                let scraper = factory();
                scraper.target_url(&params)?;
                Job::Site { scraper, params }
            }
            ScrapeTarget::Url { url, params } => Job::Url { url, params },
        };
        let label = job.label();

        let session = match self.sessions.acquire().await {
            Ok(session) => session,
            Err(e) => return Ok(failure(&label, ScrapeError::from(e))),
        };

        debug!("Session #{} running {}", session.id(), label);
        let run = AssertUnwindSafe(self.run(&job, &session)).catch_unwind();
        let outcome = match timeout(self.request_timeout, run).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(ScrapeError::Internal(panic_message(&*panic))),
            Err(_) => Err(ScrapeError::Abandoned(self.request_timeout.as_secs())),
        };
        self.sessions.release(session).await;
        debug!("{} session(s) still active", self.sessions.active_sessions());

        Ok(match outcome {
            Ok(items) => {
                info!("✅ Scraped {} item(s) from {}", items.len(), label);
                let message = format!("scraped {} item(s) from {}", items.len(), label);
                ScrapeResponse::success(items, message)
            }
            Err(e) => failure(&label, e),
        })
    }

    async fn run(&self, job: &Job, session: &Session) -> Result<Vec<ScrapeItem>, ScrapeError> {
        match job {
            Job::Site { scraper, params } => scraper.scrape(session, params).await,
            Job::Url { url, params } => self.generic.scrape(session, url, params).await,
        }
    }
}

fn failure(label: &str, error: ScrapeError) -> ScrapeResponse {
    warn!("❌ Scrape of {} failed: {}", label, error);
    ScrapeResponse::error(format!("{}: {}", error.kind(), error))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
