use crate::browser::Session;
use crate::model::{RequestError, ScrapeError, ScrapeItem};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Site-specific scraping logic. Implementations are built per request by a
/// [`ScraperFactory`] and run against an already acquired session.
#[async_trait::async_trait]
pub trait SiteScraper: Send + Sync {
    fn site_id(&self) -> &str;

    /// Builds the target URL, rejecting parameters the site does not map.
    fn target_url(&self, params: &BTreeMap<String, String>) -> Result<String, RequestError>;

    async fn scrape(
        &self,
        session: &Session,
        params: &BTreeMap<String, String>,
    ) -> Result<Vec<ScrapeItem>, ScrapeError>;
}

pub type ScraperFactory = Arc<dyn Fn() -> Box<dyn SiteScraper> + Send + Sync>;
