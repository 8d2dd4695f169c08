//! Scraper driven entirely by a [`SiteConfig`] record.

use super::scroll::scroll_until_stable;
use super::{ScrapeSettings, ScraperFactory, SiteScraper};
use crate::browser::{ContentSignal, PageDriver, Session};
use crate::config::SiteConfig;
use crate::model::{ParserError, RequestError, ScrapeError, ScrapeItem};
use crate::parser::SiteExtractor;
use crate::utils::append_query;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info};
use url::Url;

const READINESS_POLL: Duration = Duration::from_millis(250);

pub struct ConfiguredSiteScraper {
    config: Arc<SiteConfig>,
    extractor: Arc<SiteExtractor>,
    settings: ScrapeSettings,
}

impl ConfiguredSiteScraper {
    pub fn new(config: Arc<SiteConfig>, extractor: Arc<SiteExtractor>, settings: ScrapeSettings) -> Self {
        Self {
            config,
            extractor,
            settings,
        }
    }

    /// Compiles the site's selectors once; every scraper the factory builds shares them.
    pub fn factory(config: SiteConfig, settings: ScrapeSettings) -> Result<ScraperFactory, ParserError> {
        let extractor = Arc::new(SiteExtractor::compile(&config.selectors)?);
        let config = Arc::new(config);
        Ok(Arc::new(move || {
            Box::new(ConfiguredSiteScraper::new(
                config.clone(),
                extractor.clone(),
                settings.clone(),
            )) as Box<dyn SiteScraper>
        }))
    }

    fn search_url(&self) -> Result<String, RequestError> {
        let base = Url::parse(&self.config.base_url).map_err(|e| {
            RequestError::InvalidRequest(format!("site '{}' has a bad base url: {}", self.config.site_id, e))
        })?;
        let url = base
            .join(self.config.search_path.trim_start_matches('/'))
            .map_err(|e| RequestError::InvalidRequest(format!("bad search path: {}", e)))?;
        Ok(url.to_string())
    }

    /// Polls until one of the item selectors is present, bounded by the site's readiness timeout.
    async fn wait_until_ready(&self, page: &dyn PageDriver, url: &str) -> Result<String, ScrapeError> {
        let selectors = self.extractor.item_selectors();
        let deadline = Instant::now() + self.config.readiness_timeout();

        loop {
            match page.first_present(&selectors).await {
                Ok(Some(selector)) => {
                    debug!("{} ready, matched '{}'", url, selector);
                    return Ok(selector);
                }
                Ok(None) => {}
                Err(e) => debug!("Readiness probe failed on {}: {}", url, e),
            }
            if Instant::now() >= deadline {
                return Err(ScrapeError::NavigationTimeout {
                    url: url.to_string(),
                    secs: self.config.readiness_timeout_secs,
                });
            }
            sleep(READINESS_POLL).await;
        }
    }
}

#[async_trait::async_trait]
impl SiteScraper for ConfiguredSiteScraper {
    fn site_id(&self) -> &str {
        &self.config.site_id
    }

    fn target_url(&self, params: &BTreeMap<String, String>) -> Result<String, RequestError> {
        let mut query = self.config.default_params.clone();
        for (logical, value) in params {
            let key = self.config.param_mapping.get(logical).ok_or_else(|| {
                RequestError::InvalidRequest(format!(
                    "site '{}' does not accept parameter '{}'",
                    self.config.site_id, logical
                ))
            })?;
            query.insert(key.clone(), value.clone());
        }

        let url = self.search_url()?;
        Ok(append_query(&url, query.iter().map(|(k, v)| (k.as_str(), v.as_str()))))
    }

    async fn scrape(
        &self,
        session: &Session,
        params: &BTreeMap<String, String>,
    ) -> Result<Vec<ScrapeItem>, ScrapeError> {
        let url = self.target_url(params)?;
        let page = session.page()?;
        info!("Scraping site '{}': {}", self.config.site_id, url);

        session.navigate(&url, self.settings.navigation_timeout).await?;
        let container = self.wait_until_ready(page, &url).await?;

        if self.config.scroll {
            scroll_until_stable(page, &ContentSignal::ElementCount(container), &self.settings.scroll).await;
        }

        let html = page
            .serialize_html()
            .await
            .map_err(|e| ScrapeError::Extraction(e.to_string()))?;
        let items = self.extractor.extract(&html, &self.config.base_url, &url);
        info!("Found {} item(s) on '{}'", items.len(), self.config.site_id);

        Ok(items)
    }
}
