// Scrapers: registry, per-site scrapers, the generic URL scraper and the scroll loop
pub mod generic;
pub mod registry;
pub mod scroll;
pub mod site;
pub mod traits;

use crate::config::AppConfig;
use std::time::Duration;

pub use generic::GenericScraper;
pub use registry::ScraperRegistry;
pub use scroll::ScrollPolicy;
pub use traits::{ScraperFactory, SiteScraper};

/// Timing knobs shared by every scraper.
#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    pub scroll: ScrollPolicy,
    pub navigation_timeout: Duration,
}

impl ScrapeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            scroll: ScrollPolicy::from(&config.scroll),
            navigation_timeout: config.browser.navigation_timeout(),
        }
    }
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            scroll: ScrollPolicy::default(),
            navigation_timeout: Duration::from_secs(30),
        }
    }
}
