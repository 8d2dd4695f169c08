use super::site::ConfiguredSiteScraper;
use super::{ScrapeSettings, ScraperFactory};
use crate::config::SiteConfig;
use crate::model::RegistryError;
use std::collections::HashMap;
use tracing::{info, warn};

/// Site id -> scraper factory. Filled once at startup, then shared read-only
/// behind an `Arc`.
#[derive(Default)]
pub struct ScraperRegistry {
    order: Vec<String>,
    factories: HashMap<String, ScraperFactory>,
}

impl ScraperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every configured site; a site that cannot be built is skipped.
    pub fn from_sites(sites: &[SiteConfig], settings: &ScrapeSettings) -> Self {
        let mut registry = Self::new();
        for site in sites {
            let factory = match ConfiguredSiteScraper::factory(site.clone(), settings.clone()) {
                Ok(factory) => factory,
                Err(e) => {
                    warn!("⚠️ Site '{}' not registered: {}", site.site_id, e);
                    continue;
                }
            };
            if let Err(e) = registry.register(site.site_id.clone(), factory) {
                warn!("⚠️ {}", e);
            }
        }
        info!("Registered sites: {:?}", registry.list_sites());
        registry
    }

    pub fn register(&mut self, site_id: impl Into<String>, factory: ScraperFactory) -> Result<(), RegistryError> {
        let site_id = site_id.into();
        if self.factories.contains_key(&site_id) {
            return Err(RegistryError::DuplicateSite(site_id));
        }
        self.order.push(site_id.clone());
        self.factories.insert(site_id, factory);
        Ok(())
    }

    pub fn resolve(&self, site_id: &str) -> Result<ScraperFactory, RegistryError> {
        self.factories
            .get(site_id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownSite(site_id.to_string()))
    }

    /// Snapshot in registration order.
    pub fn list_sites(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
