//! Site-agnostic scraper: load any URL, scroll until the content settles,
//! return the whole document with its title and `<meta>` pairs.

use super::ScrapeSettings;
use super::scroll::scroll_until_stable;
use crate::browser::{ContentSignal, PageDriver, Session};
use crate::model::{ScrapeError, ScrapeItem};
use crate::parser::meta_tags;
use crate::utils::append_query;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Lifecycle of one generic scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Navigating,
    ScrollingStable,
    Extracting,
    Done,
    Failed,
}

impl Phase {
    /// Only navigation and extraction can fail; scrolling always moves on.
    pub fn can_advance_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Idle, Navigating)
                | (Navigating, ScrollingStable)
                | (Navigating, Failed)
                | (ScrollingStable, Extracting)
                | (Extracting, Done)
                | (Extracting, Failed)
        )
    }
}

struct Progress<'a> {
    url: &'a str,
    phase: Phase,
}

impl<'a> Progress<'a> {
    fn new(url: &'a str) -> Self {
        Self { url, phase: Phase::Idle }
    }

    fn advance(&mut self, next: Phase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal transition {:?} -> {:?}",
            self.phase,
            next
        );
        debug!("{}: {:?} -> {:?}", self.url, self.phase, next);
        self.phase = next;
    }
}

#[derive(Debug, Clone, Default)]
pub struct GenericScraper {
    settings: ScrapeSettings,
}

impl GenericScraper {
    pub fn new(settings: ScrapeSettings) -> Self {
        Self { settings }
    }

    /// `url` with `params` appended as its query string.
    pub fn target_url(url: &str, params: &BTreeMap<String, String>) -> String {
        append_query(url, params.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// Always yields exactly one item on success.
    pub async fn scrape(
        &self,
        session: &Session,
        url: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<Vec<ScrapeItem>, ScrapeError> {
        let target = Self::target_url(url, params);
        let page = session.page()?;
        let mut progress = Progress::new(&target);
        info!("🌐 Generic scrape: {}", target);

        progress.advance(Phase::Navigating);
        if let Err(e) = session.navigate(&target, self.settings.navigation_timeout).await {
            progress.advance(Phase::Failed);
            return Err(e);
        }

        progress.advance(Phase::ScrollingStable);
        let outcome = scroll_until_stable(page, &ContentSignal::DocumentHeight, &self.settings.scroll).await;
        debug!("Scroll outcome for {}: {:?}", target, outcome);

        progress.advance(Phase::Extracting);
        match extract_page(page, &target).await {
            Ok(item) => {
                progress.advance(Phase::Done);
                info!("Extracted {} bytes of html from {}", item.html.len(), target);
                Ok(vec![item])
            }
            Err(e) => {
                progress.advance(Phase::Failed);
                Err(e)
            }
        }
    }
}

/// Only a failed html serialization is fatal; title and metadata degrade.
async fn extract_page(page: &dyn PageDriver, target: &str) -> Result<ScrapeItem, ScrapeError> {
    let html = page
        .serialize_html()
        .await
        .map_err(|e| ScrapeError::Extraction(e.to_string()))?;

    let title = page.title().await.unwrap_or_else(|e| {
        warn!("Title unavailable for {}: {}", target, e);
        String::new()
    });

    let metadata = page.read_metadata().await.unwrap_or_else(|e| {
        warn!("Metadata read failed for {}, falling back to html: {}", target, e);
        meta_tags(&html)
    });

    Ok(ScrapeItem {
        url: target.to_string(),
        title,
        html,
        metadata,
    })
}
