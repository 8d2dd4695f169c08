//! Browser abstraction used by the scrapers.
//!
//! Scrapers only talk to a [`PageDriver`]; the session manager obtains pages
//! from a [`BrowserDriver`]. The Chromium implementation lives in [`chromium`].

pub mod chromium;
pub mod session;

#[cfg(test)]
pub mod fake;

use crate::model::BrowserError;
use async_trait::async_trait;
use std::collections::BTreeMap;

pub use chromium::ChromiumDriver;
pub use session::{Session, SessionManager};

/// Measurable proxy for "did scrolling reveal anything new".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSignal {
    /// Scrollable height of the document.
    DocumentHeight,
    /// Number of elements matching a CSS selector.
    ElementCount(String),
}

/// Opens isolated pages. One page per scrape, never shared.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn open_page(&self) -> Result<Box<dyn PageDriver>, BrowserError>;
}

/// The primitives a scraper may use on an open page.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigates and waits for the load to complete.
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;
    async fn scroll_to_bottom(&self) -> Result<(), BrowserError>;
    async fn measure_content_signal(&self, signal: &ContentSignal) -> Result<u64, BrowserError>;
    async fn serialize_html(&self) -> Result<String, BrowserError>;
    async fn title(&self) -> Result<String, BrowserError>;
    async fn read_metadata(&self) -> Result<BTreeMap<String, String>, BrowserError>;
    /// Returns the first selector that currently matches an element.
    async fn first_present(&self, selectors: &[String]) -> Result<Option<String>, BrowserError>;
    /// Clicks the first present element; returns the selector that was clicked.
    async fn click_first(&self, selectors: &[String]) -> Result<Option<String>, BrowserError>;
    /// Clicks the first button or link whose visible text contains one of
    /// `texts`, ignoring case; returns the text that matched.
    async fn click_text(&self, texts: &[String]) -> Result<Option<String>, BrowserError>;
    /// Closes the page and its browser context.
    async fn close(self: Box<Self>) -> Result<(), BrowserError>;
}
