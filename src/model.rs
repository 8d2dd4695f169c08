// Core structs: ScrapeRequest, ScrapeItem, ScrapeResponse and the error enums
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScrapeMode {
    #[serde(rename = "site")]
    SiteScrape,
    #[serde(rename = "url")]
    UrlScrape,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeRequest {
    pub mode: ScrapeMode,
    #[serde(default)]
    pub site_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// A request after validation: exactly one target, chosen by `mode`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeTarget {
    Site {
        site_id: String,
        params: BTreeMap<String, String>,
    },
    Url {
        url: String,
        params: BTreeMap<String, String>,
    },
}

impl ScrapeRequest {
    #[cfg(test)]
    pub fn site(site_id: impl Into<String>, params: BTreeMap<String, String>) -> Self {
        Self {
            mode: ScrapeMode::SiteScrape,
            site_id: Some(site_id.into()),
            url: None,
            params,
        }
    }

    #[cfg(test)]
    pub fn url(url: impl Into<String>, params: BTreeMap<String, String>) -> Self {
        Self {
            mode: ScrapeMode::UrlScrape,
            site_id: None,
            url: Some(url.into()),
            params,
        }
    }

    /// Checks that the field selected by `mode` is set and the other one is not.
    pub fn validate(self) -> Result<ScrapeTarget, RequestError> {
        let site_id = self.site_id.filter(|s| !s.trim().is_empty());
        let url = self.url.filter(|u| !u.trim().is_empty());

        match (self.mode, site_id, url) {
            (ScrapeMode::SiteScrape, Some(site_id), None) => Ok(ScrapeTarget::Site {
                site_id,
                params: self.params,
            }),
            (ScrapeMode::UrlScrape, None, Some(url)) => {
                let parsed = url::Url::parse(&url)
                    .map_err(|e| RequestError::InvalidRequest(format!("malformed url '{}': {}", url, e)))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(RequestError::InvalidRequest(format!(
                        "unsupported url scheme '{}'",
                        parsed.scheme()
                    )));
                }
                Ok(ScrapeTarget::Url {
                    url,
                    params: self.params,
                })
            }
            (ScrapeMode::SiteScrape, None, _) => Err(RequestError::InvalidRequest(
                "site mode requires a site_id".into(),
            )),
            (ScrapeMode::UrlScrape, _, None) => Err(RequestError::InvalidRequest(
                "url mode requires a url".into(),
            )),
            (_, Some(_), Some(_)) => Err(RequestError::InvalidRequest(
                "exactly one of site_id and url may be set".into(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeItem {
    pub url: String,
    pub title: String,
    pub html: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeResponse {
    pub status: ScrapeStatus,
    pub data: Vec<ScrapeItem>,
    pub message: String,
}

impl ScrapeResponse {
    pub fn success(data: Vec<ScrapeItem>, message: impl Into<String>) -> Self {
        Self {
            status: ScrapeStatus::Success,
            data,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ScrapeStatus::Error,
            data: Vec::new(),
            message: message.into(),
        }
    }
}

/// Caller mistakes. These are reported directly and never reach a browser.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown site: {0}")]
    UnknownSite(String),
    #[error("site already registered: {0}")]
    DuplicateSite(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("browser session could not be opened: {0}")]
    Open(String),
    #[error("all {0} browser sessions are in use")]
    CapacityExceeded(usize),
    #[error("browser session already released")]
    Released,
}

/// Failures reported by a browser driver primitive.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("page error: {0}")]
    Page(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("script evaluation failed: {0}")]
    Script(String),
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("{0}")]
    Request(#[from] RequestError),
    #[error("{0}")]
    Session(#[from] SessionError),
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("{url} did not become ready within {secs}s")]
    NavigationTimeout { url: String, secs: u64 },
    #[error("extraction failed: {0}")]
    Extraction(String),
    #[error("request abandoned after {0}s")]
    Abandoned(u64),
    #[error("scraper crashed: {0}")]
    Internal(String),
}

impl ScrapeError {
    /// Short kind label used in caller-facing messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::Request(_) => "InvalidRequest",
            ScrapeError::Session(SessionError::CapacityExceeded(_)) => "CapacityExceeded",
            ScrapeError::Session(_) => "SessionError",
            ScrapeError::Navigation { .. } => "NavigationError",
            ScrapeError::NavigationTimeout { .. } => "NavigationTimeout",
            ScrapeError::Extraction(_) => "ExtractionError",
            ScrapeError::Abandoned(_) => "Timeout",
            ScrapeError::Internal(_) => "InternalError",
        }
    }
}

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("invalid selector '{selector}' for field '{field}'")]
    InvalidSelector { field: String, selector: String },
    #[error("missing required field: {0}")]
    MissingField(String),
}
