use crate::parser::SiteExtractor;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Json(#[from] serde_json::Error),
}

/// One CSS selector list plus an optional attribute to read instead of text.
/// Accepts `"sel"`, `["a", "b"]` or `{"selectors": [..], "attribute": "href"}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawRule")]
pub struct ExtractionRule {
    pub selectors: Vec<String>,
    pub attribute: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRule {
    One(String),
    Many(Vec<String>),
    Full {
        selectors: Vec<String>,
        #[serde(default)]
        attribute: Option<String>,
    },
}

impl From<RawRule> for ExtractionRule {
    fn from(raw: RawRule) -> Self {
        match raw {
            RawRule::One(s) => Self { selectors: vec![s], attribute: None },
            RawRule::Many(selectors) => Self { selectors, attribute: None },
            RawRule::Full { selectors, attribute } => Self { selectors, attribute },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    pub site_id: String,
    pub base_url: String,
    #[serde(default)]
    pub search_path: String,
    /// Logical parameter name -> query key on the target site.
    #[serde(default)]
    pub param_mapping: BTreeMap<String, String>,
    /// Query key -> value, sent unless the caller overrides the key.
    #[serde(default)]
    pub default_params: BTreeMap<String, String>,
    pub selectors: BTreeMap<String, ExtractionRule>,
    #[serde(default = "default_readiness_timeout")]
    pub readiness_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub scroll: bool,
}

impl SiteConfig {
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    /// Checks everything the scraper relies on later; returns the reason on failure.
    fn check(&self) -> Result<(), String> {
        if self.site_id.trim().is_empty() {
            return Err("empty site_id".into());
        }
        url::Url::parse(&self.base_url).map_err(|e| format!("bad base_url: {}", e))?;
        if let Some((logical, _)) = self.param_mapping.iter().find(|(k, v)| k.is_empty() || v.is_empty()) {
            return Err(format!("empty entry in param_mapping near '{}'", logical));
        }
        SiteExtractor::compile(&self.selectors).map_err(|e| e.to_string())?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacityPolicy {
    Block,
    Fail,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub chrome_executable: Option<PathBuf>,
    pub extra_args: Vec<String>,
    pub max_sessions: usize,
    pub on_capacity: CapacityPolicy,
    pub navigation_timeout_secs: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1280,
            window_height: 800,
            chrome_executable: None,
            extra_args: Vec::new(),
            max_sessions: 4,
            on_capacity: CapacityPolicy::Block,
            navigation_timeout_secs: 30,
        }
    }
}

impl BrowserSettings {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrollSettings {
    pub stability_threshold: u32,
    pub max_iterations: u32,
    pub settle_interval_ms: u64,
    pub max_elapsed_secs: u64,
    pub load_more_selectors: Vec<String>,
    pub load_more_texts: Vec<String>,
}

impl Default for ScrollSettings {
    fn default() -> Self {
        Self {
            stability_threshold: 3,
            max_iterations: 20,
            settle_interval_ms: 2000,
            max_elapsed_secs: 60,
            load_more_selectors: [
                "button.load-more",
                ".btn-load-more",
                "a.more",
                "[class*=\"load-more\"]",
                "[class*=\"loadMore\"]",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            load_more_texts: ["載入更多", "加載更多", "Load more", "Show more"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawAppConfig {
    #[serde(default)]
    server: ServerSettings,
    #[serde(default)]
    browser: BrowserSettings,
    #[serde(default)]
    scroll: ScrollSettings,
    #[serde(default = "default_request_timeout")]
    request_timeout_secs: u64,
    #[serde(default)]
    sites: Vec<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub browser: BrowserSettings,
    pub scroll: ScrollSettings,
    pub request_timeout_secs: u64,
    pub sites: Vec<SiteConfig>,
}

impl AppConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Applies the HOST / PORT environment overrides.
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("HOST") {
            self.server.host = host;
        }
        match std::env::var("PORT").map(|p| p.parse::<u16>()) {
            Ok(Ok(port)) => self.server.port = port,
            Ok(Err(e)) => warn!("Ignoring invalid PORT: {}", e),
            Err(_) => {}
        }
    }
}

fn default_readiness_timeout() -> u64 {
    15
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    180
}

pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses the config text. Broken site entries are dropped with a warning;
/// only a broken document as a whole is an error.
pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    let raw: RawAppConfig = serde_json::from_str(content)?;

    let mut sites: Vec<SiteConfig> = Vec::new();
    for (index, value) in raw.sites.into_iter().enumerate() {
        let site: SiteConfig = match serde_json::from_value(value) {
            Ok(site) => site,
            Err(e) => {
                warn!("⚠️ Skipping site entry #{}: {}", index, e);
                continue;
            }
        };
        if let Err(reason) = site.check() {
            warn!("⚠️ Skipping site '{}': {}", site.site_id, reason);
            continue;
        }
        if sites.iter().any(|s| s.site_id == site.site_id) {
            warn!("⚠️ Skipping duplicate site '{}'", site.site_id);
            continue;
        }
        sites.push(site);
    }
    info!("Loaded {} site configuration(s)", sites.len());

    Ok(AppConfig {
        server: raw.server,
        browser: raw.browser,
        scroll: raw.scroll,
        request_timeout_secs: raw.request_timeout_secs,
        sites,
    })
}
