mod browser;
mod config;
mod model;
mod orchestrator;
mod parser;
mod scraper;
mod server;
mod utils;

use browser::{ChromiumDriver, SessionManager};
use config::{load_config, AppConfig};
use orchestrator::Orchestrator;
use scraper::{GenericScraper, ScrapeSettings, ScraperRegistry};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

const DEFAULT_CONFIG: &str = "config.json";

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Log details about any panic
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("😱 Panic occurred: {:?}", panic_info);
    }));

    let path = std::env::var("PAGEGRAB_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG.to_string());
    let mut config: AppConfig = match load_config(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Config load error ({}): {}", path, e);
            return;
        }
    };
    config.apply_env();

    let addr: SocketAddr = match format!("{}:{}", config.server.host, config.server.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid listen address {}:{}: {}", config.server.host, config.server.port, e);
            return;
        }
    };

    let settings = ScrapeSettings::from_config(&config);
    let registry = ScraperRegistry::from_sites(&config.sites, &settings);
    if registry.is_empty() {
        warn!("No sites registered, only url scrapes will be served");
    }
    let site_count = registry.len();

    // Chromium is launched lazily on the first scrape
    let driver = Arc::new(ChromiumDriver::new(config.browser.clone()));
    let sessions = SessionManager::new(driver, config.browser.max_sessions, config.browser.on_capacity);

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(registry),
        sessions,
        GenericScraper::new(settings),
        config.request_timeout(),
    ));

    info!(
        "Serving {} site(s), up to {} concurrent browser session(s)",
        site_count,
        config.browser.max_sessions
    );

    if let Err(e) = server::serve(addr, orchestrator).await {
        error!("Server error: {}", e);
    }
}
