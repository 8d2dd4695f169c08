//! Chromium driver built on chromiumoxide.
//!
//! One browser process is launched on first use and shared; every page gets
//! its own browser context so cookies and storage never leak between scrapes.

use super::{BrowserDriver, ContentSignal, PageDriver};
use crate::config::BrowserSettings;
use crate::model::BrowserError;
use crate::parser::meta_tags;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const DOCUMENT_HEIGHT_JS: &str = "Math.max(\
    document.body ? document.body.scrollHeight : 0, \
    document.documentElement ? document.documentElement.scrollHeight : 0)";

const SCROLL_TO_BOTTOM_JS: &str = "window.scrollTo(0, Math.max(\
    document.body ? document.body.scrollHeight : 0, \
    document.documentElement ? document.documentElement.scrollHeight : 0))";

/// JS string literal for `value`.
fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

fn js_array(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

struct Launched<T> {
    browser: Arc<T>,
    alive: Arc<AtomicBool>,
}

/// The shared browser process. Launched on first use and launched again
/// once its connection is gone.
struct BrowserSlot<T> {
    current: Mutex<Option<Launched<T>>>,
}

impl<T> BrowserSlot<T> {
    fn new() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }

    /// `launch` gets the liveness flag the new browser must clear when its
    /// connection ends.
    async fn get_or_launch<F, Fut>(&self, launch: F) -> Result<Arc<T>, BrowserError>
    where
        F: FnOnce(Arc<AtomicBool>) -> Fut,
        Fut: Future<Output = Result<T, BrowserError>>,
    {
        let mut current = self.current.lock().await;
        if let Some(launched) = current.as_ref() {
            if launched.alive.load(Ordering::SeqCst) {
                return Ok(launched.browser.clone());
            }
            warn!("Browser connection lost, relaunching");
        }
        *current = None;

        let alive = Arc::new(AtomicBool::new(true));
        let browser = Arc::new(launch(alive.clone()).await?);
        *current = Some(Launched {
            browser: browser.clone(),
            alive,
        });
        Ok(browser)
    }

    /// Forgets `browser` if it is still the current one.
    async fn invalidate(&self, browser: &Arc<T>) {
        let mut current = self.current.lock().await;
        if current.as_ref().is_some_and(|l| Arc::ptr_eq(&l.browser, browser)) {
            *current = None;
        }
    }
}

pub struct ChromiumDriver {
    settings: BrowserSettings,
    browser: BrowserSlot<Browser>,
}

impl ChromiumDriver {
    pub fn new(settings: BrowserSettings) -> Self {
        Self {
            settings,
            browser: BrowserSlot::new(),
        }
    }

    fn build_config(settings: &BrowserSettings) -> Result<BrowserConfig, BrowserError> {
        let mut builder = BrowserConfig::builder()
            .window_size(settings.window_width, settings.window_height)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .arg("--mute-audio")
            .arg("--hide-scrollbars");

        if !settings.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &settings.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        for arg in &settings.extra_args {
            builder = builder.arg(arg.clone());
        }

        builder.build().map_err(BrowserError::Launch)
    }

    async fn browser(&self) -> Result<Arc<Browser>, BrowserError> {
        self.browser
            .get_or_launch(|alive| async move {
                let config = Self::build_config(&self.settings)?;
                info!("🚀 Launching Chromium (headless: {})", self.settings.headless);

                let (browser, mut handler) = Browser::launch(config)
                    .await
                    .map_err(|e| BrowserError::Launch(e.to_string()))?;

                tokio::spawn(async move {
                    while let Some(event) = handler.next().await {
                        if let Err(e) = event {
                            debug!("Chromium handler event error: {}", e);
                        }
                    }
                    alive.store(false, Ordering::SeqCst);
                    warn!("Chromium handler stopped");
                });

                Ok(browser)
            })
            .await
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn open_page(&self) -> Result<Box<dyn PageDriver>, BrowserError> {
        let browser = self.browser().await?;

        let context_id = match browser.execute(CreateBrowserContextParams::default()).await {
            Ok(response) => response.result.browser_context_id,
            Err(e) => {
                self.browser.invalidate(&browser).await;
                return Err(BrowserError::Page(format!("failed to create browser context: {}", e)));
            }
        };

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(BrowserError::Page)?;

        let page = match browser.new_page(target).await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.execute(DisposeBrowserContextParams::new(context_id)).await;
                return Err(BrowserError::Page(format!("failed to open page: {}", e)));
            }
        };

        Ok(Box::new(ChromiumPage {
            page,
            browser,
            context_id,
        }))
    }
}

pub struct ChromiumPage {
    page: Page,
    browser: Arc<Browser>,
    context_id: BrowserContextId,
}

impl ChromiumPage {
    async fn eval<T: serde::de::DeserializeOwned>(&self, script: &str) -> Result<T, BrowserError> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::Script(e.to_string()))?
            .into_value()
            .map_err(|e| BrowserError::Script(format!("unexpected script result: {:?}", e)))
    }
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| BrowserError::Navigation(e.to_string()))?;
        Ok(())
    }

    async fn scroll_to_bottom(&self) -> Result<(), BrowserError> {
        self.page
            .evaluate(SCROLL_TO_BOTTOM_JS)
            .await
            .map_err(|e| BrowserError::Script(format!("scroll failed: {}", e)))?;
        Ok(())
    }

    async fn measure_content_signal(&self, signal: &ContentSignal) -> Result<u64, BrowserError> {
        let value: f64 = match signal {
            ContentSignal::DocumentHeight => self.eval(DOCUMENT_HEIGHT_JS).await?,
            ContentSignal::ElementCount(selector) => {
                let script = format!("document.querySelectorAll({}).length", js_string(selector));
                self.eval(&script).await?
            }
        };
        Ok(value.max(0.0) as u64)
    }

    async fn serialize_html(&self) -> Result<String, BrowserError> {
        self.page
            .content()
            .await
            .map_err(|e| BrowserError::Page(format!("failed to serialize html: {}", e)))
    }

    async fn title(&self) -> Result<String, BrowserError> {
        let title = self
            .page
            .get_title()
            .await
            .map_err(|e| BrowserError::Page(e.to_string()))?;
        Ok(title.unwrap_or_default())
    }

    async fn read_metadata(&self) -> Result<BTreeMap<String, String>, BrowserError> {
        let html = self.serialize_html().await?;
        Ok(meta_tags(&html))
    }

    async fn first_present(&self, selectors: &[String]) -> Result<Option<String>, BrowserError> {
        let script = format!(
            "(() => {{ for (const s of {}) {{ try {{ if (document.querySelector(s)) return s; }} catch (e) {{}} }} return ''; }})()",
            js_array(selectors)
        );
        let found: String = self.eval(&script).await?;
        Ok(Some(found).filter(|s| !s.is_empty()))
    }

    async fn click_first(&self, selectors: &[String]) -> Result<Option<String>, BrowserError> {
        let script = format!(
            "(() => {{ for (const s of {}) {{ try {{ const el = document.querySelector(s); if (el) {{ el.click(); return s; }} }} catch (e) {{}} }} return ''; }})()",
            js_array(selectors)
        );
        let clicked: String = self.eval(&script).await?;
        Ok(Some(clicked).filter(|s| !s.is_empty()))
    }

    async fn click_text(&self, texts: &[String]) -> Result<Option<String>, BrowserError> {
        let script = format!(
            "(() => {{ const wanted = {}; \
               for (const el of document.querySelectorAll('button, a, [role=\"button\"]')) {{ \
                 const label = (el.innerText || '').trim().toLowerCase(); \
                 const hit = wanted.find(t => label.includes(t.toLowerCase())); \
                 if (hit) {{ el.click(); return hit; }} \
               }} return ''; }})()",
            js_array(texts)
        );
        let clicked: String = self.eval(&script).await?;
        Ok(Some(clicked).filter(|s| !s.is_empty()))
    }

    async fn close(self: Box<Self>) -> Result<(), BrowserError> {
        let ChromiumPage {
            page,
            browser,
            context_id,
        } = *self;

        let closed = page.close().await;
        let disposed = browser
            .execute(DisposeBrowserContextParams::new(context_id))
            .await;

        closed.map_err(|e| BrowserError::Page(format!("failed to close page: {}", e)))?;
        disposed.map_err(|e| BrowserError::Page(format!("failed to dispose context: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn js_literals_are_escaped() {
        assert_eq!(js_string("a[href='x']"), "\"a[href='x']\"");
        assert_eq!(js_string("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(js_array(&["a".into(), ".b".into()]), "[\"a\",\".b\"]");
    }

    #[test]
    fn launch_config_builds() {
        let mut settings = BrowserSettings::default();
        settings.chrome_executable = Some("/usr/bin/chromium".into());
        settings.extra_args.push("--lang=en-US".into());
        assert!(ChromiumDriver::build_config(&settings).is_ok());
    }

    #[tokio::test]
    async fn slot_relaunches_after_connection_loss() {
        let slot = BrowserSlot::<u32>::new();
        let launches = std::sync::atomic::AtomicU32::new(0);
        let flags = std::sync::Mutex::new(Vec::new());
        let launch = |alive: Arc<AtomicBool>| {
            flags.lock().unwrap().push(alive);
            let n = launches.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, BrowserError>(n) }
        };

        let first = slot.get_or_launch(launch).await.unwrap();
        let again = slot.get_or_launch(launch).await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(launches.load(Ordering::SeqCst), 1);

        // handler task ended
        flags.lock().unwrap()[0].store(false, Ordering::SeqCst);
        let second = slot.get_or_launch(launch).await.unwrap();
        assert_eq!(*second, 1);

        // a stale handle does not evict the live browser
        slot.invalidate(&first).await;
        assert!(Arc::ptr_eq(&second, &slot.get_or_launch(launch).await.unwrap()));

        slot.invalidate(&second).await;
        assert_eq!(*slot.get_or_launch(launch).await.unwrap(), 2);
        assert_eq!(launches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failed_launch_is_retried() {
        let slot = BrowserSlot::<u32>::new();
        let err = slot
            .get_or_launch(|_| async { Err(BrowserError::Launch("no chrome".into())) })
            .await;
        assert!(err.is_err());
        assert_eq!(*slot.get_or_launch(|_| async { Ok::<_, BrowserError>(7) }).await.unwrap(), 7);
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_page_roundtrip() {
        let driver = ChromiumDriver::new(BrowserSettings::default());
        let page = driver.open_page().await.expect("failed to open page");

        page.navigate("data:text/html,<title>Hello</title><meta name='description' content='d'><h1>World</h1>")
            .await
            .expect("navigation failed");

        assert_eq!(page.title().await.unwrap(), "Hello");
        assert!(page.serialize_html().await.unwrap().contains("<h1>World</h1>"));
        assert_eq!(page.read_metadata().await.unwrap()["description"], "d");
        assert_eq!(
            page.first_present(&["p".into(), "h1".into()]).await.unwrap().as_deref(),
            Some("h1")
        );
        assert!(page.measure_content_signal(&ContentSignal::DocumentHeight).await.unwrap() > 0);

        page.close().await.expect("close failed");
    }
}
