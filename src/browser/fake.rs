//! Scripted in-memory browser for tests.

use super::{BrowserDriver, ContentSignal, PageDriver};
use crate::model::BrowserError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type SignalFn = Arc<dyn Fn(usize) -> u64 + Send + Sync>;

/// What every page opened by a [`FakeDriver`] will do.
#[derive(Clone)]
pub struct PageScript {
    /// Signal value for the n-th measurement.
    pub signal: SignalFn,
    pub navigate_error: Option<String>,
    pub navigate_delay: Option<Duration>,
    /// Measurements from the n-th on take this long.
    pub slow_measurements: Option<(usize, Duration)>,
    pub html: String,
    pub fail_html: bool,
    pub title: String,
    pub metadata: BTreeMap<String, String>,
    /// Selectors considered present on the page.
    pub present: Vec<String>,
    /// Button and link labels on the page.
    pub labels: Vec<String>,
}

impl Default for PageScript {
    fn default() -> Self {
        Self {
            signal: Arc::new(|_| 1000),
            navigate_error: None,
            navigate_delay: None,
            slow_measurements: None,
            html: "<html><head><title>Fake</title></head><body></body></html>".into(),
            fail_html: false,
            title: "Fake".into(),
            metadata: BTreeMap::new(),
            present: Vec::new(),
            labels: Vec::new(),
        }
    }
}

impl PageScript {
    /// Replays `values`, repeating the last one forever.
    pub fn signals(values: Vec<u64>) -> Self {
        Self {
            signal: Arc::new(move |n| values.get(n).or(values.last()).copied().unwrap_or(0)),
            ..Self::default()
        }
    }

    /// A page that never stops growing.
    pub fn growing() -> Self {
        Self {
            signal: Arc::new(|n| (n as u64 + 1) * 100),
            ..Self::default()
        }
    }
}

#[derive(Default)]
pub struct Recorder {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub measurements: AtomicUsize,
    pub scrolls: AtomicUsize,
    pub clicks: AtomicUsize,
    pub visited: Mutex<Vec<String>>,
}

pub struct FakeDriver {
    script: PageScript,
    fail_open: bool,
    pub recorder: Arc<Recorder>,
}

impl FakeDriver {
    pub fn new(script: PageScript) -> Self {
        Self {
            script,
            fail_open: false,
            recorder: Arc::new(Recorder::default()),
        }
    }

    pub fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::new(PageScript::default())
        }
    }

    pub fn opened(&self) -> usize {
        self.recorder.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.recorder.closed.load(Ordering::SeqCst)
    }

    pub fn visited(&self) -> Vec<String> {
        self.recorder.visited.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn open_page(&self) -> Result<Box<dyn PageDriver>, BrowserError> {
        if self.fail_open {
            return Err(BrowserError::Launch("no browser in this test".into()));
        }
        self.recorder.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePage::new(self.script.clone(), self.recorder.clone())))
    }
}

pub struct FakePage {
    script: PageScript,
    recorder: Arc<Recorder>,
    reads: AtomicUsize,
}

impl FakePage {
    pub fn new(script: PageScript, recorder: Arc<Recorder>) -> Self {
        Self {
            script,
            recorder,
            reads: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        if let Some(delay) = self.script.navigate_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = &self.script.navigate_error {
            return Err(BrowserError::Navigation(reason.clone()));
        }
        self.recorder.visited.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn scroll_to_bottom(&self) -> Result<(), BrowserError> {
        self.recorder.scrolls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn measure_content_signal(&self, _signal: &ContentSignal) -> Result<u64, BrowserError> {
        let n = self.reads.fetch_add(1, Ordering::SeqCst);
        self.recorder.measurements.fetch_add(1, Ordering::SeqCst);
        if let Some((from, delay)) = self.script.slow_measurements {
            if n >= from {
                tokio::time::sleep(delay).await;
            }
        }
        Ok((self.script.signal)(n))
    }

    async fn serialize_html(&self) -> Result<String, BrowserError> {
        if self.script.fail_html {
            return Err(BrowserError::Page("renderer crashed".into()));
        }
        Ok(self.script.html.clone())
    }

    async fn title(&self) -> Result<String, BrowserError> {
        Ok(self.script.title.clone())
    }

    async fn read_metadata(&self) -> Result<BTreeMap<String, String>, BrowserError> {
        Ok(self.script.metadata.clone())
    }

    async fn first_present(&self, selectors: &[String]) -> Result<Option<String>, BrowserError> {
        Ok(selectors.iter().find(|s| self.script.present.contains(s)).cloned())
    }

    async fn click_first(&self, selectors: &[String]) -> Result<Option<String>, BrowserError> {
        let hit = selectors.iter().find(|s| self.script.present.contains(s)).cloned();
        if hit.is_some() {
            self.recorder.clicks.fetch_add(1, Ordering::SeqCst);
        }
        Ok(hit)
    }

    async fn click_text(&self, texts: &[String]) -> Result<Option<String>, BrowserError> {
        let hit = texts
            .iter()
            .find(|t| {
                let wanted = t.to_lowercase();
                self.script.labels.iter().any(|l| l.to_lowercase().contains(&wanted))
            })
            .cloned();
        if hit.is_some() {
            self.recorder.clicks.fetch_add(1, Ordering::SeqCst);
        }
        Ok(hit)
    }

    async fn close(self: Box<Self>) -> Result<(), BrowserError> {
        self.recorder.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
