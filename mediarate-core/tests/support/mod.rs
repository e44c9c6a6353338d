//! In-memory browser fakes: a scripted set of pages served to every session.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mediarate_core::{
    adapter_for, BrowserError, BrowserFactory, BrowserInstance, BrowserPool, BrowserResult,
    Orchestrator, PageSession, Platform, PlatformSettings, RetryPolicy,
};
use serde_json::Value;

#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub body: String,
    pub texts: HashMap<String, String>,
    /// `(needle, result)`: a script containing `needle` evaluates to `result`.
    pub scripts: Vec<(String, Value)>,
    pub delay: Duration,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    pub fn text(mut self, selector: &str, text: &str) -> Self {
        self.texts.insert(selector.to_string(), text.to_string());
        self
    }

    pub fn script(mut self, needle: &str, result: Value) -> Self {
        self.scripts.push((needle.to_string(), result));
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug, Default)]
pub struct FakeWeb {
    pages: Mutex<HashMap<String, FakePage>>,
    visits: Mutex<Vec<String>>,
    default_delay: Mutex<Duration>,
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    /// Every navigation fails and probes report a dead browser.
    pub crashed: AtomicBool,
}

impl FakeWeb {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, page: FakePage) {
        self.pages.lock().unwrap().insert(url.to_string(), page);
    }

    pub fn slow_everywhere(&self, delay: Duration) {
        *self.default_delay.lock().unwrap() = delay;
    }

    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }

    fn load(&self, url: &str) -> FakePage {
        self.visits.lock().unwrap().push(url.to_string());
        let page = self.pages.lock().unwrap().get(url).cloned();
        match page {
            Some(page) => page,
            None => FakePage::new().delay(*self.default_delay.lock().unwrap()),
        }
    }
}

pub struct FakeSession {
    web: Arc<FakeWeb>,
    current: Mutex<FakePage>,
}

#[async_trait]
impl PageSession for FakeSession {
    async fn goto(&self, url: &str) -> BrowserResult<()> {
        if self.web.crashed.load(Ordering::SeqCst) {
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: "target crashed".into(),
            });
        }
        let page = self.web.load(url);
        if !page.delay.is_zero() {
            tokio::time::sleep(page.delay).await;
        }
        *self.current.lock().unwrap() = page;
        Ok(())
    }

    async fn wait_for_selector(&self, _selector: &str, _timeout: Duration) -> BrowserResult<bool> {
        Ok(true)
    }

    async fn body_text(&self) -> BrowserResult<String> {
        Ok(self.current.lock().unwrap().body.clone())
    }

    async fn select_text(&self, selector: &str) -> BrowserResult<Option<String>> {
        Ok(self.current.lock().unwrap().texts.get(selector).cloned())
    }

    async fn evaluate(&self, script: &str) -> BrowserResult<Value> {
        let page = self.current.lock().unwrap();
        Ok(page
            .scripts
            .iter()
            .find(|(needle, _)| script.contains(needle.as_str()))
            .map(|(_, result)| result.clone())
            .unwrap_or(Value::Null))
    }

    async fn click(&self, selector: &str) -> BrowserResult<bool> {
        Ok(self.current.lock().unwrap().texts.contains_key(selector))
    }

    async fn close(self: Box<Self>) -> BrowserResult<()> {
        self.web.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug)]
pub struct FakeBrowser {
    id: String,
    web: Arc<FakeWeb>,
}

#[async_trait]
impl BrowserInstance for FakeBrowser {
    fn id(&self) -> &str {
        &self.id
    }

    async fn open_session(&self) -> BrowserResult<Box<dyn PageSession>> {
        self.web.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            web: Arc::clone(&self.web),
            current: Mutex::new(FakePage::new()),
        }))
    }

    async fn probe(&self) -> BrowserResult<()> {
        if self.web.crashed.load(Ordering::SeqCst) {
            Err(BrowserError::Unexpected("browser is gone".into()))
        } else {
            Ok(())
        }
    }

    async fn shutdown(&self) {}
}

pub struct FakeFactory {
    web: Arc<FakeWeb>,
    launched: AtomicUsize,
}

#[async_trait]
impl BrowserFactory for FakeFactory {
    async fn launch(&self) -> BrowserResult<Arc<dyn BrowserInstance>> {
        let n = self.launched.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeBrowser {
            id: format!("fake-{n}"),
            web: Arc::clone(&self.web),
        }))
    }
}

/// Orchestrator over the fake web with every built-in adapter, no retry
/// delay and no settle pause.
pub fn orchestrator(web: &Arc<FakeWeb>, max_browsers: usize) -> Orchestrator {
    let factory = Arc::new(FakeFactory {
        web: Arc::clone(web),
        launched: AtomicUsize::new(0),
    });
    let pool = BrowserPool::new(factory, max_browsers);
    let mut orchestrator = Orchestrator::new(pool, RetryPolicy::new(3, Duration::ZERO), Duration::ZERO);
    for platform in Platform::ALL {
        orchestrator = orchestrator.with_adapter(adapter_for(platform, PlatformSettings::defaults(platform)));
    }
    orchestrator
}
