use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::browser::{BrowserContextId, CloseParams};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, NavigateParams,
};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use rand::seq::SliceRandom;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::BrowserConfig;

use super::error::{BrowserError, BrowserResult};
use super::session::{BrowserFactory, BrowserInstance, PageSession};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.5 Safari/605.1.15";
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const SELECTOR_POLL: Duration = Duration::from_millis(200);

/// Launches headless Chromium processes for the browser pool.
#[derive(Debug, Clone)]
pub struct BrowserLauncher {
    config: Arc<BrowserConfig>,
}

impl BrowserLauncher {
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    fn select_user_agent(&self) -> String {
        let mut rng = rand::thread_rng();
        self.config
            .user_agents
            .pool
            .choose(&mut rng)
            .cloned()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    fn build_chromium_config(&self, user_agent: &str) -> BrowserResult<ChromiumConfig> {
        let mut builder = ChromiumConfig::builder();
        if let Some(path) = &self.config.chromium.executable_path {
            builder = builder.chrome_executable(path);
        }
        if !self.config.chromium.headless {
            builder = builder.with_head();
        }
        if !self.config.chromium.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(timeout) = self.config.chromium.request_timeout_seconds {
            builder = builder.request_timeout(Duration::from_secs(timeout));
        }

        let mut args = vec![format!("--user-agent={user_agent}")];
        if self.config.chromium.disable_gpu {
            args.push("--disable-gpu".into());
        }
        if let Some(lang) = &self.config.flags.lang {
            args.push(format!("--lang={lang}"));
        }
        for feature in &self.config.flags.disable_blink_features {
            args.push(format!("--disable-blink-features={feature}"));
        }
        if self.config.flags.no_first_run {
            args.push("--no-first-run".into());
        }
        if self.config.flags.disable_automation_controlled {
            args.push("--disable-features=AutomationControlled".into());
        }
        if let Some(accept) = &self.config.flags.accept_language {
            args.push(format!("--accept-lang={accept}"));
        }
        args.push("--mute-audio".into());
        args.push("--password-store=basic".into());

        builder = builder.args(args);

        builder.build().map_err(BrowserError::Configuration)
    }
}

#[async_trait]
impl BrowserFactory for BrowserLauncher {
    async fn launch(&self) -> BrowserResult<Arc<dyn BrowserInstance>> {
        let user_agent = self.select_user_agent();
        let chromium_config = self.build_chromium_config(&user_agent)?;
        let id = Uuid::new_v4().to_string();
        info!(
            browser = %id,
            ua = %user_agent,
            headless = self.config.chromium.headless,
            "launching chromium instance"
        );

        let (browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|err| BrowserError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "chromium handler reported error");
                }
            }
        });

        Ok(Arc::new(ChromiumBrowser {
            id,
            browser: Arc::new(browser),
            handler_task: Mutex::new(Some(handler_task)),
            config: Arc::clone(&self.config),
            user_agent,
        }))
    }
}

#[derive(Debug)]
pub struct ChromiumBrowser {
    id: String,
    browser: Arc<Browser>,
    handler_task: Mutex<Option<JoinHandle<()>>>,
    config: Arc<BrowserConfig>,
    user_agent: String,
}

impl ChromiumBrowser {
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    async fn create_context(&self) -> BrowserResult<BrowserContextId> {
        let response = self
            .browser
            .execute(CreateBrowserContextParams::default())
            .await?;
        Ok(response.result.browser_context_id)
    }

    async fn configure_page(&self, page: &Page) -> BrowserResult<()> {
        let mut params_builder =
            SetUserAgentOverrideParams::builder().user_agent(self.user_agent.clone());
        if let Some(accept) = &self.config.flags.accept_language {
            params_builder = params_builder.accept_language(accept.clone());
        }
        let params = params_builder
            .build()
            .map_err(BrowserError::Configuration)?;
        page.set_user_agent(params).await?;

        if let Some(lang) = &self.config.flags.lang {
            let languages_script = format!(
                "Object.defineProperty(navigator, 'language', {{ get: () => '{lang}' }});\nObject.defineProperty(navigator, 'languages', {{ get: () => ['{lang}', 'en-US'] }});"
            );
            page.evaluate_on_new_document(
                AddScriptToEvaluateOnNewDocumentParams::builder()
                    .source(languages_script)
                    .build()
                    .map_err(BrowserError::Configuration)?,
            )
            .await?;
        }
        page.evaluate_on_new_document(
            AddScriptToEvaluateOnNewDocumentParams::builder()
                .source("Object.defineProperty(navigator, 'webdriver', { get: () => undefined });")
                .build()
                .map_err(BrowserError::Configuration)?,
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl BrowserInstance for ChromiumBrowser {
    fn id(&self) -> &str {
        &self.id
    }

    async fn open_session(&self) -> BrowserResult<Box<dyn PageSession>> {
        let context_id = self.create_context().await?;
        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(BrowserError::Configuration)?;
        let page = match self.browser.new_page(params).await {
            Ok(page) => page,
            Err(err) => {
                dispose_context(&self.browser, context_id).await;
                return Err(err.into());
            }
        };
        if let Err(err) = self.configure_page(&page).await {
            let _ = page.close().await;
            dispose_context(&self.browser, context_id).await;
            return Err(err);
        }
        Ok(Box::new(ChromiumSession {
            page: Some(page),
            browser: Arc::clone(&self.browser),
            context_id: Some(context_id),
            navigation_timeout: self.config.navigation.timeout(),
        }))
    }

    async fn probe(&self) -> BrowserResult<()> {
        let probe = async {
            let context_id = self.create_context().await?;
            self.browser
                .execute(DisposeBrowserContextParams::new(context_id))
                .await?;
            Ok::<_, BrowserError>(())
        };
        tokio::time::timeout(PROBE_TIMEOUT, probe)
            .await
            .map_err(|_| BrowserError::Timeout(format!("liveness probe on {}", self.id)))?
    }

    async fn shutdown(&self) {
        info!(browser = %self.id, "shutting down chromium instance");
        if let Err(err) = self.browser.execute(CloseParams::default()).await {
            warn!(browser = %self.id, error = %err, "failed to close browser gracefully");
        }
        let handle = self
            .handler_task
            .lock()
            .ok()
            .and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl Drop for ChromiumBrowser {
    fn drop(&mut self) {
        if let Ok(guard) = self.handler_task.lock() {
            if let Some(handle) = guard.as_ref() {
                if !handle.is_finished() {
                    warn!(browser = %self.id, "chromium instance dropped without explicit shutdown");
                    handle.abort();
                }
            }
        }
    }
}

async fn dispose_context(browser: &Browser, context_id: BrowserContextId) {
    if let Err(err) = browser
        .execute(DisposeBrowserContextParams::new(context_id))
        .await
    {
        debug!(error = %err, "failed to dispose browser context");
    }
}

#[derive(Debug)]
pub struct ChromiumSession {
    page: Option<Page>,
    browser: Arc<Browser>,
    context_id: Option<BrowserContextId>,
    navigation_timeout: Duration,
}

impl ChromiumSession {
    fn page(&self) -> BrowserResult<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| BrowserError::Unexpected("page already closed".into()))
    }

    async fn eval_value(&self, script: &str) -> BrowserResult<serde_json::Value> {
        let result = self.page()?.evaluate(script).await?;
        Ok(result
            .into_value::<serde_json::Value>()
            .unwrap_or(serde_json::Value::Null))
    }
}

#[async_trait]
impl PageSession for ChromiumSession {
    async fn goto(&self, url: &str) -> BrowserResult<()> {
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(BrowserError::Configuration)?;
        let page = self.page()?;
        let navigation = async {
            page.goto(params).await?;
            page.wait_for_navigation().await?;
            Ok::<_, BrowserError>(())
        };
        match tokio::time::timeout(self.navigation_timeout, navigation).await {
            Ok(result) => result,
            Err(_) => Err(BrowserError::Timeout(format!("navigation to {url}"))),
        }
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> BrowserResult<bool> {
        let script = format!(
            "document.querySelector({}) !== null",
            js_string(selector)
        );
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.eval_value(&script).await?.as_bool().unwrap_or(false) {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(SELECTOR_POLL).await;
        }
    }

    async fn body_text(&self) -> BrowserResult<String> {
        let value = self
            .eval_value("document.body ? document.body.innerText : ''")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn select_text(&self, selector: &str) -> BrowserResult<Option<String>> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); return el ? (el.innerText || el.textContent || '').trim() : null; }})()",
            js_string(selector)
        );
        let value = self.eval_value(&script).await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn evaluate(&self, script: &str) -> BrowserResult<serde_json::Value> {
        self.page()?
            .evaluate(script)
            .await
            .map_err(|err| BrowserError::Script(err.to_string()))?
            .into_value::<serde_json::Value>()
            .map_err(|err| BrowserError::Script(format!("failed to decode payload: {err}")))
    }

    async fn click(&self, selector: &str) -> BrowserResult<bool> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; el.click(); return true; }})()",
            js_string(selector)
        );
        Ok(self.eval_value(&script).await?.as_bool().unwrap_or(false))
    }

    async fn close(mut self: Box<Self>) -> BrowserResult<()> {
        if let Some(page) = self.page.take() {
            if let Err(err) = page.close().await {
                debug!(error = %err, "failed to close page");
            }
        }
        if let Some(context_id) = self.context_id.take() {
            dispose_context(&self.browser, context_id).await;
        }
        Ok(())
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        let page = self.page.take();
        let context_id = self.context_id.take();
        if page.is_none() && context_id.is_none() {
            return;
        }
        let browser = Arc::clone(&self.browser);
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Some(page) = page {
                    let _ = page.close().await;
                }
                if let Some(context_id) = context_id {
                    dispose_context(&browser, context_id).await;
                }
            });
        }
    }
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "''".to_string())
}
