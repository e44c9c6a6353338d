use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::error::BrowserResult;

/// One navigable page inside an isolated browsing context. Owned by a single
/// adapter call and closed on every exit path.
#[async_trait]
pub trait PageSession: Send + Sync {
    async fn goto(&self, url: &str) -> BrowserResult<()>;
    /// Waits until `selector` matches or `timeout` passes; `false` on timeout.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> BrowserResult<bool>;
    async fn body_text(&self) -> BrowserResult<String>;
    async fn select_text(&self, selector: &str) -> BrowserResult<Option<String>>;
    async fn evaluate(&self, script: &str) -> BrowserResult<serde_json::Value>;
    async fn click(&self, selector: &str) -> BrowserResult<bool>;
    async fn close(self: Box<Self>) -> BrowserResult<()>;
}

/// A running browser process that can hand out isolated sessions.
#[async_trait]
pub trait BrowserInstance: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;
    async fn open_session(&self) -> BrowserResult<Box<dyn PageSession>>;
    /// Cheap liveness check: open and dispose an empty context.
    async fn probe(&self) -> BrowserResult<()>;
    async fn shutdown(&self);
}

#[async_trait]
pub trait BrowserFactory: Send + Sync {
    async fn launch(&self) -> BrowserResult<Arc<dyn BrowserInstance>>;
}
