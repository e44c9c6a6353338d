mod automation;
mod error;
mod metrics;
mod pool;
mod retry;
mod session;

pub use automation::{BrowserLauncher, ChromiumBrowser, ChromiumSession};
pub use error::{BrowserError, BrowserResult, PoolError, PoolResult};
pub use metrics::PoolMetrics;
pub use pool::{BrowserHandle, BrowserPool};
pub use retry::{RetryOutcome, RetryPolicy};
pub use session::{BrowserFactory, BrowserInstance, PageSession};
