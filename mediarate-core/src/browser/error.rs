use thiserror::Error;

pub type BrowserResult<T> = Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("chromium launch failed: {0}")]
    Launch(String),
    #[error("cdp error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),
    #[error("timeout waiting for {0}")]
    Timeout(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("script evaluation failed: {0}")]
    Script(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl BrowserError {
    pub fn is_timeout(&self) -> bool {
        match self {
            BrowserError::Timeout(_) => true,
            BrowserError::Cdp(err) => err.to_string().to_lowercase().contains("timeout"),
            _ => false,
        }
    }
}

pub type PoolResult<T> = Result<T, PoolError>;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("browser pool has no capacity (max_browsers = {max_browsers})")]
    NoCapacity { max_browsers: usize },
    #[error("browser pool is closed")]
    Closed,
    #[error("cancelled while waiting for a browser")]
    Cancelled,
    #[error("browser pool bookkeeping out of sync: {0}")]
    Inconsistent(String),
}
