use thiserror::Error;

use crate::browser::{BrowserError, PoolError};
use crate::record::RequestStatus;

use super::Platform;

pub type AdapterResult<T> = Result<T, AdapterError>;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{platform} rate limited the request (matched {phrase:?})")]
    RateLimited { platform: Platform, phrase: String },
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("request cancelled")]
    Cancelled,
    #[error("browser error: {0}")]
    Browser(BrowserError),
    #[error("failed to parse {what}: {reason}")]
    Parse { what: String, reason: String },
    #[error("browser pool error: {0}")]
    Pool(PoolError),
}

impl AdapterError {
    pub fn parse(what: impl Into<String>, reason: impl ToString) -> Self {
        AdapterError::Parse {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    /// Status reported for a platform whose pipeline ended with this error.
    pub fn status(&self) -> RequestStatus {
        match self {
            AdapterError::RateLimited { .. } => RequestStatus::RateLimit,
            AdapterError::Timeout(_) => RequestStatus::Timeout,
            AdapterError::Cancelled => RequestStatus::Cancelled,
            AdapterError::Browser(_) | AdapterError::Parse { .. } | AdapterError::Pool(_) => {
                RequestStatus::FetchFailed
            }
        }
    }

    /// Navigation faults worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, AdapterError::Browser(_) | AdapterError::Timeout(_))
    }
}

impl From<PoolError> for AdapterError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Cancelled => AdapterError::Cancelled,
            other => AdapterError::Pool(other),
        }
    }
}

impl From<BrowserError> for AdapterError {
    fn from(err: BrowserError) -> Self {
        if err.is_timeout() {
            AdapterError::Timeout(err.to_string())
        } else {
            AdapterError::Browser(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browser_timeouts_become_timeout_status() {
        let err = AdapterError::from(BrowserError::Timeout("navigation".into()));
        assert_eq!(err.status(), RequestStatus::Timeout);
        assert!(err.is_transient());
    }

    #[test]
    fn soft_blocks_are_not_retried() {
        let err = AdapterError::RateLimited {
            platform: Platform::Douban,
            phrase: "检测到有异常请求".into(),
        };
        assert_eq!(err.status(), RequestStatus::RateLimit);
        assert!(!err.is_transient());
        assert!(!AdapterError::Cancelled.is_transient());
        assert_eq!(AdapterError::Cancelled.status(), RequestStatus::Cancelled);
    }

    #[test]
    fn pool_and_parse_failures_are_fetch_failures() {
        let err = AdapterError::from(PoolError::Closed);
        assert_eq!(err.status(), RequestStatus::FetchFailed);
        assert!(matches!(
            AdapterError::from(PoolError::Cancelled),
            AdapterError::Cancelled
        ));
        assert_eq!(
            AdapterError::parse("search rows", "not an array").status(),
            RequestStatus::FetchFailed
        );
    }
}
