use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::browser::{PageSession, RetryPolicy};
use crate::cancel::CancellationSignal;

use super::detector::{detect_rate_limit, RateLimitRules};
use super::error::{AdapterError, AdapterResult};
use super::Platform;

const PAUSE_SLICE: Duration = Duration::from_millis(100);

/// Everything an adapter step needs to drive one page. Every call checks
/// the cancellation signal first, so adapters never talk to the session
/// directly.
pub struct PageContext<'a> {
    platform: Platform,
    session: &'a dyn PageSession,
    signal: &'a dyn CancellationSignal,
    retry: &'a RetryPolicy,
    rules: &'a RateLimitRules,
    settle: Duration,
}

impl<'a> PageContext<'a> {
    pub fn new(
        platform: Platform,
        session: &'a dyn PageSession,
        signal: &'a dyn CancellationSignal,
        retry: &'a RetryPolicy,
        rules: &'a RateLimitRules,
        settle: Duration,
    ) -> Self {
        Self {
            platform,
            session,
            signal,
            retry,
            rules,
            settle,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }

    pub fn checkpoint(&self) -> AdapterResult<()> {
        if self.signal.is_cancelled() {
            Err(AdapterError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Loads `url` under the retry policy, lets the page settle and then
    /// inspects it for soft blocks.
    pub async fn navigate(&self, url: &str) -> AdapterResult<()> {
        self.checkpoint()?;
        let session = self.session;
        let signal = self.signal;
        let platform = self.platform;
        let outcome = self
            .retry
            .run_until(
                signal,
                |attempt| async move {
                    if signal.is_cancelled() {
                        return Err(AdapterError::Cancelled);
                    }
                    debug!(%platform, url, attempt, "navigating");
                    guarded(signal, session.goto(url)).await?.map_err(AdapterError::from)
                },
                AdapterError::is_transient,
            )
            .await
            .map_err(|err| if signal.is_cancelled() { AdapterError::Cancelled } else { err })?;
        if outcome.attempts > 1 {
            debug!(%platform, url, attempts = outcome.attempts, "navigation recovered");
        }
        self.pause(self.settle).await?;
        if let Some(hit) = guarded(self.signal, detect_rate_limit(self.session, self.rules)).await?? {
            warn!(
                %platform,
                url,
                phrase = %hit.phrase,
                selector = hit.selector.as_deref().unwrap_or("<page>"),
                "soft block detected"
            );
            return Err(AdapterError::RateLimited {
                platform,
                phrase: hit.phrase,
            });
        }
        Ok(())
    }

    /// Sleeps in short slices so a cancel lands within one slice.
    pub async fn pause(&self, duration: Duration) -> AdapterResult<()> {
        let mut remaining = duration;
        while !remaining.is_zero() {
            self.checkpoint()?;
            let step = remaining.min(PAUSE_SLICE);
            sleep(step).await;
            remaining -= step;
        }
        self.checkpoint()
    }

    pub async fn wait_for(&self, selector: &str, timeout: Duration) -> AdapterResult<bool> {
        self.checkpoint()?;
        Ok(guarded(self.signal, self.session.wait_for_selector(selector, timeout)).await??)
    }

    pub async fn text(&self, selector: &str) -> AdapterResult<Option<String>> {
        self.checkpoint()?;
        let text = guarded(self.signal, self.session.select_text(selector)).await??;
        Ok(text
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty()))
    }

    pub async fn evaluate_as<T: DeserializeOwned>(&self, script: &str, what: &str) -> AdapterResult<T> {
        self.checkpoint()?;
        let value = guarded(self.signal, self.session.evaluate(script)).await??;
        serde_json::from_value(value).map_err(|err| AdapterError::parse(what, err))
    }

    /// Best-effort UI toggle. Missing elements and click failures are logged
    /// and ignored.
    pub async fn toggle(&self, selector: &str) -> AdapterResult<bool> {
        self.checkpoint()?;
        match guarded(self.signal, self.session.click(selector)).await? {
            Ok(clicked) => Ok(clicked),
            Err(err) => {
                debug!(platform = %self.platform, selector, error = %err, "toggle skipped");
                Ok(false)
            }
        }
    }
}

/// Drives `operation` while polling the signal every slice, so a cancel
/// interrupts a slow page call instead of waiting for it.
async fn guarded<F: Future>(signal: &dyn CancellationSignal, operation: F) -> AdapterResult<F::Output> {
    tokio::pin!(operation);
    loop {
        tokio::select! {
            output = &mut operation => return Ok(output),
            _ = sleep(PAUSE_SLICE) => {
                if signal.is_cancelled() {
                    return Err(AdapterError::Cancelled);
                }
            }
        }
    }
}
