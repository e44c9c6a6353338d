use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use crate::cancel::{CancellationSignal, NeverCancelled};
use crate::config::RetrySection;

const CANCEL_POLL: Duration = Duration::from_millis(100);

/// Fixed-delay retry for transient faults. No backoff, no jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    delay: Duration,
}

#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    pub result: T,
    pub attempts: usize,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &RetrySection) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.delay_ms))
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Retries every failure until the attempt budget runs out.
    pub async fn run<F, Fut, T, E>(&self, operation: F) -> Result<RetryOutcome<T>, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.run_if(operation, |_| true).await
    }

    /// Like [`RetryPolicy::run`], but errors for which `retryable` is false are
    /// returned immediately. The last error is always returned unchanged.
    pub async fn run_if<F, Fut, T, E, P>(
        &self,
        operation: F,
        retryable: P,
    ) -> Result<RetryOutcome<T>, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        self.run_until(&NeverCancelled, operation, retryable).await
    }

    /// Like [`RetryPolicy::run_if`], but the delay between attempts is cut
    /// short once `signal` trips, returning the last error.
    pub async fn run_until<F, Fut, T, E, P>(
        &self,
        signal: &dyn CancellationSignal,
        mut operation: F,
        retryable: P,
    ) -> Result<RetryOutcome<T>, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0usize;
        loop {
            match operation(attempt).await {
                Ok(result) => {
                    return Ok(RetryOutcome {
                        result,
                        attempts: attempt + 1,
                    });
                }
                Err(error) => {
                    attempt += 1;
                    if attempt >= self.max_attempts || !retryable(&error) {
                        return Err(error);
                    }
                    debug!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %error,
                        "transient failure, retrying"
                    );
                    if !self.delay.is_zero() && !pause(signal, self.delay).await {
                        debug!(attempt, "cancelled between attempts");
                        return Err(error);
                    }
                }
            }
        }
    }
}

/// Sleeps for `delay`; false when `signal` tripped first.
async fn pause(signal: &dyn CancellationSignal, delay: Duration) -> bool {
    let delay = sleep(delay);
    tokio::pin!(delay);
    loop {
        if signal.is_cancelled() {
            return false;
        }
        tokio::select! {
            _ = &mut delay => return true,
            _ = sleep(CANCEL_POLL) => {}
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelFlag;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let retry = RetryPolicy::new(3, Duration::from_secs(1));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_for_run = Arc::clone(&calls);
        let outcome = retry
            .run(move |_| {
                let calls = Arc::clone(&calls_for_run);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err("network blip".to_string())
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.result, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn aborts_after_max_attempts_with_last_error() {
        let retry = RetryPolicy::new(3, Duration::from_secs(1));
        let started = tokio::time::Instant::now();
        let result = retry
            .run(|attempt| async move { Err::<(), String>(format!("failure {attempt}")) })
            .await;
        assert_eq!(result.unwrap_err(), "failure 2");
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn non_retryable_errors_return_immediately() {
        let retry = RetryPolicy::new(5, Duration::from_millis(1));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_for_run = Arc::clone(&calls);
        let result = retry
            .run_if(
                move |_| {
                    calls_for_run.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), &str>("cancelled") }
                },
                |err| *err != "cancelled",
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_cuts_the_retry_delay_short() {
        let retry = RetryPolicy::new(3, Duration::from_secs(60));
        let flag = CancelFlag::new();
        let trigger = flag.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_for_run = Arc::clone(&calls);
        let started = tokio::time::Instant::now();
        let result = retry
            .run_until(
                &flag,
                move |_| {
                    calls_for_run.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), &str>("timeout") }
                },
                |_| true,
            )
            .await;
        assert_eq!(result.unwrap_err(), "timeout");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn zero_attempts_is_clamped() {
        let retry = RetryPolicy::from_config(&RetrySection {
            max_attempts: 0,
            delay_ms: 0,
        });
        assert_eq!(retry.max_attempts(), 1);
    }
}
