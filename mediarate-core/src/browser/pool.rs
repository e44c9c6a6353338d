use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{OnceCell, OwnedSemaphorePermit, Semaphore};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::cancel::{CancellationSignal, NeverCancelled};

use super::error::{PoolError, PoolResult};
use super::metrics::PoolMetrics;
use super::session::{BrowserFactory, BrowserInstance};

struct PoolState {
    idle: VecDeque<Arc<dyn BrowserInstance>>,
    active: usize,
    metrics: PoolMetrics,
}

struct PoolInner {
    factory: Arc<dyn BrowserFactory>,
    max_browsers: usize,
    permits: Arc<Semaphore>,
    started: OnceCell<()>,
    state: Mutex<PoolState>,
}

/// How often a queued caller re-checks its cancellation signal.
const CANCEL_POLL: Duration = Duration::from_millis(100);

impl PoolInner {
    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn no_capacity(&self) -> PoolError {
        PoolError::NoCapacity {
            max_browsers: self.max_browsers,
        }
    }
}

/// Bounded set of shared browser instances. Bookkeeping sits behind a single
/// mutex that is never held across browsing work.
#[derive(Clone)]
pub struct BrowserPool {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for BrowserPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowserPool")
            .field("max_browsers", &self.inner.max_browsers)
            .field("metrics", &self.metrics())
            .finish()
    }
}

impl BrowserPool {
    pub fn new(factory: Arc<dyn BrowserFactory>, max_browsers: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                factory,
                max_browsers,
                permits: Arc::new(Semaphore::new(0)),
                started: OnceCell::new(),
                state: Mutex::new(PoolState {
                    idle: VecDeque::new(),
                    active: 0,
                    metrics: PoolMetrics::default(),
                }),
            }),
        }
    }

    pub fn max_browsers(&self) -> usize {
        self.inner.max_browsers
    }

    pub fn metrics(&self) -> PoolMetrics {
        let state = self.inner.state();
        let mut snapshot = state.metrics.clone();
        snapshot.active_instances = state.active;
        snapshot.available_instances = state.idle.len();
        snapshot
    }

    async fn ensure_started(&self) -> PoolResult<()> {
        let inner = &self.inner;
        inner
            .started
            .get_or_try_init(|| async {
                if inner.max_browsers == 0 {
                    return Err(PoolError::NoCapacity { max_browsers: 0 });
                }
                let launches = futures::future::join_all(
                    (0..inner.max_browsers).map(|_| inner.factory.launch()),
                )
                .await;
                let mut launched = 0usize;
                {
                    let mut state = inner.state();
                    for result in launches {
                        match result {
                            Ok(browser) => {
                                state.idle.push_back(browser);
                                state.active += 1;
                                launched += 1;
                            }
                            Err(err) => {
                                state.metrics.record_launch_failure();
                                warn!(error = %err, "browser launch failed during pool start");
                            }
                        }
                    }
                }
                if launched == 0 {
                    return Err(PoolError::NoCapacity {
                        max_browsers: inner.max_browsers,
                    });
                }
                inner.permits.add_permits(launched);
                info!(
                    launched,
                    max_browsers = inner.max_browsers,
                    "browser pool started"
                );
                Ok(())
            })
            .await
            .map(|_| ())
    }

    /// Launches the browsers if needed and fails with `NoCapacity` when none
    /// are alive.
    pub async fn start(&self) -> PoolResult<()> {
        self.ensure_started().await?;
        if self.inner.state().active == 0 {
            return Err(self.inner.no_capacity());
        }
        Ok(())
    }

    /// Waits for a free browser, starting the pool on first use.
    pub async fn acquire(&self) -> PoolResult<BrowserHandle> {
        self.acquire_until(&NeverCancelled).await
    }

    /// Like [`BrowserPool::acquire`], but gives up with `Cancelled` once
    /// `signal` trips while queued.
    pub async fn acquire_until(&self, signal: &dyn CancellationSignal) -> PoolResult<BrowserHandle> {
        if signal.is_cancelled() {
            return Err(PoolError::Cancelled);
        }
        self.start().await?;
        let waiting = Arc::clone(&self.inner.permits).acquire_owned();
        tokio::pin!(waiting);
        let permit = loop {
            tokio::select! {
                permit = &mut waiting => break permit.map_err(|_| self.closed_error())?,
                _ = sleep(CANCEL_POLL) => {
                    if signal.is_cancelled() {
                        return Err(PoolError::Cancelled);
                    }
                }
            }
        };
        let browser = {
            let mut state = self.inner.state();
            state.metrics.record_request();
            state.idle.pop_front()
        };
        match browser {
            Some(browser) => {
                debug!(browser = %browser.id(), "browser acquired");
                Ok(BrowserHandle {
                    pool: Arc::clone(&self.inner),
                    browser,
                    permit: Some(permit),
                    evicted: false,
                })
            }
            None => Err(PoolError::Inconsistent(
                "permit granted without an idle browser".into(),
            )),
        }
    }

    fn closed_error(&self) -> PoolError {
        if self.inner.state().active == 0 {
            self.inner.no_capacity()
        } else {
            PoolError::Closed
        }
    }

    /// Returns capacity to the pool. Dropping the handle does the same.
    pub fn release(&self, handle: BrowserHandle) {
        drop(handle);
    }

    /// Runs `operation` on a pooled browser. When the operation fails the
    /// browser is probed, and a dead one is replaced before the original
    /// error is handed back. A failure after `signal` tripped is a
    /// cancellation: no probe, no failure count. The handle is released on
    /// every path.
    pub async fn run_with_browser<F, Fut, T, E>(
        &self,
        signal: &dyn CancellationSignal,
        operation: F,
    ) -> Result<T, E>
    where
        F: FnOnce(Arc<dyn BrowserInstance>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<PoolError> + fmt::Display,
    {
        let handle = self.acquire_until(signal).await?;
        let browser = Arc::clone(handle.browser());
        match operation(browser).await {
            Ok(value) => Ok(value),
            Err(err) if signal.is_cancelled() => {
                debug!(browser = %handle.browser().id(), "operation cancelled");
                Err(err)
            }
            Err(err) => {
                self.inner.state().metrics.record_failure();
                if let Err(probe_err) = handle.browser().probe().await {
                    warn!(
                        browser = %handle.browser().id(),
                        error = %err,
                        probe_error = %probe_err,
                        "browser failed liveness probe, replacing"
                    );
                    self.replace(handle).await;
                }
                Err(err)
            }
        }
    }

    async fn replace(&self, mut handle: BrowserHandle) {
        handle.evicted = true;
        {
            let mut state = self.inner.state();
            state.active = state.active.saturating_sub(1);
            state.metrics.record_crash();
        }
        handle.browser.shutdown().await;
        match self.inner.factory.launch().await {
            Ok(replacement) => {
                info!(browser = %replacement.id(), "replacement browser launched");
                let mut state = self.inner.state();
                state.idle.push_back(replacement);
                state.active += 1;
            }
            Err(err) => {
                let remaining = {
                    let mut state = self.inner.state();
                    state.metrics.record_launch_failure();
                    state.active
                };
                warn!(error = %err, remaining, "replacement launch failed, pool capacity reduced");
                if let Some(permit) = handle.permit.take() {
                    permit.forget();
                }
                if remaining == 0 {
                    // wakes every queued caller with NoCapacity
                    warn!("no browsers left, closing pool");
                    self.inner.permits.close();
                }
            }
        }
    }

    pub async fn shutdown(&self) {
        self.inner.permits.close();
        let idle: Vec<_> = {
            let mut state = self.inner.state();
            let drained: Vec<_> = state.idle.drain(..).collect();
            state.active = state.active.saturating_sub(drained.len());
            drained
        };
        for browser in idle {
            browser.shutdown().await;
        }
    }
}

/// Exclusive lease on a pooled browser. Goes back to the pool when dropped.
pub struct BrowserHandle {
    pool: Arc<PoolInner>,
    browser: Arc<dyn BrowserInstance>,
    permit: Option<OwnedSemaphorePermit>,
    evicted: bool,
}

impl fmt::Debug for BrowserHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowserHandle")
            .field("browser", &self.browser.id())
            .field("evicted", &self.evicted)
            .finish()
    }
}

impl BrowserHandle {
    pub fn browser(&self) -> &Arc<dyn BrowserInstance> {
        &self.browser
    }
}

impl Drop for BrowserHandle {
    fn drop(&mut self) {
        if !self.evicted {
            self.pool.state().idle.push_back(Arc::clone(&self.browser));
        }
        // permit drops after the browser is back in the idle queue
        self.permit.take();
    }
}
