use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, error, info};

use crate::browser::{BrowserPool, PoolError, PoolMetrics, RetryPolicy};
use crate::cancel::CancellationSignal;
use crate::config::MediarateConfig;
use crate::model::CanonicalMedia;
use crate::platform::{
    adapter_for, finalize, scrape, AdapterError, PageContext, Platform, PlatformAdapter,
};
use crate::record::{RatingRecord, RequestStatus};

pub type RatingMap = BTreeMap<Platform, RatingRecord>;

/// Fans one media record out to every requested platform, one task each.
#[derive(Clone)]
pub struct Orchestrator {
    pool: BrowserPool,
    adapters: HashMap<Platform, Arc<dyn PlatformAdapter>>,
    retry: RetryPolicy,
    settle: Duration,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("pool", &self.pool)
            .field("platforms", &self.platforms())
            .field("retry", &self.retry)
            .field("settle", &self.settle)
            .finish()
    }
}

impl Orchestrator {
    pub fn new(pool: BrowserPool, retry: RetryPolicy, settle: Duration) -> Self {
        Self {
            pool,
            adapters: HashMap::new(),
            retry,
            settle,
        }
    }

    /// Orchestrator with the built-in adapter for every platform, configured
    /// from `config`.
    pub fn from_config(config: &MediarateConfig, pool: BrowserPool) -> Self {
        let mut orchestrator = Self::new(
            pool,
            RetryPolicy::from_config(&config.retry),
            config.browser.navigation.settle(),
        );
        for platform in Platform::ALL {
            orchestrator = orchestrator.with_adapter(adapter_for(platform, config.platform_settings(platform)));
        }
        orchestrator
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn PlatformAdapter>) -> Self {
        self.adapters.insert(adapter.platform(), adapter);
        self
    }

    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<Platform> = self.adapters.keys().copied().collect();
        platforms.sort();
        platforms
    }

    pub fn pool(&self) -> &BrowserPool {
        &self.pool
    }

    pub fn metrics(&self) -> PoolMetrics {
        self.pool.metrics()
    }

    /// Scrapes every platform concurrently. Each platform ends with exactly
    /// one record; no platform failure reaches the caller as an error. A pool
    /// without a single live browser does.
    pub async fn aggregate(
        &self,
        media: &CanonicalMedia,
        platforms: &[Platform],
        signal: Arc<dyn CancellationSignal>,
    ) -> Result<RatingMap, PoolError> {
        if !signal.is_cancelled() && !platforms.is_empty() {
            self.pool.start().await?;
        }
        let media = Arc::new(media.clone());
        let mut scheduled = Vec::with_capacity(platforms.len());
        let mut results = RatingMap::new();

        for &platform in platforms {
            if results.contains_key(&platform) || scheduled.iter().any(|(p, _)| *p == platform) {
                continue;
            }
            let Some(adapter) = self.adapters.get(&platform).cloned() else {
                error!(%platform, "no adapter registered");
                results.insert(
                    platform,
                    RatingRecord::with_status(
                        platform.shape(media.media_type),
                        RequestStatus::FetchFailed,
                    ),
                );
                continue;
            };
            let task = tokio::spawn(run_platform(
                self.pool.clone(),
                adapter,
                Arc::clone(&media),
                Arc::clone(&signal),
                self.retry.clone(),
                self.settle,
            ));
            scheduled.push((platform, task));
        }

        info!(
            tmdb_id = media.tmdb_id,
            media_type = %media.media_type,
            platforms = scheduled.len(),
            "aggregating ratings"
        );

        let (names, tasks): (Vec<_>, Vec<_>) = scheduled.into_iter().unzip();
        for (platform, joined) in names.into_iter().zip(join_all(tasks).await) {
            let record = match joined {
                Ok(record) => record,
                Err(err) => {
                    let status = if signal.is_cancelled() {
                        RequestStatus::Cancelled
                    } else {
                        error!(%platform, error = %err, "platform task aborted");
                        RequestStatus::FetchFailed
                    };
                    RatingRecord::with_status(platform.shape(media.media_type), status)
                }
            };
            results.insert(platform, record);
        }
        Ok(results)
    }
}

async fn run_platform(
    pool: BrowserPool,
    adapter: Arc<dyn PlatformAdapter>,
    media: Arc<CanonicalMedia>,
    signal: Arc<dyn CancellationSignal>,
    retry: RetryPolicy,
    settle: Duration,
) -> RatingRecord {
    let platform = adapter.platform();
    if signal.is_cancelled() {
        return finalize(platform, &media, Err(AdapterError::Cancelled), signal.as_ref());
    }
    let outcome = pool
        .run_with_browser(signal.as_ref(), |browser| {
            let adapter = Arc::clone(&adapter);
            let media = Arc::clone(&media);
            let signal = Arc::clone(&signal);
            async move {
                let session = browser.open_session().await?;
                let ctx = PageContext::new(
                    platform,
                    session.as_ref(),
                    signal.as_ref(),
                    &retry,
                    &adapter.settings().rate_limit_rules,
                    settle,
                );
                let outcome = scrape(adapter.as_ref(), &ctx, &media).await;
                drop(ctx);
                if let Err(err) = session.close().await {
                    debug!(%platform, error = %err, "session close failed");
                }
                outcome
            }
        })
        .await;
    finalize(platform, &media, outcome, signal.as_ref())
}
