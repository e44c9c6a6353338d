use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::aggregate::{Orchestrator, RatingMap};
use crate::browser::PoolError;
use crate::cache::{cache_key, RatingCache};
use crate::cancel::CancellationSignal;
use crate::model::CanonicalMedia;
use crate::platform::Platform;
use crate::record::RequestStatus;
use crate::resolver::{MediaResolver, ResolverError, ResolverResult};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Resolver(#[from] ResolverError),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Resolve, consult the cache, scrape whatever missed and write successful
/// results back. Cache failures only cost a scrape.
pub struct RatingService {
    resolver: Arc<dyn MediaResolver>,
    cache: Arc<dyn RatingCache>,
    orchestrator: Orchestrator,
}

impl RatingService {
    pub fn new(
        resolver: Arc<dyn MediaResolver>,
        cache: Arc<dyn RatingCache>,
        orchestrator: Orchestrator,
    ) -> Self {
        Self {
            resolver,
            cache,
            orchestrator,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub async fn resolve(&self, tmdb_id: u64) -> ResolverResult<CanonicalMedia> {
        self.resolver.resolve(tmdb_id).await
    }

    /// Ratings for a TMDB id across `platforms`.
    pub async fn ratings(
        &self,
        tmdb_id: u64,
        platforms: &[Platform],
        signal: Arc<dyn CancellationSignal>,
    ) -> Result<(CanonicalMedia, RatingMap), ServiceError> {
        let media = self.resolve(tmdb_id).await?;
        let ratings = self.ratings_for(&media, platforms, signal).await?;
        Ok((media, ratings))
    }

    /// Ratings for an already resolved record.
    pub async fn ratings_for(
        &self,
        media: &CanonicalMedia,
        platforms: &[Platform],
        signal: Arc<dyn CancellationSignal>,
    ) -> Result<RatingMap, PoolError> {
        let mut results = RatingMap::new();
        let mut missing = Vec::new();
        for &platform in platforms {
            if results.contains_key(&platform) || missing.contains(&platform) {
                continue;
            }
            let key = cache_key(platform, media.media_type, media.tmdb_id);
            match self.cache.get(&key).await {
                Ok(Some(record)) => {
                    debug!(%platform, key = %key, "cache hit");
                    results.insert(platform, record);
                }
                Ok(None) => missing.push(platform),
                Err(err) => {
                    warn!(%platform, key = %key, error = %err, "cache read failed");
                    missing.push(platform);
                }
            }
        }
        if missing.is_empty() {
            return Ok(results);
        }

        let scraped = self.orchestrator.aggregate(media, &missing, signal).await?;
        for (platform, record) in scraped {
            if record.status() == Some(RequestStatus::Successful) {
                let key = cache_key(platform, media.media_type, media.tmdb_id);
                if let Err(err) = self.cache.set(&key, &record).await {
                    warn!(%platform, key = %key, error = %err, "cache write failed");
                }
            }
            results.insert(platform, record);
        }
        Ok(results)
    }
}
