pub mod aggregate;
pub mod browser;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod error;
pub mod matching;
pub mod model;
pub mod platform;
pub mod record;
pub mod resolver;
pub mod service;
pub mod status;

pub use aggregate::{Orchestrator, RatingMap};
pub use browser::{
    BrowserError, BrowserFactory, BrowserHandle, BrowserInstance, BrowserLauncher, BrowserPool,
    BrowserResult, PageSession, PoolError, PoolMetrics, RetryPolicy,
};
pub use cache::{cache_key, CacheError, MemoryRatingCache, RatingCache, SqliteRatingCache};
pub use cancel::{CancelFlag, CancellationSignal, NeverCancelled};
pub use config::{load_config, BrowserConfig, MediarateConfig, PlatformOverride};
pub use error::{ConfigError, Result};
pub use matching::{best_match, parse_ideographic, score};
pub use model::{CanonicalMedia, MatchScore, MediaType, SearchCandidate, SeasonInfo};
pub use platform::{
    adapter_for, AdapterError, PageContext, Platform, PlatformAdapter, PlatformSettings,
    RateLimitRules,
};
pub use record::{RatingRecord, RatingShape, RequestStatus, UNAVAILABLE};
pub use resolver::{MediaResolver, ResolverError, TmdbResolver};
pub use service::{RatingService, ServiceError};
pub use status::classify;
