use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use mediarate_core::record::SeasonRating;
use mediarate_core::{
    load_config, BrowserLauncher, BrowserPool, CancelFlag, CanonicalMedia, MediaResolver,
    MediarateConfig, MemoryRatingCache, Orchestrator, Platform, PoolMetrics, RatingCache,
    RatingMap, RatingRecord, RatingService, SqliteRatingCache, TmdbResolver,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] mediarate_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache error: {0}")]
    Cache(#[from] mediarate_core::CacheError),
    #[error("resolver error: {0}")]
    Resolver(#[from] mediarate_core::ResolverError),
    #[error("{0}")]
    Service(#[from] mediarate_core::ServiceError),
    #[error("browser pool error: {0}")]
    Pool(#[from] mediarate_core::PoolError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Aggregate movie and series ratings across platforms", long_about = None)]
pub struct Cli {
    /// Path to mediarate.toml
    #[arg(long, default_value = "configs/mediarate.toml")]
    pub config: PathBuf,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Emit logs as JSON lines
    #[arg(long, default_value_t = false)]
    pub log_json: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve a TMDB id and scrape every requested platform
    Ratings(RatingsArgs),
    /// Scrape a movie described on the command line, without TMDB
    Lookup(LookupArgs),
    /// Show the canonical record TMDB returns for an id
    Resolve(ResolveArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Args, Debug)]
pub struct RatingsArgs {
    /// TMDB id of the movie or series
    pub tmdb_id: u64,
    /// Platforms to query (repeatable); all when omitted
    #[arg(long = "platform", value_parser = parse_platform)]
    pub platforms: Vec<Platform>,
    /// Skip the rating cache
    #[arg(long, default_value_t = false)]
    pub no_cache: bool,
}

#[derive(Args, Debug)]
pub struct LookupArgs {
    /// English title
    pub title: String,
    /// Release year
    pub year: String,
    /// Localized title used on douban
    #[arg(long)]
    pub localized: Option<String>,
    /// IMDb id, skips the imdb search page
    #[arg(long)]
    pub imdb_id: Option<String>,
    /// Director, informational
    #[arg(long)]
    pub director: Option<String>,
    #[arg(long = "platform", value_parser = parse_platform)]
    pub platforms: Vec<Platform>,
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    pub tmdb_id: u64,
}

fn parse_platform(value: &str) -> std::result::Result<Platform, String> {
    value.parse()
}

fn selected_platforms(requested: &[Platform]) -> Vec<Platform> {
    if requested.is_empty() {
        Platform::ALL.to_vec()
    } else {
        requested.to_vec()
    }
}

/// Installs the global subscriber. Honors `RUST_LOG`, defaults to `info`.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if installed.is_err() {
        eprintln!("tracing subscriber already installed");
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli.config)?;

    match &cli.command {
        Commands::Config => {
            let report = ConfigReport::new(&cli.config, &config);
            render(&report, cli.format)?;
        }
        Commands::Resolve(args) => {
            let resolver = TmdbResolver::from_config(&config.resolver)?;
            let media = resolver.resolve(args.tmdb_id).await?;
            render(&MediaReport(media), cli.format)?;
        }
        Commands::Ratings(args) => {
            let platforms = selected_platforms(&args.platforms);
            let resolver = TmdbResolver::from_config(&config.resolver)?;
            let cache = open_cache(&config, args.no_cache)?;
            let orchestrator = build_orchestrator(&config);
            let service = RatingService::new(Arc::new(resolver), cache, orchestrator.clone());
            let flag = cancel_on_ctrl_c();

            let outcome = service
                .ratings(args.tmdb_id, &platforms, Arc::new(flag))
                .await;
            orchestrator.pool().shutdown().await;
            let (media, ratings) = outcome?;
            let report = RatingsReport {
                media,
                ratings,
                pool: orchestrator.metrics(),
            };
            render(&report, cli.format)?;
        }
        Commands::Lookup(args) => {
            let platforms = selected_platforms(&args.platforms);
            let media = lookup_media(args)?;
            let orchestrator = build_orchestrator(&config);
            let flag = cancel_on_ctrl_c();

            let outcome = orchestrator
                .aggregate(&media, &platforms, Arc::new(flag))
                .await;
            orchestrator.pool().shutdown().await;
            let ratings = outcome?;
            let report = RatingsReport {
                media,
                ratings,
                pool: orchestrator.metrics(),
            };
            render(&report, cli.format)?;
        }
    }

    Ok(())
}

fn build_orchestrator(config: &MediarateConfig) -> Orchestrator {
    let launcher = BrowserLauncher::new(config.browser.clone());
    let pool = BrowserPool::new(Arc::new(launcher), config.pool.max_browsers);
    Orchestrator::from_config(config, pool)
}

fn open_cache(config: &MediarateConfig, disabled: bool) -> Result<Arc<dyn RatingCache>> {
    match config.cache.path.as_deref() {
        Some(path) if !disabled => {
            let path = Path::new(path);
            if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let cache = SqliteRatingCache::open(path, config.cache.ttl_seconds)?;
            info!(path = %path.display(), "using sqlite rating cache");
            Ok(Arc::new(cache))
        }
        _ => Ok(Arc::new(MemoryRatingCache::new())),
    }
}

/// Flag tripped by the first Ctrl-C. In-flight platforms finish as cancelled.
fn cancel_on_ctrl_c() -> CancelFlag {
    let flag = CancelFlag::new();
    let trigger = flag.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("interrupt received, cancelling");
                trigger.cancel();
            }
            Err(err) => warn!(error = %err, "could not listen for ctrl-c"),
        }
    });
    flag
}

fn lookup_media(args: &LookupArgs) -> Result<CanonicalMedia> {
    let title = args.title.trim();
    if title.is_empty() {
        return Err(AppError::InvalidInput("title must not be empty".into()));
    }
    let year = args.year.trim();
    if year.len() != 4 || !year.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(AppError::InvalidInput(format!("`{year}` is not a four digit year")));
    }
    let mut media = CanonicalMedia::movie(title, year, 0);
    if let Some(localized) = args.localized.as_deref() {
        media = media.with_localized_title(localized.trim());
    }
    if let Some(imdb_id) = args.imdb_id.as_deref() {
        media = media.with_imdb_id(imdb_id.trim());
    }
    if let Some(director) = args.director.as_deref() {
        media.director = director.trim().to_string();
    }
    Ok(media)
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug, Serialize)]
struct RatingsReport {
    media: CanonicalMedia,
    ratings: RatingMap,
    pool: PoolMetrics,
}

impl DisplayFallback for RatingsReport {
    fn display(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(
            output,
            "{} ({}) [{}]",
            self.media.title, self.media.year, self.media.media_type
        );
        for (platform, record) in &self.ratings {
            let status = record
                .status()
                .map(|status| status.to_string())
                .unwrap_or_else(|| "-".into());
            let _ = writeln!(
                output,
                "  {:<15} {:<12} {}",
                platform.as_str(),
                status,
                summarize(record)
            );
        }
        let _ = write!(
            output,
            "pool: {} requests, {} failed, {} crashes, {:.1}% ok",
            self.pool.total_requests,
            self.pool.failed_requests,
            self.pool.crash_count,
            self.pool.success_rate()
        );
        output
    }
}

fn summarize(record: &RatingRecord) -> String {
    match record {
        RatingRecord::Simple(simple) => format!("{} ({} votes)", simple.rating, simple.rating_count),
        RatingRecord::SeasonedSimple(seasoned) => {
            if seasoned.seasons.is_empty() {
                return "no seasons".into();
            }
            seasoned
                .seasons
                .iter()
                .map(|SeasonRating { season_number, rating, rating_count }| {
                    format!("S{season_number} {rating} ({rating_count})")
                })
                .collect::<Vec<_>>()
                .join(", ")
        }
        RatingRecord::DualScore(dual) => {
            let mut line = format!(
                "tomatometer {} audience {}",
                dual.series.tomatometer, dual.series.audience_score
            );
            if !dual.seasons.is_empty() {
                let _ = write!(line, " +{} seasons", dual.seasons.len());
            }
            line
        }
        RatingRecord::DualScore2(dual) => {
            let mut line = format!(
                "metascore {} userscore {}",
                dual.overall.metascore, dual.overall.userscore
            );
            if !dual.seasons.is_empty() {
                let _ = write!(line, " +{} seasons", dual.seasons.len());
            }
            line
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
struct MediaReport(CanonicalMedia);

impl DisplayFallback for MediaReport {
    fn display(&self) -> String {
        let media = &self.0;
        let mut output = format!("{} ({}) [{}]", media.title, media.year, media.media_type);
        let _ = write!(output, "\n  tmdb:      {}", media.tmdb_id);
        let _ = write!(
            output,
            "\n  imdb:      {}",
            media.imdb_id.as_deref().unwrap_or("-")
        );
        let _ = write!(output, "\n  original:  {}", media.original_title);
        let _ = write!(output, "\n  localized: {}", media.localized_title);
        let _ = write!(output, "\n  director:  {}", media.director);
        for season in &media.seasons {
            let _ = write!(
                output,
                "\n  season {:>2}: {} ({} episodes)",
                season.season_number, season.air_year, season.episode_count
            );
        }
        output
    }
}

#[derive(Debug, Serialize)]
struct ConfigReport {
    config_path: String,
    max_browsers: usize,
    retry_attempts: usize,
    retry_delay_ms: u64,
    settle_ms: u64,
    resolver_base_url: String,
    resolver_api_key: bool,
    cache_path: Option<String>,
    cache_ttl_seconds: u64,
    platforms: Vec<PlatformReport>,
}

#[derive(Debug, Serialize)]
struct PlatformReport {
    platform: Platform,
    match_threshold: u8,
    search_url_template: String,
    rate_limit_phrases: usize,
}

impl ConfigReport {
    fn new(path: &Path, config: &MediarateConfig) -> Self {
        let platforms = Platform::ALL
            .into_iter()
            .map(|platform| {
                let settings = config.platform_settings(platform);
                PlatformReport {
                    platform,
                    match_threshold: settings.match_threshold,
                    search_url_template: settings.search_url_template,
                    rate_limit_phrases: settings.rate_limit_rules.phrases.len(),
                }
            })
            .collect();
        Self {
            config_path: path.display().to_string(),
            max_browsers: config.pool.max_browsers,
            retry_attempts: config.retry.max_attempts,
            retry_delay_ms: config.retry.delay_ms,
            settle_ms: config.browser.navigation.settle_ms,
            resolver_base_url: config.resolver.base_url.clone(),
            resolver_api_key: config.resolver.api_key().is_some(),
            cache_path: config.cache.path.clone(),
            cache_ttl_seconds: config.cache.ttl_seconds,
            platforms,
        }
    }
}

impl DisplayFallback for ConfigReport {
    fn display(&self) -> String {
        let mut output = format!("config: {}", self.config_path);
        let _ = write!(output, "\n  browsers:  {}", self.max_browsers);
        let _ = write!(
            output,
            "\n  retry:     {} attempts, {} ms apart",
            self.retry_attempts, self.retry_delay_ms
        );
        let _ = write!(output, "\n  settle:    {} ms", self.settle_ms);
        let _ = write!(
            output,
            "\n  resolver:  {} (api key {})",
            self.resolver_base_url,
            if self.resolver_api_key { "set" } else { "missing" }
        );
        let _ = write!(
            output,
            "\n  cache:     {} (ttl {}s)",
            self.cache_path.as_deref().unwrap_or("memory"),
            self.cache_ttl_seconds
        );
        for platform in &self.platforms {
            let _ = write!(
                output,
                "\n  {:<15} threshold {:>3}  {} block phrases  {}",
                platform.platform.as_str(),
                platform.match_threshold,
                platform.rate_limit_phrases,
                platform.search_url_template
            );
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediarate_core::record::{DualScore2Rating, MetascoreBlock, SeasonedRating, SimpleRating};
    use mediarate_core::{RequestStatus, SeasonInfo};

    #[test]
    fn platforms_parse_from_repeated_flags() {
        let cli = Cli::try_parse_from([
            "mediaratectl",
            "ratings",
            "27205",
            "--platform",
            "imdb",
            "--platform",
            "rotten-tomatoes",
        ])
        .unwrap();
        let Commands::Ratings(args) = cli.command else {
            panic!("expected ratings command");
        };
        assert_eq!(args.tmdb_id, 27205);
        assert_eq!(args.platforms, vec![Platform::Imdb, Platform::RottenTomatoes]);
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn unknown_platform_is_rejected() {
        let err = Cli::try_parse_from(["mediaratectl", "ratings", "1", "--platform", "netflix"])
            .unwrap_err();
        assert!(err.to_string().contains("unknown platform"));
    }

    #[test]
    fn empty_selection_means_every_platform() {
        assert_eq!(selected_platforms(&[]), Platform::ALL.to_vec());
        assert_eq!(selected_platforms(&[Platform::Douban]), vec![Platform::Douban]);
    }

    #[test]
    fn lookup_validates_year() {
        let args = LookupArgs {
            title: "Heat".into(),
            year: "95".into(),
            localized: None,
            imdb_id: None,
            director: None,
            platforms: Vec::new(),
        };
        assert!(matches!(lookup_media(&args), Err(AppError::InvalidInput(_))));

        let args = LookupArgs {
            year: "1995".into(),
            localized: Some("盗火线".into()),
            director: Some("Michael Mann".into()),
            ..args
        };
        let media = lookup_media(&args).unwrap();
        assert_eq!(media.localized_title, "盗火线");
        assert_eq!(media.director, "Michael Mann");
        assert!(media.imdb_id.is_none());
    }

    #[test]
    fn summaries_cover_every_shape() {
        let simple = RatingRecord::Simple(SimpleRating {
            rating: "8.8".into(),
            rating_count: "2600000".into(),
            status: Some(RequestStatus::Successful),
        });
        assert_eq!(summarize(&simple), "8.8 (2600000 votes)");

        let seasoned = RatingRecord::SeasonedSimple(SeasonedRating {
            seasons: vec![SeasonRating {
                season_number: 1,
                rating: "9.2".into(),
                rating_count: "120512".into(),
            }],
            status: Some(RequestStatus::Successful),
        });
        assert_eq!(summarize(&seasoned), "S1 9.2 (120512)");

        let mut season = MetascoreBlock::unavailable(Some(1));
        season.metascore = "87".into();
        let dual = RatingRecord::DualScore2(DualScore2Rating {
            overall: MetascoreBlock::unavailable(None),
            seasons: vec![season],
            status: None,
        });
        assert_eq!(summarize(&dual), "metascore unavailable userscore unavailable +1 seasons");
    }

    #[test]
    fn ratings_report_renders_as_json() {
        let media = CanonicalMedia::tv(
            "The Bear",
            "2022",
            136315,
            vec![SeasonInfo {
                season_number: 1,
                air_year: "2022".into(),
                episode_count: 8,
            }],
        );
        let mut ratings = RatingMap::new();
        ratings.insert(
            Platform::Metacritic,
            RatingRecord::with_status(
                Platform::Metacritic.shape(media.media_type),
                RequestStatus::NoFound,
            ),
        );
        let report = RatingsReport {
            media,
            ratings,
            pool: PoolMetrics::default(),
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["ratings"]["metacritic"]["status"], "no_found");
        assert!(report.display().contains("metacritic"));
    }

    #[test]
    fn config_report_reads_fixture() {
        let path = Path::new("../configs/mediarate.toml");
        let config = load_config(path).unwrap();
        let report = ConfigReport::new(path, &config);
        assert_eq!(report.max_browsers, 3);
        assert_eq!(report.platforms.len(), Platform::ALL.len());
        let douban = &report.platforms[0];
        assert_eq!(douban.platform, Platform::Douban);
        assert_eq!(douban.match_threshold, 70);
        assert!(report.display().contains("douban"));
    }

    #[tokio::test]
    async fn empty_pool_fails_before_scraping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mediarate.toml");
        fs::write(&path, "[pool]\nmax_browsers = 0\n").unwrap();
        let cli = Cli::try_parse_from([
            "mediaratectl",
            "--config",
            path.to_str().unwrap(),
            "lookup",
            "Inception",
            "2010",
        ])
        .unwrap();

        let err = run(cli).await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(err.to_string().contains("pool.max_browsers"));
    }

    #[test]
    fn pool_exhaustion_is_an_error() {
        let err = AppError::from(mediarate_core::ServiceError::Pool(
            mediarate_core::PoolError::NoCapacity { max_browsers: 3 },
        ));
        assert!(matches!(
            err,
            AppError::Service(mediarate_core::ServiceError::Pool(_))
        ));
        assert!(!err.to_string().is_empty());
    }
}
