use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};
use crate::platform::{Platform, PlatformSettings, RateLimitRules};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MediarateConfig {
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub pool: PoolSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub resolver: ResolverSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub platforms: PlatformsSection,
}

impl MediarateConfig {
    pub fn validate(&self) -> Result<()> {
        if self.pool.max_browsers == 0 {
            return Err(ConfigError::Invalid(
                "pool.max_browsers must be at least 1".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.browser.navigation.timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "browser.navigation.timeout_seconds must be positive".into(),
            ));
        }
        for platform in Platform::ALL {
            let settings = self.platform_settings(platform);
            if settings.match_threshold > 100 {
                return Err(ConfigError::Invalid(format!(
                    "platforms.{platform}.match_threshold must be within 0..=100"
                )));
            }
            if settings.search_url_template.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "platforms.{platform}.search_url_template is empty"
                )));
            }
        }
        Ok(())
    }

    /// Built-in adapter settings for `platform` with any configured
    /// overrides applied on top.
    pub fn platform_settings(&self, platform: Platform) -> PlatformSettings {
        let defaults = PlatformSettings::defaults(platform);
        match self.platforms.get(platform) {
            Some(overrides) => defaults.with_overrides(overrides),
            None => defaults,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrowserConfig {
    #[serde(default)]
    pub chromium: ChromiumSection,
    #[serde(default)]
    pub flags: FlagsSection,
    #[serde(default)]
    pub user_agents: UserAgentSection,
    #[serde(default)]
    pub navigation: NavigationSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChromiumSection {
    pub executable_path: Option<String>,
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default = "default_true")]
    pub sandbox: bool,
    #[serde(default = "default_true")]
    pub disable_gpu: bool,
    pub request_timeout_seconds: Option<u64>,
}

impl Default for ChromiumSection {
    fn default() -> Self {
        Self {
            executable_path: None,
            headless: true,
            sandbox: true,
            disable_gpu: true,
            request_timeout_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlagsSection {
    #[serde(default = "default_true")]
    pub no_first_run: bool,
    #[serde(default = "default_true")]
    pub disable_automation_controlled: bool,
    #[serde(default)]
    pub disable_blink_features: Vec<String>,
    pub lang: Option<String>,
    pub accept_language: Option<String>,
}

impl Default for FlagsSection {
    fn default() -> Self {
        Self {
            no_first_run: true,
            disable_automation_controlled: true,
            disable_blink_features: Vec::new(),
            lang: None,
            accept_language: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserAgentSection {
    #[serde(default)]
    pub pool: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NavigationSection {
    #[serde(default = "default_navigation_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl NavigationSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl Default for NavigationSection {
    fn default() -> Self {
        Self {
            timeout_seconds: default_navigation_timeout(),
            settle_ms: default_settle_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolSection {
    #[serde(default = "default_max_browsers")]
    pub max_browsers: usize,
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            max_browsers: default_max_browsers(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolverSection {
    #[serde(default = "default_tmdb_base_url")]
    pub base_url: String,
    pub api_key: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    #[serde(default = "default_resolver_timeout")]
    pub timeout_seconds: u64,
}

impl ResolverSection {
    /// Configured key, falling back to `MEDIARATE_TMDB_API_KEY`.
    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| std::env::var("MEDIARATE_TMDB_API_KEY").ok())
            .filter(|key| !key.trim().is_empty())
    }
}

impl Default for ResolverSection {
    fn default() -> Self {
        Self {
            base_url: default_tmdb_base_url(),
            api_key: None,
            language: default_language(),
            pacing_ms: default_pacing_ms(),
            timeout_seconds: default_resolver_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    pub path: Option<String>,
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            path: None,
            ttl_seconds: default_cache_ttl(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlatformsSection {
    pub douban: Option<PlatformOverride>,
    pub imdb: Option<PlatformOverride>,
    pub letterboxd: Option<PlatformOverride>,
    pub rottentomatoes: Option<PlatformOverride>,
    pub metacritic: Option<PlatformOverride>,
}

impl PlatformsSection {
    pub fn get(&self, platform: Platform) -> Option<&PlatformOverride> {
        match platform {
            Platform::Douban => self.douban.as_ref(),
            Platform::Imdb => self.imdb.as_ref(),
            Platform::Letterboxd => self.letterboxd.as_ref(),
            Platform::RottenTomatoes => self.rottentomatoes.as_ref(),
            Platform::Metacritic => self.metacritic.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlatformOverride {
    pub search_url_template: Option<String>,
    pub tv_search_url_template: Option<String>,
    pub detail_url_template: Option<String>,
    pub season_url_template: Option<String>,
    pub match_threshold: Option<u8>,
    pub rate_limit: Option<RateLimitRules>,
}

fn default_true() -> bool {
    true
}

fn default_navigation_timeout() -> u64 {
    30
}

fn default_settle_ms() -> u64 {
    1500
}

fn default_max_browsers() -> usize {
    5
}

fn default_max_attempts() -> usize {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_tmdb_base_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_language() -> String {
    "zh-CN".to_string()
}

fn default_pacing_ms() -> u64 {
    250
}

fn default_resolver_timeout() -> u64 {
    10
}

fn default_cache_ttl() -> u64 {
    86_400
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<MediarateConfig> {
    let config: MediarateConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
