use serde::Serialize;

use crate::config::PlatformOverride;
use crate::model::{CanonicalMedia, MediaType};

use super::detector::RateLimitRules;
use super::Platform;

pub const DEFAULT_MATCH_THRESHOLD: u8 = 70;

/// Per-platform adapter configuration. Templates understand `{query}`,
/// `{query_path}`, `{url}`, `{imdb_id}`, `{season}` and `{season_padded}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformSettings {
    pub search_url_template: String,
    pub tv_search_url_template: String,
    pub detail_url_template: String,
    pub season_url_template: Option<String>,
    pub match_threshold: u8,
    pub rate_limit_rules: RateLimitRules,
}

impl PlatformSettings {
    pub fn defaults(platform: Platform) -> Self {
        match platform {
            Platform::Douban => Self {
                search_url_template:
                    "https://search.douban.com/movie/subject_search?search_text={query}&cat=1002"
                        .into(),
                tv_search_url_template:
                    "https://search.douban.com/movie/subject_search?search_text={query}&cat=1002"
                        .into(),
                detail_url_template: "{url}".into(),
                season_url_template: None,
                match_threshold: DEFAULT_MATCH_THRESHOLD,
                rate_limit_rules: rules(
                    &["#captcha_form", ".error-tip", "div.note"],
                    &[
                        "检测到有异常请求",
                        "你访问豆瓣的方式有点像机器人程序",
                        "请输入验证码",
                        "登录跳转",
                    ],
                ),
            },
            Platform::Imdb => Self {
                search_url_template: "https://www.imdb.com/find/?q={query}&s=tt&ttype=ft".into(),
                tv_search_url_template: "https://www.imdb.com/find/?q={query}&s=tt&ttype=tv"
                    .into(),
                detail_url_template: "https://www.imdb.com/title/{imdb_id}/".into(),
                season_url_template: None,
                match_threshold: DEFAULT_MATCH_THRESHOLD,
                rate_limit_rules: rules(
                    &["h1", "#error-page"],
                    &["Too Many Requests", "rate limit exceeded", "503 Service Unavailable"],
                ),
            },
            Platform::Letterboxd => Self {
                search_url_template: "https://letterboxd.com/search/films/{query_path}/".into(),
                tv_search_url_template: "https://letterboxd.com/search/films/{query_path}/".into(),
                detail_url_template: "{url}".into(),
                season_url_template: None,
                match_threshold: DEFAULT_MATCH_THRESHOLD,
                rate_limit_rules: rules(
                    &["h1", ".error-message"],
                    &[
                        "Too Many Requests",
                        "Access Denied",
                        "Checking your browser",
                        "Verify you are human",
                    ],
                ),
            },
            Platform::RottenTomatoes => Self {
                search_url_template: "https://www.rottentomatoes.com/search?search={query}".into(),
                tv_search_url_template: "https://www.rottentomatoes.com/search?search={query}"
                    .into(),
                detail_url_template: "{url}".into(),
                season_url_template: Some("{url}/s{season_padded}".into()),
                match_threshold: DEFAULT_MATCH_THRESHOLD,
                rate_limit_rules: rules(
                    &["h1", "#main-page-content .error"],
                    &["Too Many Requests", "Access Denied", "rate limit exceeded"],
                ),
            },
            Platform::Metacritic => Self {
                search_url_template: "https://www.metacritic.com/search/{query_path}/?category=2"
                    .into(),
                tv_search_url_template:
                    "https://www.metacritic.com/search/{query_path}/?category=1".into(),
                detail_url_template: "{url}".into(),
                season_url_template: Some("{url}/season-{season}/".into()),
                match_threshold: DEFAULT_MATCH_THRESHOLD,
                rate_limit_rules: rules(
                    &["h1", ".c-error"],
                    &[
                        "Access Denied",
                        "Too Many Requests",
                        "403 Forbidden",
                        "rate limit exceeded",
                    ],
                ),
            },
        }
    }

    pub fn with_overrides(mut self, overrides: &PlatformOverride) -> Self {
        if let Some(template) = &overrides.search_url_template {
            self.search_url_template = template.clone();
        }
        if let Some(template) = &overrides.tv_search_url_template {
            self.tv_search_url_template = template.clone();
        }
        if let Some(template) = &overrides.detail_url_template {
            self.detail_url_template = template.clone();
        }
        if let Some(template) = &overrides.season_url_template {
            self.season_url_template = Some(template.clone());
        }
        if let Some(threshold) = overrides.match_threshold {
            self.match_threshold = threshold;
        }
        if let Some(rules) = &overrides.rate_limit {
            self.rate_limit_rules = rules.clone();
        }
        self
    }

    pub fn search_url(&self, media_type: MediaType, query: &str) -> String {
        let template = match media_type {
            MediaType::Movie => &self.search_url_template,
            MediaType::Tv => &self.tv_search_url_template,
        };
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        let path_encoded = encoded.replace('+', "%20");
        render(
            template,
            &[("query", encoded.as_str()), ("query_path", path_encoded.as_str())],
        )
    }

    pub fn detail_url(&self, url: &str, imdb_id: Option<&str>) -> String {
        if self.detail_url_template.contains("{imdb_id}") && imdb_id.is_none() {
            return url.to_string();
        }
        render(
            &self.detail_url_template,
            &[
                ("url", url.trim_end_matches('/')),
                ("imdb_id", imdb_id.unwrap_or_default()),
            ],
        )
    }

    pub fn season_url(&self, detail_url: &str, season_number: u32) -> Option<String> {
        let template = self.season_url_template.as_ref()?;
        let season = season_number.to_string();
        let padded = format!("{season_number:02}");
        Some(render(
            template,
            &[
                ("url", detail_url.trim_end_matches('/')),
                ("season", season.as_str()),
                ("season_padded", padded.as_str()),
            ],
        ))
    }
}

/// Query text used on a platform's search page.
pub fn search_query(platform: Platform, media: &CanonicalMedia) -> &str {
    let preferred = match platform {
        Platform::Douban => media.localized_title.trim(),
        _ => media.title.trim(),
    };
    if preferred.is_empty() {
        media.original_title.trim()
    } else {
        preferred
    }
}

fn rules(selectors: &[&str], phrases: &[&str]) -> RateLimitRules {
    RateLimitRules {
        selectors: selectors.iter().map(|s| s.to_string()).collect(),
        phrases: phrases.iter().map(|s| s.to_string()).collect(),
    }
}

fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut rendered = template.to_string();
    for (key, value) in values {
        rendered = rendered.replace(&format!("{{{key}}}"), value);
    }
    rendered
}
