mod context;
mod detector;
mod douban;
mod error;
mod imdb;
mod letterboxd;
mod metacritic;
mod pipeline;
mod rottentomatoes;
mod settings;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::matching::{best_match, split_title_year};
use crate::model::{CanonicalMedia, MediaType, SearchCandidate};
use crate::record::{RatingRecord, RatingShape};

pub use context::PageContext;
pub use detector::{detect_rate_limit, find_phrase, RateLimitRules, RateLimited};
pub use douban::DoubanAdapter;
pub use error::{AdapterError, AdapterResult};
pub use imdb::ImdbAdapter;
pub use letterboxd::LetterboxdAdapter;
pub use metacritic::MetacriticAdapter;
pub use pipeline::{finalize, scrape};
pub use rottentomatoes::RottenTomatoesAdapter;
pub use settings::{search_query, PlatformSettings, DEFAULT_MATCH_THRESHOLD};

const RESULTS_WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Douban,
    Imdb,
    Letterboxd,
    RottenTomatoes,
    Metacritic,
}

impl Platform {
    pub const ALL: [Platform; 5] = [
        Platform::Douban,
        Platform::Imdb,
        Platform::Letterboxd,
        Platform::RottenTomatoes,
        Platform::Metacritic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Douban => "douban",
            Platform::Imdb => "imdb",
            Platform::Letterboxd => "letterboxd",
            Platform::RottenTomatoes => "rottentomatoes",
            Platform::Metacritic => "metacritic",
        }
    }

    /// Record shape this platform produces for a media type.
    pub fn shape(&self, media_type: MediaType) -> RatingShape {
        match (self, media_type) {
            (Platform::Douban, MediaType::Tv) => RatingShape::SeasonedSimple,
            (Platform::Douban | Platform::Imdb | Platform::Letterboxd, _) => RatingShape::Simple,
            (Platform::RottenTomatoes, _) => RatingShape::DualScore,
            (Platform::Metacritic, _) => RatingShape::DualScore2,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace(&['-', '_', ' '][..], "");
        Platform::ALL
            .into_iter()
            .find(|platform| platform.as_str() == normalized)
            .ok_or_else(|| format!("unknown platform `{value}`"))
    }
}

/// One platform's search, match and extract flow.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    fn settings(&self) -> &PlatformSettings;

    /// Script evaluated on the search page. Must return an array of
    /// `{title, year, url, imdb_id?, director?, season_number?}` objects.
    fn row_script(&self) -> &'static str;

    /// Selector whose presence means result rows have rendered.
    fn results_selector(&self) -> &'static str;

    fn search_url(&self, media: &CanonicalMedia) -> String {
        let query = search_query(self.platform(), media);
        self.settings().search_url(media.media_type, query)
    }

    /// A candidate known without searching, if any.
    fn known_candidate(&self, _media: &CanonicalMedia) -> Option<SearchCandidate> {
        None
    }

    /// Cleans a raw search row; `None` drops it.
    fn normalize_candidate(&self, candidate: SearchCandidate) -> Option<SearchCandidate> {
        clean_candidate(candidate)
    }

    /// Zero rows is an empty result, not a failure.
    async fn search(
        &self,
        ctx: &PageContext<'_>,
        media: &CanonicalMedia,
    ) -> AdapterResult<Vec<SearchCandidate>> {
        let url = self.search_url(media);
        ctx.navigate(&url).await?;
        if !ctx.wait_for(self.results_selector(), RESULTS_WAIT).await? {
            tracing::debug!(platform = %self.platform(), url = %url, "no result rows rendered");
        }
        let rows: Vec<SearchCandidate> = ctx.evaluate_as(self.row_script(), "search rows").await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| self.normalize_candidate(row))
            .collect())
    }

    /// Accepted candidates; empty means nothing on the platform matched.
    fn select(&self, candidates: &[SearchCandidate], media: &CanonicalMedia) -> Vec<SearchCandidate> {
        best_match(media, candidates, self.platform(), self.settings().match_threshold)
            .map(|matched| vec![matched.candidate])
            .unwrap_or_default()
    }

    async fn extract(
        &self,
        ctx: &PageContext<'_>,
        selected: &[SearchCandidate],
        media: &CanonicalMedia,
    ) -> AdapterResult<RatingRecord>;
}

/// The built-in adapter for `platform`.
pub fn adapter_for(platform: Platform, settings: PlatformSettings) -> Arc<dyn PlatformAdapter> {
    match platform {
        Platform::Douban => Arc::new(DoubanAdapter::new(settings)),
        Platform::Imdb => Arc::new(ImdbAdapter::new(settings)),
        Platform::Letterboxd => Arc::new(LetterboxdAdapter::new(settings)),
        Platform::RottenTomatoes => Arc::new(RottenTomatoesAdapter::new(settings)),
        Platform::Metacritic => Arc::new(MetacriticAdapter::new(settings)),
    }
}

/// Drops rows without a title or link and moves a trailing `(YYYY)` from
/// the title into the year.
pub(crate) fn clean_candidate(mut candidate: SearchCandidate) -> Option<SearchCandidate> {
    let title: String = candidate.title.chars().filter(|ch| *ch != '\u{200e}').collect();
    if candidate.url.trim().is_empty() || title.trim().is_empty() {
        return None;
    }
    let (title, year) = split_title_year(&title);
    candidate.title = title;
    if candidate.year.trim().is_empty() {
        candidate.year = year.unwrap_or_default();
    }
    candidate.year = candidate.year.trim().to_string();
    Some(candidate)
}

/// Reads `aggregateRating` from the page's JSON-LD blocks.
pub(crate) const JSON_LD_RATING_SCRIPT: &str = r#"(() => {
  for (const node of document.querySelectorAll('script[type="application/ld+json"]')) {
    try {
      const data = JSON.parse(node.textContent.replace(/\/\*[\s\S]*?\*\//g, ''));
      const agg = data && data.aggregateRating;
      if (agg) {
        return {
          rating: agg.ratingValue != null ? String(agg.ratingValue) : null,
          count: agg.ratingCount != null ? String(agg.ratingCount) : null,
        };
      }
    } catch (e) {}
  }
  return { rating: null, count: null };
})()"#;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub(crate) struct RatingPair {
    #[serde(default)]
    pub rating: Option<String>,
    #[serde(default)]
    pub count: Option<String>,
}

/// Trimmed text or the sentinel.
pub(crate) fn field(value: Option<String>) -> String {
    crate::record::field_or_unavailable(value)
}

/// Keeps only the digits of a count such as `"1,234 Ratings"`.
pub(crate) fn digits_only(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.chars().filter(char::is_ascii_digit).collect::<String>())
        .filter(|digits| !digits.is_empty())
}
