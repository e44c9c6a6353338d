use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::matching::best_match;
use crate::model::{CanonicalMedia, MediaType, SearchCandidate};
use crate::record::{DualScoreBlock, DualScoreRating, RatingRecord};

use super::context::PageContext;
use super::error::{AdapterError, AdapterResult};
use super::settings::PlatformSettings;
use super::{digits_only, field, Platform, PlatformAdapter};

const ROW_SCRIPT: &str = r#"(() => Array.from(document.querySelectorAll('search-page-media-row')).map(row => {
  const link = row.querySelector('a[data-qa="info-name"]');
  return {
    title: link ? link.textContent.trim() : '',
    year: row.getAttribute('releaseyear') || row.getAttribute('startyear') || '',
    url: link ? link.href : '',
  };
}))()"#;

/// Scores only render after both scorecard toggles have been opened.
const TOGGLES: [&str; 2] = [
    "rt-button[slot=\"criticsScoreIcon\"]",
    "rt-button[slot=\"audienceScoreIcon\"]",
];

const SCORE_SCRIPT: &str = r#"(() => {
  const text = selector => {
    const node = document.querySelector(selector);
    const value = node ? node.textContent.trim() : '';
    return value.length ? value : null;
  };
  return {
    tomatometer: text('rt-text[slot="criticsScore"]'),
    audience_score: text('rt-text[slot="audienceScore"]'),
    critics_avg: text('#critics-score-details [data-qa="score-details-average"]'),
    audience_avg: text('#audience-score-details [data-qa="score-details-average"]'),
    critics_count: text('rt-link[slot="criticsReviews"]'),
    audience_count: text('rt-link[slot="audienceReviews"]'),
  };
})()"#;

#[derive(Debug, Default, Deserialize)]
struct ScoreFields {
    tomatometer: Option<String>,
    audience_score: Option<String>,
    critics_avg: Option<String>,
    audience_avg: Option<String>,
    critics_count: Option<String>,
    audience_count: Option<String>,
}

impl ScoreFields {
    fn into_block(self, season_number: Option<u32>) -> DualScoreBlock {
        DualScoreBlock {
            season_number,
            tomatometer: field(self.tomatometer),
            audience_score: field(self.audience_score),
            critics_avg: field(self.critics_avg),
            audience_avg: field(self.audience_avg),
            critics_count: field(digits_only(self.critics_count)),
            audience_count: field(digits_only(self.audience_count)),
            status: None,
        }
    }
}

pub struct RottenTomatoesAdapter {
    settings: PlatformSettings,
}

impl RottenTomatoesAdapter {
    pub fn new(settings: PlatformSettings) -> Self {
        Self { settings }
    }

    async fn read_block(
        &self,
        ctx: &PageContext<'_>,
        url: &str,
        season_number: Option<u32>,
    ) -> AdapterResult<DualScoreBlock> {
        ctx.navigate(url).await?;
        for toggle in TOGGLES {
            if !ctx.toggle(toggle).await? {
                debug!(url, toggle, "score toggle not present");
            }
        }
        let fields: ScoreFields = ctx.evaluate_as(SCORE_SCRIPT, "rottentomatoes scores").await?;
        Ok(fields.into_block(season_number))
    }
}

#[async_trait]
impl PlatformAdapter for RottenTomatoesAdapter {
    fn platform(&self) -> Platform {
        Platform::RottenTomatoes
    }

    fn settings(&self) -> &PlatformSettings {
        &self.settings
    }

    fn row_script(&self) -> &'static str {
        ROW_SCRIPT
    }

    fn results_selector(&self) -> &'static str {
        "search-page-media-row"
    }

    /// Search mixes films and series; only rows of the right kind compete.
    fn select(&self, candidates: &[SearchCandidate], media: &CanonicalMedia) -> Vec<SearchCandidate> {
        let kind: Vec<SearchCandidate> = candidates
            .iter()
            .filter(|candidate| is_kind(&candidate.url, media.media_type))
            .cloned()
            .collect();
        best_match(media, &kind, Platform::RottenTomatoes, self.settings.match_threshold)
            .map(|matched| vec![matched.candidate])
            .unwrap_or_default()
    }

    async fn extract(
        &self,
        ctx: &PageContext<'_>,
        selected: &[SearchCandidate],
        media: &CanonicalMedia,
    ) -> AdapterResult<RatingRecord> {
        let candidate = selected
            .first()
            .ok_or_else(|| AdapterError::parse("rottentomatoes selection", "no candidate"))?;
        let detail_url = self.settings.detail_url(&candidate.url, None);
        let series = self.read_block(ctx, &detail_url, None).await?;
        let mut seasons = Vec::new();
        if media.is_tv() {
            for season in &media.seasons {
                let Some(url) = self.settings.season_url(&detail_url, season.season_number) else {
                    break;
                };
                seasons.push(
                    self.read_block(ctx, &url, Some(season.season_number))
                        .await?,
                );
            }
        }
        Ok(RatingRecord::DualScore(DualScoreRating {
            series,
            seasons,
            status: None,
        }))
    }
}

fn is_kind(url: &str, media_type: MediaType) -> bool {
    match media_type {
        MediaType::Movie => url.contains("/m/"),
        MediaType::Tv => url.contains("/tv/"),
    }
}
