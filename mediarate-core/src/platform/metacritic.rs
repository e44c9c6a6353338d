use async_trait::async_trait;
use serde::Deserialize;

use crate::model::{CanonicalMedia, SearchCandidate};
use crate::record::{DualScore2Rating, MetascoreBlock, RatingRecord};

use super::context::PageContext;
use super::error::{AdapterError, AdapterResult};
use super::settings::PlatformSettings;
use super::{digits_only, field, Platform, PlatformAdapter};

const ROW_SCRIPT: &str = r#"(() => Array.from(document.querySelectorAll('a[data-testid="search-result-item"]')).map(item => {
  const title = item.querySelector('[data-testid="product-title"]');
  const date = item.querySelector('[data-testid="product-release-date"]');
  const year = date ? ((date.textContent.match(/\d{4}/) || [])[0] || '') : '';
  return { title: title ? title.textContent.trim() : '', year, url: item.href };
}))()"#;

const SCORE_SCRIPT: &str = r#"(() => {
  const block = testid => document.querySelector(`[data-testid="${testid}"]`);
  const text = (root, selector) => {
    const node = root ? root.querySelector(selector) : null;
    const value = node ? node.textContent.trim() : '';
    return value.length ? value : null;
  };
  const critic = block('critic-score-info');
  const user = block('user-score-info');
  return {
    metascore: text(critic, '.c-siteReviewScore span'),
    critics_count: text(critic, 'a[href*="critic-reviews"]'),
    userscore: text(user, '.c-siteReviewScore span'),
    users_count: text(user, 'a[href*="user-reviews"]'),
  };
})()"#;

/// Unscored titles show `tbd` in place of a number.
const NOT_YET_SCORED: &str = "tbd";

#[derive(Debug, Default, Deserialize)]
struct ScoreFields {
    metascore: Option<String>,
    critics_count: Option<String>,
    userscore: Option<String>,
    users_count: Option<String>,
}

impl ScoreFields {
    fn into_block(self, season_number: Option<u32>) -> MetascoreBlock {
        MetascoreBlock {
            season_number,
            metascore: field(scored(self.metascore)),
            critics_count: field(digits_only(self.critics_count)),
            userscore: field(scored(self.userscore)),
            users_count: field(digits_only(self.users_count)),
            status: None,
        }
    }
}

fn scored(value: Option<String>) -> Option<String> {
    value.filter(|score| !score.trim().eq_ignore_ascii_case(NOT_YET_SCORED))
}

pub struct MetacriticAdapter {
    settings: PlatformSettings,
}

impl MetacriticAdapter {
    pub fn new(settings: PlatformSettings) -> Self {
        Self { settings }
    }

    async fn read_block(
        &self,
        ctx: &PageContext<'_>,
        url: &str,
        season_number: Option<u32>,
    ) -> AdapterResult<MetascoreBlock> {
        ctx.navigate(url).await?;
        let fields: ScoreFields = ctx.evaluate_as(SCORE_SCRIPT, "metacritic scores").await?;
        Ok(fields.into_block(season_number))
    }
}

#[async_trait]
impl PlatformAdapter for MetacriticAdapter {
    fn platform(&self) -> Platform {
        Platform::Metacritic
    }

    fn settings(&self) -> &PlatformSettings {
        &self.settings
    }

    fn row_script(&self) -> &'static str {
        ROW_SCRIPT
    }

    fn results_selector(&self) -> &'static str {
        "a[data-testid=\"search-result-item\"]"
    }

    async fn extract(
        &self,
        ctx: &PageContext<'_>,
        selected: &[SearchCandidate],
        media: &CanonicalMedia,
    ) -> AdapterResult<RatingRecord> {
        let candidate = selected
            .first()
            .ok_or_else(|| AdapterError::parse("metacritic selection", "no candidate"))?;
        let detail_url = self.settings.detail_url(&candidate.url, None);
        let overall = self.read_block(ctx, &detail_url, None).await?;
        let mut seasons = Vec::new();
        if media.is_tv() {
            for season in &media.seasons {
                let Some(url) = self.settings.season_url(&detail_url, season.season_number) else {
                    break;
                };
                seasons.push(self.read_block(ctx, &url, Some(season.season_number)).await?);
            }
        }
        Ok(RatingRecord::DualScore2(DualScore2Rating {
            overall,
            seasons,
            status: None,
        }))
    }
}
