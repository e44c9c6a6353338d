use async_trait::async_trait;
use tracing::debug;

use crate::matching::douban_season_matches;
use crate::model::{CanonicalMedia, MediaType, SearchCandidate};
use crate::record::{RatingRecord, SeasonRating, SeasonedRating, SimpleRating};

use super::context::PageContext;
use super::error::{AdapterError, AdapterResult};
use super::settings::PlatformSettings;
use super::{clean_candidate, digits_only, field, Platform, PlatformAdapter};

const ROW_SCRIPT: &str = r#"(() => Array.from(document.querySelectorAll('.item-root')).map(item => {
  const link = item.querySelector('a.title-text');
  return { title: link ? link.textContent.trim() : '', year: '', url: link ? link.href : '' };
}))()"#;

const RATING: &str = "strong.rating_num";
const VOTES: &str = "span[property=\"v:votes\"]";

pub struct DoubanAdapter {
    settings: PlatformSettings,
}

impl DoubanAdapter {
    pub fn new(settings: PlatformSettings) -> Self {
        Self { settings }
    }

    async fn read_rating(
        &self,
        ctx: &PageContext<'_>,
        url: &str,
    ) -> AdapterResult<(Option<String>, Option<String>)> {
        ctx.navigate(&self.settings.detail_url(url, None)).await?;
        let rating = ctx.text(RATING).await?;
        let votes = digits_only(ctx.text(VOTES).await?);
        Ok((rating, votes))
    }
}

#[async_trait]
impl PlatformAdapter for DoubanAdapter {
    fn platform(&self) -> Platform {
        Platform::Douban
    }

    fn settings(&self) -> &PlatformSettings {
        &self.settings
    }

    fn row_script(&self) -> &'static str {
        ROW_SCRIPT
    }

    fn results_selector(&self) -> &'static str {
        ".item-root"
    }

    fn normalize_candidate(&self, candidate: SearchCandidate) -> Option<SearchCandidate> {
        let mut candidate = clean_candidate(candidate)?;
        candidate.title = localized_segment(&candidate.title).to_string();
        Some(candidate)
    }

    /// Tv keeps one listing per season; movies take the single best match.
    fn select(&self, candidates: &[SearchCandidate], media: &CanonicalMedia) -> Vec<SearchCandidate> {
        match media.media_type {
            MediaType::Movie => crate::matching::best_match(
                media,
                candidates,
                Platform::Douban,
                self.settings.match_threshold,
            )
            .map(|matched| vec![matched.candidate])
            .unwrap_or_default(),
            MediaType::Tv => douban_season_matches(media, candidates)
                .into_iter()
                .map(|(season_number, matched)| SearchCandidate {
                    season_number: Some(season_number),
                    ..matched.candidate
                })
                .collect(),
        }
    }

    async fn extract(
        &self,
        ctx: &PageContext<'_>,
        selected: &[SearchCandidate],
        media: &CanonicalMedia,
    ) -> AdapterResult<RatingRecord> {
        if media.media_type == MediaType::Movie {
            let candidate = selected
                .first()
                .ok_or_else(|| AdapterError::parse("douban selection", "no candidate"))?;
            let (rating, votes) = self.read_rating(ctx, &candidate.url).await?;
            return Ok(RatingRecord::Simple(SimpleRating {
                rating: field(rating),
                rating_count: field(votes),
                status: None,
            }));
        }

        let mut seasons = Vec::with_capacity(selected.len());
        for candidate in selected {
            let season_number = candidate.season_number.unwrap_or(1);
            debug!(season = season_number, url = %candidate.url, "reading douban season");
            let (rating, votes) = self.read_rating(ctx, &candidate.url).await?;
            seasons.push(SeasonRating {
                season_number,
                rating: field(rating),
                rating_count: field(votes),
            });
        }
        Ok(RatingRecord::SeasonedSimple(SeasonedRating {
            seasons,
            status: None,
        }))
    }
}

/// Douban lists `"<localized> <original>"`; keep the localized part. A
/// title that is entirely Latin is returned as is.
fn localized_segment(title: &str) -> &str {
    let title = title.trim();
    if title.is_ascii() {
        return title;
    }
    let mut previous_space = false;
    for (index, ch) in title.char_indices() {
        if previous_space && ch.is_ascii_alphabetic() && !title[..index].trim().is_ascii() {
            return title[..index].trim_end();
        }
        previous_space = ch.is_whitespace();
    }
    title
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SeasonInfo;

    #[test]
    fn localized_part_is_kept() {
        assert_eq!(localized_segment("盗梦空间 Inception"), "盗梦空间");
        assert_eq!(
            localized_segment("绝命毒师 第二季 Breaking Bad Season 2"),
            "绝命毒师 第二季"
        );
        assert_eq!(localized_segment("Heat"), "Heat");
        assert_eq!(localized_segment("蝙蝠侠：黑暗骑士"), "蝙蝠侠：黑暗骑士");
    }

    #[test]
    fn tv_selection_tags_season_numbers() {
        let adapter = DoubanAdapter::new(PlatformSettings::defaults(Platform::Douban));
        let media = CanonicalMedia::tv(
            "Breaking Bad",
            "2008",
            1396,
            vec![
                SeasonInfo {
                    season_number: 1,
                    air_year: "2008".into(),
                    episode_count: 7,
                },
                SeasonInfo {
                    season_number: 2,
                    air_year: "2009".into(),
                    episode_count: 13,
                },
            ],
        )
        .with_localized_title("绝命毒师");
        let rows = vec![
            SearchCandidate::new("绝命毒师 第二季 Breaking Bad Season 2 (2009)", "", "https://movie.douban.com/subject/2/"),
            SearchCandidate::new("绝命毒师 第一季 Breaking Bad Season 1 (2008)", "", "https://movie.douban.com/subject/1/"),
        ];
        let candidates: Vec<_> = rows
            .into_iter()
            .filter_map(|row| adapter.normalize_candidate(row))
            .collect();
        let selected = adapter.select(&candidates, &media);
        let seasons: Vec<_> = selected
            .iter()
            .map(|candidate| (candidate.season_number, candidate.url.as_str()))
            .collect();
        assert_eq!(
            seasons,
            vec![
                (Some(1), "https://movie.douban.com/subject/1/"),
                (Some(2), "https://movie.douban.com/subject/2/"),
            ]
        );
    }
}
