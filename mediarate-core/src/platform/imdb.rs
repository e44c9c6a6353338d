use async_trait::async_trait;
use tracing::debug;

use crate::model::{CanonicalMedia, SearchCandidate};
use crate::record::{RatingRecord, SimpleRating};

use super::context::PageContext;
use super::error::{AdapterError, AdapterResult};
use super::settings::PlatformSettings;
use super::{digits_only, field, Platform, PlatformAdapter, RatingPair, JSON_LD_RATING_SCRIPT};

const ROW_SCRIPT: &str = r#"(() => Array.from(document.querySelectorAll('li.ipc-metadata-list-summary-item')).map(item => {
  const link = item.querySelector('a.ipc-metadata-list-summary-item__t');
  const href = link ? link.href : '';
  const id = (href.match(/\/title\/(tt\d+)/) || [])[1] || null;
  const meta = Array.from(item.querySelectorAll('.ipc-metadata-list-summary-item__li')).map(node => node.textContent.trim());
  const year = (meta.find(text => /^\d{4}/.test(text)) || '').slice(0, 4);
  return { title: link ? link.textContent.trim() : '', year, url: href, imdb_id: id };
}))()"#;

const SCORE_FALLBACK: &str = "[data-testid=\"hero-rating-bar__aggregate-rating__score\"] span";

pub struct ImdbAdapter {
    settings: PlatformSettings,
}

impl ImdbAdapter {
    pub fn new(settings: PlatformSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl PlatformAdapter for ImdbAdapter {
    fn platform(&self) -> Platform {
        Platform::Imdb
    }

    fn settings(&self) -> &PlatformSettings {
        &self.settings
    }

    fn row_script(&self) -> &'static str {
        ROW_SCRIPT
    }

    fn results_selector(&self) -> &'static str {
        "li.ipc-metadata-list-summary-item"
    }

    /// With an imdb id on the canonical record the search page is skipped.
    fn known_candidate(&self, media: &CanonicalMedia) -> Option<SearchCandidate> {
        let imdb_id = media.imdb_id.as_deref().map(str::trim).filter(|id| !id.is_empty())?;
        let mut candidate = SearchCandidate::new(
            media.title.clone(),
            media.year.clone(),
            self.settings.detail_url("", Some(imdb_id)),
        );
        candidate.imdb_id = Some(imdb_id.to_string());
        candidate.director = Some(media.director.trim().to_string()).filter(|name| !name.is_empty());
        Some(candidate)
    }

    async fn extract(
        &self,
        ctx: &PageContext<'_>,
        selected: &[SearchCandidate],
        _media: &CanonicalMedia,
    ) -> AdapterResult<RatingRecord> {
        let candidate = selected
            .first()
            .ok_or_else(|| AdapterError::parse("imdb selection", "no candidate"))?;
        let url = self
            .settings
            .detail_url(&candidate.url, candidate.imdb_id.as_deref());
        ctx.navigate(&url).await?;
        let mut pair: RatingPair = ctx.evaluate_as(JSON_LD_RATING_SCRIPT, "imdb rating").await?;
        if pair.rating.is_none() {
            debug!(url = %url, "json-ld rating missing, trying hero score");
            pair.rating = ctx.text(SCORE_FALLBACK).await?;
        }
        Ok(simple_rating(pair))
    }
}

fn simple_rating(pair: RatingPair) -> RatingRecord {
    RatingRecord::Simple(SimpleRating {
        rating: field(pair.rating),
        rating_count: field(digits_only(pair.count)),
        status: None,
    })
}
