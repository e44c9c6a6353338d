use async_trait::async_trait;

use crate::model::{CanonicalMedia, SearchCandidate};
use crate::record::{RatingRecord, SimpleRating};

use super::context::PageContext;
use super::error::{AdapterError, AdapterResult};
use super::settings::PlatformSettings;
use super::{digits_only, field, Platform, PlatformAdapter, RatingPair, JSON_LD_RATING_SCRIPT};

const ROW_SCRIPT: &str = r#"(() => Array.from(document.querySelectorAll('ul.results > li')).map(item => {
  const link = item.querySelector('.film-title-wrapper > a, h2.headline-2 a');
  const year = item.querySelector('.film-title-wrapper small a, small.metadata a');
  const directors = Array.from(item.querySelectorAll('.film-metadata a[href*="/director/"]'))
    .map(node => node.textContent.trim());
  return {
    title: link ? link.textContent.trim() : '',
    year: year ? year.textContent.trim() : '',
    url: link ? link.href : '',
    director: directors.length ? directors.join(', ') : null,
  };
}))()"#;

/// `"Weighted average of 4.22 out of 5"` style meta used when JSON-LD is absent.
const META_RATING: &str = "meta[name=\"twitter:data2\"]";

pub struct LetterboxdAdapter {
    settings: PlatformSettings,
}

impl LetterboxdAdapter {
    pub fn new(settings: PlatformSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl PlatformAdapter for LetterboxdAdapter {
    fn platform(&self) -> Platform {
        Platform::Letterboxd
    }

    fn settings(&self) -> &PlatformSettings {
        &self.settings
    }

    fn row_script(&self) -> &'static str {
        ROW_SCRIPT
    }

    fn results_selector(&self) -> &'static str {
        "ul.results"
    }

    async fn extract(
        &self,
        ctx: &PageContext<'_>,
        selected: &[SearchCandidate],
        _media: &CanonicalMedia,
    ) -> AdapterResult<RatingRecord> {
        let candidate = selected
            .first()
            .ok_or_else(|| AdapterError::parse("letterboxd selection", "no candidate"))?;
        let url = self.settings.detail_url(&candidate.url, None);
        ctx.navigate(&url).await?;
        let mut pair: RatingPair = ctx.evaluate_as(JSON_LD_RATING_SCRIPT, "letterboxd rating").await?;
        if pair.rating.is_none() {
            let script = format!(
                "(() => {{ const node = document.querySelector({selector}); return node ? node.getAttribute('content') : null; }})()",
                selector = serde_json::Value::from(META_RATING)
            );
            let meta: Option<String> = ctx.evaluate_as(&script, "letterboxd meta rating").await?;
            pair.rating = meta.as_deref().and_then(rating_from_meta);
        }
        Ok(RatingRecord::Simple(SimpleRating {
            rating: field(pair.rating),
            rating_count: field(digits_only(pair.count)),
            status: None,
        }))
    }
}

/// First decimal number in the meta description.
fn rating_from_meta(content: &str) -> Option<String> {
    content
        .split_whitespace()
        .find(|token| token.contains('.') && token.parse::<f64>().is_ok())
        .map(str::to_string)
}
