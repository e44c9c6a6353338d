use tracing::{debug, info, warn};

use crate::cancel::CancellationSignal;
use crate::model::CanonicalMedia;
use crate::record::{RatingRecord, RequestStatus};
use crate::status::classify;

use super::context::PageContext;
use super::error::AdapterResult;
use super::{Platform, PlatformAdapter};

/// Search, match and extract for one platform, in that order. A search
/// that accepts nothing yields a `NoFound` record rather than an error.
pub async fn scrape(
    adapter: &dyn PlatformAdapter,
    ctx: &PageContext<'_>,
    media: &CanonicalMedia,
) -> AdapterResult<RatingRecord> {
    let platform = adapter.platform();
    ctx.checkpoint()?;
    let candidates = match adapter.known_candidate(media) {
        Some(candidate) => {
            debug!(%platform, url = %candidate.url, "using known candidate");
            vec![candidate]
        }
        None => adapter.search(ctx, media).await?,
    };
    ctx.checkpoint()?;
    let selected = adapter.select(&candidates, media);
    debug!(
        %platform,
        candidates = candidates.len(),
        accepted = selected.len(),
        "candidates scored"
    );
    if selected.is_empty() {
        return Ok(RatingRecord::with_status(
            platform.shape(media.media_type),
            RequestStatus::NoFound,
        ));
    }
    adapter.extract(ctx, &selected, media).await
}

/// Turns a pipeline outcome into the final record. Errors become their
/// status, a cancelled run is never classified, everything else goes
/// through the classifier.
pub fn finalize(
    platform: Platform,
    media: &CanonicalMedia,
    outcome: AdapterResult<RatingRecord>,
    signal: &dyn CancellationSignal,
) -> RatingRecord {
    let shape = platform.shape(media.media_type);
    let record = match outcome {
        Ok(_) if signal.is_cancelled() => {
            RatingRecord::with_status(shape, RequestStatus::Cancelled)
        }
        Ok(record) => classify(&record),
        Err(err) => {
            let status = err.status();
            match status {
                RequestStatus::Cancelled => debug!(%platform, "platform request cancelled"),
                _ => warn!(
                    %platform,
                    tmdb_id = media.tmdb_id,
                    status = %status,
                    error = %err,
                    "platform request failed"
                ),
            }
            RatingRecord::with_status(shape, status)
        }
    };
    if let Some(status) = record.status() {
        if status != RequestStatus::Cancelled {
            info!(%platform, tmdb_id = media.tmdb_id, %status, "platform finished");
        }
    }
    record
}
