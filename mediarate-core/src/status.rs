use crate::record::{is_unavailable, RatingRecord, RequestStatus};

/// Status for one group of extracted fields: all sentinel is `NoRating`,
/// all present is `Successful`, anything in between is `FetchFailed`.
pub fn classify_fields<'a, I>(fields: I) -> RequestStatus
where
    I: IntoIterator<Item = &'a str>,
{
    let mut present = 0usize;
    let mut missing = 0usize;
    for field in fields {
        if is_unavailable(field) {
            missing += 1;
        } else {
            present += 1;
        }
    }
    match (present, missing) {
        (0, _) => RequestStatus::NoRating,
        (_, 0) => RequestStatus::Successful,
        _ => RequestStatus::FetchFailed,
    }
}

/// Returns a new record with statuses filled in. A status decided earlier in
/// the pipeline is kept as is. Multi-section records get a status per block,
/// and the top level is `Successful` only when every block is.
pub fn classify(record: &RatingRecord) -> RatingRecord {
    if record.status().is_some() {
        return record.clone();
    }
    let mut classified = record.clone();
    match &mut classified {
        RatingRecord::Simple(simple) => {
            simple.status = Some(classify_fields([
                simple.rating.as_str(),
                simple.rating_count.as_str(),
            ]));
        }
        RatingRecord::SeasonedSimple(seasoned) => {
            seasoned.status = Some(classify_fields(
                seasoned
                    .seasons
                    .iter()
                    .flat_map(|season| [season.rating.as_str(), season.rating_count.as_str()]),
            ));
        }
        RatingRecord::DualScore(dual) => {
            dual.series.status = Some(classify_fields(dual.series.fields()));
            for season in &mut dual.seasons {
                season.status = Some(classify_fields(season.fields()));
            }
            dual.status = Some(classify_fields(
                std::iter::once(&dual.series)
                    .chain(dual.seasons.iter())
                    .flat_map(|block| block.fields()),
            ));
        }
        RatingRecord::DualScore2(dual) => {
            dual.overall.status = Some(classify_fields(dual.overall.fields()));
            for season in &mut dual.seasons {
                season.status = Some(classify_fields(season.fields()));
            }
            dual.status = Some(classify_fields(
                std::iter::once(&dual.overall)
                    .chain(dual.seasons.iter())
                    .flat_map(|block| block.fields()),
            ));
        }
    }
    classified
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{
        DualScore2Rating, DualScoreBlock, DualScoreRating, MetascoreBlock, RatingShape,
        SeasonRating, SeasonedRating, SimpleRating,
    };

    fn simple(rating: &str, count: &str) -> RatingRecord {
        RatingRecord::Simple(SimpleRating {
            rating: rating.into(),
            rating_count: count.into(),
            status: None,
        })
    }

    fn filled_block(season_number: Option<u32>) -> DualScoreBlock {
        DualScoreBlock {
            season_number,
            tomatometer: "87%".into(),
            audience_score: "91%".into(),
            critics_avg: "7.9/10".into(),
            audience_avg: "4.5/5".into(),
            critics_count: "361".into(),
            audience_count: "250000".into(),
            status: None,
        }
    }

    #[test]
    fn simple_records_follow_field_presence() {
        assert_eq!(
            classify(&simple("8.8", "2600000")).status(),
            Some(RequestStatus::Successful)
        );
        assert_eq!(
            classify(&simple("unavailable", "unavailable")).status(),
            Some(RequestStatus::NoRating)
        );
        assert_eq!(
            classify(&simple("8.8", "unavailable")).status(),
            Some(RequestStatus::FetchFailed)
        );
    }

    #[test]
    fn classification_is_idempotent() {
        let record = simple("8.8", "2600000");
        let once = classify(&record);
        let twice = classify(&once);
        assert_eq!(once, twice);
        assert_eq!(classify(&record).status(), once.status());
    }

    #[test]
    fn upstream_status_is_never_overwritten() {
        let record = RatingRecord::with_status(RatingShape::DualScore, RequestStatus::Cancelled);
        assert_eq!(classify(&record), record);
        let limited = simple("8.8", "10").stamped(RequestStatus::RateLimit);
        assert_eq!(classify(&limited).status(), Some(RequestStatus::RateLimit));
    }

    #[test]
    fn tv_needs_every_block_present() {
        let mut partial_season = filled_block(Some(2));
        partial_season.audience_avg = "unavailable".into();
        let record = RatingRecord::DualScore(DualScoreRating {
            series: filled_block(None),
            seasons: vec![filled_block(Some(1)), partial_season],
            status: None,
        });
        let classified = classify(&record);
        let RatingRecord::DualScore(dual) = &classified else {
            panic!("shape changed");
        };
        assert_eq!(dual.status, Some(RequestStatus::FetchFailed));
        assert_eq!(dual.series.status, Some(RequestStatus::Successful));
        assert_eq!(dual.seasons[0].status, Some(RequestStatus::Successful));
        assert_eq!(dual.seasons[1].status, Some(RequestStatus::FetchFailed));
        assert_eq!(record.status(), None);
    }

    #[test]
    fn empty_metascore_blocks_mean_no_rating() {
        let record = RatingRecord::DualScore2(DualScore2Rating {
            overall: MetascoreBlock::unavailable(None),
            seasons: vec![MetascoreBlock::unavailable(Some(1))],
            status: None,
        });
        assert_eq!(classify(&record).status(), Some(RequestStatus::NoRating));
    }

    #[test]
    fn douban_seasons_are_classified_together() {
        let record = RatingRecord::SeasonedSimple(SeasonedRating {
            seasons: vec![
                SeasonRating {
                    season_number: 1,
                    rating: "9.3".into(),
                    rating_count: "50000".into(),
                },
                SeasonRating::unavailable(2),
            ],
            status: None,
        });
        assert_eq!(classify(&record).status(), Some(RequestStatus::FetchFailed));
    }
}
