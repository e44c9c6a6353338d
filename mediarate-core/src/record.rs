use std::fmt;

use serde::{Deserialize, Serialize};

/// Placeholder for any rating field that could not be obtained.
pub const UNAVAILABLE: &str = "unavailable";

pub fn unavailable() -> String {
    UNAVAILABLE.to_string()
}

pub fn is_unavailable(value: &str) -> bool {
    value == UNAVAILABLE
}

/// Normalizes a scraped value: blanks and missing values become the sentinel.
pub fn field_or_unavailable(value: Option<String>) -> String {
    match value {
        Some(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                unavailable()
            } else {
                trimmed.to_string()
            }
        }
        None => unavailable(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Successful,
    NoFound,
    NoRating,
    FetchFailed,
    RateLimit,
    Timeout,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Successful => "successful",
            RequestStatus::NoFound => "no_found",
            RequestStatus::NoRating => "no_rating",
            RequestStatus::FetchFailed => "fetch_failed",
            RequestStatus::RateLimit => "rate_limit",
            RequestStatus::Timeout => "timeout",
            RequestStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RatingShape {
    Simple,
    SeasonedSimple,
    DualScore,
    DualScore2,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleRating {
    pub rating: String,
    pub rating_count: String,
    pub status: Option<RequestStatus>,
}

impl Default for SimpleRating {
    fn default() -> Self {
        Self {
            rating: unavailable(),
            rating_count: unavailable(),
            status: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonRating {
    pub season_number: u32,
    pub rating: String,
    pub rating_count: String,
}

impl SeasonRating {
    pub fn unavailable(season_number: u32) -> Self {
        Self {
            season_number,
            rating: unavailable(),
            rating_count: unavailable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SeasonedRating {
    pub seasons: Vec<SeasonRating>,
    pub status: Option<RequestStatus>,
}

/// Critics/audience block used for both the series and each season.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualScoreBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season_number: Option<u32>,
    pub tomatometer: String,
    pub audience_score: String,
    pub critics_avg: String,
    pub audience_avg: String,
    pub critics_count: String,
    pub audience_count: String,
    pub status: Option<RequestStatus>,
}

impl DualScoreBlock {
    pub fn unavailable(season_number: Option<u32>) -> Self {
        Self {
            season_number,
            tomatometer: unavailable(),
            audience_score: unavailable(),
            critics_avg: unavailable(),
            audience_avg: unavailable(),
            critics_count: unavailable(),
            audience_count: unavailable(),
            status: None,
        }
    }

    pub fn fields(&self) -> [&str; 6] {
        [
            self.tomatometer.as_str(),
            self.audience_score.as_str(),
            self.critics_avg.as_str(),
            self.audience_avg.as_str(),
            self.critics_count.as_str(),
            self.audience_count.as_str(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualScoreRating {
    pub series: DualScoreBlock,
    pub seasons: Vec<DualScoreBlock>,
    pub status: Option<RequestStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetascoreBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season_number: Option<u32>,
    pub metascore: String,
    pub critics_count: String,
    pub userscore: String,
    pub users_count: String,
    pub status: Option<RequestStatus>,
}

impl MetascoreBlock {
    pub fn unavailable(season_number: Option<u32>) -> Self {
        Self {
            season_number,
            metascore: unavailable(),
            critics_count: unavailable(),
            userscore: unavailable(),
            users_count: unavailable(),
            status: None,
        }
    }

    pub fn fields(&self) -> [&str; 4] {
        [
            self.metascore.as_str(),
            self.critics_count.as_str(),
            self.userscore.as_str(),
            self.users_count.as_str(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualScore2Rating {
    pub overall: MetascoreBlock,
    pub seasons: Vec<MetascoreBlock>,
    pub status: Option<RequestStatus>,
}

/// Platform-shaped rating output. Every field that looks numeric is a string
/// and missing values are always [`UNAVAILABLE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum RatingRecord {
    Simple(SimpleRating),
    SeasonedSimple(SeasonedRating),
    DualScore(DualScoreRating),
    DualScore2(DualScore2Rating),
}

impl RatingRecord {
    /// A record of the given shape with every field set to the sentinel and
    /// the status already decided.
    pub fn with_status(shape: RatingShape, status: RequestStatus) -> Self {
        let record = match shape {
            RatingShape::Simple => RatingRecord::Simple(SimpleRating::default()),
            RatingShape::SeasonedSimple => RatingRecord::SeasonedSimple(SeasonedRating::default()),
            RatingShape::DualScore => RatingRecord::DualScore(DualScoreRating {
                series: DualScoreBlock::unavailable(None),
                seasons: Vec::new(),
                status: None,
            }),
            RatingShape::DualScore2 => RatingRecord::DualScore2(DualScore2Rating {
                overall: MetascoreBlock::unavailable(None),
                seasons: Vec::new(),
                status: None,
            }),
        };
        record.stamped(status)
    }

    pub fn shape(&self) -> RatingShape {
        match self {
            RatingRecord::Simple(_) => RatingShape::Simple,
            RatingRecord::SeasonedSimple(_) => RatingShape::SeasonedSimple,
            RatingRecord::DualScore(_) => RatingShape::DualScore,
            RatingRecord::DualScore2(_) => RatingShape::DualScore2,
        }
    }

    pub fn status(&self) -> Option<RequestStatus> {
        match self {
            RatingRecord::Simple(record) => record.status,
            RatingRecord::SeasonedSimple(record) => record.status,
            RatingRecord::DualScore(record) => record.status,
            RatingRecord::DualScore2(record) => record.status,
        }
    }

    /// Copy of this record with `status` written on the top level and on
    /// every sub-section.
    pub fn stamped(&self, status: RequestStatus) -> Self {
        let mut record = self.clone();
        match &mut record {
            RatingRecord::Simple(simple) => simple.status = Some(status),
            RatingRecord::SeasonedSimple(seasoned) => seasoned.status = Some(status),
            RatingRecord::DualScore(dual) => {
                dual.status = Some(status);
                dual.series.status = Some(status);
                for season in &mut dual.seasons {
                    season.status = Some(status);
                }
            }
            RatingRecord::DualScore2(dual) => {
                dual.status = Some(status);
                dual.overall.status = Some(status);
                for season in &mut dual.seasons {
                    season.status = Some(status);
                }
            }
        }
        record
    }

    /// Every rating field in the record, for sentinel checks.
    pub fn field_values(&self) -> Vec<&str> {
        match self {
            RatingRecord::Simple(simple) => vec![simple.rating.as_str(), simple.rating_count.as_str()],
            RatingRecord::SeasonedSimple(seasoned) => seasoned
                .seasons
                .iter()
                .flat_map(|season| [season.rating.as_str(), season.rating_count.as_str()])
                .collect(),
            RatingRecord::DualScore(dual) => std::iter::once(&dual.series)
                .chain(dual.seasons.iter())
                .flat_map(|block| block.fields())
                .collect(),
            RatingRecord::DualScore2(dual) => std::iter::once(&dual.overall)
                .chain(dual.seasons.iter())
                .flat_map(|block| block.fields())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_collapse_to_sentinel() {
        assert_eq!(field_or_unavailable(None), UNAVAILABLE);
        assert_eq!(field_or_unavailable(Some("   ".into())), UNAVAILABLE);
        assert_eq!(field_or_unavailable(Some(" 8.8 ".into())), "8.8");
    }

    #[test]
    fn stamping_reaches_every_section() {
        let record = RatingRecord::DualScore(DualScoreRating {
            series: DualScoreBlock::unavailable(None),
            seasons: vec![
                DualScoreBlock::unavailable(Some(1)),
                DualScoreBlock::unavailable(Some(2)),
            ],
            status: None,
        });
        let stamped = record.stamped(RequestStatus::Timeout);
        match stamped {
            RatingRecord::DualScore(dual) => {
                assert_eq!(dual.status, Some(RequestStatus::Timeout));
                assert_eq!(dual.series.status, Some(RequestStatus::Timeout));
                assert!(dual
                    .seasons
                    .iter()
                    .all(|season| season.status == Some(RequestStatus::Timeout)));
            }
            other => panic!("unexpected shape {other:?}"),
        }
        assert_eq!(record.status(), None);
    }

    #[test]
    fn failed_records_hold_only_sentinels() {
        for shape in [
            RatingShape::Simple,
            RatingShape::SeasonedSimple,
            RatingShape::DualScore,
            RatingShape::DualScore2,
        ] {
            let record = RatingRecord::with_status(shape, RequestStatus::RateLimit);
            assert_eq!(record.shape(), shape);
            assert_eq!(record.status(), Some(RequestStatus::RateLimit));
            assert!(record.field_values().iter().all(|value| is_unavailable(value)));
        }
    }

    #[test]
    fn records_serialize_with_shape_tag() {
        let record = RatingRecord::Simple(SimpleRating {
            rating: "8.8".into(),
            rating_count: "2500000".into(),
            status: Some(RequestStatus::Successful),
        });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["shape"], "simple");
        assert_eq!(json["status"], "successful");
        let back: RatingRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
