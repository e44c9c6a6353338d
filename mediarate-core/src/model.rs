use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Movie,
    Tv,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonInfo {
    pub season_number: u32,
    pub air_year: String,
    pub episode_count: u32,
}

/// Normalized description of a title, used as ground truth when matching
/// search results on every platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalMedia {
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub title: String,
    pub original_title: String,
    pub localized_title: String,
    pub year: String,
    pub director: String,
    pub imdb_id: Option<String>,
    pub tmdb_id: u64,
    #[serde(default)]
    pub seasons: Vec<SeasonInfo>,
}

impl CanonicalMedia {
    pub fn movie(title: impl Into<String>, year: impl Into<String>, tmdb_id: u64) -> Self {
        let title = title.into();
        Self {
            media_type: MediaType::Movie,
            original_title: title.clone(),
            localized_title: title.clone(),
            title,
            year: year.into(),
            director: String::new(),
            imdb_id: None,
            tmdb_id,
            seasons: Vec::new(),
        }
    }

    pub fn tv(
        title: impl Into<String>,
        year: impl Into<String>,
        tmdb_id: u64,
        seasons: Vec<SeasonInfo>,
    ) -> Self {
        Self {
            media_type: MediaType::Tv,
            seasons,
            ..Self::movie(title, year, tmdb_id)
        }
    }

    pub fn with_imdb_id(mut self, imdb_id: impl Into<String>) -> Self {
        self.imdb_id = Some(imdb_id.into());
        self
    }

    pub fn with_localized_title(mut self, localized: impl Into<String>) -> Self {
        self.localized_title = localized.into();
        self
    }

    pub fn with_original_title(mut self, original: impl Into<String>) -> Self {
        self.original_title = original.into();
        self
    }

    pub fn is_tv(&self) -> bool {
        self.media_type == MediaType::Tv
    }

    /// Titles worth comparing against, deduplicated and without blanks.
    pub fn title_variants(&self, include_localized: bool) -> Vec<&str> {
        let mut sources = vec![self.title.as_str(), self.original_title.as_str()];
        if include_localized {
            sources.push(self.localized_title.as_str());
        }
        let mut variants: Vec<&str> = Vec::with_capacity(sources.len());
        for value in sources {
            let trimmed = value.trim();
            if !trimmed.is_empty() && !variants.contains(&trimmed) {
                variants.push(trimmed);
            }
        }
        variants
    }

    pub fn season(&self, number: u32) -> Option<&SeasonInfo> {
        self.seasons.iter().find(|season| season.season_number == number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SearchCandidate {
    pub title: String,
    #[serde(default)]
    pub year: String,
    pub url: String,
    #[serde(default)]
    pub season_number: Option<u32>,
    #[serde(default)]
    pub imdb_id: Option<String>,
    #[serde(default)]
    pub director: Option<String>,
}

impl SearchCandidate {
    pub fn new(title: impl Into<String>, year: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            year: year.into(),
            url: url.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchScore {
    pub score: u8,
    pub candidate: SearchCandidate,
}
