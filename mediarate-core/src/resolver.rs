use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::config::ResolverSection;
use crate::model::{CanonicalMedia, MediaType, SeasonInfo};

const ENGLISH: &str = "en-US";

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("tmdb returned {status_code}: {message}")]
    Api { status_code: u16, message: String },
    #[error("failed to decode tmdb response at {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
    #[error("no movie or series with tmdb id {0}")]
    NotFound(u64),
    #[error("tmdb api key is not configured")]
    MissingApiKey,
}

pub type ResolverResult<T> = std::result::Result<T, ResolverError>;

/// Turns an external id into the canonical record used for matching.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve(&self, tmdb_id: u64) -> ResolverResult<CanonicalMedia>;
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CrewMember {
    #[serde(default)]
    name: String,
    #[serde(default)]
    job: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Credits {
    #[serde(default)]
    crew: Vec<CrewMember>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ExternalIds {
    imdb_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Creator {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct MovieDetail {
    id: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    original_title: String,
    release_date: Option<String>,
    imdb_id: Option<String>,
    #[serde(default)]
    credits: Credits,
}

#[derive(Debug, Clone, Deserialize)]
struct TvSeason {
    season_number: i64,
    air_date: Option<String>,
    #[serde(default)]
    episode_count: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct TvDetail {
    id: u64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    original_name: String,
    first_air_date: Option<String>,
    #[serde(default)]
    created_by: Vec<Creator>,
    #[serde(default)]
    seasons: Vec<TvSeason>,
    #[serde(default)]
    external_ids: ExternalIds,
    #[serde(default)]
    credits: Credits,
}

/// TMDB-backed resolver. Sequential calls are spaced by a fixed interval.
#[derive(Debug)]
pub struct TmdbResolver {
    client: Client,
    base_url: String,
    api_key: String,
    language: String,
    pacing: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl TmdbResolver {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            language: "zh-CN".to_string(),
            pacing: Duration::from_millis(250),
            last_call: Mutex::new(None),
        }
    }

    pub fn from_config(config: &ResolverSection) -> ResolverResult<Self> {
        let api_key = config.api_key().ok_or(ResolverError::MissingApiKey)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self::new(client, config.base_url.clone(), api_key)
            .with_language(config.language.clone())
            .with_pacing(Duration::from_millis(config.pacing_ms)))
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    async fn pace(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let ready_at = previous + self.pacing;
            let now = Instant::now();
            if ready_at > now {
                sleep(ready_at - now).await;
            }
        }
        *last_call = Some(Instant::now());
    }

    /// `Ok(None)` on 404.
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        language: &str,
        append: &str,
    ) -> ResolverResult<Option<T>> {
        self.pace().await;
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, language, "tmdb request");
        let response = self
            .client
            .get(&url)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("language", language),
                ("append_to_response", append),
            ])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        handle_response(response).await.map(Some)
    }

    async fn resolve_movie(&self, tmdb_id: u64) -> ResolverResult<Option<CanonicalMedia>> {
        let path = format!("/movie/{tmdb_id}");
        let Some(localized) = self.get::<MovieDetail>(&path, &self.language, "credits").await? else {
            return Ok(None);
        };
        let english = if self.language == ENGLISH {
            None
        } else {
            self.get::<MovieDetail>(&path, ENGLISH, "").await?
        };
        Ok(Some(movie_media(localized, english)))
    }

    async fn resolve_tv(&self, tmdb_id: u64) -> ResolverResult<Option<CanonicalMedia>> {
        let path = format!("/tv/{tmdb_id}");
        let Some(localized) = self
            .get::<TvDetail>(&path, &self.language, "credits,external_ids")
            .await?
        else {
            return Ok(None);
        };
        let english = if self.language == ENGLISH {
            None
        } else {
            self.get::<TvDetail>(&path, ENGLISH, "").await?
        };
        Ok(Some(tv_media(localized, english)))
    }
}

#[async_trait]
impl MediaResolver for TmdbResolver {
    /// Tries the id as a movie first, then as a series.
    async fn resolve(&self, tmdb_id: u64) -> ResolverResult<CanonicalMedia> {
        if let Some(media) = self.resolve_movie(tmdb_id).await? {
            info!(tmdb_id, title = %media.title, "resolved movie");
            return Ok(media);
        }
        if let Some(media) = self.resolve_tv(tmdb_id).await? {
            info!(tmdb_id, title = %media.title, seasons = media.seasons.len(), "resolved series");
            return Ok(media);
        }
        Err(ResolverError::NotFound(tmdb_id))
    }
}

async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> ResolverResult<T> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ResolverError::Api {
            status_code: status.as_u16(),
            message: body,
        });
    }
    decode(&body)
}

fn decode<T: DeserializeOwned>(body: &str) -> ResolverResult<T> {
    let deserializer = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(deserializer).map_err(|err| ResolverError::Json {
        path: err.path().to_string(),
        source: err.into_inner(),
    })
}

fn year_of(date: Option<&str>) -> String {
    date.map(str::trim)
        .filter(|date| date.len() >= 4 && date.is_char_boundary(4))
        .map(|date| date[..4].to_string())
        .filter(|year| year.chars().all(|ch| ch.is_ascii_digit()))
        .unwrap_or_default()
}

fn directors(credits: &Credits) -> String {
    let mut names: Vec<&str> = Vec::new();
    for member in credits.crew.iter().filter(|member| member.job == "Director") {
        let name = member.name.trim();
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names.join(", ")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn movie_media(localized: MovieDetail, english: Option<MovieDetail>) -> CanonicalMedia {
    let title = english
        .as_ref()
        .map(|detail| detail.title.trim().to_string())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| localized.title.trim().to_string());
    CanonicalMedia {
        media_type: MediaType::Movie,
        title,
        original_title: localized.original_title.trim().to_string(),
        localized_title: localized.title.trim().to_string(),
        year: year_of(localized.release_date.as_deref()),
        director: directors(&localized.credits),
        imdb_id: non_empty(localized.imdb_id),
        tmdb_id: localized.id,
        seasons: Vec::new(),
    }
}

fn tv_media(localized: TvDetail, english: Option<TvDetail>) -> CanonicalMedia {
    let title = english
        .as_ref()
        .map(|detail| detail.name.trim().to_string())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| localized.name.trim().to_string());
    let mut director = directors(&localized.credits);
    if director.is_empty() {
        director = localized
            .created_by
            .iter()
            .map(|creator| creator.name.trim())
            .filter(|name| !name.is_empty())
            .collect::<Vec<_>>()
            .join(", ");
    }
    let seasons = localized
        .seasons
        .iter()
        .filter(|season| season.season_number >= 1)
        .map(|season| SeasonInfo {
            season_number: season.season_number as u32,
            air_year: year_of(season.air_date.as_deref()),
            episode_count: season.episode_count,
        })
        .collect();
    CanonicalMedia {
        media_type: MediaType::Tv,
        title,
        original_title: localized.original_name.trim().to_string(),
        localized_title: localized.name.trim().to_string(),
        year: year_of(localized.first_air_date.as_deref()),
        director,
        imdb_id: non_empty(localized.external_ids.imdb_id),
        tmdb_id: localized.id,
        seasons,
    }
}
