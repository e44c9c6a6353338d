use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use thiserror::Error;
use tracing::debug;

use crate::model::MediaType;
use crate::platform::Platform;
use crate::record::RatingRecord;

const CACHE_SCHEMA: &str = include_str!("../sql/rating_cache.sql");
const MAX_TTL_SECONDS: u64 = 100 * 365 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to open cache database {path}: {source}")]
    OpenDatabase {
        path: PathBuf,
        source: rusqlite::Error,
    },
    #[error("cache database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("failed to encode cached record: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("cache task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// `rating:{platform}:{type}:{id}`
pub fn cache_key(platform: Platform, media_type: MediaType, tmdb_id: u64) -> String {
    format!("rating:{platform}:{media_type}:{tmdb_id}")
}

/// Side store for finished rating records.
#[async_trait]
pub trait RatingCache: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<RatingRecord>>;
    async fn set(&self, key: &str, record: &RatingRecord) -> CacheResult<()>;
}

/// Process-local cache without expiry.
#[derive(Debug, Default)]
pub struct MemoryRatingCache {
    entries: Mutex<HashMap<String, RatingRecord>>,
}

impl MemoryRatingCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, RatingRecord>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RatingCache for MemoryRatingCache {
    async fn get(&self, key: &str) -> CacheResult<Option<RatingRecord>> {
        Ok(self.entries().get(key).cloned())
    }

    async fn set(&self, key: &str, record: &RatingRecord) -> CacheResult<()> {
        self.entries().insert(key.to_string(), record.clone());
        Ok(())
    }
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;\n\
         PRAGMA synchronous = NORMAL;\n\
         PRAGMA temp_store = MEMORY;\n\
         PRAGMA busy_timeout = 5000;\n",
    )
}

/// SQLite-backed cache. Entries older than the TTL read as misses.
#[derive(Debug, Clone)]
pub struct SqliteRatingCache {
    path: PathBuf,
    flags: OpenFlags,
    ttl: Duration,
}

impl SqliteRatingCache {
    /// Opens (creating if needed) the database at `path` and applies the schema.
    pub fn open(path: impl AsRef<Path>, ttl_seconds: u64) -> CacheResult<Self> {
        let cache = Self {
            path: path.as_ref().to_path_buf(),
            flags: OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
            ttl: Duration::seconds(ttl_seconds.min(MAX_TTL_SECONDS) as i64),
        };
        let conn = cache.connect()?;
        conn.execute_batch(CACHE_SCHEMA)?;
        Ok(cache)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> CacheResult<Connection> {
        let conn = Connection::open_with_flags(&self.path, self.flags).map_err(|source| {
            CacheError::OpenDatabase {
                path: self.path.clone(),
                source,
            }
        })?;
        configure_connection(&conn).map_err(|source| CacheError::OpenDatabase {
            path: self.path.clone(),
            source,
        })?;
        Ok(conn)
    }

    fn read(&self, key: &str, now: DateTime<Utc>) -> CacheResult<Option<RatingRecord>> {
        let conn = self.connect()?;
        let row: Option<(String, DateTime<Utc>)> = conn
            .query_row(
                "SELECT record, stored_at FROM rating_cache WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((payload, stored_at)) = row else {
            return Ok(None);
        };
        if stored_at + self.ttl < now {
            debug!(key, %stored_at, "cached record expired");
            conn.execute("DELETE FROM rating_cache WHERE key = ?1", params![key])?;
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&payload)?))
    }

    fn write(&self, key: &str, record: &RatingRecord, now: DateTime<Utc>) -> CacheResult<()> {
        let payload = serde_json::to_string(record)?;
        let status = record
            .status()
            .map(|status| status.as_str())
            .unwrap_or("unclassified");
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO rating_cache (key, status, record, stored_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET status = excluded.status, record = excluded.record, stored_at = excluded.stored_at",
            params![key, status, payload, now],
        )?;
        Ok(())
    }
}

#[async_trait]
impl RatingCache for SqliteRatingCache {
    async fn get(&self, key: &str) -> CacheResult<Option<RatingRecord>> {
        let cache = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || cache.read(&key, Utc::now())).await?
    }

    async fn set(&self, key: &str, record: &RatingRecord) -> CacheResult<()> {
        let cache = self.clone();
        let key = key.to_string();
        let record = record.clone();
        tokio::task::spawn_blocking(move || cache.write(&key, &record, Utc::now())).await?
    }
}
