//! Result cache: resolved nutrition keyed by namespace + normalized query.
//!
//! Two implementations: an in-process map for tests and short-lived use, and
//! a SQLite store with expiry, hit counting and maintenance helpers.

use async_trait::async_trait;
use fs2::FileExt;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::resolve::ResolutionResult;
use crate::scoring::normalize_text;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultCacheKey {
    pub namespace: String,
    pub normalized_query: String,
    pub key_hash: String,
}

impl ResultCacheKey {
    pub fn new(namespace: &str, query: &str) -> Self {
        let normalized_query = normalize_text(query);
        let key_hash = hash_fields(&[namespace, &normalized_query]);
        Self {
            namespace: namespace.to_string(),
            normalized_query,
            key_hash,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache lock poisoned")]
    Poisoned,
    #[error("task join error: {0}")]
    Join(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

#[async_trait]
pub trait ResultCache: Send + Sync {
    /// A live (unexpired) entry, if any.
    async fn get(&self, key: &ResultCacheKey) -> Result<Option<ResolutionResult>, CacheError>;
    async fn set(
        &self,
        key: &ResultCacheKey,
        value: &ResolutionResult,
        ttl: Duration,
    ) -> Result<(), CacheError>;
}

// =============================================================================
// In-memory
// =============================================================================

#[derive(Debug, Default)]
pub struct MemoryResultCache {
    entries: Mutex<HashMap<String, (ResolutionResult, Instant)>>,
}

impl MemoryResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResultCache for MemoryResultCache {
    async fn get(&self, key: &ResultCacheKey) -> Result<Option<ResolutionResult>, CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        let live = entries
            .get(&key.key_hash)
            .filter(|(_, expires_at)| Instant::now() < *expires_at)
            .map(|(value, _)| value.clone());
        if live.is_none() {
            entries.remove(&key.key_hash);
        }
        Ok(live)
    }

    async fn set(
        &self,
        key: &ResultCacheKey,
        value: &ResolutionResult,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        entries.retain(|_, (_, expires_at)| now < *expires_at);
        entries.insert(key.key_hash.clone(), (value.clone(), now + ttl));
        Ok(())
    }
}

// =============================================================================
// SQLite
// =============================================================================

#[derive(Clone)]
pub struct SqliteResultCache {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteResultCache {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; \
             PRAGMA synchronous=NORMAL; \
             CREATE TABLE IF NOT EXISTS resolution_cache ( \
               key_hash TEXT PRIMARY KEY, \
               namespace TEXT NOT NULL, \
               query TEXT NOT NULL, \
               source TEXT NOT NULL, \
               confidence REAL NOT NULL, \
               result_json TEXT NOT NULL, \
               created_at INTEGER NOT NULL, \
               updated_at INTEGER NOT NULL, \
               expires_at INTEGER NOT NULL, \
               hit_count INTEGER NOT NULL DEFAULT 0 \
             ); \
             CREATE INDEX IF NOT EXISTS resolution_cache_expires ON resolution_cache(expires_at);",
        )?;

        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("NUTRI_CACHE_PATH") {
            return PathBuf::from(path);
        }
        PathBuf::from(".nutri_resolution_cache.sqlite")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_exclusive(&self) -> Result<CacheLock, CacheError> {
        CacheLock::new(&self.path)
    }

    fn with_conn<F, R>(&self, f: F) -> Result<R, CacheError>
    where
        F: FnOnce(&Connection) -> Result<R, CacheError>,
    {
        let guard = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        f(&guard)
    }
}

#[async_trait]
impl ResultCache for SqliteResultCache {
    async fn get(&self, key: &ResultCacheKey) -> Result<Option<ResolutionResult>, CacheError> {
        let key_hash = key.key_hash.clone();
        let conn = self.clone();
        tokio::task::spawn_blocking(move || {
            conn.with_conn(|conn| {
                let now = now_epoch();
                let mut stmt = conn.prepare(
                    "SELECT result_json FROM resolution_cache \
                     WHERE key_hash = ?1 AND expires_at > ?2",
                )?;
                let mut rows = stmt.query(params![key_hash, now])?;
                let Some(row) = rows.next()? else {
                    return Ok(None);
                };
                let raw: String = row.get(0)?;
                let result: ResolutionResult =
                    serde_json::from_str(&raw).map_err(|e| CacheError::Serde(e.to_string()))?;
                conn.execute(
                    "UPDATE resolution_cache \
                     SET hit_count = hit_count + 1, updated_at = ?1 \
                     WHERE key_hash = ?2",
                    params![now, key_hash],
                )?;
                Ok(Some(result))
            })
        })
        .await
        .map_err(|e| CacheError::Join(e.to_string()))?
    }

    async fn set(
        &self,
        key: &ResultCacheKey,
        value: &ResolutionResult,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let key = key.clone();
        let raw = serde_json::to_string(value).map_err(|e| CacheError::Serde(e.to_string()))?;
        let source = value.source.as_str();
        let confidence = value.confidence;
        let conn = self.clone();
        tokio::task::spawn_blocking(move || {
            conn.with_conn(|conn| {
                let now = now_epoch();
                let expires_at = now.saturating_add(ttl.as_secs().min(i64::MAX as u64) as i64);
                conn.execute(
                    "INSERT INTO resolution_cache ( \
                        key_hash, namespace, query, source, confidence, result_json, \
                        created_at, updated_at, expires_at \
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
                     ON CONFLICT(key_hash) DO UPDATE SET \
                        source = excluded.source, \
                        confidence = excluded.confidence, \
                        result_json = excluded.result_json, \
                        updated_at = excluded.updated_at, \
                        expires_at = excluded.expires_at",
                    params![
                        key.key_hash,
                        key.namespace,
                        key.normalized_query,
                        source,
                        confidence,
                        raw,
                        now,
                        now,
                        expires_at,
                    ],
                )?;
                Ok(())
            })
        })
        .await
        .map_err(|e| CacheError::Join(e.to_string()))?
    }
}

#[derive(Debug)]
pub struct CacheLock {
    _file: std::fs::File,
}

impl CacheLock {
    fn new(db_path: &Path) -> Result<Self, CacheError> {
        let mut lock_path = db_path.to_path_buf();
        lock_path.set_extension("lock");
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(lock_path)?;
        file.lock_exclusive()?;
        Ok(Self { _file: file })
    }
}

#[derive(Debug, Serialize)]
pub struct CacheExportRow {
    pub key_hash: String,
    pub namespace: String,
    pub query: String,
    pub source: String,
    pub confidence: f64,
    pub result: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
    pub expires_at: i64,
    pub hit_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CachePruneStats {
    pub deleted: usize,
    pub remaining: usize,
}

/// What [`SqliteResultCache::prune`] removes. Rules combine.
#[derive(Debug, Clone, Copy, Default)]
pub struct PruneOptions {
    pub expired: bool,
    pub max_age_days: Option<u64>,
    pub max_rows: Option<usize>,
}

impl SqliteResultCache {
    pub async fn export_jsonl(&self, path: impl AsRef<Path>) -> Result<usize, CacheError> {
        let path = path.as_ref().to_path_buf();
        let conn = self.clone();
        tokio::task::spawn_blocking(move || {
            conn.with_conn(|conn| {
                use std::io::Write;

                let mut stmt = conn.prepare(
                    "SELECT key_hash, namespace, query, source, confidence, result_json, \
                            created_at, updated_at, expires_at, hit_count \
                     FROM resolution_cache ORDER BY updated_at DESC",
                )?;
                let mut rows = stmt.query([])?;
                let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
                let mut written = 0usize;
                while let Some(row) = rows.next()? {
                    let raw: String = row.get(5)?;
                    let record = CacheExportRow {
                        key_hash: row.get(0)?,
                        namespace: row.get(1)?,
                        query: row.get(2)?,
                        source: row.get(3)?,
                        confidence: row.get(4)?,
                        result: serde_json::from_str(&raw)
                            .map_err(|e| CacheError::Serde(e.to_string()))?,
                        created_at: row.get(6)?,
                        updated_at: row.get(7)?,
                        expires_at: row.get(8)?,
                        hit_count: row.get(9)?,
                    };
                    let line = serde_json::to_string(&record)
                        .map_err(|e| CacheError::Serde(e.to_string()))?;
                    writeln!(file, "{line}")?;
                    written += 1;
                }
                file.flush()?;
                Ok(written)
            })
        })
        .await
        .map_err(|e| CacheError::Join(e.to_string()))?
    }

    pub async fn prune(&self, options: PruneOptions) -> Result<CachePruneStats, CacheError> {
        let conn = self.clone();
        tokio::task::spawn_blocking(move || {
            conn.with_conn(|conn| {
                let now = now_epoch();
                let mut deleted: usize = 0;

                if options.expired {
                    deleted += conn.execute(
                        "DELETE FROM resolution_cache WHERE expires_at <= ?1",
                        params![now],
                    )?;
                }

                if let Some(days) = options.max_age_days {
                    let cutoff = now.saturating_sub((days as i64).saturating_mul(86_400));
                    deleted += conn.execute(
                        "DELETE FROM resolution_cache WHERE updated_at < ?1",
                        params![cutoff],
                    )?;
                }

                if let Some(max_rows) = options.max_rows {
                    let removed = conn.execute(
                        "DELETE FROM resolution_cache WHERE key_hash IN ( \
                            SELECT key_hash FROM resolution_cache \
                            ORDER BY updated_at DESC LIMIT -1 OFFSET ?1 \
                         )",
                        params![max_rows as i64],
                    )?;
                    deleted = deleted.saturating_add(removed);
                }

                let remaining: i64 =
                    conn.query_row("SELECT COUNT(*) FROM resolution_cache", [], |row| {
                        row.get(0)
                    })?;
                Ok(CachePruneStats {
                    deleted,
                    remaining: remaining.max(0) as usize,
                })
            })
        })
        .await
        .map_err(|e| CacheError::Join(e.to_string()))?
    }
}

fn hash_fields(fields: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for (idx, field) in fields.iter().enumerate() {
        if idx > 0 {
            hasher.update(b"|");
        }
        hasher.update(field.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
