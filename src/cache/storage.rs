//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::CacheError;
use crate::http::{RequestKey, Response};

/// A response read back from a bucket.
#[derive(Debug, PartialEq, Eq)]
pub struct StoredResponse {
  /// The stored snapshot, owned by the reader
  pub response: Response,
  /// When the entry was written
  pub stored_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
///
/// A backend holds any number of named buckets, each mapping request keys to
/// response snapshots. Writes are upserts: the last write for a key wins.
pub trait CacheStorage: Send + Sync {
  /// Create the bucket if it does not exist yet.
  fn create_bucket(&self, bucket: &str) -> Result<(), CacheError>;

  /// Names of all known buckets.
  fn bucket_names(&self) -> Result<Vec<String>, CacheError>;

  /// Remove a bucket and all of its entries. Returns false if it was absent.
  fn delete_bucket(&self, bucket: &str) -> Result<bool, CacheError>;

  /// Look up a single entry.
  fn get(&self, bucket: &str, key: &RequestKey) -> Result<Option<StoredResponse>, CacheError>;

  /// Insert or overwrite a single entry.
  fn put(&self, bucket: &str, key: &RequestKey, response: Response) -> Result<(), CacheError>;

  /// Readable keys of every entry in a bucket, sorted.
  fn keys(&self, bucket: &str) -> Result<Vec<String>, CacheError>;
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self, CacheError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        CacheError::StorageUnavailable(format!("failed to create cache directory: {}", e))
      })?;
    }

    let conn = Connection::open(path).map_err(|e| {
      CacheError::StorageUnavailable(format!(
        "failed to open cache database at {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::with_connection(conn)
  }

  /// Open a private, non-persistent database.
  pub fn open_in_memory() -> Result<Self, CacheError> {
    let conn = Connection::open_in_memory()
      .map_err(|e| CacheError::StorageUnavailable(format!("failed to open database: {}", e)))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self, CacheError> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Option<PathBuf> {
    let data_dir = dirs::data_dir().or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))?;
    Some(data_dir.join("swcache").join("cache.db"))
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
    self
      .conn
      .lock()
      .map_err(|e| CacheError::StorageUnavailable(format!("lock poisoned: {}", e)))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<(), CacheError> {
    let conn = self.lock()?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| CacheError::StorageUnavailable(format!("failed to run migrations: {}", e)))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_buckets (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One response snapshot per (bucket, request key)
CREATE TABLE IF NOT EXISTS cache_entries (
    bucket TEXT NOT NULL,
    key_hash TEXT NOT NULL,
    request_key TEXT NOT NULL,
    status INTEGER NOT NULL,
    status_text TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (bucket, key_hash)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_bucket ON cache_entries(bucket);
"#;

impl CacheStorage for SqliteStorage {
  fn create_bucket(&self, bucket: &str) -> Result<(), CacheError> {
    let conn = self.lock()?;

    conn
      .execute(
        "INSERT OR IGNORE INTO cache_buckets (name) VALUES (?)",
        params![bucket],
      )
      .map_err(|e| {
        CacheError::StorageUnavailable(format!("failed to create bucket {}: {}", bucket, e))
      })?;

    Ok(())
  }

  fn bucket_names(&self) -> Result<Vec<String>, CacheError> {
    let conn = self.lock()?;
    let read_err = |e: rusqlite::Error| CacheError::StorageRead {
      bucket: "*".to_string(),
      reason: e.to_string(),
    };

    let mut stmt = conn
      .prepare("SELECT name FROM cache_buckets ORDER BY name")
      .map_err(read_err)?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(read_err)?
      .collect::<Result<Vec<String>, _>>()
      .map_err(read_err)?;

    Ok(names)
  }

  fn delete_bucket(&self, bucket: &str) -> Result<bool, CacheError> {
    let mut conn = self.lock()?;
    let write_err = |e: rusqlite::Error| CacheError::StorageWrite {
      bucket: bucket.to_string(),
      key: "*".to_string(),
      reason: e.to_string(),
    };

    let tx = conn.transaction().map_err(write_err)?;
    tx.execute("DELETE FROM cache_entries WHERE bucket = ?", params![bucket])
      .map_err(write_err)?;
    let removed = tx
      .execute("DELETE FROM cache_buckets WHERE name = ?", params![bucket])
      .map_err(write_err)?;
    tx.commit().map_err(write_err)?;

    Ok(removed > 0)
  }

  fn get(&self, bucket: &str, key: &RequestKey) -> Result<Option<StoredResponse>, CacheError> {
    let conn = self.lock()?;
    let read_err = |e: rusqlite::Error| CacheError::StorageRead {
      bucket: bucket.to_string(),
      reason: e.to_string(),
    };

    let row: Option<(u16, String, String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT status, status_text, headers, body, stored_at FROM cache_entries
         WHERE bucket = ? AND key_hash = ?",
        params![bucket, key.digest()],
        |row| {
          Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
          ))
        },
      )
      .optional()
      .map_err(read_err)?;

    match row {
      Some((status, status_text, headers, body, stored_at)) => {
        let headers: Vec<(String, String)> = serde_json::from_str(&headers)?;
        let stored_at = parse_datetime(&stored_at).map_err(|reason| CacheError::StorageRead {
          bucket: bucket.to_string(),
          reason,
        })?;

        Ok(Some(StoredResponse {
          response: Response {
            status,
            status_text,
            headers,
            body,
          },
          stored_at,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, bucket: &str, key: &RequestKey, response: Response) -> Result<(), CacheError> {
    let conn = self.lock()?;
    let headers = serde_json::to_string(&response.headers)?;

    conn
      .execute(
        "INSERT OR REPLACE INTO cache_entries
           (bucket, key_hash, request_key, status, status_text, headers, body, stored_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))",
        params![
          bucket,
          key.digest(),
          key.as_str(),
          response.status,
          response.status_text,
          headers,
          response.body,
        ],
      )
      .map_err(|e| CacheError::StorageWrite {
        bucket: bucket.to_string(),
        key: key.to_string(),
        reason: e.to_string(),
      })?;

    Ok(())
  }

  fn keys(&self, bucket: &str) -> Result<Vec<String>, CacheError> {
    let conn = self.lock()?;
    let read_err = |e: rusqlite::Error| CacheError::StorageRead {
      bucket: bucket.to_string(),
      reason: e.to_string(),
    };

    let mut stmt = conn
      .prepare("SELECT request_key FROM cache_entries WHERE bucket = ? ORDER BY request_key")
      .map_err(read_err)?;

    let keys = stmt
      .query_map(params![bucket], |row| row.get(0))
      .map_err(read_err)?
      .collect::<Result<Vec<String>, _>>()
      .map_err(read_err)?;

    Ok(keys)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, String> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| format!("failed to parse datetime '{}': {}", s, e))
}
