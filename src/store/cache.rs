use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;

/// Local key/value persistence for the zone collection.
///
/// Values are opaque strings; the store decides the encoding. A cache is
/// never the source of truth, so callers log write failures rather than
/// failing the operation that triggered them.
pub trait ZoneCache {
    fn read(&mut self, key: &str) -> Result<Option<String>>;
    fn write(&mut self, key: &str, value: &str) -> Result<()>;
    fn clear(&mut self, key: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryZoneCache {
    entries: HashMap<String, String>,
    fail_writes: bool,
}

impl InMemoryZoneCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail, as a full disk would.
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

impl ZoneCache for InMemoryZoneCache {
    fn read(&mut self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        if self.fail_writes {
            anyhow::bail!("cache write rejected for '{}'", key);
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Cache persisted in a single SQLite table.
pub struct SqliteZoneCache {
    conn: Connection,
}

impl SqliteZoneCache {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("open zone cache {}", path.display()))?;
        let mut cache = Self { conn };
        cache.ensure_schema()?;
        Ok(cache)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory zone cache")?;
        let mut cache = Self { conn };
        cache.ensure_schema()?;
        Ok(cache)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL,
              updated_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }
}

impl ZoneCache for SqliteZoneCache {
    fn read(&mut self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM cache_entries WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO cache_entries(key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            params![key, value, crate::now_iso8601()],
        )?;
        Ok(())
    }

    fn clear(&mut self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
        Ok(())
    }
}
