// SQLite persistence layer: a string key-value store plus typed helpers.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::rankings::RankingRow;

/// String blob storage capability used by the session and the signal cache.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// SQLite-backed key-value store.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Key holding the user's own Sleeper user ids.
    const MY_USER_IDS_KEY: &'static str = "settings/my_user_ids";
    /// Key holding the name of the ranking sheet last loaded.
    const ACTIVE_RANKINGS_KEY: &'static str = "settings/active_rankings";
    const RANKINGS_PREFIX: &'static str = "rankings/";

    /// Open (or create) a SQLite database at `path` and ensure the schema
    /// exists. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS kv (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection. A poisoned lock is recovered since
    /// every write is a single statement.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Keys starting with `prefix`, sorted.
    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT key FROM kv WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key")
            .context("failed to prepare key listing query")?;
        let keys = stmt
            .query_map(params![prefix], |row| row.get(0))
            .context("failed to list keys")?
            .collect::<std::result::Result<Vec<String>, _>>()
            .context("failed to read key rows")?;
        Ok(keys)
    }

    /// Delete every key starting with `prefix`. Returns the number removed.
    pub fn remove_prefix(&self, prefix: &str) -> Result<usize> {
        let conn = self.conn();
        let n = conn
            .execute(
                "DELETE FROM kv WHERE substr(key, 1, length(?1)) = ?1",
                params![prefix],
            )
            .context("failed to delete keys by prefix")?;
        Ok(n)
    }

    // ------------------------------------------------------------------
    // JSON helpers
    // ------------------------------------------------------------------

    /// Serialize `value` as JSON under `key`, replacing any previous value.
    pub fn save_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)
            .with_context(|| format!("failed to serialize value for {key}"))?;
        self.set(key, &json)
    }

    /// Load and deserialize the JSON stored under `key`.
    pub fn load_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(json) => {
                let value = serde_json::from_str(&json)
                    .with_context(|| format!("failed to deserialize value for {key}"))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // User settings
    // ------------------------------------------------------------------

    pub fn my_user_ids(&self) -> Result<HashSet<String>> {
        Ok(self
            .load_json::<Vec<String>>(Self::MY_USER_IDS_KEY)?
            .unwrap_or_default()
            .into_iter()
            .collect())
    }

    pub fn set_my_user_ids(&self, ids: &HashSet<String>) -> Result<()> {
        let mut sorted: Vec<&String> = ids.iter().collect();
        sorted.sort();
        self.save_json(Self::MY_USER_IDS_KEY, &sorted)
    }

    pub fn active_rankings(&self) -> Result<Option<String>> {
        self.load_json(Self::ACTIVE_RANKINGS_KEY)
    }

    pub fn set_active_rankings(&self, name: &str) -> Result<()> {
        self.save_json(Self::ACTIVE_RANKINGS_KEY, name)
    }

    // ------------------------------------------------------------------
    // Saved ranking sheets
    // ------------------------------------------------------------------

    /// Store a parsed ranking sheet (including taken flags) under `name`.
    pub fn save_rankings(&self, name: &str, rows: &[RankingRow]) -> Result<()> {
        self.save_json(&format!("{}{name}", Self::RANKINGS_PREFIX), rows)
    }

    pub fn load_rankings(&self, name: &str) -> Result<Option<Vec<RankingRow>>> {
        self.load_json(&format!("{}{name}", Self::RANKINGS_PREFIX))
    }

    pub fn delete_rankings(&self, name: &str) -> Result<()> {
        self.remove(&format!("{}{name}", Self::RANKINGS_PREFIX))
    }

    /// Names of every saved ranking sheet, sorted.
    pub fn list_rankings(&self) -> Result<Vec<String>> {
        Ok(self
            .keys_with_prefix(Self::RANKINGS_PREFIX)?
            .into_iter()
            .map(|k| k[Self::RANKINGS_PREFIX.len()..].to_string())
            .collect())
    }
}

impl KeyValueStore for Database {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn();
        conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()
            .with_context(|| format!("failed to read key {key}"))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO kv (key, value, updated_at)
             VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value],
        )
        .with_context(|| format!("failed to write key {key}"))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
            .with_context(|| format!("failed to delete key {key}"))?;
        Ok(())
    }
}
