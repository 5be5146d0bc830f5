//! Settings repository contracts and SQLite implementation.
//!
//! # Invariants
//! - Values are stored as JSON text and decoded on read.
//! - Saving an existing key replaces its value.

use crate::repo::registro_repo::{RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

/// Repository interface for key/value settings.
pub trait SettingsRepository {
    fn get_setting_value(&self, key: &str) -> RepoResult<Option<Value>>;
    fn save_setting_value(&self, key: &str, value: &Value) -> RepoResult<()>;
}

/// SQLite-backed settings repository.
pub struct SqliteSettingsRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSettingsRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl SettingsRepository for SqliteSettingsRepository<'_> {
    fn get_setting_value(&self, key: &str) -> RepoResult<Option<Value>> {
        let raw: Option<String> = self
            .conn
            .query_row("SELECT value FROM settings WHERE key = ?1;", [key], |row| {
                row.get(0)
            })
            .optional()?;

        match raw {
            Some(text) => serde_json::from_str(&text).map(Some).map_err(|err| {
                RepoError::InvalidData(format!("invalid JSON in settings.value for `{key}`: {err}"))
            }),
            None => Ok(None),
        }
    }

    fn save_setting_value(&self, key: &str, value: &Value) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT (key) DO UPDATE SET
                value = excluded.value,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![key, value.to_string()],
        )?;
        Ok(())
    }
}
