// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Underlying storage media: host-provided string key/value maps that the
// encrypted adapter writes ciphertext into.
//
// Schema (SqliteMedium):
//   kv(
//     key   TEXT PRIMARY KEY,
//     value TEXT NOT NULL
//   )

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use carevault_core::error::{CarevaultError, Result};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, instrument};

/// A persistent string-keyed map supplied by the host environment.
///
/// Implementations hold no knowledge of encryption; callers are expected to
/// go through `EncryptedStorage` for anything sensitive.
pub trait StorageMedium {
    /// Raw value stored under `key`, if any.
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    fn write(&self, key: &str, value: &str) -> Result<()>;

    /// Delete `key`. Deleting an absent key is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    /// Every key currently present, in ascending order.
    fn keys(&self) -> Result<Vec<String>>;
}

// ---------------------------------------------------------------------------
// In-memory medium
// ---------------------------------------------------------------------------

/// In-memory medium. Clones share the same underlying map, so a test can keep
/// a handle and inspect what the adapter wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryMedium {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
    /// Maximum total bytes (keys + values); writes beyond it fail.
    quota: Option<usize>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    /// A medium that rejects writes once the stored bytes would exceed
    /// `quota`, like a full browser storage area.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: Arc::default(),
            quota: Some(quota),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| CarevaultError::Medium("memory medium lock poisoned".into()))
    }

    /// Remove every key.
    pub fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }
}

impl StorageMedium for MemoryMedium {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.lock()?;
        if let Some(quota) = self.quota {
            let used: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if used + key.len() + value.len() > quota {
                return Err(CarevaultError::Medium(format!(
                    "quota of {quota} bytes exceeded writing {key}"
                )));
            }
        }
        entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// SQLite medium
// ---------------------------------------------------------------------------

const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS kv (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
"#;

/// Medium backed by a single SQLite table.
///
/// All methods are synchronous because `rusqlite` does not support async
/// natively.
pub struct SqliteMedium {
    conn: Connection,
}

impl SqliteMedium {
    /// Open (or create) the medium database at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| CarevaultError::Database(format!("open: {e}")))?;

        // WAL survives unclean shutdowns more gracefully.
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| CarevaultError::Database(format!("WAL pragma: {e}")))?;

        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| CarevaultError::Database(format!("create table: {e}")))?;

        debug!("sqlite medium opened");
        Ok(Self { conn })
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| CarevaultError::Database(format!("open in-memory: {e}")))?;

        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| CarevaultError::Database(format!("create table: {e}")))?;

        debug!("in-memory sqlite medium opened");
        Ok(Self { conn })
    }
}

impl StorageMedium for SqliteMedium {
    fn read(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| CarevaultError::Database(format!("read {key}: {e}")))
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .map_err(|e| CarevaultError::Database(format!("write {key}: {e}")))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])
            .map_err(|e| CarevaultError::Database(format!("delete {key}: {e}")))?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM kv ORDER BY key ASC")
            .map_err(|e| CarevaultError::Database(format!("prepare keys: {e}")))?;

        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| CarevaultError::Database(format!("query keys: {e}")))?;

        let mut keys = Vec::new();
        for row in rows {
            keys.push(row.map_err(|e| CarevaultError::Database(format!("read key: {e}")))?);
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(medium: &dyn StorageMedium) {
        assert_eq!(medium.read("a").unwrap(), None);

        medium.write("b", "2").unwrap();
        medium.write("a", "1").unwrap();
        medium.write("a", "one").unwrap();

        assert_eq!(medium.read("a").unwrap().as_deref(), Some("one"));
        assert_eq!(medium.keys().unwrap(), vec!["a".to_string(), "b".to_string()]);

        medium.delete("a").unwrap();
        medium.delete("a").expect("delete is idempotent");
        assert_eq!(medium.read("a").unwrap(), None);
        assert_eq!(medium.keys().unwrap(), vec!["b".to_string()]);
    }

    #[test]
    fn memory_medium_contract() {
        exercise(&MemoryMedium::new());
    }

    #[test]
    fn sqlite_medium_contract() {
        exercise(&SqliteMedium::open_in_memory().expect("open"));
    }

    #[test]
    fn memory_clones_share_entries() {
        let medium = MemoryMedium::new();
        let handle = medium.clone();
        medium.write("k", "v").unwrap();
        assert_eq!(handle.read("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn quota_rejects_oversized_writes() {
        let medium = MemoryMedium::with_quota(8);
        medium.write("k", "1234").unwrap();
        // Replacing a value only counts the new size.
        medium.write("k", "567").unwrap();
        let err = medium.write("other", "12345").unwrap_err();
        assert!(matches!(err, CarevaultError::Medium(_)));
        assert_eq!(medium.read("other").unwrap(), None);
    }

    #[test]
    fn sqlite_medium_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("vault.db");

        SqliteMedium::open(&path).unwrap().write("k", "v").unwrap();

        let reopened = SqliteMedium::open(&path).unwrap();
        assert_eq!(reopened.read("k").unwrap().as_deref(), Some("v"));
    }
}
