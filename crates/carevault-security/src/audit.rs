// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Audit entries for data leaving the store, plus an append-only SQLite trail
// the host can record them into.
//
// Schema:
//   audit_log(
//     id        INTEGER PRIMARY KEY AUTOINCREMENT,
//     timestamp TEXT    NOT NULL,   -- RFC 3339
//     action    TEXT    NOT NULL,   -- JSON string, e.g. "EXPORT_PATIENT_DATA"
//     subject   TEXT    NOT NULL,   -- masked label only
//     metadata  TEXT    NOT NULL    -- JSON object
//   )

use std::collections::BTreeMap;
use std::path::Path;

use carevault_core::error::{CarevaultError, Result};
use carevault_core::types::Timestamp;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::masking::MaskedPatient;

// ---------------------------------------------------------------------------
// Local error helpers
// ---------------------------------------------------------------------------

/// Convert a `rusqlite::Error` into a `CarevaultError::Database`.
fn db_err(e: rusqlite::Error) -> CarevaultError {
    CarevaultError::Database(e.to_string())
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    ExportPatientData,
    ExportAllData,
    ImportBackup,
    DeletePatient,
    ClearAllData,
    MigrateLegacyData,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExportPatientData => "EXPORT_PATIENT_DATA",
            Self::ExportAllData => "EXPORT_ALL_DATA",
            Self::ImportBackup => "IMPORT_BACKUP",
            Self::DeletePatient => "DELETE_PATIENT",
            Self::ClearAllData => "CLEAR_ALL_DATA",
            Self::MigrateLegacyData => "MIGRATE_LEGACY_DATA",
        }
    }
}

impl std::str::FromStr for AuditAction {
    type Err = CarevaultError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_value(Value::String(s.to_ascii_uppercase()))?)
    }
}

/// Who an audit entry is about.
///
/// Only masked data can become a subject, so raw identifiers cannot end up in
/// an entry.
#[derive(Debug, Clone, Copy)]
pub enum AuditSubject<'a> {
    Patient(&'a MaskedPatient),
    AllPatients { count: usize },
    System,
}

impl AuditSubject<'_> {
    pub fn label(&self) -> String {
        match self {
            Self::Patient(masked) => masked.display_label(),
            Self::AllPatients { count } => format!("all patients ({count})"),
            Self::System => "system".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub action: AuditAction,
    pub timestamp: Timestamp,
    pub subject: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// Build a timestamped audit entry.
pub fn create_audit_log_entry(
    action: AuditAction,
    subject: AuditSubject<'_>,
    metadata: BTreeMap<String, Value>,
) -> AuditLogEntry {
    AuditLogEntry {
        action,
        timestamp: Utc::now(),
        subject: subject.label(),
        metadata,
    }
}

// ---------------------------------------------------------------------------
// Persistent trail
// ---------------------------------------------------------------------------

/// An entry read back from the trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedAudit {
    pub id: i64,
    #[serde(flatten)]
    pub entry: AuditLogEntry,
}

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS audit_log (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT    NOT NULL,
    action    TEXT    NOT NULL,
    subject   TEXT    NOT NULL,
    metadata  TEXT    NOT NULL
);";

/// Append-only audit trail backed by a SQLite database.
pub struct AuditTrail {
    conn: Connection,
}

impl AuditTrail {
    /// Open (or create) the audit database at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(db_err)?;

        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        debug!("audit trail opened");
        Ok(Self { conn })
    }

    /// Open an in-memory audit database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        debug!("in-memory audit trail opened");
        Ok(Self { conn })
    }

    /// Append `entry` and return its row id.
    #[instrument(skip(self, entry), fields(action = entry.action.as_str()))]
    pub fn record(&self, entry: &AuditLogEntry) -> Result<i64> {
        let action_json = serde_json::to_string(&entry.action)?;
        let metadata_json = serde_json::to_string(&entry.metadata)?;

        self.conn
            .execute(
                "INSERT INTO audit_log (timestamp, action, subject, metadata)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    entry.timestamp.to_rfc3339(),
                    action_json,
                    entry.subject,
                    metadata_json
                ],
            )
            .map_err(db_err)?;

        debug!("audit entry recorded");
        Ok(self.conn.last_insert_rowid())
    }

    /// The most recent `limit` entries, newest first.
    pub fn recent(&self, limit: u32) -> Result<Vec<RecordedAudit>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, timestamp, action, subject, metadata
                 FROM audit_log
                 ORDER BY id DESC
                 LIMIT ?1",
            )
            .map_err(db_err)?;

        let rows = stmt.query_map(params![limit], row_to_audit).map_err(db_err)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(db_err)?);
        }
        Ok(entries)
    }

    /// Every entry for `action`, oldest first.
    pub fn for_action(&self, action: AuditAction) -> Result<Vec<RecordedAudit>> {
        let action_json = serde_json::to_string(&action)?;
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, timestamp, action, subject, metadata
                 FROM audit_log
                 WHERE action = ?1
                 ORDER BY id ASC",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![action_json], row_to_audit)
            .map_err(db_err)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(db_err)?);
        }
        Ok(entries)
    }

    /// Total number of entries in the trail.
    pub fn count(&self) -> Result<u64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))
            .map_err(db_err)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Column indices must match the SELECT order used in the query methods above.
fn row_to_audit(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecordedAudit> {
    let id: i64 = row.get(0)?;
    let timestamp_str: String = row.get(1)?;
    let action_json: String = row.get(2)?;
    let subject: String = row.get(3)?;
    let metadata_json: String = row.get(4)?;

    let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let action: AuditAction = serde_json::from_str(&action_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let metadata: BTreeMap<String, Value> =
        serde_json::from_str(&metadata_json).unwrap_or_default();

    Ok(RecordedAudit {
        id,
        entry: AuditLogEntry {
            action,
            timestamp,
            subject,
            metadata,
        },
    })
}
