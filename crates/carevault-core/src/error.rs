// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for CareVault.

use thiserror::Error;

/// Top-level error type for all CareVault operations.
#[derive(Debug, Error)]
pub enum CarevaultError {
    // -- Security errors --
    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("invalid key material: {0}")]
    KeyMaterial(String),

    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    // -- Records --
    #[error("{kind} {id} references unknown patient {patient_id}")]
    UnknownPatient {
        kind: &'static str,
        id: String,
        patient_id: String,
    },

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("export is {size} bytes, above the configured limit of {limit} bytes")]
    ExportTooLarge { size: u64, limit: u64 },

    // -- Migration --
    /// A target patient was requested after the one-time legacy import had
    /// already run.
    #[error("legacy data was already imported; a target patient only applies to the first import")]
    AlreadyMigrated,

    // -- Storage / persistence --
    #[error("storage medium error: {0}")]
    Medium(String),

    #[error("database error: {0}")]
    Database(String),

    /// The in-memory mutation was applied but the snapshot did not reach the
    /// underlying medium.
    #[error("change kept in memory but not persisted: {0}")]
    Persistence(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CarevaultError {
    /// True when the caller's change is visible in memory despite the error.
    pub fn is_persistence_failure(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CarevaultError>;
