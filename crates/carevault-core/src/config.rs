// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Storage configuration, persisted inside the encrypted store state.

use serde::{Deserialize, Serialize};

/// How often the host should produce an automatic backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupFrequency {
    Daily,
    Weekly,
    Monthly,
}

/// Persistent storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StorageConfig {
    /// Encrypt the store at rest.
    pub encryption_enabled: bool,
    /// Whether the host should write periodic backups.
    pub auto_backup: bool,
    pub backup_frequency: BackupFrequency,
    /// Days to keep records. Not enforced by the store.
    pub retention_period_days: u32,
    /// Upper bound for a serialized export, in bytes.
    pub max_export_size_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            encryption_enabled: true,
            auto_backup: false,
            backup_frequency: BackupFrequency::Weekly,
            retention_period_days: 365,
            max_export_size_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Partial configuration update; `None` fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigUpdate {
    pub encryption_enabled: Option<bool>,
    pub auto_backup: Option<bool>,
    pub backup_frequency: Option<BackupFrequency>,
    pub retention_period_days: Option<u32>,
    pub max_export_size_bytes: Option<u64>,
}

impl StorageConfig {
    /// Merge a partial update into this config.
    pub fn apply(&mut self, update: &ConfigUpdate) {
        if let Some(v) = update.encryption_enabled {
            self.encryption_enabled = v;
        }
        if let Some(v) = update.auto_backup {
            self.auto_backup = v;
        }
        if let Some(v) = update.backup_frequency {
            self.backup_frequency = v;
        }
        if let Some(v) = update.retention_period_days {
            self.retention_period_days = v;
        }
        if let Some(v) = update.max_export_size_bytes {
            self.max_export_size_bytes = v;
        }
    }
}
