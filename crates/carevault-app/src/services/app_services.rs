// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer: opens the vault, the key and the audit trail, and
// pairs every operation that moves data in or out with its audit entry.
//
// Data directory layout:
//   identity.key   age X25519 identity (owner read/write only)
//   vault.db       SQLite medium holding the encrypted store snapshot
//   audit.db       SQLite audit trail

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use carevault_core::config::StorageConfig;
use carevault_core::error::{CarevaultError, Result};
use carevault_core::types::{DataType, RecordId};
use carevault_security::audit::{
    AuditAction, AuditLogEntry, AuditSubject, AuditTrail, RecordedAudit, create_audit_log_entry,
};
use carevault_security::cipher::StorageKey;
use carevault_security::integrity::{hash_bytes, verify_hash};
use carevault_security::masking::mask_patient;
use carevault_security::medium::SqliteMedium;
use carevault_security::storage::EncryptedStorage;
use carevault_store::{ClinicalStore, ImportSummary, MigrationOptions, MigrationReport, to_json_within};

pub const KEY_FILE: &str = "identity.key";
pub const VAULT_FILE: &str = "vault.db";
pub const AUDIT_FILE: &str = "audit.db";

/// Summary printed by `carevault stats`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultStats {
    pub data_dir: PathBuf,
    pub revision: u64,
    /// Another process has committed since this one opened the vault.
    pub external_changes: bool,
    pub records: BTreeMap<DataType, usize>,
    pub audit_entries: u64,
    pub config: StorageConfig,
    pub first_visit: bool,
    pub recovered_from_unreadable_state: bool,
}

pub struct AppServices {
    store: ClinicalStore<SqliteMedium>,
    audit_trail: AuditTrail,
    data_dir: PathBuf,
}

impl AppServices {
    /// Open every service under `dir`. Call once at startup.
    ///
    /// Generates the identity on first use and runs the legacy importer.
    pub fn init(dir: &Path, options: &MigrationOptions) -> Result<Self> {
        info!(path = %dir.display(), "initialising app services");

        let key = load_or_create_key(&dir.join(KEY_FILE))?;
        let medium = SqliteMedium::open(dir.join(VAULT_FILE))?;
        let store = ClinicalStore::open_with(EncryptedStorage::new(medium, key), options)?;
        let audit_trail = AuditTrail::open(dir.join(AUDIT_FILE))?;

        let services = Self {
            store,
            audit_trail,
            data_dir: dir.to_path_buf(),
        };

        if let Some(report) = services.store.last_migration()
            && report.migrated > 0
        {
            services.audit(create_audit_log_entry(
                AuditAction::MigrateLegacyData,
                AuditSubject::System,
                migration_metadata(report),
            ));
        }
        if let Some(notice) = services.store.startup_notice() {
            warn!(message = %notice.message, "store opened empty");
        }

        info!("app services initialised");
        Ok(services)
    }

    pub fn store(&self) -> &ClinicalStore<SqliteMedium> {
        &self.store
    }

    /// Report of the importer run made by `init`, for `carevault migrate`.
    ///
    /// `target` is honoured only by the run that performs the import. Once
    /// the marker is set, asking for a target is refused instead of silently
    /// ignored.
    pub fn migration_outcome(&self, target: Option<&RecordId>) -> Result<&MigrationReport> {
        let report = self.store.last_migration().ok_or_else(|| {
            CarevaultError::Persistence("migration did not complete; see the log for details".into())
        })?;
        if report.already_complete && target.is_some() {
            warn!("target patient ignored: legacy data was imported on an earlier run");
            return Err(CarevaultError::AlreadyMigrated);
        }
        Ok(report)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn stats(&self) -> Result<VaultStats> {
        Ok(VaultStats {
            data_dir: self.data_dir.clone(),
            revision: self.store.revision(),
            external_changes: self.store.has_external_changes()?,
            records: self.store.counts(),
            audit_entries: self.audit_trail.count()?,
            config: self.store.config().clone(),
            first_visit: self.store.is_first_visit(),
            recovered_from_unreadable_state: self.store.recovered_from_unreadable_state(),
        })
    }

    // -- Export --------------------------------------------------------------

    /// Serialized export of one patient, full or masked. The export is
    /// audited only once it has passed the size limit.
    pub fn export_patient(&self, patient_id: &RecordId, masked: bool) -> Result<Vec<u8>> {
        let exported = self
            .store
            .export_patient(patient_id)
            .ok_or_else(|| CarevaultError::InvalidRecord("no patient with that id".into()))?;

        let limit = self.store.config().max_export_size_bytes;
        let bytes = if masked {
            to_json_within(&exported.masked, limit)?
        } else {
            to_json_within(&exported.payload, limit)?
        };

        self.audit(with_output_metadata(exported.audit, &bytes, masked));
        Ok(bytes)
    }

    /// Serialized export of the whole store, full (a backup) or masked.
    pub fn export_all(&self, masked: bool) -> Result<Vec<u8>> {
        let exported = self.store.export_all();

        let limit = self.store.config().max_export_size_bytes;
        let bytes = if masked {
            to_json_within(&exported.masked, limit)?
        } else {
            to_json_within(&exported.payload, limit)?
        };

        self.audit(with_output_metadata(exported.audit, &bytes, masked));
        Ok(bytes)
    }

    // -- Import / delete / clear ---------------------------------------------

    /// Replace the store with the backup in `path`, optionally checking its
    /// SHA-256 first. Nothing changes when the check or the parse fails.
    pub fn import_file(&mut self, path: &Path, expected_sha256: Option<&str>) -> Result<ImportSummary> {
        let bytes = fs::read(path)?;
        if let Some(expected) = expected_sha256 {
            verify_hash(&bytes, expected)?;
        }
        let backup: Value = serde_json::from_slice(&bytes)?;

        let summary = self.store.import_backup(&backup)?;
        if summary.applied {
            let metadata = BTreeMap::from([
                ("imported".to_owned(), json!(summary.imported)),
                ("losses".to_owned(), json!(summary.losses)),
                ("sha256".to_owned(), json!(hash_bytes(&bytes))),
                ("verified".to_owned(), json!(expected_sha256.is_some())),
            ]);
            self.audit(create_audit_log_entry(
                AuditAction::ImportBackup,
                AuditSubject::AllPatients {
                    count: self.store.get_all_patients().len(),
                },
                metadata,
            ));
        }
        Ok(summary)
    }

    /// Delete a patient and everything recorded for them.
    pub fn delete_patient(&mut self, patient_id: &RecordId) -> Result<bool> {
        let Some(masked) = self.store.get_patient(patient_id).map(mask_patient) else {
            return Ok(false);
        };
        let before = self.store.counts();

        self.store.delete_patient(patient_id)?;

        let removed: BTreeMap<DataType, usize> = self
            .store
            .counts()
            .into_iter()
            .map(|(data_type, after)| {
                let removed = before.get(&data_type).map_or(0, |b| b.saturating_sub(after));
                (data_type, removed)
            })
            .collect();
        self.audit(create_audit_log_entry(
            AuditAction::DeletePatient,
            AuditSubject::Patient(&masked),
            BTreeMap::from([("removed".to_owned(), json!(removed))]),
        ));
        Ok(true)
    }

    pub fn clear_all_data(&mut self) -> Result<()> {
        let counts = self.store.counts();
        self.store.clear_all_data()?;
        self.audit(create_audit_log_entry(
            AuditAction::ClearAllData,
            AuditSubject::System,
            BTreeMap::from([("cleared".to_owned(), json!(counts))]),
        ));
        Ok(())
    }

    // -- Audit ---------------------------------------------------------------

    /// Record an audit entry. Failures are logged, not propagated.
    fn audit(&self, entry: AuditLogEntry) {
        if let Err(e) = self.audit_trail.record(&entry) {
            error!(error = %e, action = entry.action.as_str(), "failed to record audit entry");
        }
    }

    /// Recent audit entries, newest first, optionally for one action.
    pub fn audit_entries(&self, limit: u32, action: Option<AuditAction>) -> Result<Vec<RecordedAudit>> {
        match action {
            None => self.audit_trail.recent(limit),
            Some(action) => {
                let mut entries = self.audit_trail.for_action(action)?;
                entries.reverse();
                entries.truncate(limit as usize);
                Ok(entries)
            }
        }
    }
}

fn with_output_metadata(mut entry: AuditLogEntry, bytes: &[u8], masked: bool) -> AuditLogEntry {
    entry.metadata.insert("masked".to_owned(), json!(masked));
    entry.metadata.insert("sizeBytes".to_owned(), json!(bytes.len()));
    entry.metadata.insert("sha256".to_owned(), json!(hash_bytes(bytes)));
    entry
}

fn migration_metadata(report: &MigrationReport) -> BTreeMap<String, Value> {
    BTreeMap::from([
        ("migrated".to_owned(), json!(report.migrated)),
        ("errors".to_owned(), json!(report.errors.len())),
        (
            "placeholderCreated".to_owned(),
            json!(report.placeholder_patient.is_some()),
        ),
    ])
}

// ---------------------------------------------------------------------------
// Key file
// ---------------------------------------------------------------------------

/// Read the identity at `path`, generating one on first use.
fn load_or_create_key(path: &Path) -> Result<StorageKey> {
    if path.exists() {
        let encoded = fs::read_to_string(path)?;
        return StorageKey::from_identity_str(encoded.trim());
    }

    let key = StorageKey::generate();
    let encoded = key
        .export_identity()
        .ok_or_else(|| CarevaultError::KeyMaterial("generated key cannot be exported".into()))?;

    let mut file = owner_only(path)?;
    file.write_all(encoded.as_bytes())?;
    file.write_all(b"\n")?;
    file.sync_all()?;

    info!(path = %path.display(), "generated new storage identity");
    Ok(key)
}

#[cfg(unix)]
fn owner_only(path: &Path) -> Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    Ok(fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?)
}

#[cfg(not(unix))]
fn owner_only(path: &Path) -> Result<fs::File> {
    Ok(fs::OpenOptions::new().write(true).create_new(true).open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use carevault_core::types::{PatientProfile, VitalReading, VitalSigns};
    use carevault_security::medium::StorageMedium;

    fn init(dir: &Path) -> AppServices {
        AppServices::init(dir, &MigrationOptions::default()).expect("init services")
    }

    fn seed(services: &mut AppServices) -> RecordId {
        let store = &mut services.store;
        let jane = store
            .save_patient(PatientProfile::new("Jane", "Doe").with_medical_record_number("12345"))
            .unwrap();
        store
            .save_vital_signs(VitalSigns::new(jane.id.clone(), VitalReading::blood_pressure(120, 80)))
            .unwrap();
        jane.id
    }

    #[test]
    fn key_is_created_once_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let jane_id = {
            let mut services = init(dir.path());
            seed(&mut services)
        };
        let first_key = fs::read_to_string(dir.path().join(KEY_FILE)).unwrap();
        assert!(first_key.starts_with("AGE-SECRET-KEY-1"));

        let services = init(dir.path());
        assert_eq!(fs::read_to_string(dir.path().join(KEY_FILE)).unwrap(), first_key);
        assert!(services.store().get_patient(&jane_id).is_some());
    }

    #[cfg(unix)]
    #[test]
    fn key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        init(dir.path());
        let mode = fs::metadata(dir.path().join(KEY_FILE)).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn masked_export_is_audited() {
        let dir = tempfile::tempdir().unwrap();
        let mut services = init(dir.path());
        let jane = seed(&mut services);

        let bytes = services.export_patient(&jane, true).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("J.D."));
        assert!(!text.contains("12345"));

        let entries = services
            .audit_entries(10, Some(AuditAction::ExportPatientData))
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry.metadata["masked"], json!(true));
        assert!(!entries[0].entry.subject.contains("Jane"));
    }

    #[test]
    fn oversized_export_is_refused_and_not_audited() {
        let dir = tempfile::tempdir().unwrap();
        let mut services = init(dir.path());
        seed(&mut services);
        services
            .store
            .update_config(&carevault_core::config::ConfigUpdate {
                max_export_size_bytes: Some(64),
                ..Default::default()
            })
            .unwrap();

        assert!(matches!(
            services.export_all(false),
            Err(CarevaultError::ExportTooLarge { limit: 64, .. })
        ));
        assert!(services.audit_entries(10, Some(AuditAction::ExportAllData)).unwrap().is_empty());
    }

    #[test]
    fn backup_round_trip_with_checksum() {
        let source_dir = tempfile::tempdir().unwrap();
        let mut source = init(source_dir.path());
        let jane = seed(&mut source);
        let backup = source.export_all(false).unwrap();
        let backup_path = source_dir.path().join("backup.json");
        fs::write(&backup_path, &backup).unwrap();

        let target_dir = tempfile::tempdir().unwrap();
        let mut target = init(target_dir.path());

        let wrong = "0".repeat(64);
        assert!(matches!(
            target.import_file(&backup_path, Some(&wrong)),
            Err(CarevaultError::IntegrityMismatch { .. })
        ));
        assert!(target.store().get_all_patients().is_empty());

        let summary = target
            .import_file(&backup_path, Some(&hash_bytes(&backup)))
            .unwrap();
        assert!(summary.applied);
        assert_eq!(target.store().get_patient_vitals(&jane, None).len(), 1);
        assert_eq!(target.audit_entries(10, Some(AuditAction::ImportBackup)).unwrap().len(), 1);
    }

    #[test]
    fn stats_flag_a_commit_from_another_process() {
        let dir = tempfile::tempdir().unwrap();
        let first = init(dir.path());
        assert!(!first.stats().unwrap().external_changes);

        let mut second = init(dir.path());
        seed(&mut second);
        assert!(first.stats().unwrap().external_changes);
        assert!(!second.stats().unwrap().external_changes);
    }

    #[test]
    fn delete_and_clear_are_audited() {
        let dir = tempfile::tempdir().unwrap();
        let mut services = init(dir.path());
        let jane = seed(&mut services);

        assert!(services.delete_patient(&jane).unwrap());
        assert!(!services.delete_patient(&jane).unwrap());
        services.clear_all_data().unwrap();

        let deletes = services.audit_entries(10, Some(AuditAction::DeletePatient)).unwrap();
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].entry.metadata["removed"]["vitals"], json!(1));
        assert_eq!(services.audit_entries(10, Some(AuditAction::ClearAllData)).unwrap().len(), 1);
        assert_eq!(services.stats().unwrap().audit_entries, 2);
    }

    fn write_legacy_reading(dir: &Path) {
        let medium = SqliteMedium::open(dir.join(VAULT_FILE)).unwrap();
        medium
            .write(
                "bp-readings",
                r#"[{"systolic": 130, "diastolic": 85, "pulse": 72, "date": "2024-01-01"}]"#,
            )
            .unwrap();
    }

    #[test]
    fn target_patient_receives_unowned_readings() {
        let dir = tempfile::tempdir().unwrap();
        // Two patients saved before the importer has ever run.
        let jane = {
            let medium = SqliteMedium::open(dir.path().join(VAULT_FILE)).unwrap();
            let key = load_or_create_key(&dir.path().join(KEY_FILE)).unwrap();
            let mut store =
                ClinicalStore::open_without_migration(EncryptedStorage::new(medium, key)).unwrap();
            store.save_patient(PatientProfile::new("John", "Roe")).unwrap();
            store.save_patient(PatientProfile::new("Jane", "Doe")).unwrap().id
        };
        write_legacy_reading(dir.path());
        let services = AppServices::init(
            dir.path(),
            &MigrationOptions {
                target_patient: Some(jane.clone()),
            },
        )
        .unwrap();
        let report = services.migration_outcome(Some(&jane)).unwrap();
        assert_eq!(report.migrated, 2);
        assert!(report.placeholder_patient.is_none());
        assert_eq!(services.store().get_patient_vitals(&jane, None).len(), 2);
    }

    #[test]
    fn later_migrate_with_target_is_refused_not_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write_legacy_reading(dir.path());

        // Any command opens the services, which runs the importer once.
        let placeholder = {
            let services = init(dir.path());
            let report = services.migration_outcome(None).unwrap();
            assert_eq!(report.migrated, 2);
            report.placeholder_patient.clone().expect("no patients existed")
        };

        let mut services = init(dir.path());
        let jane = seed(&mut services);
        drop(services);

        let services = AppServices::init(
            dir.path(),
            &MigrationOptions {
                target_patient: Some(jane.clone()),
            },
        )
        .unwrap();
        assert!(matches!(
            services.migration_outcome(Some(&jane)),
            Err(CarevaultError::AlreadyMigrated)
        ));
        assert!(services.migration_outcome(None).unwrap().already_complete);
        assert_eq!(services.store().get_patient_vitals(&placeholder, None).len(), 2);
        assert_eq!(services.store().get_patient_vitals(&jane, None).len(), 1);
    }

    #[test]
    fn legacy_data_in_vault_is_migrated_and_audited() {
        let dir = tempfile::tempdir().unwrap();
        write_legacy_reading(dir.path());

        let services = init(dir.path());
        assert_eq!(services.stats().unwrap().records[&DataType::Vitals], 2);

        let entries = services
            .audit_entries(10, Some(AuditAction::MigrateLegacyData))
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry.metadata["migrated"], json!(2));
    }
}
