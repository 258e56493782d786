// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The clinical data store.
//
// One explicit `ClinicalStore` owns every collection. Each mutating call
// changes the in-memory state and then commits the whole snapshot through the
// encrypted adapter before returning, so state is durable as soon as a call
// returns `Ok`. When the commit fails the mutation stays in memory and the
// caller gets `CarevaultError::Persistence`.
//
// The store assumes a single writer per medium. The envelope's revision lets
// a host notice that another process committed in the meantime.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error, info, instrument, warn};

use carevault_core::config::{ConfigUpdate, StorageConfig};
use carevault_core::error::{CarevaultError, Result};
use carevault_core::human_errors::{HumanError, unreadable_store_notice};
use carevault_core::types::{
    AssessmentResult, DataType, EducationProgress, GoalTracking, PatientProfile, RecordId,
    VitalSigns, VitalType,
};
use carevault_security::audit::{AuditAction, AuditSubject, create_audit_log_entry};
use carevault_security::masking::{mask_patient, mask_patient_batch};
use carevault_security::medium::StorageMedium;
use carevault_security::storage::{EncryptedStorage, Lookup};

use crate::export::{
    EXPORT_VERSION, Exported, ImportSummary, MaskedExport, PatientExport, StoreExport,
};
use crate::migration::{self, MigrationOptions, MigrationReport};
use crate::records::ClinicalRecord;
use crate::state::{ClinicalState, EnvelopeRef, STATE_KEY, STATE_VERSION};

/// Only the revision of a stored envelope, for cheap change detection.
#[derive(Deserialize)]
struct StoredRevision {
    #[serde(default)]
    revision: u64,
}

pub struct ClinicalStore<M: StorageMedium> {
    storage: EncryptedStorage<M>,
    state: ClinicalState,
    /// Revision of the last snapshot this instance wrote or loaded.
    revision: u64,
    recovered_from_unreadable: bool,
    last_migration: Option<MigrationReport>,
}

impl<M: StorageMedium> ClinicalStore<M> {
    /// Rehydrate from `storage` and run the legacy importer once.
    pub fn open(storage: EncryptedStorage<M>) -> Result<Self> {
        Self::open_with(storage, &MigrationOptions::default())
    }

    /// Like [`open`](Self::open) with explicit importer options.
    ///
    /// Only a failure to read the medium is returned as an error. A failed
    /// migration is logged and left for the next start, and no migration runs
    /// while the saved state is unreadable.
    #[instrument(skip_all)]
    pub fn open_with(storage: EncryptedStorage<M>, options: &MigrationOptions) -> Result<Self> {
        let mut store = Self::open_without_migration(storage)?;
        if store.recovered_from_unreadable {
            // Leave the unreadable snapshot alone until the user changes something.
            warn!("skipping legacy migration until the store is readable");
            return Ok(store);
        }
        match migration::run(&mut store, options) {
            Ok(report) => store.last_migration = Some(report),
            Err(e) => error!(error = %e, "legacy migration failed; will retry on next start"),
        }
        Ok(store)
    }

    /// Rehydrate from `storage` without touching legacy data.
    #[instrument(skip_all)]
    pub fn open_without_migration(storage: EncryptedStorage<M>) -> Result<Self> {
        let mut store = Self {
            storage,
            state: ClinicalState::default(),
            revision: 0,
            recovered_from_unreadable: false,
            last_migration: None,
        };
        store.rehydrate()?;
        Ok(store)
    }

    fn rehydrate(&mut self) -> Result<()> {
        let envelope = match self.storage.lookup::<Value>(STATE_KEY)? {
            Lookup::Missing => {
                info!("no saved state; starting empty");
                return Ok(());
            }
            Lookup::Unreadable => {
                warn!("saved state is unreadable; starting empty");
                self.recovered_from_unreadable = true;
                return Ok(());
            }
            Lookup::Found(envelope) => envelope,
        };

        let version = envelope.get("version").and_then(Value::as_u64).unwrap_or(0);
        if version > u64::from(STATE_VERSION) {
            warn!(version, supported = STATE_VERSION, "saved state is from a newer format");
        }
        self.revision = envelope.get("revision").and_then(Value::as_u64).unwrap_or(0);

        match envelope.get("state").and_then(ClinicalState::from_value_lossy) {
            Some((state, losses)) => {
                if losses.malformed + losses.orphaned + losses.duplicates > 0 {
                    warn!(?losses, "dropped records while loading saved state");
                }
                self.state = state;
                info!(
                    revision = self.revision,
                    records = self.state.record_count(),
                    "state rehydrated"
                );
            }
            None => {
                warn!("saved envelope has no usable state; starting empty");
                self.recovered_from_unreadable = true;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Commit
    // -----------------------------------------------------------------------

    /// Write the full snapshot through the adapter.
    pub(crate) fn commit(&mut self) -> Result<()> {
        let next = self.revision + 1;
        let envelope = EnvelopeRef {
            version: STATE_VERSION,
            revision: next,
            state: &self.state,
        };

        if let Err(e) = self.storage.set(STATE_KEY, &envelope) {
            error!(error = %e, "state snapshot not persisted");
            return Err(CarevaultError::Persistence(e.to_string()));
        }

        self.revision = next;
        debug!(revision = next, "state committed");
        Ok(())
    }

    /// Validate and upsert `record` in memory without committing.
    pub(crate) fn apply<T: ClinicalRecord>(&mut self, mut record: T) -> Result<T> {
        if let Some(patient_id) = record.patient_id()
            && !self.state.patients.iter().any(|p| &p.id == patient_id)
        {
            return Err(CarevaultError::UnknownPatient {
                kind: T::KIND,
                id: record.id().to_string(),
                patient_id: patient_id.to_string(),
            });
        }

        let collection = T::collection_mut(&mut self.state);
        let position = collection.iter().position(|r| r.id() == record.id());
        record.prepare(position.map(|i| &collection[i]), Utc::now())?;

        match position {
            Some(i) => collection[i] = record.clone(),
            None => collection.push(record.clone()),
        }
        debug!(kind = T::KIND, replaced = position.is_some(), "record applied");
        Ok(record)
    }

    pub(crate) fn state(&self) -> &ClinicalState {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut ClinicalState {
        &mut self.state
    }

    // -----------------------------------------------------------------------
    // Generic record access
    // -----------------------------------------------------------------------

    /// Insert or replace `record` by id, then commit. Returns the record as
    /// stored (timestamps and normalisation applied).
    pub fn save<T: ClinicalRecord>(&mut self, record: T) -> Result<T> {
        let stored = self.apply(record)?;
        self.commit()?;
        Ok(stored)
    }

    pub fn get<T: ClinicalRecord>(&self, id: &RecordId) -> Option<&T> {
        T::collection(&self.state).iter().find(|r| r.id() == id)
    }

    pub fn list<T: ClinicalRecord>(&self, predicate: impl Fn(&T) -> bool) -> Vec<&T> {
        T::collection(&self.state)
            .iter()
            .filter(|r| predicate(r))
            .collect()
    }

    /// Remove one patient-owned record. Returns `false` when nothing matched.
    fn remove<T: ClinicalRecord>(&mut self, id: &RecordId) -> Result<bool> {
        let collection = T::collection_mut(&mut self.state);
        let before = collection.len();
        collection.retain(|r| r.id() != id);
        if collection.len() == before {
            return Ok(false);
        }
        debug!(kind = T::KIND, "record removed");
        self.commit()?;
        Ok(true)
    }

    fn owned_by<T: ClinicalRecord>(&self, patient_id: &RecordId) -> Vec<&T> {
        self.list(|r: &T| r.patient_id() == Some(patient_id))
    }

    // -----------------------------------------------------------------------
    // Patients
    // -----------------------------------------------------------------------

    pub fn save_patient(&mut self, patient: PatientProfile) -> Result<PatientProfile> {
        self.save(patient)
    }

    pub fn get_patient(&self, id: &RecordId) -> Option<&PatientProfile> {
        self.get(id)
    }

    pub fn get_all_patients(&self) -> &[PatientProfile] {
        &self.state.patients
    }

    /// Delete a patient and every record that references it, in one commit.
    #[instrument(skip_all)]
    pub fn delete_patient(&mut self, id: &RecordId) -> Result<bool> {
        if self.get_patient(id).is_none() {
            return Ok(false);
        }
        let removed = self.state.remove_patient_cascade(id);
        info!(removed, "patient deleted");
        self.commit()?;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Assessments
    // -----------------------------------------------------------------------

    pub fn save_assessment(&mut self, assessment: AssessmentResult) -> Result<AssessmentResult> {
        self.save(assessment)
    }

    /// Newest first.
    pub fn get_patient_assessments(&self, patient_id: &RecordId) -> Vec<&AssessmentResult> {
        let mut assessments = self.owned_by::<AssessmentResult>(patient_id);
        assessments.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        assessments
    }

    pub fn delete_assessment(&mut self, id: &RecordId) -> Result<bool> {
        self.remove::<AssessmentResult>(id)
    }

    // -----------------------------------------------------------------------
    // Vitals
    // -----------------------------------------------------------------------

    pub fn save_vital_signs(&mut self, vitals: VitalSigns) -> Result<VitalSigns> {
        self.save(vitals)
    }

    /// Newest first, optionally limited to one vital type.
    pub fn get_patient_vitals(
        &self,
        patient_id: &RecordId,
        kind: Option<VitalType>,
    ) -> Vec<&VitalSigns> {
        let mut vitals: Vec<&VitalSigns> = self.list(|v: &VitalSigns| {
            &v.patient_id == patient_id && kind.is_none_or(|k| v.kind() == k)
        });
        vitals.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        vitals
    }

    pub fn delete_vital_signs(&mut self, id: &RecordId) -> Result<bool> {
        self.remove::<VitalSigns>(id)
    }

    // -----------------------------------------------------------------------
    // Goals and education
    // -----------------------------------------------------------------------

    pub fn save_goal(&mut self, goal: GoalTracking) -> Result<GoalTracking> {
        self.save(goal)
    }

    pub fn get_patient_goals(&self, patient_id: &RecordId) -> Vec<&GoalTracking> {
        self.owned_by(patient_id)
    }

    pub fn delete_goal(&mut self, id: &RecordId) -> Result<bool> {
        self.remove::<GoalTracking>(id)
    }

    pub fn save_education_progress(
        &mut self,
        progress: EducationProgress,
    ) -> Result<EducationProgress> {
        self.save(progress)
    }

    pub fn get_patient_education_progress(
        &self,
        patient_id: &RecordId,
    ) -> Vec<&EducationProgress> {
        self.owned_by(patient_id)
    }

    // -----------------------------------------------------------------------
    // Configuration and onboarding flags
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &StorageConfig {
        &self.state.config
    }

    pub fn update_config(&mut self, update: &ConfigUpdate) -> Result<StorageConfig> {
        self.state.config.apply(update);
        self.commit()?;
        Ok(self.state.config.clone())
    }

    pub fn is_first_visit(&self) -> bool {
        !self.state.has_been_welcomed
    }

    pub fn mark_welcomed(&mut self) -> Result<()> {
        if self.state.has_been_welcomed {
            return Ok(());
        }
        self.state.has_been_welcomed = true;
        self.commit()
    }

    pub fn should_show_tour(&self) -> bool {
        !self.state.tour_completed
    }

    pub fn mark_tour_completed(&mut self) -> Result<()> {
        if self.state.tour_completed {
            return Ok(());
        }
        self.state.tour_completed = true;
        self.commit()
    }

    // -----------------------------------------------------------------------
    // Export
    // -----------------------------------------------------------------------

    /// Everything held for one patient, with its masked view and the audit
    /// entry describing the export. `None` if the patient does not exist.
    #[instrument(skip_all)]
    pub fn export_patient(&self, patient_id: &RecordId) -> Option<Exported<PatientExport>> {
        let patient = self.get_patient(patient_id)?;
        let masked_patient = mask_patient(patient);

        let payload = PatientExport {
            version: EXPORT_VERSION,
            patient: patient.clone(),
            masked_patient: masked_patient.clone(),
            assessments: cloned(self.owned_by(patient_id)),
            vitals: cloned(self.owned_by(patient_id)),
            goals: cloned(self.owned_by(patient_id)),
            education: cloned(self.owned_by(patient_id)),
            exported_at: Utc::now(),
        };

        let counts = BTreeMap::from([
            (DataType::Patients, 1),
            (DataType::Assessments, payload.assessments.len()),
            (DataType::Vitals, payload.vitals.len()),
            (DataType::Goals, payload.goals.len()),
            (DataType::Education, payload.education.len()),
        ]);
        let masked = MaskedExport::new(vec![masked_patient], counts);
        let audit = create_audit_log_entry(
            AuditAction::ExportPatientData,
            AuditSubject::Patient(&masked.patients[0]),
            export_metadata(&masked),
        );

        info!(subject = %audit.subject, "patient export prepared");
        Some(Exported {
            payload,
            masked,
            audit,
        })
    }

    /// The whole store in backup form.
    #[instrument(skip_all)]
    pub fn export_all(&self) -> Exported<StoreExport> {
        let masked_patients = mask_patient_batch(&self.state.patients);
        let payload = StoreExport {
            version: EXPORT_VERSION,
            patients: self.state.patients.clone(),
            masked_patients: masked_patients.clone(),
            assessments: self.state.assessments.clone(),
            vitals: self.state.vitals.clone(),
            goals: self.state.goals.clone(),
            education: self.state.education.clone(),
            config: self.state.config.clone(),
            exported_at: Utc::now(),
        };

        let masked = MaskedExport::new(masked_patients, self.counts());
        let audit = create_audit_log_entry(
            AuditAction::ExportAllData,
            AuditSubject::AllPatients {
                count: masked.patients.len(),
            },
            export_metadata(&masked),
        );

        info!(patients = masked.patients.len(), "full export prepared");
        Exported {
            payload,
            masked,
            audit,
        }
    }

    // -----------------------------------------------------------------------
    // Import and reset
    // -----------------------------------------------------------------------

    /// Replace the whole state from a backup object.
    ///
    /// Missing fields take their defaults and malformed elements are skipped.
    /// Records whose patient is not part of the backup are dropped. A value
    /// that is not an object changes nothing. Onboarding flags absent from the
    /// backup keep their current values; the legacy-migration marker is never
    /// taken from a backup.
    #[instrument(skip_all)]
    pub fn import_backup(&mut self, data: &Value) -> Result<ImportSummary> {
        let Some((mut imported, losses)) = ClinicalState::from_value_lossy(data) else {
            warn!("backup is not an object; nothing imported");
            return Ok(ImportSummary::default());
        };

        if data.get("hasBeenWelcomed").is_none() {
            imported.has_been_welcomed = self.state.has_been_welcomed;
        }
        if data.get("tourCompleted").is_none() {
            imported.tour_completed = self.state.tour_completed;
        }
        imported.legacy_migrated_at = self.state.legacy_migrated_at;

        self.state = imported;
        let summary = ImportSummary {
            applied: true,
            imported: self.counts(),
            losses,
        };
        info!(
            records = self.state.record_count(),
            ?losses,
            "backup imported"
        );

        self.commit()?;
        Ok(summary)
    }

    /// Reset every collection, the config and the onboarding flags.
    #[instrument(skip_all)]
    pub fn clear_all_data(&mut self) -> Result<()> {
        self.state = ClinicalState {
            legacy_migrated_at: self.state.legacy_migrated_at,
            ..ClinicalState::default()
        };
        info!("all clinical data cleared");
        self.commit()
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub fn generate_id(&self) -> RecordId {
        RecordId::generate()
    }

    pub fn counts(&self) -> BTreeMap<DataType, usize> {
        DataType::ALL
            .into_iter()
            .map(|data_type| {
                let count = match data_type {
                    DataType::Patients => self.state.patients.len(),
                    DataType::Assessments => self.state.assessments.len(),
                    DataType::Vitals => self.state.vitals.len(),
                    DataType::Goals => self.state.goals.len(),
                    DataType::Education => self.state.education.len(),
                };
                (data_type, count)
            })
            .collect()
    }

    /// True when startup found saved data it could not read and began empty.
    pub fn recovered_from_unreadable_state(&self) -> bool {
        self.recovered_from_unreadable
    }

    /// Banner text for the host when startup fell back to an empty store.
    pub fn startup_notice(&self) -> Option<HumanError> {
        self.recovered_from_unreadable.then(unreadable_store_notice)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether the stored snapshot was written by someone else since this
    /// instance last loaded or committed.
    pub fn has_external_changes(&self) -> Result<bool> {
        let stored = match self.storage.lookup::<StoredRevision>(STATE_KEY)? {
            Lookup::Found(stored) => stored.revision,
            Lookup::Missing => 0,
            // Still the unreadable snapshot we started from.
            Lookup::Unreadable if self.recovered_from_unreadable && self.revision == 0 => {
                return Ok(false);
            }
            Lookup::Unreadable => return Ok(true),
        };
        Ok(stored != self.revision)
    }

    /// Report from the importer run during `open`, if it completed.
    pub fn last_migration(&self) -> Option<&MigrationReport> {
        self.last_migration.as_ref()
    }

    pub fn storage(&self) -> &EncryptedStorage<M> {
        &self.storage
    }
}

fn cloned<T: Clone>(records: Vec<&T>) -> Vec<T> {
    records.into_iter().cloned().collect()
}

fn export_metadata(masked: &MaskedExport) -> BTreeMap<String, Value> {
    BTreeMap::from([
        ("dataTypes".to_owned(), json!(masked.data_types)),
        ("recordCounts".to_owned(), json!(masked.record_counts)),
        ("exportVersion".to_owned(), json!(EXPORT_VERSION)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use carevault_core::types::{AnswerValue, VitalReading};
    use carevault_security::cipher::StorageKey;
    use carevault_security::medium::MemoryMedium;

    fn fresh() -> (ClinicalStore<MemoryMedium>, MemoryMedium, StorageKey) {
        let medium = MemoryMedium::new();
        let key = StorageKey::generate();
        let store = ClinicalStore::open(storage_for(&medium, &key)).unwrap();
        (store, medium, key)
    }

    fn storage_for(medium: &MemoryMedium, key: &StorageKey) -> EncryptedStorage<MemoryMedium> {
        let identity = key.export_identity().unwrap();
        EncryptedStorage::new(medium.clone(), StorageKey::from_identity_str(&identity).unwrap())
    }

    #[test]
    fn record_for_unknown_patient_is_rejected() {
        let (mut store, _, _) = fresh();
        let before = store.revision();
        let err = store
            .save_assessment(AssessmentResult::new(RecordId::from("ghost"), "phq9", "PHQ-9"))
            .unwrap_err();
        assert!(matches!(err, CarevaultError::UnknownPatient { kind: "assessment", .. }));
        assert!(store.state.assessments.is_empty());
        assert_eq!(store.revision(), before);
    }

    #[test]
    fn every_save_commits_a_new_revision() {
        let (mut store, _, _) = fresh();
        let start = store.revision();
        let patient = store.save_patient(PatientProfile::new("Jane", "Doe")).unwrap();
        store
            .save_vital_signs(VitalSigns::new(patient.id.clone(), VitalReading::heart_rate(64.0)))
            .unwrap();
        assert_eq!(store.revision(), start + 2);
        assert!(!store.has_external_changes().unwrap());
    }

    #[test]
    fn vitals_filter_by_type_newest_first() {
        let (mut store, _, _) = fresh();
        let patient = store.save_patient(PatientProfile::new("Jane", "Doe")).unwrap();

        let mut older = VitalSigns::new(patient.id.clone(), VitalReading::weight(70.0));
        older.timestamp = Utc::now() - chrono::Duration::days(2);
        store.save_vital_signs(older).unwrap();
        store
            .save_vital_signs(VitalSigns::new(patient.id.clone(), VitalReading::weight(69.5)))
            .unwrap();
        store
            .save_vital_signs(VitalSigns::new(patient.id.clone(), VitalReading::blood_pressure(118, 76)))
            .unwrap();

        let weights = store.get_patient_vitals(&patient.id, Some(VitalType::Weight));
        assert_eq!(weights.len(), 2);
        assert_eq!(weights[0].reading.scalar(), Some(69.5));
        assert_eq!(store.get_patient_vitals(&patient.id, None).len(), 3);
    }

    #[test]
    fn single_record_deletes() {
        let (mut store, _, _) = fresh();
        let patient = store.save_patient(PatientProfile::new("Jane", "Doe")).unwrap();
        let assessment = store
            .save_assessment(
                AssessmentResult::new(patient.id.clone(), "phq9", "PHQ-9")
                    .with_answer("q1", AnswerValue::Number(2.0)),
            )
            .unwrap();

        assert!(store.delete_assessment(&assessment.id).unwrap());
        assert!(!store.delete_assessment(&assessment.id).unwrap());
        assert!(!store.delete_goal(&RecordId::from("none")).unwrap());
        assert!(store.get_patient(&patient.id).is_some());
    }

    #[test]
    fn onboarding_flags_persist() {
        let (mut store, medium, key) = fresh();
        assert!(store.is_first_visit());
        assert!(store.should_show_tour());
        store.mark_welcomed().unwrap();
        store.mark_tour_completed().unwrap();

        let reopened = ClinicalStore::open(storage_for(&medium, &key)).unwrap();
        assert!(!reopened.is_first_visit());
        assert!(!reopened.should_show_tour());
    }

    #[test]
    fn config_updates_persist() {
        let (mut store, medium, key) = fresh();
        let updated = store
            .update_config(&ConfigUpdate {
                auto_backup: Some(true),
                retention_period_days: Some(30),
                ..ConfigUpdate::default()
            })
            .unwrap();
        assert!(updated.auto_backup);
        assert!(updated.encryption_enabled);

        let reopened = ClinicalStore::open(storage_for(&medium, &key)).unwrap();
        assert_eq!(reopened.config().retention_period_days, 30);
    }

    #[test]
    fn export_all_reports_counts_and_masks() {
        let (mut store, _, _) = fresh();
        let patient = store
            .save_patient(PatientProfile::new("Jane", "Doe").with_medical_record_number("12345"))
            .unwrap();
        store
            .save_vital_signs(VitalSigns::new(patient.id.clone(), VitalReading::heart_rate(70.0)))
            .unwrap();

        let exported = store.export_all();
        assert_eq!(exported.payload.patients.len(), 1);
        assert_eq!(exported.masked.record_counts[&DataType::Vitals], 1);
        assert_eq!(exported.masked.data_types, vec![DataType::Patients, DataType::Vitals]);
        assert_eq!(exported.audit.action, AuditAction::ExportAllData);
        assert_eq!(exported.audit.metadata["dataTypes"], json!(["patients", "vitals"]));

        let masked_json = serde_json::to_string(&exported.masked).unwrap();
        assert!(!masked_json.contains("12345"));
        assert!(!masked_json.contains("Jane"));
    }

    #[test]
    fn export_of_unknown_patient_is_none() {
        let (store, _, _) = fresh();
        assert!(store.export_patient(&RecordId::from("nobody")).is_none());
    }

    #[test]
    fn non_object_backup_is_a_no_op() {
        let (mut store, _, _) = fresh();
        store.save_patient(PatientProfile::new("Jane", "Doe")).unwrap();
        let revision = store.revision();

        let summary = store.import_backup(&json!([1, 2, 3])).unwrap();
        assert!(!summary.applied);
        assert_eq!(store.get_all_patients().len(), 1);
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn backup_round_trips_through_export() {
        let (mut source, _, _) = fresh();
        let patient = source.save_patient(PatientProfile::new("Jane", "Doe")).unwrap();
        source
            .save_goal(GoalTracking::new(
                patient.id.clone(),
                carevault_core::types::GoalCategory::Exercise,
                "Walk daily",
                carevault_core::types::GoalFrequency::Daily,
            ))
            .unwrap();
        let backup = serde_json::to_value(&source.export_all().payload).unwrap();

        let (mut target, _, _) = fresh();
        target.mark_welcomed().unwrap();
        let summary = target.import_backup(&backup).unwrap();

        assert!(summary.applied);
        assert_eq!(summary.imported[&DataType::Goals], 1);
        assert_eq!(target.get_patient_goals(&patient.id).len(), 1);
        // Flags the backup does not carry are kept.
        assert!(!target.is_first_visit());
    }

    #[test]
    fn clear_keeps_migration_marker() {
        let (mut store, _, _) = fresh();
        let marker = store.state.legacy_migrated_at;
        assert!(marker.is_some());

        store.save_patient(PatientProfile::new("Jane", "Doe")).unwrap();
        store.mark_welcomed().unwrap();
        store.clear_all_data().unwrap();

        assert!(store.get_all_patients().is_empty());
        assert!(store.is_first_visit());
        assert_eq!(store.state.legacy_migrated_at, marker);
    }

    #[test]
    fn foreign_commit_is_detected() {
        let (mut store, medium, key) = fresh();
        let mut other = ClinicalStore::open(storage_for(&medium, &key)).unwrap();
        assert!(!store.has_external_changes().unwrap());

        other.save_patient(PatientProfile::new("John", "Roe")).unwrap();
        assert!(store.has_external_changes().unwrap());
        assert!(!other.has_external_changes().unwrap());
    }

    #[test]
    fn generated_ids_are_unique() {
        let (store, _, _) = fresh();
        let ids: std::collections::HashSet<_> = (0..500).map(|_| store.generate_id()).collect();
        assert_eq!(ids.len(), 500);
    }
}
