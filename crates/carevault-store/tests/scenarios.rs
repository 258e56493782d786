// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// End-to-end behaviour of the store over real media.

use carevault_core::error::CarevaultError;
use carevault_core::types::{
    AnswerValue, AssessmentResult, EducationProgress, GoalCategory, GoalCompletion,
    GoalFrequency, GoalTracking,
    PatientProfile, RecordId, VitalReading, VitalSigns, VitalType,
};
use carevault_security::audit::AuditAction;
use carevault_security::cipher::StorageKey;
use carevault_security::medium::{MemoryMedium, SqliteMedium, StorageMedium};
use carevault_security::storage::{ENCRYPTED_NAMESPACE, EncryptedStorage};
use carevault_store::ClinicalStore;
use carevault_store::state::STATE_KEY;
use serde_json::json;
use std::sync::OnceLock;

/// One identity shared by every store a test opens.
fn key() -> StorageKey {
    static IDENTITY: OnceLock<String> = OnceLock::new();
    let encoded = IDENTITY.get_or_init(|| {
        StorageKey::generate()
            .export_identity()
            .expect("x25519 keys export")
    });
    StorageKey::from_identity_str(encoded).expect("test identity")
}

fn open(medium: &MemoryMedium) -> ClinicalStore<MemoryMedium> {
    ClinicalStore::open(EncryptedStorage::new(medium.clone(), key())).expect("open store")
}

#[test]
fn export_masks_patient_and_emits_one_audit_entry() {
    let mut store = open(&MemoryMedium::new());
    let jane = store
        .save_patient(PatientProfile::new("Jane", "Doe").with_medical_record_number("12345"))
        .unwrap();
    store
        .save_vital_signs(VitalSigns::new(jane.id.clone(), VitalReading::blood_pressure(120, 80)))
        .unwrap();

    let exported = store.export_patient(&jane.id).expect("patient exists");

    assert_eq!(exported.masked.patients[0].initials, "J.D.");
    let masked_json = serde_json::to_string(&exported.masked).unwrap();
    assert!(!masked_json.contains("12345"));
    assert!(!masked_json.contains("Jane"));

    assert_eq!(exported.audit.action, AuditAction::ExportPatientData);
    assert!(exported.audit.subject.starts_with("J.D."));
    assert!(!serde_json::to_string(&exported.audit).unwrap().contains("12345"));

    // The full payload is still complete for legitimate use.
    assert_eq!(exported.payload.patient.medical_record_number.as_deref(), Some("12345"));
    assert_eq!(exported.payload.vitals.len(), 1);
}

#[test]
fn deleting_a_patient_cascades_to_every_collection() {
    let medium = MemoryMedium::new();
    let mut store = open(&medium);
    let jane = store.save_patient(PatientProfile::new("Jane", "Doe")).unwrap();
    let john = store.save_patient(PatientProfile::new("John", "Roe")).unwrap();

    for owner in [&jane, &john] {
        store
            .save_assessment(AssessmentResult::new(owner.id.clone(), "gad7", "GAD-7"))
            .unwrap();
        store
            .save_vital_signs(VitalSigns::new(owner.id.clone(), VitalReading::heart_rate(66.0)))
            .unwrap();
        store
            .save_goal(GoalTracking::new(
                owner.id.clone(),
                GoalCategory::Sleep,
                "Eight hours",
                GoalFrequency::Daily,
            ))
            .unwrap();
        store
            .save_education_progress(EducationProgress::new(owner.id.clone(), "sleep-hygiene"))
            .unwrap();
    }

    assert!(store.delete_patient(&jane.id).unwrap());

    assert!(store.get_patient(&jane.id).is_none());
    assert!(store.get_patient_assessments(&jane.id).is_empty());
    assert!(store.get_patient_vitals(&jane.id, None).is_empty());
    assert!(store.get_patient_goals(&jane.id).is_empty());
    assert!(store.get_patient_education_progress(&jane.id).is_empty());
    assert_eq!(store.get_patient_assessments(&john.id).len(), 1);

    // The cascade is durable too.
    let reopened = open(&medium);
    assert!(reopened.get_patient(&jane.id).is_none());
    assert!(reopened.get_patient_vitals(&jane.id, None).is_empty());
    assert_eq!(reopened.get_patient_goals(&john.id).len(), 1);
}

#[test]
fn legacy_reading_migrates_once() {
    let medium = MemoryMedium::new();
    medium
        .write(
            "bp-readings",
            &json!([{"systolic": 130, "diastolic": 85, "pulse": 72, "timestamp": 1_704_096_000_000_i64}])
                .to_string(),
        )
        .unwrap();

    let store = open(&medium);
    let report = store.last_migration().expect("migration ran");
    assert_eq!(report.migrated, 2);

    let owner = report.placeholder_patient.clone().expect("placeholder owner");
    let bp = store.get_patient_vitals(&owner, Some(VitalType::BloodPressure));
    assert_eq!(bp.len(), 1);
    assert_eq!(bp[0].reading, VitalReading::blood_pressure(130, 85));
    assert_eq!(bp[0].timestamp.timestamp_millis(), 1_704_096_000_000);
    let hr = store.get_patient_vitals(&owner, Some(VitalType::HeartRate));
    assert_eq!(hr.len(), 1);
    assert_eq!(hr[0].reading.scalar(), Some(72.0));
    drop(store);

    // Put the legacy key back to prove the marker alone stops a re-import.
    medium
        .write(
            "bp-readings",
            &json!([{"systolic": 130, "diastolic": 85, "pulse": 72, "timestamp": 1_704_096_000_000_i64}])
                .to_string(),
        )
        .unwrap();
    let again = open(&medium);
    assert!(again.last_migration().unwrap().already_complete);
    assert_eq!(again.get_patient_vitals(&owner, None).len(), 2);
    assert_eq!(again.get_all_patients().len(), 1);
}

#[test]
fn saving_twice_keeps_one_record() {
    let mut store = open(&MemoryMedium::new());
    let first = store.save_patient(PatientProfile::new("Jane", "Doe")).unwrap();

    let mut edited = first.clone();
    edited.allergies.push("penicillin".into());
    let second = store.save_patient(edited).unwrap();

    assert_eq!(store.get_all_patients().len(), 1);
    assert_eq!(second.created_at, first.created_at);
    assert!(second.updated_at >= first.updated_at);
    assert_eq!(store.get_patient(&first.id).unwrap().allergies, vec!["penicillin"]);
}

#[test]
fn failed_write_keeps_change_in_memory() {
    // Large enough for the empty snapshot, too small for a long condition list.
    let medium = MemoryMedium::with_quota(4_000);
    let mut store = open(&medium);
    let revision = store.revision();

    let mut patient = PatientProfile::new("Jane", "Doe");
    patient.conditions = (0..200).map(|i| format!("condition-{i}")).collect();
    let err = store.save_patient(patient.clone()).unwrap_err();

    assert!(err.is_persistence_failure());
    assert!(matches!(err, CarevaultError::Persistence(_)));
    assert!(store.get_patient(&patient.id).is_some());
    assert_eq!(store.revision(), revision);

    // Nothing reached the medium.
    let reopened = open(&medium);
    assert!(reopened.get_patient(&patient.id).is_none());
}

#[test]
fn state_survives_reopen_on_sqlite() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("vault.db");

    let jane_id = {
        let medium = SqliteMedium::open(&path).unwrap();
        let mut store = ClinicalStore::open(EncryptedStorage::new(medium, key())).unwrap();
        let jane = store.save_patient(PatientProfile::new("Jane", "Doe")).unwrap();
        store
            .save_vital_signs(VitalSigns::new(jane.id.clone(), VitalReading::weight(61.2)))
            .unwrap();
        jane.id
    };

    let medium = SqliteMedium::open(&path).unwrap();
    let store = ClinicalStore::open(EncryptedStorage::new(medium, key())).unwrap();
    assert_eq!(store.get_patient(&jane_id).unwrap().last_name, "Doe");
    assert_eq!(store.get_patient_vitals(&jane_id, None).len(), 1);
    assert!(!store.recovered_from_unreadable_state());
}

#[test]
fn corrupted_state_starts_empty_with_a_notice() {
    let medium = MemoryMedium::new();
    let mut store = open(&medium);
    store.save_patient(PatientProfile::new("Jane", "Doe")).unwrap();
    drop(store);

    let stored_key = format!("{ENCRYPTED_NAMESPACE}{STATE_KEY}");
    medium.write(&stored_key, "cv1:00ff00ff").unwrap();

    let store = open(&medium);
    assert!(store.get_all_patients().is_empty());
    assert!(store.recovered_from_unreadable_state());
    assert!(store.startup_notice().is_some());
}

#[test]
fn state_under_another_key_reads_as_empty() {
    let medium = MemoryMedium::new();
    let mut store = open(&medium);
    store.save_patient(PatientProfile::new("Jane", "Doe")).unwrap();
    drop(store);

    let stranger =
        ClinicalStore::open(EncryptedStorage::new(medium.clone(), StorageKey::generate())).unwrap();
    assert!(stranger.get_all_patients().is_empty());
    assert!(stranger.recovered_from_unreadable_state());
}

#[test]
fn stored_snapshot_contains_no_plaintext() {
    let medium = MemoryMedium::new();
    let mut store = open(&medium);
    store
        .save_patient(PatientProfile::new("Zelda", "Quartermaine").with_medical_record_number("MRN-998877"))
        .unwrap();

    for key in medium.keys().unwrap() {
        let raw = medium.read(&key).unwrap().unwrap();
        for needle in ["Zelda", "Quartermaine", "MRN-998877", "firstName", "patients"] {
            assert!(!raw.contains(needle), "{key} leaks {needle}");
        }
    }
}

#[test]
fn backup_drops_orphans_and_keeps_the_rest() {
    let mut store = open(&MemoryMedium::new());
    let summary = store
        .import_backup(&json!({
            "patients": [{"id": "p1", "firstName": "Jane", "lastName": "Doe"}],
            "vitals": [
                {"id": "v1", "patientId": "p1", "type": "weight", "value": 60, "unit": "kg",
                 "timestamp": "2026-01-01T00:00:00Z"},
                {"id": "v2", "patientId": "p9", "type": "weight", "value": 61, "unit": "kg",
                 "timestamp": "2026-01-01T00:00:00Z"},
                {"id": "v3", "patientId": "p1", "type": "blood_pressure", "value": 120, "unit": "mmHg"},
            ],
        }))
        .unwrap();

    assert!(summary.applied);
    assert_eq!(summary.losses.orphaned, 1);
    assert_eq!(summary.losses.malformed, 1);
    assert_eq!(store.get_patient_vitals(&RecordId::from("p1"), None).len(), 1);
}

#[test]
fn non_finite_numbers_are_refused_and_saved_records_survive_reopen() {
    let medium = MemoryMedium::new();
    let mut store = open(&medium);
    let jane = store.save_patient(PatientProfile::new("Jane", "Doe")).unwrap();

    let err = store
        .save_assessment(
            AssessmentResult::new(jane.id.clone(), "phq9", "PHQ-9")
                .with_answer("q1", AnswerValue::Number(f64::INFINITY)),
        )
        .unwrap_err();
    assert!(matches!(err, CarevaultError::InvalidRecord(_)));

    let mut goal = GoalTracking::new(
        jane.id.clone(),
        GoalCategory::Exercise,
        "Walk daily",
        GoalFrequency::Daily,
    );
    goal.completions.push(GoalCompletion {
        date: goal.start_date,
        completed: true,
        value: Some(f64::NAN),
        notes: None,
    });
    assert!(store.save_goal(goal.clone()).is_err());
    assert!(store.get_patient_assessments(&jane.id).is_empty());
    assert!(store.get_patient_goals(&jane.id).is_empty());

    store
        .save_assessment(
            AssessmentResult::new(jane.id.clone(), "phq9", "PHQ-9")
                .with_answer("q1", AnswerValue::NumberList(vec![1.0, 2.5])),
        )
        .unwrap();
    goal.completions[0].value = Some(30.0);
    store.save_goal(goal).unwrap();
    drop(store);

    let reopened = open(&medium);
    assert_eq!(reopened.get_patient_assessments(&jane.id).len(), 1);
    let goals = reopened.get_patient_goals(&jane.id);
    assert_eq!(goals.len(), 1);
    assert_eq!(goals[0].completions[0].value, Some(30.0));
}
