// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// One-time import of plaintext readings written before storage was encrypted.
//
// Legacy keys live outside the encrypted namespace and hold JSON arrays:
//   bp-readings, bp-readings:*         [{ systolic, diastolic, pulse?, timestamp|date, notes?, patientId? }]
//   weight-readings, weight-readings:* [{ weight, unit?, timestamp|date, notes?, patientId? }]
//
// The `legacyMigratedAt` marker is committed in the same snapshot as the
// imported vitals, so once a run has been persisted no later run can import
// the same data again. Legacy keys whose entries all converted are removed
// after that commit; keys with problems stay where they are.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use carevault_core::error::Result;
use carevault_core::types::{PatientProfile, RecordId, Timestamp, VitalReading, VitalSigns};
use carevault_security::medium::StorageMedium;

use crate::store::ClinicalStore;

pub const LEGACY_BP_KEY: &str = "bp-readings";
pub const LEGACY_WEIGHT_KEY: &str = "weight-readings";

/// Name given to the profile that receives readings with no known owner.
const PLACEHOLDER_NAME: (&str, &str) = ("Imported", "Patient");

#[derive(Debug, Clone, Default)]
pub struct MigrationOptions {
    /// Patient that receives readings which do not name an existing patient.
    pub target_patient: Option<RecordId>,
}

/// A legacy entry (or whole key) that could not be imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationIssue {
    pub key: String,
    /// Position in the key's array; `None` when the whole key was unusable.
    pub index: Option<usize>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    /// Vital-sign records created.
    pub migrated: usize,
    /// True when an earlier run had already completed; nothing was read.
    pub already_complete: bool,
    pub errors: Vec<MigrationIssue>,
    /// Profile created to own readings with nowhere else to go.
    pub placeholder_patient: Option<RecordId>,
}

// ---------------------------------------------------------------------------
// Legacy shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LegacyKind {
    BloodPressure,
    Weight,
}

impl LegacyKind {
    fn of_key(key: &str) -> Option<Self> {
        let matches = |base: &str| {
            key == base || key.strip_prefix(base).is_some_and(|rest| rest.starts_with(':'))
        };
        if matches(LEGACY_BP_KEY) {
            Some(Self::BloodPressure)
        } else if matches(LEGACY_WEIGHT_KEY) {
            Some(Self::Weight)
        } else {
            None
        }
    }
}

/// Old builds sometimes stored numbers as text.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LegacyNumber {
    Number(f64),
    Text(String),
}

impl LegacyNumber {
    fn finite(&self) -> Option<f64> {
        let value = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

/// Epoch milliseconds, or text in RFC 3339, naive date-time or date form.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LegacyTimestamp {
    Millis(f64),
    Text(String),
}

impl LegacyTimestamp {
    fn resolve(&self) -> Option<Timestamp> {
        match self {
            Self::Millis(ms) if ms.is_finite() => DateTime::from_timestamp_millis(*ms as i64),
            Self::Millis(_) => None,
            Self::Text(text) => parse_timestamp_text(text.trim()),
        }
    }
}

fn parse_timestamp_text(text: &str) -> Option<Timestamp> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    text.parse::<i64>().ok().and_then(DateTime::from_timestamp_millis)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyBloodPressure {
    systolic: LegacyNumber,
    diastolic: LegacyNumber,
    #[serde(default)]
    pulse: Option<LegacyNumber>,
    #[serde(default)]
    timestamp: Option<LegacyTimestamp>,
    #[serde(default)]
    date: Option<LegacyTimestamp>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    patient_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyWeight {
    weight: LegacyNumber,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    timestamp: Option<LegacyTimestamp>,
    #[serde(default)]
    date: Option<LegacyTimestamp>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    patient_id: Option<String>,
}

fn taken_at(stamp: Option<&LegacyTimestamp>) -> std::result::Result<Timestamp, String> {
    match stamp {
        None => Err("no timestamp or date".to_owned()),
        Some(t) => t.resolve().ok_or_else(|| "unrecognised timestamp".to_owned()),
    }
}

/// Whole mmHg value in a plausible range.
fn pressure(field: &str, value: &LegacyNumber) -> std::result::Result<u16, String> {
    value
        .finite()
        .map(f64::round)
        .filter(|v| (1.0..=400.0).contains(v))
        .map(|v| v as u16)
        .ok_or_else(|| format!("{field} is not a valid pressure"))
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// Readings converted from one legacy entry, not yet attributed to a patient.
struct Converted {
    key: String,
    index: usize,
    patient_hint: Option<RecordId>,
    vitals: Vec<VitalSigns>,
}

/// A vital with a placeholder owner; `attribute_and_apply` sets the real one.
fn unowned(reading: VitalReading, taken_at: Timestamp) -> VitalSigns {
    let mut vital = VitalSigns::new(RecordId::from(""), reading);
    vital.timestamp = taken_at;
    vital
}

/// What one legacy entry yields. `issue` names a part of the entry that was
/// dropped while the rest converted.
struct EntryReadings {
    patient_id: Option<String>,
    vitals: Vec<VitalSigns>,
    issue: Option<String>,
}

fn convert_blood_pressure(entry: &Value) -> std::result::Result<EntryReadings, String> {
    let legacy = LegacyBloodPressure::deserialize(entry).map_err(|e| e.to_string())?;
    let systolic = pressure("systolic", &legacy.systolic)?;
    let diastolic = pressure("diastolic", &legacy.diastolic)?;
    let at = taken_at(legacy.timestamp.as_ref().or(legacy.date.as_ref()))?;

    let mut bp = unowned(VitalReading::blood_pressure(systolic, diastolic), at);
    bp.notes = legacy.notes;
    let mut readings = EntryReadings {
        patient_id: legacy.patient_id,
        vitals: vec![bp],
        issue: None,
    };

    if let Some(pulse) = &legacy.pulse {
        match pulse.finite().filter(|bpm| *bpm > 0.0) {
            Some(bpm) => readings.vitals.push(unowned(VitalReading::heart_rate(bpm), at)),
            None => {
                readings.issue =
                    Some("pulse is not a valid heart rate; kept the blood pressure only".to_owned());
            }
        }
    }
    Ok(readings)
}

fn convert_weight(entry: &Value) -> std::result::Result<EntryReadings, String> {
    let legacy = LegacyWeight::deserialize(entry).map_err(|e| e.to_string())?;
    let weight = legacy
        .weight
        .finite()
        .filter(|w| *w > 0.0)
        .ok_or_else(|| "weight is not a positive number".to_owned())?;
    let at = taken_at(legacy.timestamp.as_ref().or(legacy.date.as_ref()))?;

    let mut vital = unowned(VitalReading::weight(weight), at);
    if let Some(unit) = legacy.unit.filter(|u| !u.trim().is_empty()) {
        vital.unit = unit;
    }
    vital.notes = legacy.notes;
    Ok(EntryReadings {
        patient_id: legacy.patient_id,
        vitals: vec![vital],
        issue: None,
    })
}

/// Convert every entry under one key. Problems are appended to `issues`.
fn convert_key(key: &str, kind: LegacyKind, raw: &str, issues: &mut Vec<MigrationIssue>) -> Vec<Converted> {
    let entries: Vec<Value> = match serde_json::from_str(raw) {
        Ok(entries) => entries,
        Err(e) => {
            issues.push(MigrationIssue {
                key: key.to_owned(),
                index: None,
                reason: format!("not a JSON array: {e}"),
            });
            return Vec::new();
        }
    };

    let mut converted = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let result = match kind {
            LegacyKind::BloodPressure => convert_blood_pressure(entry),
            LegacyKind::Weight => convert_weight(entry),
        };
        match result {
            Ok(readings) => {
                if let Some(reason) = readings.issue {
                    warn!(key, index, %reason, "legacy entry partly converted");
                    issues.push(MigrationIssue {
                        key: key.to_owned(),
                        index: Some(index),
                        reason,
                    });
                }
                converted.push(Converted {
                    key: key.to_owned(),
                    index,
                    patient_hint: readings.patient_id.map(RecordId::from),
                    vitals: readings.vitals,
                });
            }
            Err(reason) => {
                warn!(key, index, %reason, "skipping malformed legacy entry");
                issues.push(MigrationIssue {
                    key: key.to_owned(),
                    index: Some(index),
                    reason,
                });
            }
        }
    }
    converted
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Import legacy readings into `store`, once.
///
/// Malformed entries are skipped and reported. An error is returned only
/// when the medium cannot be read or the final snapshot cannot be committed;
/// in the second case the store is left exactly as it was.
#[instrument(skip_all)]
pub fn run<M: StorageMedium>(
    store: &mut ClinicalStore<M>,
    options: &MigrationOptions,
) -> Result<MigrationReport> {
    if let Some(at) = store.state().legacy_migrated_at {
        debug!(%at, "legacy migration already complete");
        return Ok(MigrationReport {
            already_complete: true,
            ..MigrationReport::default()
        });
    }

    let medium = store.storage().medium();
    let mut sources = Vec::new();
    for key in medium.keys()? {
        if let Some(kind) = LegacyKind::of_key(&key)
            && let Some(raw) = medium.read(&key)?
        {
            sources.push((key, kind, raw));
        }
    }

    let mut report = MigrationReport::default();
    let mut converted = Vec::new();
    for (key, kind, raw) in &sources {
        converted.extend(convert_key(key, *kind, raw, &mut report.errors));
    }

    let snapshot = store.state().clone();
    attribute_and_apply(store, converted, options, &mut report);
    store.state_mut().legacy_migrated_at = Some(Utc::now());

    if let Err(e) = store.commit() {
        *store.state_mut() = snapshot;
        return Err(e);
    }

    // The readings are durable now; drop the plaintext copies that converted
    // cleanly.
    let problem_keys: HashSet<&str> = report.errors.iter().map(|i| i.key.as_str()).collect();
    let medium = store.storage().medium();
    let mut removal_issues = Vec::new();
    for (key, _, _) in sources.iter().filter(|(k, _, _)| !problem_keys.contains(k.as_str())) {
        if let Err(e) = medium.delete(key) {
            warn!(key = key.as_str(), error = %e, "could not remove migrated legacy key");
            removal_issues.push(MigrationIssue {
                key: key.clone(),
                index: None,
                reason: format!("migrated but not removed: {e}"),
            });
        }
    }
    report.errors.extend(removal_issues);

    info!(
        migrated = report.migrated,
        legacy_keys = sources.len(),
        errors = report.errors.len(),
        "legacy migration complete"
    );
    Ok(report)
}

/// Give each converted entry an owner and apply its vitals to the state.
fn attribute_and_apply<M: StorageMedium>(
    store: &mut ClinicalStore<M>,
    converted: Vec<Converted>,
    options: &MigrationOptions,
    report: &mut MigrationReport,
) {
    let target = options.target_patient.clone().filter(|id| {
        let found = store.get_patient(id).is_some();
        if !found {
            warn!("migration target patient does not exist; ignoring it");
        }
        found
    });
    let sole = match store.get_all_patients() {
        [only] => Some(only.id.clone()),
        _ => None,
    };

    for entry in converted {
        let owner = match entry.patient_hint.filter(|id| store.get_patient(id).is_some()) {
            Some(id) => id,
            None => match target.clone().or_else(|| sole.clone()) {
                Some(id) => id,
                None => match placeholder(store, report) {
                    Ok(id) => id,
                    Err(e) => {
                        report.errors.push(MigrationIssue {
                            key: entry.key,
                            index: Some(entry.index),
                            reason: e.to_string(),
                        });
                        continue;
                    }
                },
            },
        };

        for mut vital in entry.vitals {
            vital.patient_id = owner.clone();
            match store.apply(vital) {
                Ok(_) => report.migrated += 1,
                Err(e) => report.errors.push(MigrationIssue {
                    key: entry.key.clone(),
                    index: Some(entry.index),
                    reason: e.to_string(),
                }),
            }
        }
    }
}

/// The placeholder owner, created on first use within a run.
fn placeholder<M: StorageMedium>(
    store: &mut ClinicalStore<M>,
    report: &mut MigrationReport,
) -> Result<RecordId> {
    if let Some(id) = &report.placeholder_patient {
        return Ok(id.clone());
    }
    let (first, last) = PLACEHOLDER_NAME;
    let patient = store.apply(PatientProfile::new(first, last))?;
    info!("created placeholder patient for unattributed legacy readings");
    report.placeholder_patient = Some(patient.id.clone());
    Ok(patient.id)
}
