// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The store's full state and the envelope it is persisted in.
//
// Envelope (encrypted as a single unit under STATE_KEY):
//   { "version": 1, "revision": <commits so far>, "state": { ...ClinicalState } }

use std::collections::HashSet;

use carevault_core::StorageConfig;
use carevault_core::types::{
    AssessmentResult, EducationProgress, GoalTracking, PatientProfile, RecordId, Timestamp,
    VitalSigns,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::records::ClinicalRecord;

/// Adapter key holding the envelope.
pub const STATE_KEY: &str = "clinical-store";

/// Current envelope format version.
pub const STATE_VERSION: u32 = 1;

/// Every clinical collection plus UI flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClinicalState {
    pub patients: Vec<PatientProfile>,
    pub assessments: Vec<AssessmentResult>,
    pub vitals: Vec<VitalSigns>,
    pub goals: Vec<GoalTracking>,
    pub education: Vec<EducationProgress>,
    pub config: StorageConfig,
    pub has_been_welcomed: bool,
    pub tour_completed: bool,
    /// Set once the legacy importer has run to completion.
    pub legacy_migrated_at: Option<Timestamp>,
}

/// Borrowed form written on every commit.
#[derive(Serialize)]
pub(crate) struct EnvelopeRef<'a> {
    pub version: u32,
    pub revision: u64,
    pub state: &'a ClinicalState,
}

/// What a lossy parse had to throw away.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseLosses {
    /// Elements that did not parse as their record type.
    pub malformed: usize,
    /// Records dropped because their patient is not present.
    pub orphaned: usize,
    /// Earlier records replaced by a later one with the same id.
    pub duplicates: usize,
}

impl ClinicalState {
    /// Build a state from loosely shaped JSON.
    ///
    /// Returns `None` when `value` is not an object. Missing or mistyped
    /// fields fall back to their defaults, malformed collection elements are
    /// skipped one by one, and the result always satisfies the referential
    /// invariant (no record points at an absent patient).
    pub fn from_value_lossy(value: &Value) -> Option<(Self, ParseLosses)> {
        let object = value.as_object()?;
        let mut losses = ParseLosses::default();

        let mut state = Self {
            patients: parse_collection(object, "patients", &mut losses),
            assessments: parse_collection(object, "assessments", &mut losses),
            vitals: parse_collection(object, "vitals", &mut losses),
            goals: parse_collection(object, "goals", &mut losses),
            education: parse_collection(object, "education", &mut losses),
            config: object
                .get("config")
                .and_then(|c| StorageConfig::deserialize(c).ok())
                .unwrap_or_default(),
            has_been_welcomed: flag(object, "hasBeenWelcomed"),
            tour_completed: flag(object, "tourCompleted"),
            legacy_migrated_at: object
                .get("legacyMigratedAt")
                .and_then(|t| Timestamp::deserialize(t).ok()),
        };

        losses.duplicates += dedupe_by_id(&mut state.patients)
            + dedupe_by_id(&mut state.assessments)
            + dedupe_by_id(&mut state.vitals)
            + dedupe_by_id(&mut state.goals)
            + dedupe_by_id(&mut state.education);
        losses.orphaned += state.drop_orphans();

        Some((state, losses))
    }

    /// Remove every record whose patient is not in `patients`; returns how
    /// many were removed.
    pub fn drop_orphans(&mut self) -> usize {
        let known: HashSet<RecordId> = self.patients.iter().map(|p| p.id.clone()).collect();
        retain_owned(&mut self.assessments, &known)
            + retain_owned(&mut self.vitals, &known)
            + retain_owned(&mut self.goals, &known)
            + retain_owned(&mut self.education, &known)
    }

    /// Remove `patient_id` and everything that references it in one step.
    pub(crate) fn remove_patient_cascade(&mut self, patient_id: &RecordId) -> usize {
        let before = self.record_count();
        self.patients.retain(|p| &p.id != patient_id);
        self.assessments.retain(|r| &r.patient_id != patient_id);
        self.vitals.retain(|r| &r.patient_id != patient_id);
        self.goals.retain(|r| &r.patient_id != patient_id);
        self.education.retain(|r| &r.patient_id != patient_id);
        before - self.record_count()
    }

    pub fn record_count(&self) -> usize {
        self.patients.len()
            + self.assessments.len()
            + self.vitals.len()
            + self.goals.len()
            + self.education.len()
    }
}

fn flag(object: &Map<String, Value>, field: &str) -> bool {
    object.get(field).and_then(Value::as_bool).unwrap_or(false)
}

fn parse_collection<T: DeserializeOwned>(
    object: &Map<String, Value>,
    field: &str,
    losses: &mut ParseLosses,
) -> Vec<T> {
    match object.get(field) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| match T::deserialize(item) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(field, index, error = %e, "skipping malformed record");
                    losses.malformed += 1;
                    None
                }
            })
            .collect(),
        Some(_) => {
            warn!(field, "collection is not an array; using an empty one");
            losses.malformed += 1;
            Vec::new()
        }
    }
}

/// Keep only the last record for each id.
fn dedupe_by_id<T: ClinicalRecord>(records: &mut Vec<T>) -> usize {
    let before = records.len();
    let mut seen = HashSet::new();
    let mut kept: Vec<T> = Vec::with_capacity(before);
    for record in records.drain(..).rev() {
        if seen.insert(record.id().clone()) {
            kept.push(record);
        }
    }
    kept.reverse();
    *records = kept;
    before - records.len()
}

fn retain_owned<T: ClinicalRecord>(records: &mut Vec<T>, known: &HashSet<RecordId>) -> usize {
    let before = records.len();
    records.retain(|r| r.patient_id().is_none_or(|pid| known.contains(pid)));
    before - records.len()
}
