// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core clinical record types. Records are plain data; the store owns every
// instance and enforces the cross-record invariants.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Instant in UTC used for every record timestamp.
pub type Timestamp = DateTime<Utc>;

fn now() -> Timestamp {
    Utc::now()
}

/// Identifier for any stored record.
///
/// Generated ids are UUIDv7 strings (millisecond time prefix plus random
/// bits). Ids coming from backups or legacy data are accepted verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The clinical collections held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Patients,
    Assessments,
    Vitals,
    Goals,
    Education,
}

impl DataType {
    pub const ALL: [DataType; 5] = [
        Self::Patients,
        Self::Assessments,
        Self::Vitals,
        Self::Goals,
        Self::Education,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Patients => "patients",
            Self::Assessments => "assessments",
            Self::Vitals => "vitals",
            Self::Goals => "goals",
            Self::Education => "education",
        }
    }
}

// ---------------------------------------------------------------------------
// Patient profile
// ---------------------------------------------------------------------------

/// A medication on the patient's list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    pub id: RecordId,
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl Medication {
    pub fn new(name: impl Into<String>, dosage: impl Into<String>, frequency: impl Into<String>) -> Self {
        Self {
            id: RecordId::generate(),
            name: name.into(),
            dosage: dosage.into(),
            frequency: frequency.into(),
            active: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyContact {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub relationship: Option<String>,
}

/// Measurement system used when the UI renders values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PatientPreferences {
    pub units: UnitSystem,
    pub reminders_enabled: bool,
    pub language: String,
}

impl Default for PatientPreferences {
    fn default() -> Self {
        Self {
            units: UnitSystem::Metric,
            reminders_enabled: false,
            language: "en".into(),
        }
    }
}

/// Demographic and clinical profile of one patient.
///
/// `created_at` is fixed by the store at first save; `updated_at` moves on
/// every save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientProfile {
    pub id: RecordId,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub medical_record_number: Option<String>,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub medications: Vec<Medication>,
    #[serde(default)]
    pub emergency_contact: Option<EmergencyContact>,
    #[serde(default)]
    pub preferences: PatientPreferences,
    #[serde(default = "now")]
    pub created_at: Timestamp,
    #[serde(default = "now")]
    pub updated_at: Timestamp,
}

impl PatientProfile {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: RecordId::generate(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            date_of_birth: None,
            medical_record_number: None,
            conditions: Vec::new(),
            allergies: Vec::new(),
            medications: Vec::new(),
            emergency_contact: None,
            preferences: PatientPreferences::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_date_of_birth(mut self, date_of_birth: NaiveDate) -> Self {
        self.date_of_birth = Some(date_of_birth);
        self
    }

    pub fn with_medical_record_number(mut self, mrn: impl Into<String>) -> Self {
        self.medical_record_number = Some(mrn.into());
        self
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

// ---------------------------------------------------------------------------
// Assessments
// ---------------------------------------------------------------------------

/// A single questionnaire answer.
///
/// Untagged on the wire; an empty list reads back as `TextList`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Bool(bool),
    Number(f64),
    Text(String),
    TextList(Vec<String>),
    NumberList(Vec<f64>),
}

/// Output of a clinical calculator or questionnaire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentResult {
    pub id: RecordId,
    pub patient_id: RecordId,
    pub tool_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub answers: BTreeMap<String, AnswerValue>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default = "now")]
    pub timestamp: Timestamp,
}

impl AssessmentResult {
    pub fn new(patient_id: RecordId, tool_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            id: RecordId::generate(),
            patient_id,
            tool_id: tool_id.into(),
            tool_name: tool_name.into(),
            answers: BTreeMap::new(),
            score: None,
            severity: None,
            recommendations: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_answer(mut self, question_id: impl Into<String>, answer: AnswerValue) -> Self {
        self.answers.insert(question_id.into(), answer);
        self
    }
}

// ---------------------------------------------------------------------------
// Vital signs
// ---------------------------------------------------------------------------

/// Kind of vital sign, used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VitalType {
    BloodPressure,
    BloodGlucose,
    Weight,
    Temperature,
    HeartRate,
}

impl VitalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BloodPressure => "blood_pressure",
            Self::BloodGlucose => "blood_glucose",
            Self::Weight => "weight",
            Self::Temperature => "temperature",
            Self::HeartRate => "heart_rate",
        }
    }

    pub fn default_unit(&self) -> &'static str {
        match self {
            Self::BloodPressure => "mmHg",
            Self::BloodGlucose => "mg/dL",
            Self::Weight => "kg",
            Self::Temperature => "°C",
            Self::HeartRate => "bpm",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloodPressure {
    pub systolic: u16,
    pub diastolic: u16,
}

/// A vital-sign measurement; the value's shape is fixed by its type.
///
/// Serialized as `{"type": "...", "value": ...}` inside the owning record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VitalReading {
    BloodPressure { value: BloodPressure },
    BloodGlucose { value: f64 },
    Weight { value: f64 },
    Temperature { value: f64 },
    HeartRate { value: f64 },
}

impl VitalReading {
    pub fn blood_pressure(systolic: u16, diastolic: u16) -> Self {
        Self::BloodPressure {
            value: BloodPressure {
                systolic,
                diastolic,
            },
        }
    }

    pub fn heart_rate(bpm: f64) -> Self {
        Self::HeartRate { value: bpm }
    }

    pub fn weight(value: f64) -> Self {
        Self::Weight { value }
    }

    pub fn kind(&self) -> VitalType {
        match self {
            Self::BloodPressure { .. } => VitalType::BloodPressure,
            Self::BloodGlucose { .. } => VitalType::BloodGlucose,
            Self::Weight { .. } => VitalType::Weight,
            Self::Temperature { .. } => VitalType::Temperature,
            Self::HeartRate { .. } => VitalType::HeartRate,
        }
    }

    /// Scalar value, or `None` for blood pressure.
    pub fn scalar(&self) -> Option<f64> {
        match *self {
            Self::BloodPressure { .. } => None,
            Self::BloodGlucose { value }
            | Self::Weight { value }
            | Self::Temperature { value }
            | Self::HeartRate { value } => Some(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalSigns {
    pub id: RecordId,
    pub patient_id: RecordId,
    #[serde(flatten)]
    pub reading: VitalReading,
    pub unit: String,
    #[serde(default = "now")]
    pub timestamp: Timestamp,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl VitalSigns {
    /// New reading taken now, in the type's default unit.
    pub fn new(patient_id: RecordId, reading: VitalReading) -> Self {
        Self {
            id: RecordId::generate(),
            patient_id,
            unit: reading.kind().default_unit().to_owned(),
            reading,
            timestamp: Utc::now(),
            notes: None,
            location: None,
        }
    }

    pub fn kind(&self) -> VitalType {
        self.reading.kind()
    }
}

// ---------------------------------------------------------------------------
// Goals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalCategory {
    Exercise,
    Nutrition,
    Medication,
    Monitoring,
    Sleep,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalFrequency {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    #[default]
    Active,
    Completed,
    Paused,
}

/// One check-in against a goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalCompletion {
    pub date: NaiveDate,
    pub completed: bool,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalTracking {
    pub id: RecordId,
    pub patient_id: RecordId,
    pub category: GoalCategory,
    pub target: String,
    pub frequency: GoalFrequency,
    /// Ordered by date.
    #[serde(default)]
    pub completions: Vec<GoalCompletion>,
    #[serde(default)]
    pub status: GoalStatus,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

impl GoalTracking {
    pub fn new(
        patient_id: RecordId,
        category: GoalCategory,
        target: impl Into<String>,
        frequency: GoalFrequency,
    ) -> Self {
        Self {
            id: RecordId::generate(),
            patient_id,
            category,
            target: target.into(),
            frequency,
            completions: Vec::new(),
            status: GoalStatus::Active,
            start_date: Utc::now().date_naive(),
            end_date: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Education
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EducationProgress {
    pub id: RecordId,
    pub patient_id: RecordId,
    pub module_id: String,
    #[serde(default)]
    pub completed_at: Option<Timestamp>,
    /// Percentage, 0 to 100.
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub quiz_answers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub time_spent_secs: u64,
}

impl EducationProgress {
    pub fn new(patient_id: RecordId, module_id: impl Into<String>) -> Self {
        Self {
            id: RecordId::generate(),
            patient_id,
            module_id: module_id.into(),
            completed_at: None,
            progress: 0,
            quiz_answers: None,
            time_spent_secs: 0,
        }
    }
}
