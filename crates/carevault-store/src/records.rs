// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Uniform access to the five clinical collections.

use carevault_core::error::{CarevaultError, Result};
use carevault_core::types::{
    AnswerValue, AssessmentResult, DataType, EducationProgress, GoalTracking, PatientProfile, RecordId,
    Timestamp, VitalSigns,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::state::ClinicalState;

/// A record type stored in one of the store's collections.
pub trait ClinicalRecord: Clone + Serialize + DeserializeOwned {
    /// Human-readable name used in errors.
    const KIND: &'static str;
    const DATA_TYPE: DataType;

    fn id(&self) -> &RecordId;

    /// The owning patient, or `None` for a patient profile itself.
    fn patient_id(&self) -> Option<&RecordId>;

    fn collection(state: &ClinicalState) -> &Vec<Self>;

    fn collection_mut(state: &mut ClinicalState) -> &mut Vec<Self>;

    /// Validate and normalise the record before it is stored. `previous` is
    /// the stored record with the same id, if any.
    fn prepare(&mut self, _previous: Option<&Self>, _now: Timestamp) -> Result<()> {
        Ok(())
    }
}

fn require_finite(kind: &str, field: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(CarevaultError::InvalidRecord(format!("{kind} {field} must be a finite number")))
    }
}

impl ClinicalRecord for PatientProfile {
    const KIND: &'static str = "patient";
    const DATA_TYPE: DataType = DataType::Patients;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn patient_id(&self) -> Option<&RecordId> {
        None
    }

    fn collection(state: &ClinicalState) -> &Vec<Self> {
        &state.patients
    }

    fn collection_mut(state: &mut ClinicalState) -> &mut Vec<Self> {
        &mut state.patients
    }

    fn prepare(&mut self, previous: Option<&Self>, now: Timestamp) -> Result<()> {
        match previous {
            Some(stored) => {
                self.created_at = stored.created_at;
                // Never move backwards, even if the clock does.
                self.updated_at = now.max(stored.updated_at);
            }
            None => {
                self.created_at = now;
                self.updated_at = now;
            }
        }
        Ok(())
    }
}

impl ClinicalRecord for AssessmentResult {
    const KIND: &'static str = "assessment";
    const DATA_TYPE: DataType = DataType::Assessments;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn patient_id(&self) -> Option<&RecordId> {
        Some(&self.patient_id)
    }

    fn collection(state: &ClinicalState) -> &Vec<Self> {
        &state.assessments
    }

    fn collection_mut(state: &mut ClinicalState) -> &mut Vec<Self> {
        &mut state.assessments
    }

    fn prepare(&mut self, _previous: Option<&Self>, _now: Timestamp) -> Result<()> {
        if let Some(score) = self.score {
            require_finite(Self::KIND, "score", score)?;
        }
        for (question, answer) in &self.answers {
            let numbers: &[f64] = match answer {
                AnswerValue::Number(n) => std::slice::from_ref(n),
                AnswerValue::NumberList(ns) => ns,
                _ => &[],
            };
            for &n in numbers {
                require_finite(Self::KIND, &format!("answer {question}"), n)?;
            }
        }
        Ok(())
    }
}

impl ClinicalRecord for VitalSigns {
    const KIND: &'static str = "vital sign";
    const DATA_TYPE: DataType = DataType::Vitals;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn patient_id(&self) -> Option<&RecordId> {
        Some(&self.patient_id)
    }

    fn collection(state: &ClinicalState) -> &Vec<Self> {
        &state.vitals
    }

    fn collection_mut(state: &mut ClinicalState) -> &mut Vec<Self> {
        &mut state.vitals
    }

    fn prepare(&mut self, _previous: Option<&Self>, _now: Timestamp) -> Result<()> {
        if let Some(value) = self.reading.scalar() {
            require_finite(Self::KIND, "value", value)?;
        }
        if self.unit.trim().is_empty() {
            self.unit = self.kind().default_unit().to_owned();
        }
        Ok(())
    }
}

impl ClinicalRecord for GoalTracking {
    const KIND: &'static str = "goal";
    const DATA_TYPE: DataType = DataType::Goals;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn patient_id(&self) -> Option<&RecordId> {
        Some(&self.patient_id)
    }

    fn collection(state: &ClinicalState) -> &Vec<Self> {
        &state.goals
    }

    fn collection_mut(state: &mut ClinicalState) -> &mut Vec<Self> {
        &mut state.goals
    }

    fn prepare(&mut self, _previous: Option<&Self>, _now: Timestamp) -> Result<()> {
        if let Some(end) = self.end_date
            && end < self.start_date
        {
            return Err(CarevaultError::InvalidRecord(format!(
                "goal {} ends before it starts",
                self.id
            )));
        }
        for value in self.completions.iter().filter_map(|c| c.value) {
            require_finite(Self::KIND, "completion value", value)?;
        }
        self.completions.sort_by_key(|c| c.date);
        Ok(())
    }
}

impl ClinicalRecord for EducationProgress {
    const KIND: &'static str = "education progress";
    const DATA_TYPE: DataType = DataType::Education;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn patient_id(&self) -> Option<&RecordId> {
        Some(&self.patient_id)
    }

    fn collection(state: &ClinicalState) -> &Vec<Self> {
        &state.education
    }

    fn collection_mut(state: &mut ClinicalState) -> &mut Vec<Self> {
        &mut state.education
    }

    fn prepare(&mut self, _previous: Option<&Self>, now: Timestamp) -> Result<()> {
        if self.progress > 100 {
            return Err(CarevaultError::InvalidRecord(format!(
                "education progress is {}%, must be 0-100",
                self.progress
            )));
        }
        if self.progress == 100 && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
        Ok(())
    }
}
