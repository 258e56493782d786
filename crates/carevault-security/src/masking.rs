// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PII masking. De-identified views of patient profiles for export, display
// and logging. Pure functions: the same profile always masks to the same
// output.
//
//   name           -> initials ("J.D.")
//   date of birth  -> ten-year age band at the profile's last update ("40-49", "90+")
//   MRN            -> "[REDACTED]"
//   record id      -> pseudonymous reference ("PT-" + 12 hex chars of SHA-256)
//   lists          -> counts only

use carevault_core::types::PatientProfile;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::integrity::pseudonym;

/// Replacement text for any identifier that is dropped outright.
pub const REDACTED: &str = "[REDACTED]";

/// Age at or above which every patient shares one band.
const TOP_AGE_BAND: i32 = 90;

/// De-identified patient summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskedPatient {
    pub reference: String,
    pub initials: String,
    pub age_band: String,
    pub medical_record_number: Option<String>,
    pub condition_count: usize,
    pub allergy_count: usize,
    pub active_medication_count: usize,
    pub has_emergency_contact: bool,
}

impl MaskedPatient {
    /// Label used in audit entries and log lines, e.g. `J.D. (PT-1a2b3c4d5e6f)`.
    pub fn display_label(&self) -> String {
        format!("{} ({})", self.initials, self.reference)
    }
}

/// Mask one patient profile.
pub fn mask_patient(patient: &PatientProfile) -> MaskedPatient {
    MaskedPatient {
        reference: pseudonym(patient.id.as_str()),
        initials: initials(&patient.first_name, &patient.last_name),
        age_band: age_band(patient.date_of_birth, patient.updated_at.date_naive()),
        medical_record_number: patient
            .medical_record_number
            .as_ref()
            .map(|_| REDACTED.to_owned()),
        condition_count: patient.conditions.len(),
        allergy_count: patient.allergies.len(),
        active_medication_count: patient.medications.iter().filter(|m| m.active).count(),
        has_emergency_contact: patient.emergency_contact.is_some(),
    }
}

/// Mask every profile, preserving order.
pub fn mask_patient_batch(patients: &[PatientProfile]) -> Vec<MaskedPatient> {
    patients.iter().map(mask_patient).collect()
}

/// `"J.D."` from `"Jane"`, `"Doe"`. Empty name parts are skipped; a wholly
/// empty name yields `"?"`.
pub fn initials(first_name: &str, last_name: &str) -> String {
    let out: String = [first_name, last_name]
        .iter()
        .filter_map(|part| part.trim().chars().next())
        .flat_map(|c| c.to_uppercase().chain(std::iter::once('.')))
        .collect();

    if out.is_empty() { "?".to_owned() } else { out }
}

/// Ten-year band containing the age on `as_of`. Unknown or future birth dates
/// yield `"unknown"`.
pub fn age_band(date_of_birth: Option<NaiveDate>, as_of: NaiveDate) -> String {
    let Some(dob) = date_of_birth else {
        return "unknown".to_owned();
    };

    let mut age = as_of.year() - dob.year();
    if (as_of.month(), as_of.day()) < (dob.month(), dob.day()) {
        age -= 1;
    }

    match age {
        a if a < 0 => "unknown".to_owned(),
        a if a >= TOP_AGE_BAND => format!("{TOP_AGE_BAND}+"),
        a => {
            let low = a / 10 * 10;
            format!("{low}-{}", low + 9)
        }
    }
}
