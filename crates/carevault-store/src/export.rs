// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Export and backup payloads.
//
// Whole-store export (also the backup format accepted by `import_backup`):
//   { version, patients[], maskedPatients[], assessments[], vitals[], goals[],
//     education[], config, exportedAt }

use std::collections::BTreeMap;

use carevault_core::StorageConfig;
use carevault_core::error::{CarevaultError, Result};
use carevault_core::types::{
    AssessmentResult, DataType, EducationProgress, GoalTracking, PatientProfile, Timestamp,
    VitalSigns,
};
use carevault_security::audit::AuditLogEntry;
use carevault_security::masking::MaskedPatient;
use serde::{Deserialize, Serialize};

use crate::state::ParseLosses;

/// Format version stamped on every export.
pub const EXPORT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreExport {
    pub version: u32,
    pub patients: Vec<PatientProfile>,
    pub masked_patients: Vec<MaskedPatient>,
    pub assessments: Vec<AssessmentResult>,
    pub vitals: Vec<VitalSigns>,
    pub goals: Vec<GoalTracking>,
    pub education: Vec<EducationProgress>,
    pub config: StorageConfig,
    pub exported_at: Timestamp,
}

/// Everything held for one patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientExport {
    pub version: u32,
    pub patient: PatientProfile,
    pub masked_patient: MaskedPatient,
    pub assessments: Vec<AssessmentResult>,
    pub vitals: Vec<VitalSigns>,
    pub goals: Vec<GoalTracking>,
    pub education: Vec<EducationProgress>,
    pub exported_at: Timestamp,
}

/// De-identified view of an export, safe to display or log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskedExport {
    pub patients: Vec<MaskedPatient>,
    /// Collections with at least one record in the export.
    pub data_types: Vec<DataType>,
    pub record_counts: BTreeMap<DataType, usize>,
}

impl MaskedExport {
    pub(crate) fn new(patients: Vec<MaskedPatient>, record_counts: BTreeMap<DataType, usize>) -> Self {
        let data_types = record_counts
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(data_type, _)| *data_type)
            .collect();
        Self {
            patients,
            data_types,
            record_counts,
        }
    }
}

/// An export: the full payload for legitimate downstream use, its masked
/// view, and the audit entry describing it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Exported<T> {
    pub payload: T,
    pub masked: MaskedExport,
    pub audit: AuditLogEntry,
}

/// Result of `import_backup`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    /// False when the input was not an object and nothing changed.
    pub applied: bool,
    pub imported: BTreeMap<DataType, usize>,
    pub losses: ParseLosses,
}

/// Serialize `payload` as pretty JSON, refusing anything above `max_bytes`.
pub fn to_json_within<T: Serialize>(payload: &T, max_bytes: u64) -> Result<Vec<u8>> {
    let bytes = serde_json::to_vec_pretty(payload)?;
    let size = bytes.len() as u64;
    if size > max_bytes {
        return Err(CarevaultError::ExportTooLarge {
            size,
            limit: max_bytes,
        });
    }
    Ok(bytes)
}
