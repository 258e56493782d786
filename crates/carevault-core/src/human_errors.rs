// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for patients and caregivers.
//
// Every technical error is mapped to plain English with a clear suggestion.
// Severity drives how the UI presents the message.

use crate::error::CarevaultError;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Informational: data is safe, nothing to do.
    Notice,
    /// The user must change what they entered.
    ActionRequired,
    /// Data may not have been saved. Shown as a persistent warning.
    DataAtRisk,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary (shown as a heading).
    pub message: String,
    /// What the user should try (shown as body text).
    pub suggestion: String,
    pub severity: Severity,
}

/// Convert a `CarevaultError` into a `HumanError`.
pub fn humanize_error(err: &CarevaultError) -> HumanError {
    match err {
        CarevaultError::Encryption(_) | CarevaultError::KeyMaterial(_) => HumanError {
            message: "Your health data could not be locked securely.".into(),
            suggestion: "Nothing was written to this device. Restart the app and try again.".into(),
            severity: Severity::DataAtRisk,
        },

        CarevaultError::Decryption(_) => HumanError {
            message: "Some saved data could not be unlocked.".into(),
            suggestion: "If you restored a backup from another device, import it again from the original file.".into(),
            severity: Severity::DataAtRisk,
        },

        CarevaultError::IntegrityMismatch { .. } => HumanError {
            message: "This backup file has been changed since it was created.".into(),
            suggestion: "Use the original backup file, or create a new backup from the device that holds your data.".into(),
            severity: Severity::ActionRequired,
        },

        CarevaultError::UnknownPatient { .. } => HumanError {
            message: "This entry isn't linked to a saved patient.".into(),
            suggestion: "Save the patient profile first, then add the entry again.".into(),
            severity: Severity::ActionRequired,
        },

        CarevaultError::InvalidRecord(detail) => HumanError {
            message: "Some of the values entered aren't valid.".into(),
            suggestion: format!("Check the form and try again. ({detail})"),
            severity: Severity::ActionRequired,
        },

        CarevaultError::ExportTooLarge { limit, .. } => HumanError {
            message: "This export is too large to save.".into(),
            suggestion: format!(
                "Export one patient at a time, or raise the export size limit (currently {} MB) in Settings.",
                limit / (1024 * 1024)
            ),
            severity: Severity::ActionRequired,
        },

        CarevaultError::AlreadyMigrated => HumanError {
            message: "Your older readings were already imported earlier.".into(),
            suggestion: "Nothing was changed. Readings without an owner were filed under the only patient or an \"Imported Patient\" profile; review them there.".into(),
            severity: Severity::Notice,
        },

        CarevaultError::Persistence(_) | CarevaultError::Medium(_) => HumanError {
            message: "Your latest change hasn't been saved to this device yet.".into(),
            suggestion: "Your device may be out of storage space. Free some space, then make any change to save again.".into(),
            severity: Severity::DataAtRisk,
        },

        CarevaultError::Database(_) | CarevaultError::Io(_) => HumanError {
            message: "The app couldn't read or write its files.".into(),
            suggestion: "Check that the app's data folder exists and that you have permission to use it.".into(),
            severity: Severity::DataAtRisk,
        },

        CarevaultError::Serialization(_) => HumanError {
            message: "This file isn't in a format we recognise.".into(),
            suggestion: "Choose a backup file that was created by this app.".into(),
            severity: Severity::ActionRequired,
        },
    }
}

/// Banner shown when startup found saved data it could not unlock and fell
/// back to an empty store.
pub fn unreadable_store_notice() -> HumanError {
    HumanError {
        message: "We couldn't unlock your saved health data, so you're seeing an empty profile.".into(),
        suggestion: "Your old data has not been changed. If you have a backup, import it now. Otherwise, new entries will replace the unreadable data.".into(),
        severity: Severity::DataAtRisk,
    }
}
