// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! carevault-security: confidentiality and de-identification for CareVault.
//!
//! This crate owns everything that touches sensitive bytes on their way to or
//! from the host: the underlying storage media, the age-based encrypted
//! storage adapter, PII masking for exports and logs, the audit trail, and
//! SHA-256 integrity helpers.

pub mod audit;
pub mod cipher;
pub mod integrity;
pub mod masking;
pub mod medium;
pub mod storage;

// PUBLIC API: Re-export core security primitives
pub use audit::{AuditAction, AuditSubject, AuditTrail, create_audit_log_entry};
pub use cipher::StorageKey;
pub use integrity::hash_bytes;
pub use masking::mask_patient_batch;
pub use medium::MemoryMedium;
pub use storage::EncryptedStorage;
