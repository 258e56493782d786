// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SHA-256 fingerprints for backup files and pseudonymous record references.

use carevault_core::error::{CarevaultError, Result};
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `data`.
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Verify that `data` matches the expected SHA-256 hex digest.
///
/// Comparison ignores case so digests copied from other tools are accepted.
pub fn verify_hash(data: &[u8], expected_hex: &str) -> Result<()> {
    let actual = hash_bytes(data);
    if actual.eq_ignore_ascii_case(expected_hex.trim()) {
        Ok(())
    } else {
        Err(CarevaultError::IntegrityMismatch {
            expected: expected_hex.to_owned(),
            actual,
        })
    }
}

/// Stable, non-reversible reference for a record id: `PT-` followed by the
/// first 12 hex characters of its SHA-256.
pub fn pseudonym(id: &str) -> String {
    let digest = hash_bytes(id.as_bytes());
    format!("PT-{}", &digest[..12])
}
