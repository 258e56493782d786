// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Encrypted storage adapter. Opaque JSON envelopes in, hex-encoded age
// ciphertext out. The adapter is the only component that writes to the
// underlying medium on behalf of the store.
//
// Stored value layout:  "cv1:" + hex(age file)
// Stored key layout:    "carevault.enc/" + logical key

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use carevault_core::error::{CarevaultError, Result};

use crate::cipher::{EnvelopeCipher, StorageKey};
use crate::medium::StorageMedium;

/// Prefix applied to every key the adapter owns.
pub const ENCRYPTED_NAMESPACE: &str = "carevault.enc/";

/// Format marker at the start of every stored value.
const VALUE_PREFIX: &str = "cv1:";

/// Outcome of reading one key.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    /// Nothing stored under the key.
    Missing,
    /// Something is stored but it cannot be decrypted or parsed.
    Unreadable,
    Found(T),
}

impl<T> Lookup<T> {
    /// Collapse `Missing` and `Unreadable` into `None`.
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::Missing | Self::Unreadable => None,
        }
    }
}

/// Transparent encryption around a `StorageMedium`.
///
/// Envelopes are serialized to canonical JSON (object keys sorted), encrypted
/// with the adapter's key, and stored as text. Reads that fail to decrypt or
/// parse come back as absent rather than as errors.
pub struct EncryptedStorage<M> {
    medium: M,
    cipher: EnvelopeCipher,
}

impl<M: StorageMedium> EncryptedStorage<M> {
    pub fn new(medium: M, key: StorageKey) -> Self {
        Self {
            medium,
            cipher: EnvelopeCipher::new(key),
        }
    }

    /// The wrapped medium. Used by the legacy importer, which reads keys
    /// outside the encrypted namespace.
    pub fn medium(&self) -> &M {
        &self.medium
    }

    fn namespaced(key: &str) -> String {
        format!("{ENCRYPTED_NAMESPACE}{key}")
    }

    /// Encrypt `envelope` and store it under `key`.
    ///
    /// The plaintext serialization never reaches the medium.
    #[instrument(skip(self, envelope))]
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, envelope: &T) -> Result<()> {
        // Going through `Value` sorts object keys, giving one byte form per
        // logical value.
        let canonical = serde_json::to_value(envelope)?;
        let plaintext = serde_json::to_vec(&canonical)?;
        let ciphertext = self.cipher.encrypt(&plaintext)?;

        let encoded = format!("{VALUE_PREFIX}{}", hex::encode(&ciphertext));
        self.medium.write(&Self::namespaced(key), &encoded)?;

        debug!(stored_len = encoded.len(), "envelope stored");
        Ok(())
    }

    /// Read and decrypt the envelope under `key`, distinguishing an absent
    /// key from one holding unreadable data.
    ///
    /// Only medium failures are returned as errors.
    #[instrument(skip(self))]
    pub fn lookup<T: DeserializeOwned>(&self, key: &str) -> Result<Lookup<T>> {
        let Some(raw) = self.medium.read(&Self::namespaced(key))? else {
            return Ok(Lookup::Missing);
        };

        match self.decode(&raw) {
            Ok(value) => Ok(Lookup::Found(value)),
            Err(e) => {
                warn!(error = %e, "stored envelope is unreadable; treating as absent");
                Ok(Lookup::Unreadable)
            }
        }
    }

    /// Read and decrypt the envelope under `key`. `None` when absent,
    /// corrupted, encrypted under another key, or of the wrong shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        Ok(self.lookup(key)?.into_option())
    }

    /// Shape-agnostic `get`.
    pub fn get_value(&self, key: &str) -> Result<Option<Value>> {
        self.get(key)
    }

    /// Delete `key`; a later `get` returns `None`.
    #[instrument(skip(self))]
    pub fn remove(&self, key: &str) -> Result<()> {
        self.medium.delete(&Self::namespaced(key))
    }

    /// The raw stored text for `key`, exactly as the medium holds it.
    pub fn raw(&self, key: &str) -> Result<Option<String>> {
        self.medium.read(&Self::namespaced(key))
    }

    /// Logical keys currently held by the adapter.
    pub fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .medium
            .keys()?
            .into_iter()
            .filter_map(|k| k.strip_prefix(ENCRYPTED_NAMESPACE).map(str::to_owned))
            .collect())
    }

    fn decode<T: DeserializeOwned>(&self, raw: &str) -> Result<T> {
        let hex_body = raw
            .strip_prefix(VALUE_PREFIX)
            .ok_or_else(|| CarevaultError::Decryption("unrecognised value format".into()))?;
        let ciphertext =
            hex::decode(hex_body).map_err(|e| CarevaultError::Decryption(e.to_string()))?;
        let plaintext = self.cipher.decrypt(&ciphertext)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }
}
