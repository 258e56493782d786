// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Authenticated encryption of byte buffers with `age`. Two kinds of key
// material are supported: an X25519 identity (fast, suited to a key held in a
// platform keychain or key file) and a passphrase (scrypt, deliberately slow).

use std::io::{Read, Write};
use std::str::FromStr;

use age::secrecy::{ExposeSecret, SecretString};
use age::x25519;
use carevault_core::error::{CarevaultError, Result};
use tracing::{debug, instrument};

/// Key material supplied at construction time.
pub enum StorageKey {
    X25519(x25519::Identity),
    /// Wrapped in a `SecretString` so that it is zeroised on drop.
    Passphrase(SecretString),
}

impl StorageKey {
    /// Generate a fresh X25519 identity.
    pub fn generate() -> Self {
        Self::X25519(x25519::Identity::generate())
    }

    /// Parse an `AGE-SECRET-KEY-1…` string.
    pub fn from_identity_str(encoded: &str) -> Result<Self> {
        x25519::Identity::from_str(encoded.trim())
            .map(Self::X25519)
            .map_err(|e| CarevaultError::KeyMaterial(e.to_string()))
    }

    pub fn passphrase(passphrase: impl Into<String>) -> Self {
        Self::Passphrase(SecretString::from(passphrase.into()))
    }

    /// Bech32 encoding of an X25519 identity, for writing to a key file.
    /// `None` for passphrase keys.
    pub fn export_identity(&self) -> Option<String> {
        match self {
            Self::X25519(identity) => Some(identity.to_string().expose_secret().to_owned()),
            Self::Passphrase(_) => None,
        }
    }
}

/// Stateless encrypt/decrypt over a fixed key.
pub struct EnvelopeCipher {
    key: StorageKey,
}

impl EnvelopeCipher {
    pub fn new(key: StorageKey) -> Self {
        Self { key }
    }

    /// Encrypt `plaintext` into a complete age file (header + payload).
    #[instrument(skip_all, fields(plaintext_len = plaintext.len()))]
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let encryptor = match &self.key {
            StorageKey::X25519(identity) => {
                let recipient = identity.to_public();
                age::Encryptor::with_recipients(std::iter::once(&recipient as &dyn age::Recipient))
                    .map_err(|e| CarevaultError::Encryption(e.to_string()))?
            }
            StorageKey::Passphrase(passphrase) => {
                age::Encryptor::with_user_passphrase(passphrase.clone())
            }
        };

        let mut ciphertext = Vec::new();
        let mut writer = encryptor
            .wrap_output(&mut ciphertext)
            .map_err(|e| CarevaultError::Encryption(e.to_string()))?;

        writer
            .write_all(plaintext)
            .map_err(|e| CarevaultError::Encryption(e.to_string()))?;

        writer
            .finish()
            .map_err(|e| CarevaultError::Encryption(e.to_string()))?;

        debug!(ciphertext_len = ciphertext.len(), "encryption complete");
        Ok(ciphertext)
    }

    /// Decrypt a complete age file and return the original plaintext bytes.
    /// Fails on a wrong key or any tampering.
    #[instrument(skip_all, fields(ciphertext_len = ciphertext.len()))]
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let decryptor = age::Decryptor::new(ciphertext)
            .map_err(|e| CarevaultError::Decryption(e.to_string()))?;

        let mut reader = match &self.key {
            StorageKey::X25519(identity) => decryptor
                .decrypt(std::iter::once(identity as &dyn age::Identity))
                .map_err(|e| CarevaultError::Decryption(e.to_string()))?,
            StorageKey::Passphrase(passphrase) => {
                let identity = age::scrypt::Identity::new(passphrase.clone());
                decryptor
                    .decrypt(std::iter::once(&identity as &dyn age::Identity))
                    .map_err(|e| CarevaultError::Decryption(e.to_string()))?
            }
        };

        let mut plaintext = Vec::new();
        reader
            .read_to_end(&mut plaintext)
            .map_err(|e| CarevaultError::Decryption(e.to_string()))?;

        debug!(plaintext_len = plaintext.len(), "decryption complete");
        Ok(plaintext)
    }
}
