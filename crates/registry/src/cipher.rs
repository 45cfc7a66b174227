//! At-rest protection for ticket payloads.
//!
//! The store only ever sees what [`PayloadCipher::encode`] produces. With
//! encryption enabled that is an encrypt-then-sign envelope:
//!
//! ```text
//! ┌────────────┬──────────────────────────────┬──────────────────────┐
//! │ nonce (12) │ AES-256-GCM ciphertext + tag │ HMAC-SHA-512 (64)    │
//! └────────────┴──────────────────────────────┴──────────────────────┘
//!               signature covers nonce ‖ ciphertext
//! ```
//!
//! Decoding verifies the signature before any decryption is attempted, so a
//! tampered payload fails as [`CipherError::Integrity`] without touching the
//! AEAD.

use std::fmt;

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha512;
use thiserror::Error;
use zeroize::Zeroizing;

type HmacSha512 = Hmac<Sha512>;

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// AES-256 key length in bytes.
pub const ENCRYPTION_KEY_LEN: usize = 32;

/// Minimum accepted signing key length in bytes.
pub const MIN_SIGNING_KEY_LEN: usize = 32;

/// HMAC-SHA-512 output length in bytes.
pub const SIGNATURE_LEN: usize = 64;

/// AES-GCM authentication tag length in bytes.
const AEAD_TAG_LEN: usize = 16;

/// Errors produced while encoding or decoding a payload.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum CipherError {
    /// The signature did not verify or the envelope was malformed.
    #[error("payload signature verification failed")]
    Integrity,

    /// The signature verified but the ciphertext could not be decrypted.
    #[error("payload decryption failed")]
    Decryption,

    /// Encryption of a payload failed.
    #[error("payload encryption failed")]
    Encryption,

    /// Key material was rejected.
    #[error("invalid {which} key: {reason}")]
    InvalidKey {
        /// `"encryption"` or `"signing"`.
        which: &'static str,
        /// Why the key was rejected.
        reason: &'static str,
    },
}

/// Reversible transformation applied to ticket payloads before they are stored.
pub trait PayloadCipher: Send + Sync + fmt::Debug {
    /// Transforms a plaintext payload into its stored form.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::Encryption`] if the payload cannot be sealed.
    fn encode(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError>;

    /// Recovers the plaintext from its stored form.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::Integrity`] if the stored bytes were altered and
    /// [`CipherError::Decryption`] if they verify but cannot be opened.
    fn decode(&self, encoded: &[u8]) -> Result<Vec<u8>, CipherError>;

    /// Whether this cipher actually protects payloads.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Identity cipher used when at-rest encryption is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCipher;

impl PayloadCipher for NoOpCipher {
    fn encode(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        Ok(plaintext.to_vec())
    }

    fn decode(&self, encoded: &[u8]) -> Result<Vec<u8>, CipherError> {
        Ok(encoded.to_vec())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// AES-256-GCM encryption followed by an HMAC-SHA-512 signature.
pub struct EncryptThenSignCipher {
    aead: Aes256Gcm,
    signing_key: Zeroizing<Vec<u8>>,
}

impl EncryptThenSignCipher {
    /// Creates a cipher from raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidKey`] if the encryption key is not
    /// exactly 32 bytes or the signing key is shorter than 32 bytes.
    pub fn new(encryption_key: &[u8], signing_key: &[u8]) -> Result<Self, CipherError> {
        if encryption_key.len() != ENCRYPTION_KEY_LEN {
            return Err(CipherError::InvalidKey {
                which: "encryption",
                reason: "must be exactly 32 bytes",
            });
        }
        if signing_key.len() < MIN_SIGNING_KEY_LEN {
            return Err(CipherError::InvalidKey {
                which: "signing",
                reason: "must be at least 32 bytes",
            });
        }

        let aead = <Aes256Gcm as KeyInit>::new_from_slice(encryption_key).map_err(|_| {
            CipherError::InvalidKey { which: "encryption", reason: "rejected by AES-256-GCM" }
        })?;

        Ok(Self { aead, signing_key: Zeroizing::new(signing_key.to_vec()) })
    }

    fn mac(&self) -> Result<HmacSha512, CipherError> {
        <HmacSha512 as Mac>::new_from_slice(&self.signing_key)
            .map_err(|_| CipherError::InvalidKey { which: "signing", reason: "rejected by HMAC" })
    }
}

impl fmt::Debug for EncryptThenSignCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptThenSignCipher").finish_non_exhaustive()
    }
}

impl PayloadCipher for EncryptThenSignCipher {
    fn encode(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext =
            self.aead.encrypt(nonce, plaintext).map_err(|_| CipherError::Encryption)?;

        let mut envelope = Vec::with_capacity(NONCE_LEN + ciphertext.len() + SIGNATURE_LEN);
        envelope.extend_from_slice(&nonce_bytes);
        envelope.extend_from_slice(&ciphertext);

        let mut mac = self.mac()?;
        mac.update(&envelope);
        envelope.extend_from_slice(&mac.finalize().into_bytes());
        Ok(envelope)
    }

    fn decode(&self, encoded: &[u8]) -> Result<Vec<u8>, CipherError> {
        if encoded.len() < NONCE_LEN + AEAD_TAG_LEN + SIGNATURE_LEN {
            return Err(CipherError::Integrity);
        }
        let (signed, signature) = encoded.split_at(encoded.len() - SIGNATURE_LEN);

        let mut mac = self.mac()?;
        mac.update(signed);
        mac.verify_slice(signature).map_err(|_| CipherError::Integrity)?;

        let (nonce_bytes, ciphertext) = signed.split_at(NONCE_LEN);
        self.aead
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CipherError::Decryption)
    }
}
