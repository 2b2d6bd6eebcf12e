// MIT License - Copyright (c) 2026 Peter Wright
// Relay session cipher: PBKDF2 key derivation + AES-256-GCM

use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use hmac::Hmac;
use rand::RngCore;
use sha2::Sha256;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::constants::{KEY_SIZE, NONCE_SIZE, PBKDF2_ITERATIONS, PBKDF2_SALT, TAG_SIZE};
use crate::error::{RelayError, Result};

/// Symmetric key shared with the relay.
///
/// Derived once from the operator passphrase and held only in memory.
/// The bytes are wiped on drop and never printed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct RelayKey([u8; KEY_SIZE]);

impl RelayKey {
    /// Wrap raw key bytes (e.g. a key derived elsewhere).
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }
}

impl fmt::Debug for RelayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RelayKey(<redacted>)")
    }
}

/// Derive the session key from a passphrase.
///
/// PBKDF2-HMAC-SHA256 with the relay's fixed salt and 100,000 iterations.
/// Deterministic, and deliberately slow: call it once per client, not per
/// connection.
pub fn derive_key(passphrase: &str) -> Result<RelayKey> {
    let mut output = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2::<Hmac<Sha256>>(
        passphrase.as_bytes(),
        PBKDF2_SALT,
        PBKDF2_ITERATIONS,
        &mut output,
    )
    .map_err(|e| RelayError::KeyDerivation {
        reason: format!("PBKDF2-HMAC-SHA256 failed: {e}"),
    })?;

    let key = RelayKey(output);
    output.zeroize();
    debug!("Relay key derived");
    Ok(key)
}

/// Encrypt a payload for the relay.
///
/// Returns `nonce || ciphertext || tag`. Every call draws a fresh random
/// nonce, so the same plaintext never produces the same blob twice.
pub fn encrypt(key: &RelayKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce_bytes);

    let ciphertext = key
        .cipher()
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| RelayError::Encryption)?;

    let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Decrypt a `nonce || ciphertext || tag` blob from the relay.
///
/// Anything that does not verify, including a blob too short to carry a
/// nonce and tag, is an [`RelayError::Authentication`].
pub fn decrypt(key: &RelayKey, blob: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < NONCE_SIZE + TAG_SIZE {
        return Err(RelayError::Authentication);
    }
    let (nonce, ciphertext) = blob.split_at(NONCE_SIZE);

    key.cipher()
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| RelayError::Authentication)
}
