//! Authenticated secret codec
//!
//! Encrypts single secret strings with AES-256-GCM and encodes the result as
//! an envelope: `base64(ciphertext)_base64(nonce)_base64(tag)`. This exact
//! shape is how encrypted credentials are persisted, so it must not change.

use std::fmt;

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Key size in bytes (AES-256)
pub const KEY_SIZE: usize = 32;

/// Nonce size in bytes (96 bits for GCM)
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size in bytes
pub const TAG_SIZE: usize = 16;

/// Separator between the three base64 fields of an envelope
pub const ENVELOPE_DELIMITER: char = '_';

/// AES-256-GCM codec bound to one key
#[derive(Clone)]
pub struct SecretCipher {
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl SecretCipher {
    /// Create a cipher from raw key bytes. The key must be exactly 32 bytes.
    pub fn new(key: &[u8]) -> Result<Self> {
        let key: [u8; KEY_SIZE] = key.try_into().map_err(|_| {
            Error::InvalidKey(format!(
                "key must be {KEY_SIZE} bytes, got {} bytes",
                key.len()
            ))
        })?;
        Ok(Self {
            key: Zeroizing::new(key),
        })
    }

    /// Create a cipher from a hex-encoded key
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = Zeroizing::new(
            hex::decode(encoded.trim())
                .map_err(|e| Error::InvalidKey(format!("key is not valid hex: {e}")))?,
        );
        Self::new(&bytes)
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key[..]))
    }

    /// Encrypt a string with a fresh random nonce and return the envelope
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        // aes-gcm appends the tag to the ciphertext
        let sealed = self
            .cipher()
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| Error::Encryption(e.to_string()))?;
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_SIZE);

        Ok(format!(
            "{}{d}{}{d}{}",
            BASE64.encode(ciphertext),
            BASE64.encode(nonce),
            BASE64.encode(tag),
            d = ENVELOPE_DELIMITER,
        ))
    }

    /// Decrypt an envelope produced by [`SecretCipher::encrypt`]
    ///
    /// Malformed envelopes fail with [`Error::InvalidEnvelope`]; a tag that
    /// does not verify (wrong key, tampered data) fails with
    /// [`Error::Decryption`].
    pub fn decrypt(&self, envelope: &str) -> Result<String> {
        let parts = envelope.split(ENVELOPE_DELIMITER).collect::<Vec<_>>();
        let [ciphertext_b64, nonce_b64, tag_b64] = parts.as_slice() else {
            return Err(Error::InvalidEnvelope(format!(
                "expected 3 parts separated by '{ENVELOPE_DELIMITER}', got {}",
                parts.len()
            )));
        };

        let ciphertext = decode_part("ciphertext", ciphertext_b64)?;
        let nonce = decode_part("nonce", nonce_b64)?;
        let tag = decode_part("tag", tag_b64)?;

        if nonce.len() != NONCE_SIZE {
            return Err(Error::InvalidEnvelope(format!(
                "nonce must be {NONCE_SIZE} bytes, got {}",
                nonce.len()
            )));
        }
        if tag.len() != TAG_SIZE {
            return Err(Error::InvalidEnvelope(format!(
                "tag must be {TAG_SIZE} bytes, got {}",
                tag.len()
            )));
        }

        let mut sealed = ciphertext;
        sealed.extend_from_slice(&tag);

        let plaintext = self
            .cipher()
            .decrypt(Nonce::from_slice(&nonce), sealed.as_ref())
            .map_err(|_| Error::Decryption("authentication tag mismatch".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| Error::Decryption("decrypted secret is not valid UTF-8".to_string()))
    }
}

fn decode_part(name: &str, value: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(value)
        .map_err(|e| Error::InvalidEnvelope(format!("{name} is not valid base64: {e}")))
}

impl fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretCipher([REDACTED])")
    }
}
