//! HS-007: Credentials, masked in memory, sealed at rest.
//!
//! A sealed value is `base64(nonce || tag || ciphertext)` under AES-256-GCM.
//! The key is derived from a passphrase with BLAKE3's key derivation mode.

use crate::error::SecretError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use openssl::symm::{decrypt_aead, encrypt_aead, Cipher};
use std::fmt;

/// Environment variable holding the sealing passphrase.
pub const PASSPHRASE_ENV: &str = "HOTSTACK_PASSPHRASE";

const KEY_CONTEXT: &str = "hotstack 2024-06 connection profile sealing key";
const AAD: &[u8] = b"hotstack-profile-secret";
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// A credential. Debug and Display never show the plaintext.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The plaintext, for handing to an API client.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(******)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "******")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// 256-bit key for sealing secrets.
#[derive(Clone)]
pub struct SealingKey([u8; 32]);

impl SealingKey {
    pub fn from_passphrase(passphrase: &str) -> Self {
        Self(blake3::derive_key(KEY_CONTEXT, passphrase.as_bytes()))
    }

    /// Key from the `HOTSTACK_PASSPHRASE` environment variable.
    pub fn from_env() -> Result<Self, SecretError> {
        match std::env::var(PASSPHRASE_ENV) {
            Ok(p) if !p.is_empty() => Ok(Self::from_passphrase(&p)),
            _ => Err(SecretError::MissingPassphrase(PASSPHRASE_ENV)),
        }
    }
}

impl fmt::Debug for SealingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SealingKey(******)")
    }
}

/// Encrypt a secret for storage.
pub fn seal(secret: &Secret, key: &SealingKey) -> Result<String, SecretError> {
    let mut nonce = [0u8; NONCE_LEN];
    openssl::rand::rand_bytes(&mut nonce).map_err(|e| SecretError::Cipher(e.to_string()))?;

    let mut tag = [0u8; TAG_LEN];
    let ciphertext = encrypt_aead(
        Cipher::aes_256_gcm(),
        &key.0,
        Some(&nonce[..]),
        AAD,
        secret.expose().as_bytes(),
        &mut tag,
    )
    .map_err(|e| SecretError::Cipher(e.to_string()))?;

    let mut blob = Vec::with_capacity(NONCE_LEN + TAG_LEN + ciphertext.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&tag);
    blob.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(blob))
}

/// Decrypt a value produced by [`seal`].
pub fn unseal(sealed: &str, key: &SealingKey) -> Result<Secret, SecretError> {
    let blob = STANDARD
        .decode(sealed.trim())
        .map_err(|e| SecretError::Encoding(e.to_string()))?;
    if blob.len() < NONCE_LEN + TAG_LEN {
        return Err(SecretError::Truncated);
    }
    let (nonce, rest) = blob.split_at(NONCE_LEN);
    let (tag, ciphertext) = rest.split_at(TAG_LEN);

    let plain = decrypt_aead(Cipher::aes_256_gcm(), &key.0, Some(nonce), AAD, ciphertext, tag)
        .map_err(|_| SecretError::Rejected)?;
    String::from_utf8(plain)
        .map(Secret)
        .map_err(|_| SecretError::Rejected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hs007_secret_never_printed() {
        let s = Secret::new("hunter2");
        assert_eq!(format!("{}", s), "******");
        assert!(!format!("{:?}", s).contains("hunter2"));
        assert_eq!(s.expose(), "hunter2");
    }

    #[test]
    fn test_hs007_seal_unseal() {
        let key = SealingKey::from_passphrase("correct horse");
        let sealed = seal(&Secret::new("hunter2"), &key).unwrap();
        assert!(!sealed.contains("hunter2"));
        let back = unseal(&sealed, &key).unwrap();
        assert_eq!(back.expose(), "hunter2");
    }

    #[test]
    fn test_hs007_nonce_varies() {
        let key = SealingKey::from_passphrase("k");
        let a = seal(&Secret::new("same"), &key).unwrap();
        let b = seal(&Secret::new("same"), &key).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_hs007_wrong_key_rejected() {
        let sealed = seal(&Secret::new("hunter2"), &SealingKey::from_passphrase("a")).unwrap();
        let err = unseal(&sealed, &SealingKey::from_passphrase("b")).unwrap_err();
        assert!(matches!(err, SecretError::Rejected));
    }

    #[test]
    fn test_hs007_tampered_rejected() {
        let key = SealingKey::from_passphrase("k");
        let sealed = seal(&Secret::new("hunter2"), &key).unwrap();
        let mut blob = STANDARD.decode(&sealed).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        let err = unseal(&STANDARD.encode(blob), &key).unwrap_err();
        assert!(matches!(err, SecretError::Rejected));
    }

    #[test]
    fn test_hs007_truncated_and_garbage() {
        let key = SealingKey::from_passphrase("k");
        assert!(matches!(
            unseal(&STANDARD.encode([0u8; 4]), &key),
            Err(SecretError::Truncated)
        ));
        assert!(matches!(
            unseal("not base64 !!", &key),
            Err(SecretError::Encoding(_))
        ));
    }

    #[test]
    fn test_hs007_empty_secret_roundtrip() {
        let key = SealingKey::from_passphrase("k");
        let sealed = seal(&Secret::new(""), &key).unwrap();
        assert!(unseal(&sealed, &key).unwrap().is_empty());
    }

    #[test]
    fn test_hs007_key_debug_masked() {
        let key = SealingKey::from_passphrase("k");
        assert_eq!(format!("{:?}", key), "SealingKey(******)");
    }
}
