//! # AES-256-GCM Encryption
//!
//! Authenticated symmetric encryption for TESSERA. Two callers exist: the
//! keyring's delegate-list protection (detached nonce form, because the
//! published document stores ciphertext and nonce as separate fields) and
//! the sealed-envelope construction (combined form, one opaque blob).
//!
//! ## Nonce management
//!
//! GCM does not forgive nonce reuse. Every call here draws a fresh random
//! 96-bit nonce from the OS CSPRNG; at the volumes this protocol encrypts
//! (a handful of operations per identity per year), the birthday bound on
//! 96-bit nonces is not a concern.
//!
//! ## Failure behavior
//!
//! Decryption failure means tampering or a wrong key, and the two are
//! intentionally indistinguishable in the error. An authentication-tag
//! mismatch never yields plaintext — "silently returns garbage" is not an
//! available failure mode with an AEAD cipher, and the error type keeps it
//! that way at the API level too.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use thiserror::Error;

use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH};

/// Errors during symmetric encryption and decryption.
///
/// Kept vague on purpose. "Wrong key" versus "corrupted ciphertext" is
/// information we do not hand out.
#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed -- wrong key or tampered ciphertext")]
    DecryptFailed,

    #[error("ciphertext too short to contain a nonce")]
    CiphertextTooShort,
}

/// Encrypt with a random nonce, returning `nonce || ciphertext` as one blob.
///
/// The first 12 bytes are the nonce; the remainder is ciphertext plus the
/// 16-byte GCM tag. Use this form when the result is stored or transmitted
/// as a single opaque value (sealed envelopes, persisted local state).
pub fn encrypt(key: &[u8; AES_KEY_LENGTH], plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let (nonce, ciphertext) = encrypt_detached(key, plaintext)?;
    let mut out = Vec::with_capacity(AES_NONCE_LENGTH + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a blob produced by [`encrypt`].
pub fn decrypt(key: &[u8; AES_KEY_LENGTH], data: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    if data.len() < AES_NONCE_LENGTH {
        return Err(EncryptionError::CiphertextTooShort);
    }
    let (nonce_bytes, ciphertext) = data.split_at(AES_NONCE_LENGTH);
    let nonce: [u8; AES_NONCE_LENGTH] = nonce_bytes
        .try_into()
        .map_err(|_| EncryptionError::CiphertextTooShort)?;
    decrypt_detached(key, ciphertext, &nonce)
}

/// Encrypt with a random nonce, returning nonce and ciphertext separately.
///
/// This is the form behind the encrypted delegate list, whose published
/// shape keeps `ciphertext` and `nonce` as distinct fields.
pub fn encrypt_detached(
    key: &[u8; AES_KEY_LENGTH],
    plaintext: &[u8],
) -> Result<([u8; AES_NONCE_LENGTH], Vec<u8>), EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::EncryptFailed)?;

    let mut nonce_bytes = [0u8; AES_NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| EncryptionError::EncryptFailed)?;

    Ok((nonce_bytes, ciphertext))
}

/// Decrypt a detached `(ciphertext, nonce)` pair produced by
/// [`encrypt_detached`].
///
/// Any bit flipped in either the ciphertext or the nonce fails the GCM tag
/// check and surfaces as [`EncryptionError::DecryptFailed`].
pub fn decrypt_detached(
    key: &[u8; AES_KEY_LENGTH],
    ciphertext: &[u8],
    nonce: &[u8; AES_NONCE_LENGTH],
) -> Result<Vec<u8>, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::DecryptFailed)?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| EncryptionError::DecryptFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; 32] {
        let mut key = [0u8; 32];
        for (i, byte) in key.iter_mut().enumerate() {
            *byte = i as u8;
        }
        key
    }

    #[test]
    fn combined_roundtrip() {
        let key = test_key();
        let plaintext = b"three delegates walk into a bar";
        let sealed = encrypt(&key, plaintext).unwrap();
        assert_eq!(decrypt(&key, &sealed).unwrap(), plaintext);
    }

    #[test]
    fn detached_roundtrip() {
        let key = test_key();
        let (nonce, ciphertext) = encrypt_detached(&key, b"ordered delegate list").unwrap();
        let recovered = decrypt_detached(&key, &ciphertext, &nonce).unwrap();
        assert_eq!(recovered, b"ordered delegate list");
    }

    #[test]
    fn empty_plaintext_is_valid() {
        let key = test_key();
        let sealed = encrypt(&key, b"").unwrap();
        // Nonce plus tag, nothing else.
        assert_eq!(sealed.len(), AES_NONCE_LENGTH + 16);
        assert!(decrypt(&key, &sealed).unwrap().is_empty());
    }

    #[test]
    fn wrong_key_fails() {
        let key = test_key();
        let sealed = encrypt(&key, b"secret").unwrap();

        let mut wrong_key = test_key();
        wrong_key[0] ^= 0xFF;
        assert!(matches!(
            decrypt(&wrong_key, &sealed),
            Err(EncryptionError::DecryptFailed)
        ));
    }

    #[test]
    fn flipped_ciphertext_bit_fails() {
        let key = test_key();
        let (nonce, mut ciphertext) = encrypt_detached(&key, b"secret").unwrap();
        ciphertext[0] ^= 0x01;
        assert!(decrypt_detached(&key, &ciphertext, &nonce).is_err());
    }

    #[test]
    fn flipped_nonce_bit_fails() {
        let key = test_key();
        let (mut nonce, ciphertext) = encrypt_detached(&key, b"secret").unwrap();
        nonce[0] ^= 0x01;
        assert!(decrypt_detached(&key, &ciphertext, &nonce).is_err());
    }

    #[test]
    fn every_ciphertext_bit_flip_fails() {
        // Exhaustive over a short plaintext: no single-bit corruption may
        // survive authentication.
        let key = test_key();
        let (nonce, ciphertext) = encrypt_detached(&key, b"x").unwrap();
        for byte_idx in 0..ciphertext.len() {
            for bit in 0..8 {
                let mut corrupted = ciphertext.clone();
                corrupted[byte_idx] ^= 1 << bit;
                assert!(
                    decrypt_detached(&key, &corrupted, &nonce).is_err(),
                    "bit {} of byte {} survived",
                    bit,
                    byte_idx
                );
            }
        }
    }

    #[test]
    fn nonces_are_unique_per_call() {
        let key = test_key();
        let (nonce1, _) = encrypt_detached(&key, b"same input").unwrap();
        let (nonce2, _) = encrypt_detached(&key, b"same input").unwrap();
        assert_ne!(nonce1, nonce2);
    }

    #[test]
    fn too_short_blob_rejected() {
        let key = test_key();
        assert!(matches!(
            decrypt(&key, &[0u8; 4]),
            Err(EncryptionError::CiphertextTooShort)
        ));
    }
}
