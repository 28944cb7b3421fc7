//! # Sealed Envelopes
//!
//! One-shot asymmetric encryption to a recipient's X25519 public key. This
//! is how a recovery share travels: sealed to a delegate, the share is
//! opaque to everyone else — the delegate must open the envelope before it
//! can even see its own share, and a non-recipient learns nothing, not even
//! whether an envelope was meant for them.
//!
//! ## Construction
//!
//! 1. The sender generates a fresh ephemeral X25519 keypair per envelope.
//! 2. ECDH against the recipient's static public key yields a shared secret.
//! 3. The shared secret runs through BLAKE3's `derive_key` mode, bound to
//!    both public keys, producing an AES-256 key.
//! 4. The plaintext is sealed with AES-256-GCM; the ephemeral public key
//!    rides along in the envelope.
//!
//! The raw Diffie-Hellman output is never used as an encryption key
//! directly — curve points have algebraic structure, and the KDF step is
//! what turns them into uniform key material. Including both public keys in
//! the derivation binds the key to this exact sender/recipient pairing.
//!
//! ## Opening
//!
//! The recipient recomputes the ECDH secret from the ephemeral public key
//! and its own static secret, re-derives the AES key, and decrypts. A wrong
//! recipient key and a tampered envelope fail identically: the GCM tag
//! check does not pass, and [`SealedError::OpenFailed`] is returned.

use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH, SEALED_ENVELOPE_KEY_CONTEXT};
use crate::crypto::encryption::{self, EncryptionError};

/// Errors in the sealed-envelope construction.
#[derive(Debug, Error)]
pub enum SealedError {
    #[error("sealing failed")]
    SealFailed,

    #[error("envelope could not be opened -- wrong recipient key or tampered envelope")]
    OpenFailed,
}

impl From<EncryptionError> for SealedError {
    fn from(err: EncryptionError) -> Self {
        match err {
            EncryptionError::EncryptFailed => SealedError::SealFailed,
            _ => SealedError::OpenFailed,
        }
    }
}

// ---------------------------------------------------------------------------
// EncryptionKeypair
// ---------------------------------------------------------------------------

/// A long-lived X25519 keypair — the encryption leg of an identity's key
/// material.
///
/// The public half is published in the identity document so that others can
/// seal recovery shares to this identity; the secret half opens envelopes
/// received while helping someone else recover.
pub struct EncryptionKeypair {
    secret: StaticSecret,
    public: PublicKey,
}

/// The public half of an [`EncryptionKeypair`], safe to publish.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncryptionPublicKey([u8; 32]);

impl EncryptionKeypair {
    /// Generate a fresh keypair from the OS CSPRNG.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Reconstruct a keypair from 32 raw secret bytes.
    ///
    /// X25519 clamps the scalar internally, so any 32 bytes are accepted;
    /// the bytes must still come from a CSPRNG or a previous export.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let secret = StaticSecret::from(*bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Export the raw secret bytes. Crosses the boundary only inside the
    /// keyring's export and recoverable-secret paths.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// The public half, for document publication.
    pub fn public_key(&self) -> EncryptionPublicKey {
        EncryptionPublicKey(self.public.to_bytes())
    }
}

impl Clone for EncryptionKeypair {
    fn clone(&self) -> Self {
        Self::from_bytes(&self.secret.to_bytes())
    }
}

impl fmt::Debug for EncryptionKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKeypair(pub={})", self.public_key())
    }
}

impl EncryptionPublicKey {
    /// Wrap raw public key bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for EncryptionPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for EncryptionPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionPublicKey({})", &self.to_hex()[..16])
    }
}

// ---------------------------------------------------------------------------
// SealedEnvelope
// ---------------------------------------------------------------------------

/// A payload sealed to one recipient.
///
/// Self-contained: the ephemeral public key needed for opening travels with
/// the ciphertext. The recipient is not named anywhere in the envelope —
/// whether an envelope is "yours" is answered only by trying to open it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedEnvelope {
    /// Sender's one-use X25519 public key.
    pub ephemeral_key: [u8; 32],
    /// AES-256-GCM nonce.
    pub nonce: [u8; AES_NONCE_LENGTH],
    /// Ciphertext including the GCM authentication tag.
    pub ciphertext: Vec<u8>,
}

/// Seal a payload to a recipient's public encryption key.
///
/// A fresh ephemeral keypair is generated per call and consumed by the
/// Diffie-Hellman step, so no two envelopes share key material even to the
/// same recipient.
pub fn seal(recipient: &EncryptionPublicKey, plaintext: &[u8]) -> Result<SealedEnvelope, SealedError> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral).to_bytes();

    let recipient_pk = PublicKey::from(*recipient.as_bytes());
    let shared = ephemeral.diffie_hellman(&recipient_pk);
    let key = derive_envelope_key(shared.as_bytes(), &ephemeral_public, recipient.as_bytes());

    let (nonce, ciphertext) = encryption::encrypt_detached(&key, plaintext)?;

    Ok(SealedEnvelope {
        ephemeral_key: ephemeral_public,
        nonce,
        ciphertext,
    })
}

/// Open an envelope with the recipient's keypair.
///
/// Fails with [`SealedError::OpenFailed`] when the envelope was sealed to a
/// different key or has been modified in transit.
pub fn open(envelope: &SealedEnvelope, recipient: &EncryptionKeypair) -> Result<Vec<u8>, SealedError> {
    let ephemeral_pk = PublicKey::from(envelope.ephemeral_key);
    let shared = recipient.secret.diffie_hellman(&ephemeral_pk);
    let key = derive_envelope_key(
        shared.as_bytes(),
        &envelope.ephemeral_key,
        recipient.public_key().as_bytes(),
    );

    Ok(encryption::decrypt_detached(
        &key,
        &envelope.ciphertext,
        &envelope.nonce,
    )?)
}

/// Derive the envelope's AES key from the DH output and both public keys.
///
///   key = BLAKE3-derive-key(
///     context = "tessera v1 sealed envelope key",
///     input   = shared_secret || ephemeral_pub || recipient_pub
///   )
///
/// Order is fixed (sender key first) because the roles here are asymmetric,
/// unlike a session handshake — there is exactly one sealer and one opener.
fn derive_envelope_key(
    shared_secret: &[u8; 32],
    ephemeral_public: &[u8; 32],
    recipient_public: &[u8; 32],
) -> [u8; AES_KEY_LENGTH] {
    let mut hasher = blake3::Hasher::new_derive_key(SEALED_ENVELOPE_KEY_CONTEXT);
    hasher.update(shared_secret);
    hasher.update(ephemeral_public);
    hasher.update(recipient_public);

    let mut key = [0u8; AES_KEY_LENGTH];
    hasher.finalize_xof().fill(&mut key);
    key
}
