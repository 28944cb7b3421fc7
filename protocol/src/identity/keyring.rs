//! # Key Ring
//!
//! The key ring owns the three key pairs that make up an identity's local
//! key material:
//!
//! 1. **Signing** (Ed25519) — authorizes assertions made by the identity.
//! 2. **Management** (Ed25519) — authorizes anchoring transactions that
//!    publish document updates to the ledger.
//! 3. **Encryption** (X25519) — the public target for recovery shares sealed
//!    to this identity, and the secret that opens shares received while
//!    helping others recover.
//!
//! The two signing contexts are never interchangeable. Each context uses its
//! own keypair *and* its own domain tag, so a signature produced for one
//! context fails verification under the other even if the key pairs were
//! ever (wrongly) identical.
//!
//! ## Secret material boundaries
//!
//! Raw private bytes leave this type in exactly two shapes:
//!
//! - [`KeyRing::export`] — the persisted local state, stored by the caller.
//! - [`KeyRing::recoverable_secret`] — the 96-byte blob that gets split
//!   across recovery delegates. [`KeyRing::restore_from_secret`] is its
//!   inverse and is the final step of a successful recovery.
//!
//! Everything else operates on the keys without exposing them.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::{
    AES_NONCE_LENGTH, ASSERTION_DOMAIN_TAG, DELEGATE_LIST_KEY_CONTEXT, ENCRYPTION_KEY_LENGTH,
    MANAGEMENT_DOMAIN_TAG, RECOVERABLE_SECRET_LENGTH, SIGNING_KEY_LENGTH,
};
use crate::crypto::encryption::{self, EncryptionError};
use crate::crypto::keys::{TesseraKeypair, TesseraPublicKey, TesseraSignature};
use crate::crypto::sealed::{self, EncryptionKeypair, EncryptionPublicKey, SealedEnvelope};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from key ring operations.
#[derive(Debug, Error)]
pub enum KeyRingError {
    /// The recoverable secret blob has the wrong length.
    #[error("recoverable secret must be {expected} bytes, got {got}")]
    SecretLength {
        /// Required length.
        expected: usize,
        /// Length actually supplied.
        got: usize,
    },

    /// Persisted key state could not be decoded into key material.
    #[error("invalid persisted key state: {0}")]
    InvalidState(String),

    /// Symmetric decryption failed authentication — tampering or wrong key.
    #[error("integrity failure: {0}")]
    Integrity(#[from] EncryptionError),
}

// ---------------------------------------------------------------------------
// Signing contexts
// ---------------------------------------------------------------------------

/// The two signing contexts an identity operates in.
///
/// Each selects a different keypair and a different domain tag. Payloads are
/// tagged before signing, so context confusion fails closed at verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningContext {
    /// Assertion signatures, made with the signing key.
    Assertion,
    /// Anchoring-transaction authorization, made with the management key.
    Management,
}

impl SigningContext {
    fn domain_tag(self) -> &'static [u8] {
        match self {
            SigningContext::Assertion => ASSERTION_DOMAIN_TAG,
            SigningContext::Management => MANAGEMENT_DOMAIN_TAG,
        }
    }

    fn tagged(self, payload: &[u8]) -> Vec<u8> {
        let tag = self.domain_tag();
        let mut buf = Vec::with_capacity(tag.len() + payload.len());
        buf.extend_from_slice(tag);
        buf.extend_from_slice(payload);
        buf
    }
}

// ---------------------------------------------------------------------------
// PublicKeySet
// ---------------------------------------------------------------------------

/// The three public components of an identity, as they appear in a
/// published document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeySet {
    /// Verifies assertion-context signatures.
    pub signing: TesseraPublicKey,
    /// Verifies management-context signatures.
    pub management: TesseraPublicKey,
    /// Target for sealed recovery shares.
    pub encryption: EncryptionPublicKey,
}

impl PublicKeySet {
    /// Verify a signature under the given context.
    ///
    /// Selects the matching public key and prepends the context's domain
    /// tag, mirroring [`KeyRing::sign`]. A signature presented under the
    /// wrong context returns `false`.
    pub fn verify(&self, context: SigningContext, payload: &[u8], signature: &TesseraSignature) -> bool {
        let key = match context {
            SigningContext::Assertion => &self.signing,
            SigningContext::Management => &self.management,
        };
        key.verify(&context.tagged(payload), signature)
    }
}

/// Verify a context-tagged signature against a single public key.
///
/// For callers that hold one key rather than a full [`PublicKeySet`] —
/// e.g. a ledger checking the management signature embedded in an
/// anchoring transaction.
pub fn verify_signature(
    key: &TesseraPublicKey,
    context: SigningContext,
    payload: &[u8],
    signature: &TesseraSignature,
) -> bool {
    key.verify(&context.tagged(payload), signature)
}

// ---------------------------------------------------------------------------
// KeyRingState
// ---------------------------------------------------------------------------

/// Exported key material for persistence by the caller.
///
/// This is raw private key material in hex. Whoever calls
/// [`KeyRing::export`] owns the problem of storing it safely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRingState {
    /// Hex-encoded Ed25519 signing seed.
    pub signing_seed: String,
    /// Hex-encoded Ed25519 management seed.
    pub management_seed: String,
    /// Hex-encoded X25519 encryption secret.
    pub encryption_secret: String,
}

fn decode_seed(hex_str: &str, label: &str) -> Result<[u8; 32], KeyRingError> {
    let bytes = hex::decode(hex_str)
        .map_err(|_| KeyRingError::InvalidState(format!("{} is not valid hex", label)))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| KeyRingError::InvalidState(format!("{} must decode to 32 bytes", label)))
}

// ---------------------------------------------------------------------------
// KeyRing
// ---------------------------------------------------------------------------

/// The complete local key material of one identity.
///
/// Exclusively owned: one `KeyRing` per live identity, never shared between
/// logical operations. Creation happens at identity creation or as the
/// final step of recovery; the material is immutable once created except
/// for full replacement during recovery.
#[derive(Clone)]
pub struct KeyRing {
    signing: TesseraKeypair,
    management: TesseraKeypair,
    encryption: EncryptionKeypair,
}

impl KeyRing {
    /// Generate fresh key material for all three pairs.
    ///
    /// No external side effects. The only failure mode is an entropy-source
    /// failure inside the OS CSPRNG, which panics rather than returning —
    /// there is no sane way to continue without randomness.
    pub fn generate() -> Self {
        Self {
            signing: TesseraKeypair::generate(),
            management: TesseraKeypair::generate(),
            encryption: EncryptionKeypair::generate(),
        }
    }

    /// The three public components for inclusion in a document.
    pub fn public_keys(&self) -> PublicKeySet {
        PublicKeySet {
            signing: self.signing.public_key(),
            management: self.management.public_key(),
            encryption: self.encryption.public_key(),
        }
    }

    /// Sign a payload under the given context.
    ///
    /// The payload is prefixed with the context's domain tag before the
    /// context's keypair signs it. Deterministic for a given (context,
    /// payload) pair.
    pub fn sign(&self, context: SigningContext, payload: &[u8]) -> TesseraSignature {
        let keypair = match context {
            SigningContext::Assertion => &self.signing,
            SigningContext::Management => &self.management,
        };
        keypair.sign(&context.tagged(payload))
    }

    /// Symmetrically encrypt under the delegate-list key.
    ///
    /// The key is derived from the management seed with BLAKE3's
    /// `derive_key` mode, so only the holder of this key ring can produce
    /// or read these ciphertexts. Returns `(ciphertext, nonce)`.
    pub fn sym_encrypt(&self, plaintext: &[u8]) -> Result<(Vec<u8>, [u8; AES_NONCE_LENGTH]), KeyRingError> {
        let key = self.delegate_list_key();
        let (nonce, ciphertext) = encryption::encrypt_detached(&key, plaintext)?;
        Ok((ciphertext, nonce))
    }

    /// Inverse of [`sym_encrypt`](Self::sym_encrypt).
    ///
    /// Fails with [`KeyRingError::Integrity`] when the authentication tag
    /// does not check out — never returns unauthenticated plaintext.
    pub fn sym_decrypt(&self, ciphertext: &[u8], nonce: &[u8; AES_NONCE_LENGTH]) -> Result<Vec<u8>, KeyRingError> {
        let key = self.delegate_list_key();
        Ok(encryption::decrypt_detached(&key, ciphertext, nonce)?)
    }

    /// Open a sealed envelope addressed to this identity's encryption key.
    pub fn open_envelope(&self, envelope: &SealedEnvelope) -> Result<Vec<u8>, sealed::SealedError> {
        sealed::open(envelope, &self.encryption)
    }

    /// Export raw key material for persistence.
    ///
    /// The one place besides [`recoverable_secret`](Self::recoverable_secret)
    /// where private bytes cross the boundary. Callers are responsible for
    /// secure storage.
    pub fn export(&self) -> KeyRingState {
        KeyRingState {
            signing_seed: hex::encode(self.signing.seed()),
            management_seed: hex::encode(self.management.seed()),
            encryption_secret: hex::encode(self.encryption.secret_bytes()),
        }
    }

    /// Rebuild a key ring from exported state.
    pub fn restore(state: &KeyRingState) -> Result<Self, KeyRingError> {
        let signing_seed = decode_seed(&state.signing_seed, "signing seed")?;
        let management_seed = decode_seed(&state.management_seed, "management seed")?;
        let encryption_secret = decode_seed(&state.encryption_secret, "encryption secret")?;
        Ok(Self {
            signing: TesseraKeypair::from_seed(&signing_seed),
            management: TesseraKeypair::from_seed(&management_seed),
            encryption: EncryptionKeypair::from_bytes(&encryption_secret),
        })
    }

    /// The 96-byte blob that recovery delegates collectively safeguard:
    /// signing seed, management seed, encryption secret, concatenated.
    pub fn recoverable_secret(&self) -> [u8; RECOVERABLE_SECRET_LENGTH] {
        let mut secret = [0u8; RECOVERABLE_SECRET_LENGTH];
        secret[..SIGNING_KEY_LENGTH].copy_from_slice(&self.signing.seed());
        secret[SIGNING_KEY_LENGTH..SIGNING_KEY_LENGTH * 2]
            .copy_from_slice(&self.management.seed());
        secret[SIGNING_KEY_LENGTH * 2..].copy_from_slice(&self.encryption.secret_bytes());
        secret
    }

    /// Rebuild a complete key ring from a reconstructed recoverable secret.
    pub fn restore_from_secret(secret: &[u8]) -> Result<Self, KeyRingError> {
        if secret.len() != RECOVERABLE_SECRET_LENGTH {
            return Err(KeyRingError::SecretLength {
                expected: RECOVERABLE_SECRET_LENGTH,
                got: secret.len(),
            });
        }
        let signing_seed: [u8; 32] = secret[..SIGNING_KEY_LENGTH].try_into().expect("split sizes");
        let management_seed: [u8; 32] = secret[SIGNING_KEY_LENGTH..SIGNING_KEY_LENGTH * 2]
            .try_into()
            .expect("split sizes");
        let encryption_secret: [u8; ENCRYPTION_KEY_LENGTH] = secret[SIGNING_KEY_LENGTH * 2..]
            .try_into()
            .expect("split sizes");
        Ok(Self {
            signing: TesseraKeypair::from_seed(&signing_seed),
            management: TesseraKeypair::from_seed(&management_seed),
            encryption: EncryptionKeypair::from_bytes(&encryption_secret),
        })
    }

    fn delegate_list_key(&self) -> [u8; 32] {
        blake3::derive_key(DELEGATE_LIST_KEY_CONTEXT, &self.management.seed())
    }
}

impl fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Public halves only.
        f.debug_struct("KeyRing")
            .field("signing", &self.signing.public_key())
            .field("management", &self.management.public_key())
            .field("encryption", &self.encryption.public_key())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_produces_three_distinct_keys() {
        let ring = KeyRing::generate();
        let keys = ring.public_keys();
        assert_ne!(keys.signing, keys.management);
        assert_ne!(keys.signing.as_bytes(), keys.encryption.as_bytes());
    }

    #[test]
    fn sign_verify_within_context() {
        let ring = KeyRing::generate();
        let keys = ring.public_keys();
        let payload = b"attest: the sky is blue";

        let sig = ring.sign(SigningContext::Assertion, payload);
        assert!(keys.verify(SigningContext::Assertion, payload, &sig));

        let sig = ring.sign(SigningContext::Management, payload);
        assert!(keys.verify(SigningContext::Management, payload, &sig));
    }

    #[test]
    fn contexts_are_not_interchangeable() {
        let ring = KeyRing::generate();
        let keys = ring.public_keys();
        let payload = b"anchor document v2";

        let management_sig = ring.sign(SigningContext::Management, payload);
        assert!(!keys.verify(SigningContext::Assertion, payload, &management_sig));

        let assertion_sig = ring.sign(SigningContext::Assertion, payload);
        assert!(!keys.verify(SigningContext::Management, payload, &assertion_sig));
    }

    #[test]
    fn context_separation_survives_shared_key_material() {
        // Even with the same seed behind both keypairs, the domain tags keep
        // the contexts apart.
        let seed = [7u8; 32];
        let ring = KeyRing {
            signing: TesseraKeypair::from_seed(&seed),
            management: TesseraKeypair::from_seed(&seed),
            encryption: EncryptionKeypair::generate(),
        };
        let keys = ring.public_keys();
        let sig = ring.sign(SigningContext::Assertion, b"payload");
        assert!(keys.verify(SigningContext::Assertion, b"payload", &sig));
        assert!(!keys.verify(SigningContext::Management, b"payload", &sig));
    }

    #[test]
    fn sym_roundtrip() {
        let ring = KeyRing::generate();
        let (ciphertext, nonce) = ring.sym_encrypt(b"delegate list").unwrap();
        assert_eq!(ring.sym_decrypt(&ciphertext, &nonce).unwrap(), b"delegate list");
    }

    #[test]
    fn sym_decrypt_rejects_tampering() {
        let ring = KeyRing::generate();
        let (mut ciphertext, nonce) = ring.sym_encrypt(b"delegate list").unwrap();
        ciphertext[0] ^= 0x01;
        assert!(matches!(
            ring.sym_decrypt(&ciphertext, &nonce),
            Err(KeyRingError::Integrity(_))
        ));
    }

    #[test]
    fn sym_decrypt_fails_for_other_ring() {
        let ring1 = KeyRing::generate();
        let ring2 = KeyRing::generate();
        let (ciphertext, nonce) = ring1.sym_encrypt(b"private").unwrap();
        assert!(ring2.sym_decrypt(&ciphertext, &nonce).is_err());
    }

    #[test]
    fn export_restore_roundtrip() {
        let ring = KeyRing::generate();
        let restored = KeyRing::restore(&ring.export()).unwrap();
        assert_eq!(ring.public_keys(), restored.public_keys());

        // Restored ring produces signatures the original keys accept.
        let sig = restored.sign(SigningContext::Assertion, b"post-restore");
        assert!(ring.public_keys().verify(SigningContext::Assertion, b"post-restore", &sig));
    }

    #[test]
    fn restore_rejects_bad_state() {
        let mut state = KeyRing::generate().export();
        state.signing_seed = "not-hex".into();
        assert!(matches!(
            KeyRing::restore(&state),
            Err(KeyRingError::InvalidState(_))
        ));

        let mut state = KeyRing::generate().export();
        state.management_seed = "deadbeef".into();
        assert!(KeyRing::restore(&state).is_err());
    }

    #[test]
    fn recoverable_secret_rebuilds_full_ring() {
        let ring = KeyRing::generate();
        let secret = ring.recoverable_secret();
        let rebuilt = KeyRing::restore_from_secret(&secret).unwrap();
        assert_eq!(ring.public_keys(), rebuilt.public_keys());

        // The rebuilt ring can read ciphertexts the original produced.
        let (ciphertext, nonce) = ring.sym_encrypt(b"before the crash").unwrap();
        assert_eq!(rebuilt.sym_decrypt(&ciphertext, &nonce).unwrap(), b"before the crash");
    }

    #[test]
    fn restore_from_secret_rejects_wrong_length() {
        assert!(matches!(
            KeyRing::restore_from_secret(&[0u8; 64]),
            Err(KeyRingError::SecretLength { expected: 96, got: 64 })
        ));
    }

    #[test]
    fn open_envelope_with_ring_encryption_key() {
        let ring = KeyRing::generate();
        let envelope =
            crate::crypto::sealed::seal(&ring.public_keys().encryption, b"a share for you").unwrap();
        assert_eq!(ring.open_envelope(&envelope).unwrap(), b"a share for you");
    }

    #[test]
    fn debug_does_not_leak_secrets() {
        let ring = KeyRing::generate();
        let debug_str = format!("{:?}", ring);
        let state = ring.export();
        assert!(!debug_str.contains(&state.signing_seed));
        assert!(!debug_str.contains(&state.management_seed));
        assert!(!debug_str.contains(&state.encryption_secret));
    }
}
