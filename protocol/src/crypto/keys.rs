//! # Ed25519 Key Material
//!
//! Keypair generation and serialization for TESSERA identities.
//!
//! An identity holds two independent Ed25519 keypairs — one that signs
//! assertions, one that authorizes anchoring transactions — and this module
//! provides the shared wrapper types for both. Which keypair signs what is
//! decided a layer up, in [`crate::identity::keyring`], together with the
//! domain-separation tags that keep the two signing contexts apart.
//!
//! ## Security considerations
//!
//! - Private keys are zeroized on drop (`ed25519-dalek` handles this).
//! - Key generation pulls from the OS CSPRNG (`OsRng`). Entropy-source
//!   failure is fatal and not retried.
//! - Seed bytes cross the API boundary only through [`TesseraKeypair::seed`]
//!   and the keyring's export path; nothing here logs or displays them.

use ed25519_dalek::{
    Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey, SECRET_KEY_LENGTH,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Errors that can occur during key operations.
///
/// Deliberately vague about *why* something failed — error messages that
/// describe key material are a gift to attackers.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key bytes: wrong length or not a valid scalar")]
    InvalidSecretKey,

    #[error("invalid public key bytes: not a valid Ed25519 point")]
    InvalidPublicKey,
}

/// An Ed25519 keypair backing one signing context of a TESSERA identity.
///
/// Two of these exist per identity (signing and management), never
/// interchangeably: the keyring stamps every payload with a context tag
/// before it reaches [`TesseraKeypair::sign`].
///
/// `TesseraKeypair` intentionally does NOT implement `Serialize` or
/// `Deserialize`. Exporting a private key must be a deliberate act through
/// the keyring's export path, not something a stray `serde_json::to_string`
/// can do by accident.
pub struct TesseraKeypair {
    signing_key: SigningKey,
}

/// The public half of a keypair, safe to publish in an identity document.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TesseraPublicKey {
    bytes: [u8; 32],
}

/// An Ed25519 signature over a tagged payload.
///
/// Always exactly 64 bytes for signatures we produce. Stored as `Vec<u8>`
/// for serde compatibility; verification of a wrong-length signature simply
/// fails rather than panicking.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TesseraSignature {
    bytes: Vec<u8>,
}

impl TesseraKeypair {
    /// Generate a fresh keypair from the OS cryptographic RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Construct a keypair deterministically from a 32-byte seed.
    ///
    /// In Ed25519 the 32-byte secret key *is* the seed, so this is also the
    /// restore path for Shamir-recovered and locally persisted key material.
    /// A weak seed yields a weak key; the seed must come from a CSPRNG or
    /// from a previous [`seed`](Self::seed) export.
    pub fn from_seed(seed: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Returns the public key for document publication.
    pub fn public_key(&self) -> TesseraPublicKey {
        TesseraPublicKey {
            bytes: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// Sign an opaque byte payload.
    ///
    /// Deterministic per RFC 8032 — same key and payload always produce the
    /// same signature. Callers in this crate pass domain-tagged payloads;
    /// see [`crate::identity::keyring::SigningContext`].
    pub fn sign(&self, payload: &[u8]) -> TesseraSignature {
        TesseraSignature {
            bytes: self.signing_key.sign(payload).to_bytes().to_vec(),
        }
    }

    /// Verify a signature against this keypair's own public key.
    pub fn verify(&self, payload: &[u8], signature: &TesseraSignature) -> bool {
        self.public_key().verify(payload, signature)
    }

    /// Export the raw 32-byte seed.
    ///
    /// **Handle with extreme care.** This is the secret that stands between
    /// an attacker and the identity. It exists so the keyring can build the
    /// recoverable secret and the persisted key state — nothing else should
    /// call it.
    pub fn seed(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }
}

impl Clone for TesseraKeypair {
    fn clone(&self) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&self.signing_key.to_bytes()),
        }
    }
}

impl fmt::Debug for TesseraKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print seed material, not even partially.
        write!(f, "TesseraKeypair(pub={})", self.public_key().to_hex())
    }
}

impl PartialEq for TesseraKeypair {
    fn eq(&self, other: &Self) -> bool {
        // Public keys identify a keypair; comparing secret material in
        // non-constant time is a habit we refuse to form.
        self.public_key() == other.public_key()
    }
}

impl Eq for TesseraKeypair {}

// ---------------------------------------------------------------------------
// TesseraPublicKey
// ---------------------------------------------------------------------------

impl TesseraPublicKey {
    /// Wrap raw bytes without curve validation. For trusted internal paths;
    /// untrusted input goes through [`try_from_slice`](Self::try_from_slice).
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Parse a public key from an untrusted byte slice.
    ///
    /// Rejects wrong lengths and byte strings that are not valid Ed25519
    /// points — resolution hands us documents from arbitrary publishers, and
    /// a degenerate point must not survive into verification.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; 32] = slice.try_into().map_err(|_| KeyError::InvalidPublicKey)?;
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Verify a signature. Returns a plain boolean — callers want yes/no,
    /// and the specific failure mode is none of the verifier's business.
    pub fn verify(&self, payload: &[u8], signature: &TesseraSignature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let sig_bytes: [u8; 64] = match signature.bytes.as_slice().try_into() {
            Ok(b) => b,
            Err(_) => return false,
        };
        verifying_key
            .verify(payload, &DalekSignature::from_bytes(&sig_bytes))
            .is_ok()
    }

    /// Hex-encoded representation, 64 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Parse a hex-encoded public key.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s).map_err(|_| KeyError::InvalidPublicKey)?;
        Self::try_from_slice(&bytes)
    }
}

impl Hash for TesseraPublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl fmt::Display for TesseraPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for TesseraPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TesseraPublicKey({})", &self.to_hex()[..16])
    }
}

// ---------------------------------------------------------------------------
// TesseraSignature
// ---------------------------------------------------------------------------

impl TesseraSignature {
    /// Wrap a raw 64-byte signature.
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    /// Raw signature bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Hex-encoded signature, 128 characters for a valid signature.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Parse a hex-encoded signature. Rejects anything that isn't exactly
    /// 64 bytes once decoded.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 64 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        Ok(Self { bytes })
    }
}

impl fmt::Display for TesseraSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for TesseraSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_str = self.to_hex();
        if hex_str.len() >= 128 {
            write!(f, "TesseraSignature({}...{})", &hex_str[..8], &hex_str[120..])
        } else {
            write!(f, "TesseraSignature({})", hex_str)
        }
    }
}
