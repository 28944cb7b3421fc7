//! # Delegate Registry
//!
//! The sole record of *who* the three recovery delegates are, kept
//! confidential to the owner. The published document carries sealed shares
//! but never a delegate identifier — a delegate learns it holds a share
//! only by successfully opening an envelope, and third parties learn
//! nothing at all. This module maintains the owner's side of that secret:
//! the ordered delegate list, symmetrically encrypted under a key only the
//! owner's key ring can derive.
//!
//! The list order matters. Share index `n` in the recovery network is the
//! share sealed to the `n`-th delegate in this list, so the decrypted list
//! is how the owner remembers which delegate to ask for which slot.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{AES_NONCE_LENGTH, DELEGATE_COUNT};
use crate::identity::keyring::{KeyRing, KeyRingError};
use crate::identity::tessera_id::TesseraId;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from delegate list handling.
#[derive(Debug, Error)]
pub enum DelegateError {
    /// The list must contain exactly three identifiers.
    #[error("expected exactly {DELEGATE_COUNT} delegate identifiers, got {got}")]
    WrongCount {
        /// Number of identifiers supplied.
        got: usize,
    },

    /// The same identifier appears more than once.
    #[error("duplicate delegate identifier: {0}")]
    Duplicate(TesseraId),

    /// An identity cannot be its own recovery delegate.
    #[error("an identity cannot appear in its own delegate list")]
    SelfDelegate,

    /// Decryption failed authentication — tampered list or wrong key ring.
    #[error("encrypted delegate list failed integrity check")]
    Integrity,

    /// Decryption succeeded but the plaintext is not a delegate list.
    #[error("malformed delegate list payload: {0}")]
    Malformed(String),
}

// ---------------------------------------------------------------------------
// EncryptedDelegateList
// ---------------------------------------------------------------------------

/// The ordered delegate list, encrypted under the owner's key ring.
///
/// Published inside the identity document so the owner can recover the
/// list from anywhere, readable by nobody else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedDelegateList {
    /// AES-256-GCM ciphertext (tag included) over the JSON-encoded list.
    pub ciphertext: Vec<u8>,
    /// Nonce used for this encryption.
    pub nonce: [u8; AES_NONCE_LENGTH],
}

/// Validate the shape of a delegate list: exactly three entries, no
/// duplicates, and never the owner itself.
///
/// `owner` is `None` during initial creation, before the identity has an
/// identifier of its own — the self-check is vacuous until then.
pub fn validate_delegate_list(
    owner: Option<&TesseraId>,
    ids: &[TesseraId],
) -> Result<(), DelegateError> {
    if ids.len() != DELEGATE_COUNT {
        return Err(DelegateError::WrongCount { got: ids.len() });
    }
    for (i, id) in ids.iter().enumerate() {
        if ids[..i].contains(id) {
            return Err(DelegateError::Duplicate(id.clone()));
        }
        if owner == Some(id) {
            return Err(DelegateError::SelfDelegate);
        }
    }
    Ok(())
}

/// Encrypt an ordered delegate list under the owner's key ring.
pub fn encrypt_list(
    keyring: &KeyRing,
    owner: Option<&TesseraId>,
    ids: &[TesseraId],
) -> Result<EncryptedDelegateList, DelegateError> {
    validate_delegate_list(owner, ids)?;

    let payload = serde_json::to_vec(ids).map_err(|e| DelegateError::Malformed(e.to_string()))?;
    let (ciphertext, nonce) = keyring
        .sym_encrypt(&payload)
        .map_err(|_| DelegateError::Integrity)?;

    Ok(EncryptedDelegateList { ciphertext, nonce })
}

/// Decrypt a delegate list with the owner's key ring.
///
/// Tampering (or the wrong key ring) surfaces as
/// [`DelegateError::Integrity`]; a list that decrypts but fails shape
/// validation means the stored state predates a rule change or was forged
/// with the right key, and is rejected either way.
pub fn decrypt_list(
    keyring: &KeyRing,
    list: &EncryptedDelegateList,
) -> Result<Vec<TesseraId>, DelegateError> {
    let payload = match keyring.sym_decrypt(&list.ciphertext, &list.nonce) {
        Ok(payload) => payload,
        Err(KeyRingError::Integrity(_)) => return Err(DelegateError::Integrity),
        Err(e) => return Err(DelegateError::Malformed(e.to_string())),
    };

    let ids: Vec<TesseraId> =
        serde_json::from_slice(&payload).map_err(|e| DelegateError::Malformed(e.to_string()))?;
    validate_delegate_list(None, &ids)?;
    Ok(ids)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
