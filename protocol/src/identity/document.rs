//! # Identity Documents
//!
//! The canonical published shape of an identity: its three public keys and,
//! optionally, a recovery network, a public profile, and the owner's
//! encrypted delegate list. The document is the only state that ever leaves
//! the owner's machine, and its content address in the store is what the
//! identifier points at.
//!
//! ## Optional means absent
//!
//! Optional features are omitted from the serialized form entirely — never
//! null-filled. Two identities that skip every optional feature publish
//! byte-identical shapes (up to key material), which keeps addresses stable
//! and comparable across feature sets.
//!
//! ## Versioning
//!
//! `version` starts at 1 and increments by exactly one on every
//! republication. Resolvers use [`IdentityDocument::is_successor_of`] to
//! check that an updated document is a plausible next step from the one
//! they already trust.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::config::{AES_TAG_LENGTH, DELEGATE_COUNT, DOCUMENT_GENESIS_VERSION};
use crate::crypto::keys::TesseraPublicKey;
use crate::crypto::sealed::{EncryptionPublicKey, SealedEnvelope};
use crate::identity::delegates::EncryptedDelegateList;
use crate::identity::keyring::PublicKeySet;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from document construction and validation.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// A required field is missing or has the wrong shape.
    #[error("malformed document: {0}")]
    Malformed(String),

    /// The recovery network does not contain exactly three entries.
    #[error("recovery network must contain exactly {DELEGATE_COUNT} entries, got {0}")]
    WrongNetworkSize(usize),

    /// A recovery slot is duplicated or outside 1..=3.
    #[error("recovery network slot {0} is duplicated or out of range")]
    BadSlot(u8),
}

// ---------------------------------------------------------------------------
// RecoveryNetwork
// ---------------------------------------------------------------------------

/// One published entry of the recovery network: a slot number and a share
/// sealed to the delegate holding that slot.
///
/// The slot is the share's position in the owner's confidential delegate
/// list. No delegate identifier appears here — who holds the envelope is
/// knowledge the owner keeps in the encrypted list, and a delegate proves
/// the envelope is theirs only by opening it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryEntry {
    /// 1-based position in the owner's delegate list.
    pub slot: u8,
    /// The share, sealed to that delegate's encryption key.
    pub share: SealedEnvelope,
}

/// The ordered set of exactly three sealed recovery shares.
///
/// Constructing one validates the shape, and the validation survives
/// deserialization — a resolved document with a malformed network fails
/// parsing rather than producing a half-trusted value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<RecoveryEntry>", into = "Vec<RecoveryEntry>")]
pub struct RecoveryNetwork {
    entries: Vec<RecoveryEntry>,
}

impl RecoveryNetwork {
    /// Build a network from entries, enforcing exactly three distinct slots
    /// covering 1..=3.
    pub fn new(entries: Vec<RecoveryEntry>) -> Result<Self, DocumentError> {
        if entries.len() != DELEGATE_COUNT {
            return Err(DocumentError::WrongNetworkSize(entries.len()));
        }
        let mut seen = [false; DELEGATE_COUNT + 1];
        for entry in &entries {
            let slot = entry.slot as usize;
            if entry.slot == 0 || slot > DELEGATE_COUNT || seen[slot] {
                return Err(DocumentError::BadSlot(entry.slot));
            }
            seen[slot] = true;
        }
        Ok(Self { entries })
    }

    /// Build a network from sealed envelopes in delegate-list order; the
    /// i-th envelope gets slot `i + 1`.
    pub fn from_envelopes(envelopes: Vec<SealedEnvelope>) -> Result<Self, DocumentError> {
        let entries = envelopes
            .into_iter()
            .enumerate()
            .map(|(i, share)| RecoveryEntry {
                slot: (i + 1) as u8,
                share,
            })
            .collect();
        Self::new(entries)
    }

    /// The entries, in slot order as published.
    pub fn entries(&self) -> &[RecoveryEntry] {
        &self.entries
    }
}

impl TryFrom<Vec<RecoveryEntry>> for RecoveryNetwork {
    type Error = DocumentError;

    fn try_from(entries: Vec<RecoveryEntry>) -> Result<Self, Self::Error> {
        Self::new(entries)
    }
}

impl From<RecoveryNetwork> for Vec<RecoveryEntry> {
    fn from(network: RecoveryNetwork) -> Self {
        network.entries
    }
}

// ---------------------------------------------------------------------------
// PublicProfile
// ---------------------------------------------------------------------------

/// Optional human-facing metadata published with an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicProfile {
    /// Display name.
    pub name: String,

    /// Free-form key-value pairs. The protocol stores these, nothing more.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl PublicProfile {
    /// A profile with just a display name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: HashMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// IdentityDocument
// ---------------------------------------------------------------------------

/// The canonical, published identity document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityDocument {
    /// Monotonic document version, starting at 1.
    pub version: u64,

    /// Verifies assertion-context signatures.
    pub signing_key: TesseraPublicKey,

    /// Verifies management-context signatures on anchoring transactions.
    pub management_key: TesseraPublicKey,

    /// Target for recovery shares sealed to this identity.
    pub encryption_key: EncryptionPublicKey,

    /// Sealed recovery shares, present only when delegates are configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_network: Option<RecoveryNetwork>,

    /// Optional public profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_profile: Option<PublicProfile>,

    /// The owner's encrypted delegate list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_delegates: Option<EncryptedDelegateList>,

    /// When the identity first published.
    pub created_at: DateTime<Utc>,

    /// When this version published. Equal to `created_at` for version 1.
    pub updated_at: DateTime<Utc>,
}

impl IdentityDocument {
    /// The document's three public keys as a verification set.
    pub fn public_keys(&self) -> PublicKeySet {
        PublicKeySet {
            signing: self.signing_key.clone(),
            management: self.management_key.clone(),
            encryption: self.encryption_key,
        }
    }

    /// The canonical byte form used for content addressing.
    ///
    /// serde_json serializes struct fields in declaration order, so equal
    /// documents produce equal bytes and equal addresses.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("document serialization cannot fail")
    }

    /// Validate required fields and shapes.
    ///
    /// Runs on every resolution before the document is trusted. The serde
    /// layer already enforces the recovery network shape; this pass re-checks
    /// what derived deserialization cannot: curve validity of the Ed25519
    /// keys and non-degenerate optional payloads.
    pub fn validate(&self) -> Result<(), DocumentError> {
        if self.version < DOCUMENT_GENESIS_VERSION {
            return Err(DocumentError::Malformed(format!(
                "version must be >= {}, got {}",
                DOCUMENT_GENESIS_VERSION, self.version
            )));
        }

        TesseraPublicKey::try_from_slice(self.signing_key.as_bytes())
            .map_err(|_| DocumentError::Malformed("signing key is not a valid Ed25519 point".into()))?;
        TesseraPublicKey::try_from_slice(self.management_key.as_bytes()).map_err(|_| {
            DocumentError::Malformed("management key is not a valid Ed25519 point".into())
        })?;
        if self.signing_key == self.management_key {
            return Err(DocumentError::Malformed(
                "signing and management keys must be distinct".into(),
            ));
        }

        if let Some(profile) = &self.public_profile {
            if profile.name.trim().is_empty() {
                return Err(DocumentError::Malformed("profile name is empty".into()));
            }
        }

        if let Some(list) = &self.encrypted_delegates {
            if list.ciphertext.len() < AES_TAG_LENGTH {
                return Err(DocumentError::Malformed(
                    "encrypted delegate list is too short to be authentic".into(),
                ));
            }
        }

        if self.updated_at < self.created_at {
            return Err(DocumentError::Malformed(
                "updated_at precedes created_at".into(),
            ));
        }

        Ok(())
    }

    /// Whether `self` is a plausible next version of `prev`: the version
    /// increments by exactly one and the creation timestamp is preserved.
    ///
    /// Key material is allowed to differ — recovery republishes with fresh
    /// keys — so this deliberately checks lineage, not key continuity.
    pub fn is_successor_of(&self, prev: &IdentityDocument) -> bool {
        self.version == prev.version + 1 && self.created_at == prev.created_at
    }
}

// ---------------------------------------------------------------------------
// DocumentBuilder
// ---------------------------------------------------------------------------

/// Assembles an [`IdentityDocument`] from component parts.
///
/// Optional features stay out of the document unless explicitly supplied.
#[derive(Debug)]
pub struct DocumentBuilder {
    keys: PublicKeySet,
    version: u64,
    created_at: Option<DateTime<Utc>>,
    recovery_network: Option<RecoveryNetwork>,
    public_profile: Option<PublicProfile>,
    encrypted_delegates: Option<EncryptedDelegateList>,
}

impl DocumentBuilder {
    /// Start a builder for a fresh genesis document (version 1).
    pub fn new(keys: PublicKeySet) -> Self {
        Self {
            keys,
            version: DOCUMENT_GENESIS_VERSION,
            created_at: None,
            recovery_network: None,
            public_profile: None,
            encrypted_delegates: None,
        }
    }

    /// Set an explicit version (used when republishing).
    pub fn version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Preserve the creation timestamp of an earlier version.
    pub fn created_at(mut self, ts: DateTime<Utc>) -> Self {
        self.created_at = Some(ts);
        self
    }

    /// Attach a recovery network.
    pub fn recovery_network(mut self, network: RecoveryNetwork) -> Self {
        self.recovery_network = Some(network);
        self
    }

    /// Attach a public profile.
    pub fn public_profile(mut self, profile: PublicProfile) -> Self {
        self.public_profile = Some(profile);
        self
    }

    /// Attach the owner's encrypted delegate list.
    pub fn encrypted_delegates(mut self, list: EncryptedDelegateList) -> Self {
        self.encrypted_delegates = Some(list);
        self
    }

    /// Assemble the document. `updated_at` is stamped now; `created_at`
    /// defaults to now for genesis documents.
    pub fn build(self) -> IdentityDocument {
        let now = Utc::now();
        IdentityDocument {
            version: self.version,
            signing_key: self.keys.signing,
            management_key: self.keys.management,
            encryption_key: self.keys.encryption,
            recovery_network: self.recovery_network,
            public_profile: self.public_profile,
            encrypted_delegates: self.encrypted_delegates,
            created_at: self.created_at.unwrap_or(now),
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::sealed;
    use crate::identity::keyring::KeyRing;

    fn keys() -> PublicKeySet {
        KeyRing::generate().public_keys()
    }

    fn sample_network() -> RecoveryNetwork {
        let envelopes: Vec<SealedEnvelope> = (0..3)
            .map(|i| {
                let recipient = sealed::EncryptionKeypair::generate();
                sealed::seal(&recipient.public_key(), format!("share {}", i).as_bytes()).unwrap()
            })
            .collect();
        RecoveryNetwork::from_envelopes(envelopes).unwrap()
    }

    #[test]
    fn minimal_document_validates() {
        let doc = DocumentBuilder::new(keys()).build();
        assert!(doc.validate().is_ok());
        assert_eq!(doc.version, 1);
    }

    #[test]
    fn optional_fields_are_absent_from_json_when_unset() {
        let doc = DocumentBuilder::new(keys()).build();
        let json = serde_json::to_string(&doc).unwrap();
        assert!(!json.contains("recovery_network"));
        assert!(!json.contains("public_profile"));
        assert!(!json.contains("encrypted_delegates"));
    }

    #[test]
    fn optional_fields_present_when_set() {
        let ring = KeyRing::generate();
        let list = EncryptedDelegateList {
            ciphertext: ring.sym_encrypt(b"[]").map(|(c, _)| c).unwrap(),
            nonce: [0u8; 12],
        };
        let doc = DocumentBuilder::new(keys())
            .recovery_network(sample_network())
            .public_profile(PublicProfile::named("alice"))
            .encrypted_delegates(list)
            .build();
        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("recovery_network"));
        assert!(json.contains("\"alice\""));
        assert!(json.contains("encrypted_delegates"));
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn document_json_roundtrip() {
        let doc = DocumentBuilder::new(keys())
            .recovery_network(sample_network())
            .public_profile(PublicProfile::named("bob"))
            .build();
        let json = serde_json::to_string(&doc).unwrap();
        let parsed: IdentityDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(doc, parsed);
    }

    #[test]
    fn canonical_bytes_stable_for_equal_documents() {
        let doc = DocumentBuilder::new(keys()).build();
        assert_eq!(doc.canonical_bytes(), doc.clone().canonical_bytes());
    }

    #[test]
    fn network_rejects_wrong_sizes() {
        let mut entries: Vec<RecoveryEntry> = sample_network().entries().to_vec();
        entries.pop();
        assert!(matches!(
            RecoveryNetwork::new(entries),
            Err(DocumentError::WrongNetworkSize(2))
        ));
    }

    #[test]
    fn network_rejects_duplicate_slots() {
        let mut entries: Vec<RecoveryEntry> = sample_network().entries().to_vec();
        entries[2].slot = 1;
        assert!(matches!(
            RecoveryNetwork::new(entries),
            Err(DocumentError::BadSlot(1))
        ));
    }

    #[test]
    fn network_rejects_zero_slot() {
        let mut entries: Vec<RecoveryEntry> = sample_network().entries().to_vec();
        entries[0].slot = 0;
        assert!(matches!(
            RecoveryNetwork::new(entries),
            Err(DocumentError::BadSlot(0))
        ));
    }

    #[test]
    fn malformed_network_fails_deserialization() {
        // Shape validation runs inside serde, so a resolved document with a
        // two-entry network never parses.
        let doc = DocumentBuilder::new(keys())
            .recovery_network(sample_network())
            .build();
        let mut value: serde_json::Value = serde_json::to_value(&doc).unwrap();
        value["recovery_network"].as_array_mut().unwrap().pop();
        assert!(serde_json::from_value::<IdentityDocument>(value).is_err());
    }

    #[test]
    fn validate_rejects_invalid_signing_key() {
        let mut doc = DocumentBuilder::new(keys()).build();
        doc.signing_key = TesseraPublicKey::from_bytes([0xFF; 32]);
        assert!(matches!(doc.validate(), Err(DocumentError::Malformed(_))));
    }

    #[test]
    fn validate_rejects_shared_signing_and_management_key() {
        let mut doc = DocumentBuilder::new(keys()).build();
        doc.management_key = doc.signing_key.clone();
        assert!(doc.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_profile_name() {
        let mut doc = DocumentBuilder::new(keys()).build();
        doc.public_profile = Some(PublicProfile::named("  "));
        assert!(doc.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_version() {
        let mut doc = DocumentBuilder::new(keys()).build();
        doc.version = 0;
        assert!(doc.validate().is_err());
    }

    #[test]
    fn successor_check() {
        let v1 = DocumentBuilder::new(keys()).build();
        let v2 = DocumentBuilder::new(keys())
            .version(v1.version + 1)
            .created_at(v1.created_at)
            .build();
        assert!(v2.is_successor_of(&v1));
        assert!(!v1.is_successor_of(&v2));
        assert!(!v1.is_successor_of(&v1));

        // A version jump is not a successor.
        let v4 = DocumentBuilder::new(keys())
            .version(v1.version + 3)
            .created_at(v1.created_at)
            .build();
        assert!(!v4.is_successor_of(&v1));
    }

    #[test]
    fn builder_preserves_created_at_across_versions() {
        let v1 = DocumentBuilder::new(keys()).build();
        let v2 = DocumentBuilder::new(keys())
            .version(2)
            .created_at(v1.created_at)
            .build();
        assert_eq!(v1.created_at, v2.created_at);
        assert!(v2.updated_at >= v2.created_at);
    }
}
