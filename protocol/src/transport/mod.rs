//! # External Collaborator Contracts
//!
//! The protocol core does not ship a content store, a ledger client, or a
//! token format. It consumes four collaborator contracts, injected into the
//! controller at construction — explicitly owned by the caller, with no
//! module-global transport state and no implicit first-use initialization:
//!
//! - [`Resolver`] — identifier → current identity document.
//! - [`Publisher`] — identity document → content address.
//! - [`AnchorTransactionBuilder`] — builds, prices, and broadcasts the
//!   ledger transactions that anchor document updates.
//! - [`AssertionEncoder`] — encodes and decodes signed assertion tokens;
//!   the core contributes only "sign these bytes" and "verify these bytes".
//!
//! Reference in-process implementations live in [`memory`]; they are what
//! the test suite, the demo, and the local CLI run against.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::hash::double_sha256;
use crate::crypto::keys::{TesseraPublicKey, TesseraSignature};
use crate::identity::document::IdentityDocument;
use crate::identity::keyring::{verify_signature, KeyRing, PublicKeySet, SigningContext};
use crate::identity::tessera_id::{ContentAddress, TesseraId};

pub mod memory;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from identifier resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No document exists at the identifier's content address.
    #[error("no document found for {0}")]
    NotFound(TesseraId),

    /// A document was found but failed parsing or validation.
    #[error("resolved document is malformed: {0}")]
    Malformed(String),
}

/// Errors from document publication. Transient by assumption — the caller
/// may retry; the core never does so silently.
#[derive(Debug, Error)]
#[error("publish failed: {detail}")]
pub struct PublishError {
    /// What went wrong, with enough context to decide on a retry.
    pub detail: String,
}

/// Errors from broadcasting an anchoring transaction.
///
/// Carries the attempted transaction id so the caller can resubmit with a
/// fresh nonce — resubmission is the caller's decision, never automatic.
#[derive(Debug, Error)]
#[error("broadcast of tx {tx_id} failed: {detail}")]
pub struct BroadcastError {
    /// Id of the transaction that failed.
    pub tx_id: String,
    /// Ledger-reported reason.
    pub detail: String,
}

/// Errors from assertion token handling.
#[derive(Debug, Error)]
pub enum AssertionError {
    /// The token is not decodable as a token at all.
    #[error("malformed assertion token: {0}")]
    Malformed(String),

    /// The signature does not verify against the issuer's signing key.
    #[error("assertion signature verification failed")]
    Verification,

    /// The token names a different audience.
    #[error("audience mismatch: token is for {got}, expected {expected}")]
    AudienceMismatch {
        /// Audience the verifier expected.
        expected: TesseraId,
        /// Audience named in the token.
        got: TesseraId,
    },

    /// The token's validity window has passed.
    #[error("assertion token expired at {0}")]
    Expired(DateTime<Utc>),
}

// ---------------------------------------------------------------------------
// Resolution & publication
// ---------------------------------------------------------------------------

/// Maps an identifier to its current identity document.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Fetch and parse the document at `id`'s content address.
    ///
    /// Implementations return the document as stored; shape validation
    /// beyond parseability is the caller's job (the controller runs
    /// [`IdentityDocument::validate`] on every resolution).
    async fn resolve(&self, id: &TesseraId) -> Result<IdentityDocument, ResolveError>;
}

/// Stores a document in the content-addressed store.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Persist the document and return its content address.
    ///
    /// The address must be derived from the document's canonical bytes so
    /// that identical documents land at identical addresses.
    async fn publish(&self, document: &IdentityDocument) -> Result<ContentAddress, PublishError>;
}

// ---------------------------------------------------------------------------
// Anchoring
// ---------------------------------------------------------------------------

/// Unsigned parameters of an anchoring transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorTxParams {
    /// Ledger address (hex management key) funding the transaction.
    pub from_address: String,
    /// Content address being anchored.
    pub content_address: ContentAddress,
    /// Per-sender sequence number assigned by the ledger client.
    pub nonce: u64,
    /// Fee quoted at build time, in the ledger's smallest unit.
    pub fee: u64,
}

impl AnchorTxParams {
    /// Canonical byte representation for signing and id computation:
    /// null-separated strings and fixed-width little-endian integers.
    /// Deliberately not serde — field order on the wire must never depend
    /// on a serializer.
    pub fn signable_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(128);
        buf.extend_from_slice(self.from_address.as_bytes());
        buf.push(0x00);
        buf.extend_from_slice(self.content_address.as_str().as_bytes());
        buf.push(0x00);
        buf.extend_from_slice(&self.nonce.to_le_bytes());
        buf.extend_from_slice(&self.fee.to_le_bytes());
        buf
    }
}

/// Estimated cost of an anchoring transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorCost {
    /// Total fee in the ledger's smallest unit.
    pub fee: u64,
}

/// A management-signed anchoring transaction, ready for broadcast.
///
/// Produced by `update_delegates` and *returned* to the caller rather than
/// broadcast — committing funds is not a decision the core makes
/// unilaterally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedAnchorTx {
    /// Hex double-SHA-256 of the signable bytes.
    pub id: String,
    /// The signed parameters.
    pub params: AnchorTxParams,
    /// Management public key, embedded so the ledger can verify without a
    /// separate resolution.
    pub management_key: TesseraPublicKey,
    /// Management-context signature over [`AnchorTxParams::signable_bytes`].
    pub signature: TesseraSignature,
}

impl SignedAnchorTx {
    /// Sign transaction parameters with the key ring's management key.
    pub fn sign(params: AnchorTxParams, keyring: &KeyRing) -> Self {
        let signable = params.signable_bytes();
        let id = hex::encode(double_sha256(&signable));
        let signature = keyring.sign(SigningContext::Management, &signable);
        Self {
            id,
            params,
            management_key: keyring.public_keys().management,
            signature,
        }
    }

    /// Verify internal consistency: the id matches the params and the
    /// signature verifies under the management context against the
    /// embedded key. Whether that key is the *right* management key for
    /// the anchored identity is the ledger's (or verifier's) concern.
    pub fn verify(&self) -> bool {
        let signable = self.params.signable_bytes();
        if self.id != hex::encode(double_sha256(&signable)) {
            return false;
        }
        verify_signature(
            &self.management_key,
            SigningContext::Management,
            &signable,
            &self.signature,
        )
    }
}

/// Receipt returned by a successful broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorReceipt {
    /// Id of the accepted transaction.
    pub tx_id: String,
    /// Position assigned by the ledger (block height, sequence number...).
    pub position: u64,
    /// When the ledger accepted it.
    pub accepted_at: DateTime<Utc>,
}

/// Builds, prices, and broadcasts anchoring transactions.
#[async_trait]
pub trait AnchorTransactionBuilder: Send + Sync {
    /// Build unsigned transaction parameters anchoring `content_address`
    /// from `from_address`, including a fresh nonce.
    async fn build_publish_tx(
        &self,
        content_address: &ContentAddress,
        from_address: &str,
    ) -> AnchorTxParams;

    /// Estimate the cost of broadcasting `params`.
    async fn estimate_cost(&self, params: &AnchorTxParams) -> AnchorCost;

    /// Broadcast a signed transaction. Not retried on failure —
    /// resubmission with a fresh nonce is the caller's responsibility.
    async fn broadcast(&self, tx: &SignedAnchorTx) -> Result<AnchorReceipt, BroadcastError>;
}

// ---------------------------------------------------------------------------
// Assertions
// ---------------------------------------------------------------------------

/// Standard claims carried by every assertion token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
    /// The identity that signed the assertion.
    pub issuer: TesseraId,
    /// The identity the assertion is addressed to.
    pub audience: TesseraId,
    /// When the token was issued.
    pub issued_at: DateTime<Utc>,
    /// Hard expiry; tokens without one fall back to the system TTL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Encodes and decodes signed assertion tokens.
///
/// The encoding format (JWT or otherwise) is the collaborator's business.
/// The core supplies a signing function on encode and the issuer's
/// published keys on decode — signature bytes never mean anything outside
/// the assertion signing context.
pub trait AssertionEncoder: Send + Sync {
    /// Encode `payload` and `claims` into a token, signing with `signer`.
    fn encode(
        &self,
        payload: &serde_json::Value,
        claims: &AssertionClaims,
        signer: &dyn Fn(&[u8]) -> TesseraSignature,
    ) -> Result<String, AssertionError>;

    /// Extract the issuer identifier without verifying, so the caller can
    /// resolve the issuer's keys first.
    fn issuer(&self, token: &str) -> Result<TesseraId, AssertionError>;

    /// Verify `token` against the issuer's published keys and the expected
    /// audience, returning the payload on success.
    fn decode(
        &self,
        token: &str,
        issuer_keys: &PublicKeySet,
        audience: &TesseraId,
    ) -> Result<serde_json::Value, AssertionError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::tessera_id::ContentAddress;

    fn params() -> AnchorTxParams {
        AnchorTxParams {
            from_address: "ab".repeat(32),
            content_address: ContentAddress::for_bytes(b"doc"),
            nonce: 7,
            fee: 1_500,
        }
    }

    #[test]
    fn signable_bytes_cover_every_field() {
        let base = params();

        let mut changed = base.clone();
        changed.nonce += 1;
        assert_ne!(base.signable_bytes(), changed.signable_bytes());

        let mut changed = base.clone();
        changed.fee += 1;
        assert_ne!(base.signable_bytes(), changed.signable_bytes());

        let mut changed = base.clone();
        changed.content_address = ContentAddress::for_bytes(b"other doc");
        assert_ne!(base.signable_bytes(), changed.signable_bytes());
    }

    #[test]
    fn signed_tx_verifies() {
        let keyring = KeyRing::generate();
        let tx = SignedAnchorTx::sign(params(), &keyring);
        assert!(tx.verify());
        assert_eq!(tx.id.len(), 64);
    }

    #[test]
    fn tampered_params_fail_verification() {
        let keyring = KeyRing::generate();
        let mut tx = SignedAnchorTx::sign(params(), &keyring);
        tx.params.fee += 1;
        assert!(!tx.verify());
    }

    #[test]
    fn assertion_context_signature_does_not_authorize_anchoring() {
        let keyring = KeyRing::generate();
        let p = params();
        let signable = p.signable_bytes();
        // Sign the right bytes under the wrong context.
        let wrong_context_sig = keyring.sign(SigningContext::Assertion, &signable);
        let tx = SignedAnchorTx {
            id: hex::encode(double_sha256(&signable)),
            params: p,
            management_key: keyring.public_keys().management,
            signature: wrong_context_sig,
        };
        assert!(!tx.verify());
    }

    #[test]
    fn tx_serde_roundtrip() {
        let keyring = KeyRing::generate();
        let tx = SignedAnchorTx::sign(params(), &keyring);
        let json = serde_json::to_string(&tx).unwrap();
        let parsed: SignedAnchorTx = serde_json::from_str(&json).unwrap();
        assert_eq!(tx, parsed);
        assert!(parsed.verify());
    }
}
