//! # In-Process Reference Collaborators
//!
//! Working implementations of the collaborator contracts, backed by plain
//! process memory. The test suite, the demo, and the local CLI run the full
//! protocol against these; production deployments swap in real content
//! stores, ledger clients, and token libraries behind the same traits.
//!
//! Faithfulness over convenience: the [`MemoryLedger`] really does verify
//! management signatures and really does reject nonce reuse, because a
//! reference collaborator that accepts anything would let controller bugs
//! sail through the integration tests.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::{ANCHOR_BASE_FEE, ANCHOR_FEE_PER_BYTE, ASSERTION_TTL};
use crate::crypto::keys::TesseraSignature;
use crate::identity::document::IdentityDocument;
use crate::identity::keyring::{PublicKeySet, SigningContext};
use crate::identity::tessera_id::{ContentAddress, TesseraId};

use super::{
    AnchorCost, AnchorReceipt, AnchorTransactionBuilder, AnchorTxParams, AssertionClaims,
    AssertionEncoder, AssertionError, BroadcastError, PublishError, Publisher, ResolveError,
    Resolver, SignedAnchorTx,
};

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// A content-addressed store in a `HashMap`.
///
/// Addresses are derived from canonical document bytes exactly as
/// [`ContentAddress::for_bytes`] does, so locally predicted addresses always
/// match what `publish` returns. Objects are immutable once stored —
/// publishing the same bytes twice is a no-op at the same address.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects, for test assertions.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Whether the store holds nothing yet.
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl Publisher for MemoryStore {
    async fn publish(&self, document: &IdentityDocument) -> Result<ContentAddress, PublishError> {
        let bytes = document.canonical_bytes();
        let address = ContentAddress::for_bytes(&bytes);
        self.objects
            .write()
            .insert(address.as_str().to_string(), bytes);
        Ok(address)
    }
}

#[async_trait]
impl Resolver for MemoryStore {
    async fn resolve(&self, id: &TesseraId) -> Result<IdentityDocument, ResolveError> {
        let bytes = self
            .objects
            .read()
            .get(id.content_address().as_str())
            .cloned()
            .ok_or_else(|| ResolveError::NotFound(id.clone()))?;
        serde_json::from_slice(&bytes).map_err(|e| ResolveError::Malformed(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// MemoryLedger
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct LedgerState {
    /// Next nonce per from-address.
    nonces: HashMap<String, u64>,
    /// Accepted transactions, in order.
    accepted: Vec<SignedAnchorTx>,
}

/// A simulated anchoring ledger with a flat fee model.
///
/// Broadcast enforces what a real ledger would: the management signature
/// must verify and a (from, nonce) pair is spent exactly once.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: RwLock<LedgerState>,
}

impl MemoryLedger {
    /// An empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepted transaction count, for test assertions.
    pub fn accepted_count(&self) -> usize {
        self.state.read().accepted.len()
    }

    /// The most recently anchored content address for a sender, if any.
    /// This is the lookup a resolver follows to find an identity's current
    /// document version.
    pub fn latest_anchor(&self, from_address: &str) -> Option<ContentAddress> {
        self.state
            .read()
            .accepted
            .iter()
            .rev()
            .find(|tx| tx.params.from_address == from_address)
            .map(|tx| tx.params.content_address.clone())
    }
}

#[async_trait]
impl AnchorTransactionBuilder for MemoryLedger {
    async fn build_publish_tx(
        &self,
        content_address: &ContentAddress,
        from_address: &str,
    ) -> AnchorTxParams {
        let mut state = self.state.write();
        let nonce = state.nonces.entry(from_address.to_string()).or_insert(0);
        *nonce += 1;
        AnchorTxParams {
            from_address: from_address.to_string(),
            content_address: content_address.clone(),
            nonce: *nonce,
            fee: ANCHOR_BASE_FEE
                + ANCHOR_FEE_PER_BYTE * content_address.as_str().len() as u64,
        }
    }

    async fn estimate_cost(&self, params: &AnchorTxParams) -> AnchorCost {
        AnchorCost { fee: params.fee }
    }

    async fn broadcast(&self, tx: &SignedAnchorTx) -> Result<AnchorReceipt, BroadcastError> {
        if !tx.verify() {
            return Err(BroadcastError {
                tx_id: tx.id.clone(),
                detail: "management signature rejected".into(),
            });
        }

        let mut state = self.state.write();
        let replayed = state.accepted.iter().any(|accepted| {
            accepted.params.from_address == tx.params.from_address
                && accepted.params.nonce == tx.params.nonce
        });
        if replayed {
            return Err(BroadcastError {
                tx_id: tx.id.clone(),
                detail: format!("nonce {} already spent", tx.params.nonce),
            });
        }

        state.accepted.push(tx.clone());
        Ok(AnchorReceipt {
            tx_id: tx.id.clone(),
            position: state.accepted.len() as u64,
            accepted_at: Utc::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// LedgerResolver
// ---------------------------------------------------------------------------

/// The full resolution chain: content fetch plus anchor indirection.
///
/// An identifier names the *genesis* document by content address. Updates
/// publish new immutable objects and move resolution forward by anchoring
/// the new address on the ledger under the identity's management key. This
/// resolver follows that chain: fetch genesis, look up the latest anchor
/// from its management key, and fetch the anchored head if one exists.
/// Until an update's transaction is broadcast, resolution keeps returning
/// the previous version — exactly the "old document stays authoritative"
/// behavior the update protocol promises.
#[derive(Debug)]
pub struct LedgerResolver {
    store: std::sync::Arc<MemoryStore>,
    ledger: std::sync::Arc<MemoryLedger>,
}

impl LedgerResolver {
    /// Compose a resolver over a content store and an anchoring ledger.
    pub fn new(store: std::sync::Arc<MemoryStore>, ledger: std::sync::Arc<MemoryLedger>) -> Self {
        Self { store, ledger }
    }
}

#[async_trait]
impl Resolver for LedgerResolver {
    async fn resolve(&self, id: &TesseraId) -> Result<IdentityDocument, ResolveError> {
        let genesis = self.store.resolve(id).await?;

        let from = genesis.management_key.to_hex();
        match self.ledger.latest_anchor(&from) {
            Some(head) if &head != id.content_address() => {
                let head_id = TesseraId::from_content_address(head);
                self.store.resolve(&head_id).await
            }
            _ => Ok(genesis),
        }
    }
}

// ---------------------------------------------------------------------------
// JsonAssertionEncoder
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenBody {
    claims: AssertionClaims,
    payload: serde_json::Value,
}

/// A JWT-shaped token encoder: `hex(header).hex(body).hex(signature)`.
///
/// The signature covers the ASCII `header.body` prefix, signed under the
/// assertion context. Hex segments keep the implementation dependency-free;
/// a production deployment would swap in a real JWT library behind the same
/// trait.
#[derive(Debug, Default)]
pub struct JsonAssertionEncoder;

impl JsonAssertionEncoder {
    /// A new encoder. Stateless.
    pub fn new() -> Self {
        Self
    }

    fn split(token: &str) -> Result<(&str, &str, &str), AssertionError> {
        let mut parts = token.splitn(3, '.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(b), Some(s)) if !h.is_empty() && !b.is_empty() && !s.is_empty() => {
                Ok((h, b, s))
            }
            _ => Err(AssertionError::Malformed(
                "token must have three non-empty segments".into(),
            )),
        }
    }

    fn decode_body(segment: &str) -> Result<TokenBody, AssertionError> {
        let bytes =
            hex::decode(segment).map_err(|e| AssertionError::Malformed(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| AssertionError::Malformed(e.to_string()))
    }
}

impl AssertionEncoder for JsonAssertionEncoder {
    fn encode(
        &self,
        payload: &serde_json::Value,
        claims: &AssertionClaims,
        signer: &dyn Fn(&[u8]) -> TesseraSignature,
    ) -> Result<String, AssertionError> {
        let header = TokenHeader {
            alg: "Ed25519".into(),
            typ: "TSRA".into(),
        };
        let body = TokenBody {
            claims: claims.clone(),
            payload: payload.clone(),
        };

        let header_seg = hex::encode(
            serde_json::to_vec(&header).map_err(|e| AssertionError::Malformed(e.to_string()))?,
        );
        let body_seg = hex::encode(
            serde_json::to_vec(&body).map_err(|e| AssertionError::Malformed(e.to_string()))?,
        );

        let signable = format!("{}.{}", header_seg, body_seg);
        let signature = signer(signable.as_bytes());

        Ok(format!("{}.{}", signable, signature.to_hex()))
    }

    fn issuer(&self, token: &str) -> Result<TesseraId, AssertionError> {
        let (_, body_seg, _) = Self::split(token)?;
        Ok(Self::decode_body(body_seg)?.claims.issuer)
    }

    fn decode(
        &self,
        token: &str,
        issuer_keys: &PublicKeySet,
        audience: &TesseraId,
    ) -> Result<serde_json::Value, AssertionError> {
        let (header_seg, body_seg, sig_seg) = Self::split(token)?;
        let body = Self::decode_body(body_seg)?;

        if &body.claims.audience != audience {
            return Err(AssertionError::AudienceMismatch {
                expected: audience.clone(),
                got: body.claims.audience,
            });
        }

        let expires_at = body.claims.expires_at.unwrap_or_else(|| {
            body.claims.issued_at + Duration::seconds(ASSERTION_TTL.as_secs() as i64)
        });
        if Utc::now() > expires_at {
            return Err(AssertionError::Expired(expires_at));
        }

        let signature = TesseraSignature::from_hex(sig_seg)
            .map_err(|e| AssertionError::Malformed(e.to_string()))?;
        let signable = format!("{}.{}", header_seg, body_seg);
        if !issuer_keys.verify(SigningContext::Assertion, signable.as_bytes(), &signature) {
            return Err(AssertionError::Verification);
        }

        Ok(body.payload)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::document::DocumentBuilder;
    use crate::identity::keyring::KeyRing;
    use serde_json::json;

    fn sample_document() -> IdentityDocument {
        DocumentBuilder::new(KeyRing::generate().public_keys()).build()
    }

    fn id_for(document: &IdentityDocument) -> TesseraId {
        TesseraId::from_content_address(ContentAddress::for_bytes(&document.canonical_bytes()))
    }

    #[tokio::test]
    async fn store_publish_resolve_roundtrip() {
        let store = MemoryStore::new();
        let doc = sample_document();

        let address = store.publish(&doc).await.unwrap();
        assert_eq!(address, ContentAddress::for_bytes(&doc.canonical_bytes()));

        let id = TesseraId::from_content_address(address);
        let resolved = store.resolve(&id).await.unwrap();
        assert_eq!(resolved, doc);
    }

    #[tokio::test]
    async fn resolve_unknown_is_not_found() {
        let store = MemoryStore::new();
        let id = id_for(&sample_document());
        assert!(matches!(
            store.resolve(&id).await,
            Err(ResolveError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn republishing_identical_bytes_is_stable() {
        let store = MemoryStore::new();
        let doc = sample_document();
        let a1 = store.publish(&doc).await.unwrap();
        let a2 = store.publish(&doc).await.unwrap();
        assert_eq!(a1, a2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn ledger_accepts_valid_tx_and_rejects_replay() {
        let ledger = MemoryLedger::new();
        let keyring = KeyRing::generate();
        let address = ContentAddress::for_bytes(b"doc v2");
        let from = keyring.public_keys().management.to_hex();

        let params = ledger.build_publish_tx(&address, &from).await;
        assert_eq!(params.nonce, 1);
        let cost = ledger.estimate_cost(&params).await;
        assert!(cost.fee >= ANCHOR_BASE_FEE);

        let tx = SignedAnchorTx::sign(params, &keyring);
        let receipt = ledger.broadcast(&tx).await.unwrap();
        assert_eq!(receipt.tx_id, tx.id);
        assert_eq!(ledger.accepted_count(), 1);

        // Same (from, nonce) pair again: rejected, with the tx id attached.
        let err = ledger.broadcast(&tx).await.unwrap_err();
        assert_eq!(err.tx_id, tx.id);
    }

    #[tokio::test]
    async fn ledger_rejects_bad_signature() {
        let ledger = MemoryLedger::new();
        let keyring = KeyRing::generate();
        let address = ContentAddress::for_bytes(b"doc");
        let from = keyring.public_keys().management.to_hex();

        let params = ledger.build_publish_tx(&address, &from).await;
        let mut tx = SignedAnchorTx::sign(params, &keyring);
        tx.params.fee += 1;
        assert!(ledger.broadcast(&tx).await.is_err());
        assert_eq!(ledger.accepted_count(), 0);
    }

    #[tokio::test]
    async fn ledger_nonces_increment_per_sender() {
        let ledger = MemoryLedger::new();
        let address = ContentAddress::for_bytes(b"doc");
        let p1 = ledger.build_publish_tx(&address, "sender-a").await;
        let p2 = ledger.build_publish_tx(&address, "sender-a").await;
        let p3 = ledger.build_publish_tx(&address, "sender-b").await;
        assert_eq!((p1.nonce, p2.nonce, p3.nonce), (1, 2, 1));
    }

    #[tokio::test]
    async fn ledger_resolver_follows_broadcast_anchors() {
        use std::sync::Arc;

        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(MemoryLedger::new());
        let resolver = LedgerResolver::new(store.clone(), ledger.clone());
        let keyring = KeyRing::generate();

        // Genesis document.
        let v1 = DocumentBuilder::new(keyring.public_keys()).build();
        let genesis_address = store.publish(&v1).await.unwrap();
        let id = TesseraId::from_content_address(genesis_address);
        assert_eq!(resolver.resolve(&id).await.unwrap(), v1);

        // Updated document published but NOT anchored: resolution still
        // returns v1.
        let v2 = DocumentBuilder::new(keyring.public_keys())
            .version(2)
            .created_at(v1.created_at)
            .build();
        let v2_address = store.publish(&v2).await.unwrap();
        assert_eq!(resolver.resolve(&id).await.unwrap(), v1);

        // Broadcast the anchor: resolution moves to v2.
        let from = keyring.public_keys().management.to_hex();
        let params = ledger.build_publish_tx(&v2_address, &from).await;
        let tx = SignedAnchorTx::sign(params, &keyring);
        ledger.broadcast(&tx).await.unwrap();

        let resolved = resolver.resolve(&id).await.unwrap();
        assert_eq!(resolved, v2);
        assert!(resolved.is_successor_of(&v1));
    }

    fn claims(issuer: &TesseraId, audience: &TesseraId) -> AssertionClaims {
        AssertionClaims {
            issuer: issuer.clone(),
            audience: audience.clone(),
            issued_at: Utc::now(),
            expires_at: None,
        }
    }

    #[test]
    fn assertion_roundtrip() {
        let encoder = JsonAssertionEncoder::new();
        let keyring = KeyRing::generate();
        let issuer = id_for(&sample_document());
        let audience = id_for(&sample_document());

        let payload = json!({"role": "moderator"});
        let token = encoder
            .encode(&payload, &claims(&issuer, &audience), &|bytes| {
                keyring.sign(SigningContext::Assertion, bytes)
            })
            .unwrap();

        assert_eq!(encoder.issuer(&token).unwrap(), issuer);
        let decoded = encoder
            .decode(&token, &keyring.public_keys(), &audience)
            .unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn assertion_rejects_wrong_audience() {
        let encoder = JsonAssertionEncoder::new();
        let keyring = KeyRing::generate();
        let issuer = id_for(&sample_document());
        let audience = id_for(&sample_document());
        let other = id_for(&sample_document());

        let token = encoder
            .encode(&json!({}), &claims(&issuer, &audience), &|bytes| {
                keyring.sign(SigningContext::Assertion, bytes)
            })
            .unwrap();

        assert!(matches!(
            encoder.decode(&token, &keyring.public_keys(), &other),
            Err(AssertionError::AudienceMismatch { .. })
        ));
    }

    #[test]
    fn assertion_rejects_expired_token() {
        let encoder = JsonAssertionEncoder::new();
        let keyring = KeyRing::generate();
        let issuer = id_for(&sample_document());
        let audience = id_for(&sample_document());

        let mut expired = claims(&issuer, &audience);
        expired.issued_at = Utc::now() - Duration::hours(2);
        expired.expires_at = Some(Utc::now() - Duration::hours(1));

        let token = encoder
            .encode(&json!({}), &expired, &|bytes| {
                keyring.sign(SigningContext::Assertion, bytes)
            })
            .unwrap();

        assert!(matches!(
            encoder.decode(&token, &keyring.public_keys(), &audience),
            Err(AssertionError::Expired(_))
        ));
    }

    #[test]
    fn assertion_rejects_tampered_payload() {
        let encoder = JsonAssertionEncoder::new();
        let keyring = KeyRing::generate();
        let issuer = id_for(&sample_document());
        let audience = id_for(&sample_document());

        let token = encoder
            .encode(&json!({"amount": 5}), &claims(&issuer, &audience), &|b| {
                keyring.sign(SigningContext::Assertion, b)
            })
            .unwrap();

        // Re-encode the body with a different payload, keeping the old
        // signature segment.
        let (header_seg, _, sig_seg) = JsonAssertionEncoder::split(&token).unwrap();
        let forged_body = TokenBody {
            claims: claims(&issuer, &audience),
            payload: json!({"amount": 5_000_000}),
        };
        let forged_seg = hex::encode(serde_json::to_vec(&forged_body).unwrap());
        let forged = format!("{}.{}.{}", header_seg, forged_seg, sig_seg);

        assert!(matches!(
            encoder.decode(&forged, &keyring.public_keys(), &audience),
            Err(AssertionError::Verification)
        ));
    }

    #[test]
    fn assertion_rejects_management_context_signature() {
        // A token signed with the management key (or context) must not pass
        // assertion verification.
        let encoder = JsonAssertionEncoder::new();
        let keyring = KeyRing::generate();
        let issuer = id_for(&sample_document());
        let audience = id_for(&sample_document());

        let token = encoder
            .encode(&json!({}), &claims(&issuer, &audience), &|bytes| {
                keyring.sign(SigningContext::Management, bytes)
            })
            .unwrap();

        assert!(matches!(
            encoder.decode(&token, &keyring.public_keys(), &audience),
            Err(AssertionError::Verification)
        ));
    }

    #[test]
    fn garbage_token_is_malformed() {
        let encoder = JsonAssertionEncoder::new();
        assert!(matches!(
            encoder.issuer("not-a-token"),
            Err(AssertionError::Malformed(_))
        ));
        assert!(matches!(
            encoder.issuer("a.b.c"),
            Err(AssertionError::Malformed(_))
        ));
    }
}
