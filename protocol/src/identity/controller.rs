//! # Identity Controller
//!
//! Orchestrates the identity lifecycle by composing the key ring, the
//! secret sharer, the delegate registry, and the document model against the
//! injected external collaborators. The controller owns no transport state
//! of its own — every handle is caller-constructed and passed in at build
//! time, with an explicit lifecycle instead of implicit first-use setup.
//!
//! ## State machine
//!
//! ```text
//! Uninitialized → Active → (UpdatingDelegates | Recovering) → Active
//! ```
//!
//! `Active` is the resting state between operations; there is no terminal
//! state. A failed delegate update reverts to `Active` with the previous
//! document still authoritative. Recovery lives in its own
//! [`RecoverySession`] value, which stays in `Recovering` across any number
//! of below-threshold attempts.
//!
//! ## Concurrency contract
//!
//! Delegate key resolutions during `create` and `update_delegates` run
//! concurrently — there is no ordering dependency between them — but all of
//! them complete before the secret is split, so the recovery network is
//! always built against a simultaneous key snapshot. The key ring is
//! exclusively owned by its `Identity`; operations that replace key
//! material take the identity by value or `&mut`, which makes Rust itself
//! serialize them.

use std::sync::Arc;

use futures::future;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::DELEGATE_COUNT;
use crate::crypto::sealed::{EncryptionKeypair, EncryptionPublicKey, SealedEnvelope};
use crate::identity::delegates::{self, DelegateError};
use crate::identity::document::{
    DocumentBuilder, DocumentError, IdentityDocument, PublicProfile, RecoveryNetwork,
};
use crate::identity::keyring::{KeyRing, KeyRingError, KeyRingState, SigningContext};
use crate::identity::sharing::{self, RecoveryShare, SharingError};
use crate::identity::tessera_id::{ContentAddress, TesseraId};
use crate::transport::{
    AnchorCost, AnchorTransactionBuilder, AssertionClaims, AssertionEncoder, AssertionError,
    BroadcastError, PublishError, Publisher, ResolveError, Resolver, SignedAnchorTx,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by controller operations.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Bad caller input, surfaced immediately and never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Delegates(#[from] DelegateError),

    #[error(transparent)]
    Sharing(#[from] SharingError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    KeyRing(#[from] KeyRingError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Broadcast(#[from] BroadcastError),

    #[error(transparent)]
    Assertion(#[from] AssertionError),

    /// No share in the target's recovery network opens with this
    /// identity's encryption key.
    #[error("this identity holds no share for the target")]
    NotADelegate,

    /// Reconstruction produced key material whose public halves differ
    /// from the published document — a wrong or forged share set.
    #[error("recovered key material does not match the published document")]
    RecoveredKeyMismatch,

    /// The operation is not legal in the identity's current phase.
    #[error("operation requires the {expected:?} phase, identity is {found:?}")]
    WrongPhase {
        /// Phase the operation needs.
        expected: IdentityPhase,
        /// Phase the identity is in.
        found: IdentityPhase,
    },
}

impl ControllerError {
    /// Whether this error is the expected below-threshold state during
    /// recovery: keep the session, gather more shares, try again.
    pub fn is_retryable_recovery(&self) -> bool {
        matches!(
            self,
            ControllerError::Sharing(SharingError::InsufficientShares { .. })
        )
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Lifecycle phase of an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityPhase {
    /// No key material exists yet.
    Uninitialized,
    /// Live and at rest between operations.
    Active,
    /// A delegate rotation is in flight.
    UpdatingDelegates,
    /// Shares are being gathered to rebuild key material.
    Recovering,
}

/// A live identity: identifier, latest known document and content address,
/// and the local key material.
///
/// Exclusively owns its [`KeyRing`]. Constructed by [`IdentityController::create`],
/// by [`RecoverySession::attempt`], or from persisted state; destroyed only
/// by dropping it — losing local key material without a successful recovery
/// through the delegate network is unrecoverable by design.
#[derive(Debug)]
pub struct Identity {
    id: TesseraId,
    document: IdentityDocument,
    content_address: ContentAddress,
    keyring: KeyRing,
    phase: IdentityPhase,
}

/// Persisted local state, serialized by the caller.
///
/// Contains raw key material via [`KeyRingState`]; storage security is the
/// caller's responsibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalIdentityState {
    /// The identity's permanent identifier.
    pub identifier: TesseraId,
    /// Latest known document.
    pub document: IdentityDocument,
    /// Content address of that document.
    pub content_address: ContentAddress,
    /// Exported key material.
    pub keyring: KeyRingState,
}

impl Identity {
    /// The permanent identifier.
    pub fn id(&self) -> &TesseraId {
        &self.id
    }

    /// Latest known published document.
    pub fn document(&self) -> &IdentityDocument {
        &self.document
    }

    /// Content address of the latest known document.
    pub fn content_address(&self) -> &ContentAddress {
        &self.content_address
    }

    /// The local key material.
    pub fn keyring(&self) -> &KeyRing {
        &self.keyring
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> IdentityPhase {
        self.phase
    }

    /// Export everything the caller needs to persist.
    pub fn to_local_state(&self) -> LocalIdentityState {
        LocalIdentityState {
            identifier: self.id.clone(),
            document: self.document.clone(),
            content_address: self.content_address.clone(),
            keyring: self.keyring.export(),
        }
    }

    /// Rebuild a live identity from persisted state.
    pub fn from_local_state(state: &LocalIdentityState) -> Result<Self, ControllerError> {
        state.document.validate()?;
        let keyring = KeyRing::restore(&state.keyring)?;
        if keyring.public_keys() != state.document.public_keys() {
            return Err(ControllerError::Validation(
                "persisted key material does not match the persisted document".into(),
            ));
        }
        Ok(Self {
            id: state.identifier.clone(),
            document: state.document.clone(),
            content_address: state.content_address.clone(),
            keyring,
            phase: IdentityPhase::Active,
        })
    }
}

/// A signed, unbroadcast anchoring transaction with its estimated cost.
///
/// Returned by [`IdentityController::update_delegates`]. Broadcasting —
/// committing funds — is an explicit, separate step by the caller.
#[derive(Debug, Clone)]
pub struct PendingAnchor {
    /// The management-signed transaction.
    pub tx: SignedAnchorTx,
    /// Estimated cost of broadcasting it.
    pub cost: AnchorCost,
}

// ---------------------------------------------------------------------------
// IdentityController
// ---------------------------------------------------------------------------

/// The orchestration surface over the identity core and its collaborators.
pub struct IdentityController {
    resolver: Arc<dyn Resolver>,
    publisher: Arc<dyn Publisher>,
    anchor: Arc<dyn AnchorTransactionBuilder>,
    assertions: Arc<dyn AssertionEncoder>,
}

impl IdentityController {
    /// Build a controller over caller-owned collaborator handles.
    pub fn new(
        resolver: Arc<dyn Resolver>,
        publisher: Arc<dyn Publisher>,
        anchor: Arc<dyn AnchorTransactionBuilder>,
        assertions: Arc<dyn AssertionEncoder>,
    ) -> Self {
        Self {
            resolver,
            publisher,
            anchor,
            assertions,
        }
    }

    // -- creation ----------------------------------------------------------

    /// Create a fresh identity: `Uninitialized → Active`.
    ///
    /// Generates key material, optionally builds a recovery network over
    /// the given delegates (their encryption keys are resolved
    /// concurrently, and all resolutions complete before the secret is
    /// split), publishes the genesis document, and mints the identifier
    /// from the returned content address.
    pub async fn create(
        &self,
        profile_name: &str,
        delegate_ids: Option<&[TesseraId]>,
    ) -> Result<Identity, ControllerError> {
        if profile_name.trim().is_empty() {
            return Err(ControllerError::Validation(
                "profile name must not be empty".into(),
            ));
        }

        let keyring = KeyRing::generate();
        let mut builder = DocumentBuilder::new(keyring.public_keys())
            .public_profile(PublicProfile::named(profile_name));

        if let Some(ids) = delegate_ids {
            delegates::validate_delegate_list(None, ids)?;
            let recipient_keys = self.resolve_delegate_keys(ids).await?;
            let envelopes =
                sharing::split_for_delegates(&keyring.recoverable_secret(), &recipient_keys)?;
            let network = RecoveryNetwork::from_envelopes(envelopes)?;
            let encrypted_list = delegates::encrypt_list(&keyring, None, ids)?;
            builder = builder
                .recovery_network(network)
                .encrypted_delegates(encrypted_list);
        }

        let document = builder.build();
        document.validate()?;

        let content_address = self.publisher.publish(&document).await?;
        let id = TesseraId::from_content_address(content_address.clone());

        info!(
            identity = %id,
            version = document.version,
            with_recovery = delegate_ids.is_some(),
            "identity created"
        );

        Ok(Identity {
            id,
            document,
            content_address,
            keyring,
            phase: IdentityPhase::Active,
        })
    }

    // -- delegate rotation -------------------------------------------------

    /// Rotate the recovery network: `Active → UpdatingDelegates → Active`.
    ///
    /// Requires exactly [`DELEGATE_COUNT`] identifiers. Delegate keys are
    /// re-resolved on every call — a stale cached key here would make
    /// future recovery impossible, so resolution results never carry over
    /// from earlier calls. A failure of any single resolution fails the
    /// whole update.
    ///
    /// On success the incremented-version document is already in the
    /// content store, and the returned [`PendingAnchor`] carries the signed
    /// management transaction that moves resolution to it — broadcast is
    /// the caller's explicit decision. On any failure before the return,
    /// the identity reverts to `Active` with the previous document and
    /// content address untouched.
    pub async fn update_delegates(
        &self,
        identity: &mut Identity,
        new_delegate_ids: &[TesseraId],
    ) -> Result<PendingAnchor, ControllerError> {
        if identity.phase != IdentityPhase::Active {
            return Err(ControllerError::WrongPhase {
                expected: IdentityPhase::Active,
                found: identity.phase,
            });
        }

        identity.phase = IdentityPhase::UpdatingDelegates;
        match self.prepare_delegate_update(identity, new_delegate_ids).await {
            Ok((document, content_address, pending)) => {
                identity.document = document;
                identity.content_address = content_address;
                identity.phase = IdentityPhase::Active;
                info!(
                    identity = %identity.id,
                    version = identity.document.version,
                    tx = %pending.tx.id,
                    "delegates updated, anchor transaction ready"
                );
                Ok(pending)
            }
            Err(err) => {
                // The old document and content address stay authoritative;
                // nothing partial was applied to the identity.
                identity.phase = IdentityPhase::Active;
                Err(err)
            }
        }
    }

    /// All fallible update work, staged in locals. The identity is only
    /// touched by the caller after every step has succeeded — either the
    /// whole new recovery network ships, or none of it does.
    async fn prepare_delegate_update(
        &self,
        identity: &Identity,
        new_delegate_ids: &[TesseraId],
    ) -> Result<(IdentityDocument, ContentAddress, PendingAnchor), ControllerError> {
        delegates::validate_delegate_list(Some(&identity.id), new_delegate_ids)?;

        let recipient_keys = self.resolve_delegate_keys(new_delegate_ids).await?;
        let envelopes = sharing::split_for_delegates(
            &identity.keyring.recoverable_secret(),
            &recipient_keys,
        )?;
        let network = RecoveryNetwork::from_envelopes(envelopes)?;
        let encrypted_list =
            delegates::encrypt_list(&identity.keyring, Some(&identity.id), new_delegate_ids)?;

        let mut builder = DocumentBuilder::new(identity.keyring.public_keys())
            .version(identity.document.version + 1)
            .created_at(identity.document.created_at)
            .recovery_network(network)
            .encrypted_delegates(encrypted_list);
        if let Some(profile) = &identity.document.public_profile {
            builder = builder.public_profile(profile.clone());
        }
        let document = builder.build();
        document.validate()?;

        let content_address = self.publisher.publish(&document).await?;

        let params = self
            .anchor
            .build_publish_tx(&content_address, &identity.keyring.public_keys().management.to_hex())
            .await;
        let cost = self.anchor.estimate_cost(&params).await;
        let tx = SignedAnchorTx::sign(params, &identity.keyring);

        Ok((document, content_address, PendingAnchor { tx, cost }))
    }

    // -- recovery ----------------------------------------------------------

    /// Open a recovery session for a lost identity: entry into `Recovering`.
    ///
    /// Resolves and validates the target's document. The session carries a
    /// fresh transport keypair whose public half the recovering party sends
    /// to delegates out-of-band, so returned shares can travel sealed.
    pub async fn begin_recovery(
        &self,
        target: &TesseraId,
    ) -> Result<RecoverySession, ControllerError> {
        let document = self.resolve_validated(target).await?;
        if document.recovery_network.is_none() {
            return Err(ControllerError::Validation(
                "target identity has no recovery network".into(),
            ));
        }

        debug!(target = %target, "recovery session opened");
        Ok(RecoverySession {
            target: target.clone(),
            document,
            transport_keypair: EncryptionKeypair::generate(),
            shares: Vec::new(),
        })
    }

    /// Help another identity recover: locate and open this identity's
    /// share in the target's recovery network.
    ///
    /// Envelopes carry no recipient names; membership is decided by trial
    /// decryption with the local encryption key. When no envelope opens,
    /// this identity is simply not a delegate of the target.
    pub async fn assist_recovery(
        &self,
        identity: &Identity,
        target: &TesseraId,
    ) -> Result<RecoveryShare, ControllerError> {
        let document = self.resolve_validated(target).await?;
        let network = document
            .recovery_network
            .as_ref()
            .ok_or(ControllerError::NotADelegate)?;

        for entry in network.entries() {
            if let Ok(payload) = identity.keyring.open_envelope(&entry.share) {
                let share = sharing::decode_share(&payload)?;
                if share.index != entry.slot {
                    return Err(ControllerError::Sharing(SharingError::MalformedShare(
                        format!("share index {} in slot {}", share.index, entry.slot),
                    )));
                }
                info!(target = %target, slot = entry.slot, "recovery share located");
                return Ok(share);
            }
        }

        Err(ControllerError::NotADelegate)
    }

    // -- assertions --------------------------------------------------------

    /// Sign an assertion payload as `identity`. Audience defaults to the
    /// identity itself.
    pub fn sign_assertion(
        &self,
        identity: &Identity,
        payload: &serde_json::Value,
        audience: Option<&TesseraId>,
    ) -> Result<String, ControllerError> {
        let claims = AssertionClaims {
            issuer: identity.id.clone(),
            audience: audience.unwrap_or(&identity.id).clone(),
            issued_at: chrono::Utc::now(),
            expires_at: None,
        };
        let keyring = &identity.keyring;
        Ok(self.assertions.encode(payload, &claims, &|bytes| {
            keyring.sign(SigningContext::Assertion, bytes)
        })?)
    }

    /// Verify an assertion token addressed to `identity` (or to the given
    /// audience), resolving the issuer's current keys first.
    pub async fn verify_assertion(
        &self,
        identity: &Identity,
        token: &str,
        audience: Option<&TesseraId>,
    ) -> Result<serde_json::Value, ControllerError> {
        let issuer = self.assertions.issuer(token)?;
        let issuer_document = self.resolve_validated(&issuer).await?;
        let audience = audience.unwrap_or(&identity.id);
        Ok(self
            .assertions
            .decode(token, &issuer_document.public_keys(), audience)?)
    }

    // -- internals ---------------------------------------------------------

    /// Resolve every delegate's current encryption key, concurrently.
    ///
    /// All resolutions must complete before any share is produced; one
    /// failure aborts the set, so the network is never built against a
    /// partial key snapshot.
    async fn resolve_delegate_keys(
        &self,
        ids: &[TesseraId],
    ) -> Result<Vec<EncryptionPublicKey>, ControllerError> {
        debug_assert_eq!(ids.len(), DELEGATE_COUNT);
        let documents =
            future::try_join_all(ids.iter().map(|id| self.resolve_validated(id))).await?;
        Ok(documents.iter().map(|doc| doc.encryption_key).collect())
    }

    /// Resolve an identifier and run document validation before trusting
    /// the result — on every resolution, no exceptions.
    async fn resolve_validated(
        &self,
        id: &TesseraId,
    ) -> Result<IdentityDocument, ControllerError> {
        let document = self.resolver.resolve(id).await?;
        document
            .validate()
            .map_err(|e| ControllerError::Resolve(ResolveError::Malformed(e.to_string())))?;
        Ok(document)
    }
}

// ---------------------------------------------------------------------------
// RecoverySession
// ---------------------------------------------------------------------------

/// The `Recovering` state: a share-gathering session for one target
/// identity.
///
/// Delegates respond asynchronously over an out-of-band channel; the
/// session accepts shares as they arrive, in any order, with duplicates
/// tolerated. [`attempt`](Self::attempt) is a pure function over the
/// gathered set — below the threshold it fails with the retryable
/// insufficient-shares error and the session stays usable.
pub struct RecoverySession {
    target: TesseraId,
    document: IdentityDocument,
    transport_keypair: EncryptionKeypair,
    shares: Vec<RecoveryShare>,
}

impl RecoverySession {
    /// The identity being recovered.
    pub fn target(&self) -> &TesseraId {
        &self.target
    }

    /// The resolved document recovery is checked against.
    pub fn document(&self) -> &IdentityDocument {
        &self.document
    }

    /// Always [`IdentityPhase::Recovering`] while the session exists.
    pub fn phase(&self) -> IdentityPhase {
        IdentityPhase::Recovering
    }

    /// Public transport key to hand to delegates, so returned shares can
    /// travel sealed instead of in the clear.
    pub fn transport_key(&self) -> EncryptionPublicKey {
        self.transport_keypair.public_key()
    }

    /// Number of shares gathered so far (duplicates included; the
    /// reconstruction step deduplicates).
    pub fn gathered(&self) -> usize {
        self.shares.len()
    }

    /// Add a plaintext share received out-of-band.
    pub fn add_share(&mut self, share: RecoveryShare) {
        self.shares.push(share);
    }

    /// Add a share sealed to this session's transport key.
    ///
    /// The session decrypts only envelopes addressed to keys it actually
    /// holds — an envelope sealed elsewhere fails to open and is rejected.
    pub fn add_sealed_share(&mut self, envelope: &SealedEnvelope) -> Result<(), ControllerError> {
        let share = sharing::open_share(envelope, &self.transport_keypair)?;
        self.shares.push(share);
        Ok(())
    }

    /// Try to finish recovery: `Recovering → Active` on success.
    ///
    /// Reconstructs the secret (failing with the retryable
    /// [`SharingError::InsufficientShares`] below threshold), rebuilds the
    /// key ring, and checks the rebuilt public keys against the published
    /// document before declaring the identity live — a forged share set
    /// that survives the commitment check still cannot impersonate the
    /// target.
    pub fn attempt(&self) -> Result<Identity, ControllerError> {
        let secret = sharing::reconstruct(&self.shares)?;
        let keyring = KeyRing::restore_from_secret(&secret)?;

        if keyring.public_keys() != self.document.public_keys() {
            return Err(ControllerError::RecoveredKeyMismatch);
        }

        info!(target = %self.target, "identity recovered");
        Ok(Identity {
            id: self.target.clone(),
            document: self.document.clone(),
            content_address: self.target.content_address().clone(),
            keyring,
            phase: IdentityPhase::Active,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
