//! # Identity Module
//!
//! The identity stack, layered leaf-first:
//!
//! 1. **Key ring** — the three key pairs (signing, management, encryption)
//!    and the signing/encryption primitives over them.
//! 2. **Sharing** — Shamir 2-of-3 splitting of the recoverable secret, and
//!    the sealed transport of shares to delegates.
//! 3. **Delegates** — the owner-confidential encrypted list of who the
//!    three recovery delegates are.
//! 4. **Document** — the canonical published shape and its validation.
//! 5. **Identifier** — `did:tessera:<content-address>`.
//! 6. **Controller** — the lifecycle state machine composing all of the
//!    above against the external publish/resolve/anchor collaborators.
//!
//! ## Design Decisions
//!
//! - Ed25519 for both signing contexts, with domain tags so assertion and
//!   management signatures can never stand in for each other.
//! - The recovery threshold is a system constant (2-of-3), not a per-user
//!   knob; one flaky delegate must never strand an identity.
//! - Published recovery entries carry a slot number and a sealed envelope,
//!   never a delegate identifier. Who the delegates are is recorded only in
//!   the encrypted list that the owner alone can read.

pub mod controller;
pub mod delegates;
pub mod document;
pub mod keyring;
pub mod sharing;
pub mod tessera_id;

pub use controller::{
    ControllerError, Identity, IdentityController, IdentityPhase, LocalIdentityState,
    PendingAnchor, RecoverySession,
};
pub use delegates::{DelegateError, EncryptedDelegateList};
pub use document::{
    DocumentBuilder, DocumentError, IdentityDocument, PublicProfile, RecoveryEntry,
    RecoveryNetwork,
};
pub use keyring::{KeyRing, KeyRingError, KeyRingState, PublicKeySet, SigningContext};
pub use sharing::{
    decode_share, open_share, reconstruct, split_for_delegates, split_secret, RecoveryShare,
    SharingError,
};
pub use tessera_id::{ContentAddress, TesseraId, TesseraIdError};
