//! # Protocol Configuration & Constants
//!
//! Every magic number in TESSERA lives here. If you're hardcoding a constant
//! somewhere else, you're doing it wrong and you owe the team coffee.
//!
//! Several of these values are part of the published document format and the
//! recovery protocol. Changing them after identities exist in the wild breaks
//! resolution and recovery for everyone, so choose wisely now.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Identifier Scheme
// ---------------------------------------------------------------------------

/// DID method name for TESSERA identifiers.
pub const DID_METHOD: &str = "tessera";

/// Full scheme prefix for identifiers: `did:tessera:<content-address>`.
/// The payload is the content address of the identity's current document.
pub const SCHEME_PREFIX: &str = "did:tessera:";

/// Version assigned to the first published document of a new identity.
/// Every republication increments the version by exactly one.
pub const DOCUMENT_GENESIS_VERSION: u64 = 1;

// ---------------------------------------------------------------------------
// Recovery Parameters
// ---------------------------------------------------------------------------

/// Number of recovery delegates. Exactly three — the recovery network,
/// the encrypted delegate list, and the published document shape all
/// assume this count.
pub const DELEGATE_COUNT: usize = 3;

/// Shares required to reconstruct the recoverable secret. System-wide,
/// not user-configurable. 2-of-3 tolerates one unreachable or hostile
/// delegate while still requiring collusion of two to steal an identity.
pub const RECOVERY_THRESHOLD: u8 = 2;

// The threshold must never exceed the share count, or recovery is
// impossible by construction.
const _: () = assert!(RECOVERY_THRESHOLD as usize <= DELEGATE_COUNT);
const _: () = assert!(RECOVERY_THRESHOLD >= 2);

/// Length of the recoverable secret: signing seed, management seed, and
/// encryption secret, 32 bytes each, concatenated in that order.
pub const RECOVERABLE_SECRET_LENGTH: usize = 96;

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Ed25519 for assertion and management signatures. 128-bit security in
/// 32+32 bytes, deterministic, and well-audited via `ed25519-dalek`.
pub const SIGNING_ALGORITHM: &str = "Ed25519";

/// Ed25519 secret key (seed) length in bytes.
pub const SIGNING_KEY_LENGTH: usize = 32;

/// Ed25519 public key length in bytes.
pub const VERIFYING_KEY_LENGTH: usize = 32;

/// Ed25519 signature length. Always 64 bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// X25519 for the one-shot sealed envelopes carrying recovery shares.
pub const KEY_EXCHANGE_ALGORITHM: &str = "X25519";

/// X25519 secret and public key length in bytes.
pub const ENCRYPTION_KEY_LENGTH: usize = 32;

/// AES-256-GCM for symmetric encryption. 256-bit keys, 96-bit nonces,
/// 128-bit authentication tags.
pub const SYMMETRIC_ALGORITHM: &str = "AES-256-GCM";

/// AES-256-GCM key length in bytes.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM nonce length in bytes. 96 bits, the standard GCM nonce size.
pub const AES_NONCE_LENGTH: usize = 12;

/// AES-256-GCM authentication tag length in bytes.
pub const AES_TAG_LENGTH: usize = 16;

/// BLAKE3 digest length in bytes. Content addresses, share commitments,
/// and derived keys are all 32-byte BLAKE3 outputs.
pub const HASH_OUTPUT_LENGTH: usize = 32;

// ---------------------------------------------------------------------------
// Domain Separation
// ---------------------------------------------------------------------------
//
// Signatures and derived keys are bound to their purpose with context
// strings. A signature or key produced under one context is useless under
// any other, even when the underlying key material coincides.

/// Domain tag prepended to every assertion-context signature payload.
pub const ASSERTION_DOMAIN_TAG: &[u8] = b"tessera/v1/assertion\x00";

/// Domain tag prepended to every management-context signature payload.
pub const MANAGEMENT_DOMAIN_TAG: &[u8] = b"tessera/v1/management\x00";

/// BLAKE3 `derive_key` context for the delegate-list symmetric key,
/// derived from the management secret.
pub const DELEGATE_LIST_KEY_CONTEXT: &str = "tessera v1 delegate list key";

/// BLAKE3 `derive_key` context for sealed-envelope session keys.
pub const SEALED_ENVELOPE_KEY_CONTEXT: &str = "tessera v1 sealed envelope key";

// ---------------------------------------------------------------------------
// Anchoring
// ---------------------------------------------------------------------------

/// Base fee for an anchoring transaction, in the ledger's smallest unit.
/// The in-process reference ledger applies this; real ledgers quote their own.
pub const ANCHOR_BASE_FEE: u64 = 1_000;

/// Additional fee per byte of anchored payload.
pub const ANCHOR_FEE_PER_BYTE: u64 = 16;

// ---------------------------------------------------------------------------
// Assertions
// ---------------------------------------------------------------------------

/// Default validity window for a signed assertion. Tokens older than this
/// are rejected at decode time unless the claims carry an explicit expiry.
pub const ASSERTION_TTL: Duration = Duration::from_secs(300);
