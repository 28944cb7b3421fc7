//! # Cryptographic Primitives for TESSERA
//!
//! Everything security-related in the protocol flows through this module.
//! We deliberately chose boring, well-audited cryptography:
//!
//! - **Ed25519** for signatures — assertion and management contexts alike.
//! - **X25519** for the sealed envelopes that carry recovery shares.
//! - **AES-256-GCM** for symmetric encryption — AEAD done right.
//! - **BLAKE3** for content addresses, commitments, and key derivation.
//! - **SHA-256** (doubled) for anchoring transaction ids, because that is
//!   what the rest of the ledger world expects to see.
//!
//! Every function here is a thin, type-safe wrapper around audited
//! implementations. If you're tempted to optimize them, go read about
//! timing attacks first and come back when you've lost the urge.

pub mod encryption;
pub mod hash;
pub mod keys;
pub mod sealed;

// Re-export the types people actually need so they don't have to memorize
// the module hierarchy.
pub use encryption::EncryptionError;
pub use hash::{blake3_hash, content_address, double_sha256};
pub use keys::{TesseraKeypair, TesseraPublicKey, TesseraSignature};
pub use sealed::{EncryptionKeypair, EncryptionPublicKey, SealedEnvelope};
