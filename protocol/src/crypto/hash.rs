//! # Hashing Utilities
//!
//! Two hash functions, two jobs:
//!
//! - **BLAKE3** for everything TESSERA-native: content addresses, share
//!   commitments, and derived keys (via `derive_key` in the callers).
//! - **Double SHA-256** for anchoring transaction ids, matching the format
//!   the broader ledger ecosystem expects when it sees a transaction hash.
//!
//! Content addresses are BLAKE3 digests of a document's canonical bytes,
//! rendered in base58. Base58 keeps addresses copy-pasteable and free of
//! characters that confuse terminals and URLs.

use sha2::{Digest, Sha256};

use crate::config::HASH_OUTPUT_LENGTH;

/// Compute the BLAKE3 hash of the input data.
pub fn blake3_hash(data: &[u8]) -> [u8; HASH_OUTPUT_LENGTH] {
    *blake3::hash(data).as_bytes()
}

/// Compute SHA-256(SHA-256(data)).
///
/// Used for anchoring transaction ids. Single-pass SHA-256 exists in the
/// dependency tree anyway; the double construction matches what ledger
/// explorers and indexers conventionally display.
pub fn double_sha256(data: &[u8]) -> [u8; HASH_OUTPUT_LENGTH] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; HASH_OUTPUT_LENGTH];
    out.copy_from_slice(&second);
    out
}

/// Derive the base58 content address for a blob of canonical bytes.
///
/// This is the same derivation the reference content store applies, so a
/// locally computed address always matches what [`publish`] returns for
/// the same bytes.
///
/// [`publish`]: crate::transport::Publisher::publish
pub fn content_address(data: &[u8]) -> String {
    bs58::encode(blake3_hash(data)).into_string()
}
