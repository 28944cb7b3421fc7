//! # Threshold Secret Sharing
//!
//! Shamir's Secret Sharing over GF(256) for the recoverable secret. The
//! policy is fixed system-wide: **3 shares, any 2 reconstruct** (see
//! [`crate::config`]). One share reveals exactly nothing — the scheme is
//! information-theoretically secure below the threshold.
//!
//! ## Finite field
//!
//! All arithmetic is in GF(2^8) with the AES irreducible polynomial
//! `x^8 + x^4 + x^3 + x + 1` (0x11B). Multiplication is carry-less
//! shift-and-add with inline reduction; inversion uses Fermat's little
//! theorem (`a^254 = a^-1` in a field of order 256).
//!
//! ## Share integrity
//!
//! Shamir shares are malleable: interpolation happily produces *a* secret
//! from any consistent-looking point set. Every share therefore carries a
//! BLAKE3 commitment to the original secret, checked after interpolation —
//! a tampered or foreign share makes reconstruction fail loudly instead of
//! yielding a plausible-but-wrong secret.
//!
//! ## Transport
//!
//! Shares never leave the owner in the clear. [`split_for_delegates`] seals
//! each share to its delegate's public encryption key, so a delegate must
//! open its envelope before it can see even its own share.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::config::{DELEGATE_COUNT, RECOVERY_THRESHOLD};
use crate::crypto::hash::blake3_hash;
use crate::crypto::sealed::{self, EncryptionPublicKey, SealedEnvelope, SealedError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from splitting, sealing, and reconstruction.
#[derive(Debug, Error)]
pub enum SharingError {
    /// The secret is empty — nothing to split.
    #[error("secret must not be empty")]
    EmptySecret,

    /// `split_for_delegates` needs exactly one recipient key per delegate.
    #[error("expected exactly {DELEGATE_COUNT} recipient keys, got {got}")]
    WrongRecipientCount {
        /// Number of keys supplied.
        got: usize,
    },

    /// Two delegates presented the same encryption key; shares sealed to
    /// them would be mutually readable.
    #[error("duplicate recipient encryption key")]
    DuplicateRecipientKey,

    /// Not enough distinct shares to meet the threshold. Expected and
    /// retryable during recovery — gather more shares and call again.
    #[error("have {have} distinct share(s), need {need}")]
    InsufficientShares {
        /// Distinct shares supplied.
        have: usize,
        /// The reconstruction threshold.
        need: usize,
    },

    /// Shares disagree on the secret length.
    #[error("share data lengths are inconsistent: expected {expected}, got {got}")]
    InconsistentShareLengths {
        /// Length from the first share seen.
        expected: usize,
        /// Length of the offending share.
        got: usize,
    },

    /// Two shares claim the same index with different contents.
    #[error("conflicting submissions for share index {0}")]
    ConflictingShare(u8),

    /// A share index outside 1..=3 cannot belong to any recovery network.
    #[error("share index {0} is out of range")]
    InvalidShareIndex(u8),

    /// The reconstructed secret does not match the shares' commitment —
    /// at least one share was tampered with or belongs elsewhere.
    #[error("reconstructed secret does not match share commitment")]
    CommitmentMismatch,

    /// An opened envelope did not contain a decodable share.
    #[error("malformed share payload: {0}")]
    MalformedShare(String),

    /// The envelope could not be opened with the supplied key.
    #[error(transparent)]
    Envelope(#[from] SealedError),
}

// ---------------------------------------------------------------------------
// GF(256) arithmetic
// ---------------------------------------------------------------------------

mod gf256 {
    /// AES field polynomial: x^8 + x^4 + x^3 + x + 1.
    const MODULUS: u16 = 0x11B;

    /// Addition (and subtraction — characteristic 2) is XOR.
    #[inline]
    pub fn add(a: u8, b: u8) -> u8 {
        a ^ b
    }

    /// Carry-less shift-and-add multiplication with inline reduction.
    pub fn mul(a: u8, b: u8) -> u8 {
        let mut a = a as u16;
        let mut b = b as u16;
        let mut acc = 0u16;
        while b != 0 {
            if b & 1 != 0 {
                acc ^= a;
            }
            a <<= 1;
            if a & 0x100 != 0 {
                a ^= MODULUS;
            }
            b >>= 1;
        }
        acc as u8
    }

    /// Square-and-multiply exponentiation.
    fn pow(mut base: u8, mut exp: u8) -> u8 {
        let mut acc = 1u8;
        while exp != 0 {
            if exp & 1 != 0 {
                acc = mul(acc, base);
            }
            base = mul(base, base);
            exp >>= 1;
        }
        acc
    }

    /// Multiplicative inverse via Fermat: a^254 = a^-1. Panics on zero,
    /// which callers exclude by construction (share indices are nonzero
    /// and distinct).
    pub fn inv(a: u8) -> u8 {
        assert!(a != 0, "inverse of zero in GF(256)");
        pow(a, 254)
    }

    /// Evaluate a polynomial (constant term first) at `x`, Horner style.
    pub fn eval_poly(coefficients: &[u8], x: u8) -> u8 {
        coefficients
            .iter()
            .rev()
            .fold(0u8, |acc, &c| add(mul(acc, x), c))
    }

    /// Lagrange interpolation at x = 0: recovers the constant term of the
    /// polynomial passing through the given points.
    pub fn interpolate_at_zero(points: &[(u8, u8)]) -> u8 {
        let mut secret = 0u8;
        for (i, &(xi, yi)) in points.iter().enumerate() {
            let mut numerator = 1u8;
            let mut denominator = 1u8;
            for (j, &(xj, _)) in points.iter().enumerate() {
                if i == j {
                    continue;
                }
                // L_i(0) multiplies (0 - x_j)/(x_i - x_j); negation is
                // identity in characteristic 2.
                numerator = mul(numerator, xj);
                denominator = mul(denominator, add(xi, xj));
            }
            let basis = mul(numerator, inv(denominator));
            secret = add(secret, mul(yi, basis));
        }
        secret
    }

}

// ---------------------------------------------------------------------------
// RecoveryShare
// ---------------------------------------------------------------------------

/// One threshold share of a recoverable secret.
///
/// The index is the x-coordinate (1-based; x = 0 holds the secret itself)
/// and doubles as the share's slot in the owner's ordered delegate list.
/// The commitment is BLAKE3 of the whole original secret and is what lets
/// reconstruction detect tampered or foreign shares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryShare {
    /// 1-based evaluation point and delegate slot.
    pub index: u8,
    /// One byte of share data per byte of secret.
    pub data: Vec<u8>,
    /// BLAKE3 commitment to the original secret.
    pub commitment: [u8; 32],
}

// ---------------------------------------------------------------------------
// Split
// ---------------------------------------------------------------------------

/// Split a secret into exactly [`DELEGATE_COUNT`] shares with the fixed
/// [`RECOVERY_THRESHOLD`].
///
/// Each secret byte gets its own random polynomial of degree
/// `threshold - 1` with the secret byte as constant term, evaluated at
/// x = 1, 2, 3. Coefficients come from the OS CSPRNG.
pub fn split_secret(secret: &[u8]) -> Result<Vec<RecoveryShare>, SharingError> {
    if secret.is_empty() {
        return Err(SharingError::EmptySecret);
    }

    let threshold = RECOVERY_THRESHOLD as usize;
    let commitment = blake3_hash(secret);
    let mut rng = rand::rngs::OsRng;

    let mut shares: Vec<RecoveryShare> = (1..=DELEGATE_COUNT)
        .map(|i| RecoveryShare {
            index: i as u8,
            data: Vec::with_capacity(secret.len()),
            commitment,
        })
        .collect();

    let mut coefficients = vec![0u8; threshold];
    for &secret_byte in secret {
        coefficients[0] = secret_byte;
        rng.fill_bytes(&mut coefficients[1..]);

        for share in shares.iter_mut() {
            share.data.push(gf256::eval_poly(&coefficients, share.index));
        }
    }

    Ok(shares)
}

/// Split a secret and seal each share to the corresponding delegate's
/// public encryption key.
///
/// Requires exactly [`DELEGATE_COUNT`] distinct recipient keys; the i-th
/// envelope is sealed to the i-th key and carries the share with index
/// `i + 1`. The returned envelopes are what the recovery network publishes.
pub fn split_for_delegates(
    secret: &[u8],
    recipients: &[EncryptionPublicKey],
) -> Result<Vec<SealedEnvelope>, SharingError> {
    if recipients.len() != DELEGATE_COUNT {
        return Err(SharingError::WrongRecipientCount {
            got: recipients.len(),
        });
    }
    for (i, key) in recipients.iter().enumerate() {
        if recipients[..i].contains(key) {
            return Err(SharingError::DuplicateRecipientKey);
        }
    }

    let shares = split_secret(secret)?;
    shares
        .iter()
        .zip(recipients)
        .map(|(share, recipient)| {
            let payload = serde_json::to_vec(share)
                .map_err(|e| SharingError::MalformedShare(e.to_string()))?;
            Ok(sealed::seal(recipient, &payload)?)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Reconstruct
// ---------------------------------------------------------------------------

/// Reconstruct a secret from a set of shares.
///
/// Tolerant of out-of-order arrival and duplicate submissions: identical
/// duplicates collapse into one, so re-invoking with the same set is
/// idempotent. Two *different* shares claiming the same index are an
/// attack or a bug, never silently resolved.
///
/// Below the threshold this fails with
/// [`SharingError::InsufficientShares`] — the expected state while
/// delegates respond asynchronously; callers retry with more shares.
/// After interpolation the result is checked against the shares'
/// commitment, so a tampered share cannot smuggle in a wrong secret.
pub fn reconstruct(shares: &[RecoveryShare]) -> Result<Vec<u8>, SharingError> {
    let mut by_index: BTreeMap<u8, &RecoveryShare> = BTreeMap::new();
    for share in shares {
        if share.index == 0 || share.index as usize > DELEGATE_COUNT {
            return Err(SharingError::InvalidShareIndex(share.index));
        }
        match by_index.get(&share.index) {
            Some(existing) if *existing != share => {
                return Err(SharingError::ConflictingShare(share.index));
            }
            _ => {
                by_index.insert(share.index, share);
            }
        }
    }

    let distinct: Vec<&RecoveryShare> = by_index.into_values().collect();
    let need = RECOVERY_THRESHOLD as usize;
    if distinct.len() < need {
        return Err(SharingError::InsufficientShares {
            have: distinct.len(),
            need,
        });
    }

    let expected_len = distinct[0].data.len();
    let commitment = distinct[0].commitment;
    for share in &distinct[1..] {
        if share.data.len() != expected_len {
            return Err(SharingError::InconsistentShareLengths {
                expected: expected_len,
                got: share.data.len(),
            });
        }
        if share.commitment != commitment {
            return Err(SharingError::CommitmentMismatch);
        }
    }

    let mut secret = Vec::with_capacity(expected_len);
    for byte_idx in 0..expected_len {
        let points: Vec<(u8, u8)> = distinct
            .iter()
            .map(|s| (s.index, s.data[byte_idx]))
            .collect();
        secret.push(gf256::interpolate_at_zero(&points));
    }

    if blake3_hash(&secret) != commitment {
        return Err(SharingError::CommitmentMismatch);
    }

    Ok(secret)
}

/// Open a sealed share with the recipient's encryption keypair and decode it.
pub fn open_share(
    envelope: &SealedEnvelope,
    recipient: &sealed::EncryptionKeypair,
) -> Result<RecoveryShare, SharingError> {
    let payload = sealed::open(envelope, recipient)?;
    decode_share(&payload)
}

/// Decode a plaintext share payload (the bytes inside an envelope).
pub fn decode_share(payload: &[u8]) -> Result<RecoveryShare, SharingError> {
    serde_json::from_slice(payload).map_err(|e| SharingError::MalformedShare(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::sealed::EncryptionKeypair;

    fn secret_96() -> Vec<u8> {
        (0..96u8).collect()
    }

    #[test]
    fn any_two_of_three_reconstruct() {
        let secret = secret_96();
        let shares = split_secret(&secret).unwrap();
        assert_eq!(shares.len(), 3);

        for (a, b) in [(0, 1), (0, 2), (1, 2)] {
            let subset = vec![shares[a].clone(), shares[b].clone()];
            assert_eq!(reconstruct(&subset).unwrap(), secret, "pair ({}, {})", a, b);
        }
    }

    #[test]
    fn all_three_also_reconstruct() {
        let secret = secret_96();
        let shares = split_secret(&secret).unwrap();
        assert_eq!(reconstruct(&shares).unwrap(), secret);
    }

    #[test]
    fn single_share_is_insufficient() {
        let shares = split_secret(&secret_96()).unwrap();
        assert!(matches!(
            reconstruct(&shares[..1]),
            Err(SharingError::InsufficientShares { have: 1, need: 2 })
        ));
    }

    #[test]
    fn duplicate_submissions_are_idempotent() {
        let secret = secret_96();
        let shares = split_secret(&secret).unwrap();
        let noisy = vec![
            shares[1].clone(),
            shares[0].clone(),
            shares[1].clone(),
            shares[0].clone(),
        ];
        assert_eq!(reconstruct(&noisy).unwrap(), secret);
    }

    #[test]
    fn duplicates_of_one_share_stay_insufficient() {
        let shares = split_secret(&secret_96()).unwrap();
        let only_one = vec![shares[0].clone(), shares[0].clone(), shares[0].clone()];
        assert!(matches!(
            reconstruct(&only_one),
            Err(SharingError::InsufficientShares { have: 1, .. })
        ));
    }

    #[test]
    fn out_of_order_arrival_is_fine() {
        let secret = secret_96();
        let shares = split_secret(&secret).unwrap();
        let reversed = vec![shares[2].clone(), shares[0].clone()];
        assert_eq!(reconstruct(&reversed).unwrap(), secret);
    }

    #[test]
    fn tampered_share_data_detected() {
        let shares = split_secret(&secret_96()).unwrap();
        let mut tampered = vec![shares[0].clone(), shares[1].clone()];
        tampered[0].data[10] ^= 0x01;
        assert!(matches!(
            reconstruct(&tampered),
            Err(SharingError::CommitmentMismatch)
        ));
    }

    #[test]
    fn foreign_share_detected_by_commitment() {
        // A share from a different secret's split cannot sneak in.
        let shares_a = split_secret(&secret_96()).unwrap();
        let shares_b = split_secret(&vec![0xAB; 96]).unwrap();
        let mixed = vec![shares_a[0].clone(), shares_b[1].clone()];
        assert!(matches!(
            reconstruct(&mixed),
            Err(SharingError::CommitmentMismatch)
        ));
    }

    #[test]
    fn conflicting_same_index_shares_rejected() {
        let shares = split_secret(&secret_96()).unwrap();
        let mut conflict = shares[0].clone();
        conflict.data[0] ^= 0xFF;
        let result = reconstruct(&[shares[0].clone(), conflict, shares[1].clone()]);
        assert!(matches!(result, Err(SharingError::ConflictingShare(1))));
    }

    #[test]
    fn zero_and_out_of_range_indices_rejected() {
        let shares = split_secret(&secret_96()).unwrap();
        let mut bad = shares[0].clone();
        bad.index = 0;
        assert!(matches!(
            reconstruct(&[bad, shares[1].clone()]),
            Err(SharingError::InvalidShareIndex(0))
        ));

        let mut bad = shares[0].clone();
        bad.index = 9;
        assert!(matches!(
            reconstruct(&[bad, shares[1].clone()]),
            Err(SharingError::InvalidShareIndex(9))
        ));
    }

    #[test]
    fn inconsistent_lengths_rejected() {
        let shares = split_secret(&secret_96()).unwrap();
        let mut short = shares[1].clone();
        short.data.truncate(40);
        assert!(matches!(
            reconstruct(&[shares[0].clone(), short]),
            Err(SharingError::InconsistentShareLengths { expected: 96, got: 40 })
        ));
    }

    #[test]
    fn empty_secret_rejected() {
        assert!(matches!(split_secret(&[]), Err(SharingError::EmptySecret)));
    }

    #[test]
    fn all_zero_and_all_one_secrets() {
        for secret in [vec![0u8; 96], vec![0xFF; 96]] {
            let shares = split_secret(&secret).unwrap();
            assert_eq!(reconstruct(&shares[1..]).unwrap(), secret);
        }
    }

    #[test]
    fn sealed_split_opens_only_for_the_right_delegate() {
        let secret = secret_96();
        let delegates: Vec<EncryptionKeypair> =
            (0..3).map(|_| EncryptionKeypair::generate()).collect();
        let keys: Vec<_> = delegates.iter().map(|d| d.public_key()).collect();

        let envelopes = split_for_delegates(&secret, &keys).unwrap();
        assert_eq!(envelopes.len(), 3);

        // Each delegate opens exactly its own envelope.
        for (i, delegate) in delegates.iter().enumerate() {
            let share = open_share(&envelopes[i], delegate).unwrap();
            assert_eq!(share.index, (i + 1) as u8);

            for (j, envelope) in envelopes.iter().enumerate() {
                if j != i {
                    assert!(open_share(envelope, delegate).is_err());
                }
            }
        }

        // Two opened shares rebuild the secret.
        let s1 = open_share(&envelopes[0], &delegates[0]).unwrap();
        let s3 = open_share(&envelopes[2], &delegates[2]).unwrap();
        assert_eq!(reconstruct(&[s1, s3]).unwrap(), secret);
    }

    #[test]
    fn sealed_split_requires_exactly_three_distinct_keys() {
        let secret = secret_96();
        let k1 = EncryptionKeypair::generate().public_key();
        let k2 = EncryptionKeypair::generate().public_key();

        assert!(matches!(
            split_for_delegates(&secret, &[k1, k2]),
            Err(SharingError::WrongRecipientCount { got: 2 })
        ));
        assert!(matches!(
            split_for_delegates(&secret, &[k1, k2, k1]),
            Err(SharingError::DuplicateRecipientKey)
        ));
    }

    #[test]
    fn share_serde_roundtrip() {
        let shares = split_secret(b"serde me").unwrap();
        let json = serde_json::to_string(&shares[0]).unwrap();
        let parsed: RecoveryShare = serde_json::from_str(&json).unwrap();
        assert_eq!(shares[0], parsed);
    }
}
