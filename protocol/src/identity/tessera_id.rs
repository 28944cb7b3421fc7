//! # TESSERA Identifiers
//!
//! A TESSERA identifier is `did:tessera:<content-address>`: the scheme
//! prefix followed by the base58 content address of the identity's current
//! document in the content store. Publishing a document *is* minting an
//! identifier — there is no registry to consult and nothing else to reserve.
//!
//! The identifier resolves by fetching the addressed document from the
//! store; the address is a BLAKE3 digest, so the retrieved bytes are
//! self-authenticating against the identifier that fetched them.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::{DID_METHOD, HASH_OUTPUT_LENGTH, SCHEME_PREFIX};
use crate::crypto::hash;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while parsing identifiers and content addresses.
#[derive(Debug, Error)]
pub enum TesseraIdError {
    /// The string does not look like `did:<method>:<identifier>`.
    #[error("invalid identifier format: {0}")]
    InvalidFormat(String),

    /// The DID method is not "tessera".
    #[error("unsupported DID method: expected 'tessera', got '{0}'")]
    UnsupportedMethod(String),

    /// The method-specific part is not a valid content address.
    #[error("invalid content address: {0}")]
    InvalidAddress(String),
}

// ---------------------------------------------------------------------------
// ContentAddress
// ---------------------------------------------------------------------------

/// A base58-encoded BLAKE3 digest naming one immutable document in the
/// content store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentAddress(String);

impl ContentAddress {
    /// Derive the address for a blob of canonical bytes.
    pub fn for_bytes(data: &[u8]) -> Self {
        Self(hash::content_address(data))
    }

    /// Parse and validate an address string: it must base58-decode to a
    /// 32-byte digest.
    pub fn parse(s: &str) -> Result<Self, TesseraIdError> {
        let decoded = bs58::decode(s)
            .into_vec()
            .map_err(|e| TesseraIdError::InvalidAddress(e.to_string()))?;
        if decoded.len() != HASH_OUTPUT_LENGTH {
            return Err(TesseraIdError::InvalidAddress(format!(
                "expected {} digest bytes, got {}",
                HASH_OUTPUT_LENGTH,
                decoded.len()
            )));
        }
        Ok(Self(s.to_string()))
    }

    /// The address as a base58 string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ContentAddress {
    type Error = TesseraIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ContentAddress> for String {
    fn from(addr: ContentAddress) -> String {
        addr.0
    }
}

// ---------------------------------------------------------------------------
// TesseraId
// ---------------------------------------------------------------------------

/// A TESSERA identity identifier: `did:tessera:<content-address>`.
///
/// # Examples
///
/// ```
/// use tessera_protocol::identity::tessera_id::{ContentAddress, TesseraId};
///
/// let address = ContentAddress::for_bytes(b"some canonical document bytes");
/// let id = TesseraId::from_content_address(address);
/// assert!(id.to_string().starts_with("did:tessera:"));
///
/// let parsed = TesseraId::parse(&id.to_string()).unwrap();
/// assert_eq!(id, parsed);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TesseraId {
    address: ContentAddress,
}

impl TesseraId {
    /// Mint an identifier from a content address returned by the publisher.
    pub fn from_content_address(address: ContentAddress) -> Self {
        Self { address }
    }

    /// Parse a `did:tessera:<address>` string.
    pub fn parse(s: &str) -> Result<Self, TesseraIdError> {
        let mut parts = s.splitn(3, ':');
        let (scheme, method, payload) = match (parts.next(), parts.next(), parts.next()) {
            (Some(a), Some(b), Some(c)) => (a, b, c),
            _ => {
                return Err(TesseraIdError::InvalidFormat(
                    "identifier must have the form 'did:<method>:<address>'".into(),
                ))
            }
        };

        if scheme != "did" {
            return Err(TesseraIdError::InvalidFormat(format!(
                "expected 'did' scheme, got '{}'",
                scheme
            )));
        }
        if method != DID_METHOD {
            return Err(TesseraIdError::UnsupportedMethod(method.to_string()));
        }

        Ok(Self {
            address: ContentAddress::parse(payload)?,
        })
    }

    /// The content address the identifier points at.
    pub fn content_address(&self) -> &ContentAddress {
        &self.address
    }
}

impl fmt::Display for TesseraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", SCHEME_PREFIX, self.address)
    }
}

impl TryFrom<String> for TesseraId {
    type Error = TesseraIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<TesseraId> for String {
    fn from(id: TesseraId) -> String {
        id.to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_id() -> TesseraId {
        TesseraId::from_content_address(ContentAddress::for_bytes(b"document bytes"))
    }

    #[test]
    fn identifier_has_scheme_prefix() {
        let id = sample_id();
        assert!(id.to_string().starts_with("did:tessera:"));
    }

    #[test]
    fn identifier_string_roundtrip() {
        let id = sample_id();
        let parsed = TesseraId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn wrong_scheme_rejected() {
        let err = TesseraId::parse("url:tessera:abc").unwrap_err();
        assert!(matches!(err, TesseraIdError::InvalidFormat(_)));
    }

    #[test]
    fn wrong_method_rejected() {
        let addr = ContentAddress::for_bytes(b"x");
        let err = TesseraId::parse(&format!("did:ethr:{}", addr)).unwrap_err();
        assert!(matches!(err, TesseraIdError::UnsupportedMethod(m) if m == "ethr"));
    }

    #[test]
    fn missing_payload_rejected() {
        assert!(TesseraId::parse("did:tessera").is_err());
    }

    #[test]
    fn garbage_address_rejected() {
        // '0', 'O', 'I', 'l' are not in the base58 alphabet.
        let err = TesseraId::parse("did:tessera:0OIl").unwrap_err();
        assert!(matches!(err, TesseraIdError::InvalidAddress(_)));
    }

    #[test]
    fn short_digest_rejected() {
        let short = bs58::encode([1u8; 8]).into_string();
        assert!(ContentAddress::parse(&short).is_err());
    }

    #[test]
    fn address_is_deterministic() {
        let a = ContentAddress::for_bytes(b"same bytes");
        let b = ContentAddress::for_bytes(b"same bytes");
        assert_eq!(a, b);
        assert_ne!(a, ContentAddress::for_bytes(b"other bytes"));
    }

    #[test]
    fn serde_roundtrip_as_string() {
        let id = sample_id();
        let json = serde_json::to_string(&id).unwrap();
        assert!(json.contains("did:tessera:"));
        let parsed: TesseraId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn serde_rejects_malformed_identifier() {
        let result: Result<TesseraId, _> = serde_json::from_str("\"did:tessera:!!!\"");
        assert!(result.is_err());
    }
}
