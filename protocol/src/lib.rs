// Copyright (c) 2026 Tessera Labs. MIT License.
// See LICENSE for details.

//! # TESSERA Protocol — Core Library
//!
//! Decentralized identity with social key recovery. An identity is a signed
//! document of public keys, content-addressed in an external store and
//! anchored on a ledger for tamper-evident publication — and when the
//! owner's device burns down, the identity comes back through three trusted
//! delegates holding threshold shares of the master secret, no central
//! authority involved.
//!
//! ## Architecture
//!
//! The crate is split into modules that mirror the actual concerns:
//!
//! - **crypto** — Ed25519, X25519 sealed envelopes, AES-256-GCM, BLAKE3.
//!   Thin wrappers over audited implementations; nothing home-grown.
//! - **identity** — the key ring, threshold sharing, the delegate registry,
//!   the document model, identifiers, and the controller state machine.
//! - **transport** — the collaborator contracts (resolver, publisher,
//!   anchoring ledger, assertion encoder) plus in-process reference
//!   implementations for tests and local use.
//! - **config** — protocol constants and network parameters.
//!
//! ## Design Philosophy
//!
//! 1. The recovery path is the product. It gets the strictest checks and
//!    the most tests.
//! 2. Confidentiality of the delegate set: the public document never says
//!    who can recover an identity.
//! 3. Failures are typed and loud. No decryption ever "succeeds" into
//!    garbage, and no publish failure is swallowed.

pub mod config;
pub mod crypto;
pub mod identity;
pub mod transport;
