//! # File-Backed Network Collaborators
//!
//! Directory-based implementations of the content store and anchoring
//! ledger, so several agents on one machine share a "network" through the
//! filesystem:
//!
//! ```text
//! <network-dir>/
//!   objects/<content-address>.json   -- immutable published documents
//!   anchors/<management-key>.json    -- per-sender nonce and anchored head
//! ```
//!
//! Resolution follows the same chain as the in-process reference resolver:
//! fetch the genesis object, then jump to the latest anchored head for its
//! management key, if one exists.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use tessera_protocol::config::{ANCHOR_BASE_FEE, ANCHOR_FEE_PER_BYTE};
use tessera_protocol::identity::controller::LocalIdentityState;
use tessera_protocol::identity::document::IdentityDocument;
use tessera_protocol::identity::tessera_id::{ContentAddress, TesseraId};
use tessera_protocol::transport::{
    AnchorCost, AnchorReceipt, AnchorTransactionBuilder, AnchorTxParams, BroadcastError,
    PublishError, Publisher, ResolveError, Resolver, SignedAnchorTx,
};

/// Filename of the local identity state inside the data directory.
const STATE_FILE: &str = "identity.json";

// ---------------------------------------------------------------------------
// Anchor records
// ---------------------------------------------------------------------------

/// Per-sender ledger state: nonce sequence and the anchored head address.
#[derive(Debug, Default, Serialize, Deserialize)]
struct AnchorRecord {
    /// Last nonce handed out by `build_publish_tx`.
    next_nonce: u64,
    /// Nonces already spent by accepted broadcasts.
    accepted_nonces: Vec<u64>,
    /// Latest anchored content address.
    head: Option<ContentAddress>,
}

fn anchors_dir(network_dir: &Path) -> PathBuf {
    network_dir.join("anchors")
}

fn objects_dir(network_dir: &Path) -> PathBuf {
    network_dir.join("objects")
}

fn record_path(network_dir: &Path, from_address: &str) -> PathBuf {
    anchors_dir(network_dir).join(format!("{from_address}.json"))
}

fn load_record(network_dir: &Path, from_address: &str) -> std::io::Result<AnchorRecord> {
    let path = record_path(network_dir, from_address);
    if !path.exists() {
        return Ok(AnchorRecord::default());
    }
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(std::io::Error::other)
}

fn save_record(
    network_dir: &Path,
    from_address: &str,
    record: &AnchorRecord,
) -> std::io::Result<()> {
    let bytes = serde_json::to_vec_pretty(record).map_err(std::io::Error::other)?;
    fs::write(record_path(network_dir, from_address), bytes)
}

// ---------------------------------------------------------------------------
// FsStore
// ---------------------------------------------------------------------------

/// Content store and anchor-following resolver over a shared directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    network_dir: PathBuf,
}

impl FsStore {
    /// Open (and lay out) a network directory.
    pub fn open(network_dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(objects_dir(network_dir))
            .with_context(|| format!("creating {}", network_dir.display()))?;
        fs::create_dir_all(anchors_dir(network_dir))?;
        Ok(Self {
            network_dir: network_dir.to_path_buf(),
        })
    }

    fn object_path(&self, address: &str) -> PathBuf {
        objects_dir(&self.network_dir).join(format!("{address}.json"))
    }

    fn read_object(&self, id: &TesseraId) -> Result<IdentityDocument, ResolveError> {
        let path = self.object_path(id.content_address().as_str());
        if !path.exists() {
            return Err(ResolveError::NotFound(id.clone()));
        }
        let bytes = fs::read(path).map_err(|e| ResolveError::Malformed(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| ResolveError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl Publisher for FsStore {
    async fn publish(&self, document: &IdentityDocument) -> Result<ContentAddress, PublishError> {
        let bytes = document.canonical_bytes();
        let address = ContentAddress::for_bytes(&bytes);
        fs::write(self.object_path(address.as_str()), &bytes).map_err(|e| PublishError {
            detail: format!("writing object {}: {}", address, e),
        })?;
        Ok(address)
    }
}

#[async_trait]
impl Resolver for FsStore {
    async fn resolve(&self, id: &TesseraId) -> Result<IdentityDocument, ResolveError> {
        let genesis = self.read_object(id)?;

        let from = genesis.management_key.to_hex();
        let record = load_record(&self.network_dir, &from)
            .map_err(|e| ResolveError::Malformed(e.to_string()))?;
        match record.head {
            Some(head) if &head != id.content_address() => {
                self.read_object(&TesseraId::from_content_address(head))
            }
            _ => Ok(genesis),
        }
    }
}

// ---------------------------------------------------------------------------
// FsLedger
// ---------------------------------------------------------------------------

/// Anchoring ledger over the shared network directory.
#[derive(Debug, Clone)]
pub struct FsLedger {
    network_dir: PathBuf,
}

impl FsLedger {
    /// Open the ledger side of a network directory.
    pub fn open(network_dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(anchors_dir(network_dir))?;
        Ok(Self {
            network_dir: network_dir.to_path_buf(),
        })
    }
}

#[async_trait]
impl AnchorTransactionBuilder for FsLedger {
    async fn build_publish_tx(
        &self,
        content_address: &ContentAddress,
        from_address: &str,
    ) -> AnchorTxParams {
        // A broken record file degrades to a fresh one; the broadcast step
        // still rejects nonce collisions.
        let mut record = load_record(&self.network_dir, from_address).unwrap_or_default();
        record.next_nonce += 1;
        let nonce = record.next_nonce;
        let _ = save_record(&self.network_dir, from_address, &record);

        AnchorTxParams {
            from_address: from_address.to_string(),
            content_address: content_address.clone(),
            nonce,
            fee: ANCHOR_BASE_FEE + ANCHOR_FEE_PER_BYTE * content_address.as_str().len() as u64,
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

        let from = &tx.params.from_address;
        let mut record =
            load_record(&self.network_dir, from).map_err(|e| BroadcastError {
                tx_id: tx.id.clone(),
                detail: e.to_string(),
            })?;

        if record.accepted_nonces.contains(&tx.params.nonce) {
            return Err(BroadcastError {
                tx_id: tx.id.clone(),
                detail: format!("nonce {} already spent", tx.params.nonce),
            });
        }

        record.accepted_nonces.push(tx.params.nonce);
        record.head = Some(tx.params.content_address.clone());
        save_record(&self.network_dir, from, &record).map_err(|e| BroadcastError {
            tx_id: tx.id.clone(),
            detail: e.to_string(),
        })?;

        Ok(AnchorReceipt {
            tx_id: tx.id.clone(),
            position: record.accepted_nonces.len() as u64,
            accepted_at: chrono::Utc::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// Local state
// ---------------------------------------------------------------------------

/// Persist the identity's local state (including raw key material) into
/// the data directory.
pub fn save_state(data_dir: &Path, state: &LocalIdentityState) -> anyhow::Result<()> {
    fs::create_dir_all(data_dir)
        .with_context(|| format!("creating {}", data_dir.display()))?;
    let bytes = serde_json::to_vec_pretty(state)?;
    let path = data_dir.join(STATE_FILE);
    fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Load the identity's local state from the data directory.
pub fn load_state(data_dir: &Path) -> anyhow::Result<LocalIdentityState> {
    let path = data_dir.join(STATE_FILE);
    let bytes = fs::read(&path)
        .with_context(|| format!("no identity at {} (run `tessera init`?)", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_protocol::identity::document::DocumentBuilder;
    use tessera_protocol::identity::keyring::KeyRing;

    #[tokio::test]
    async fn publish_resolve_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();

        let doc = DocumentBuilder::new(KeyRing::generate().public_keys()).build();
        let address = store.publish(&doc).await.unwrap();
        let id = TesseraId::from_content_address(address);
        assert_eq!(store.resolve(&id).await.unwrap(), doc);
    }

    #[tokio::test]
    async fn resolve_missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        let id = TesseraId::from_content_address(ContentAddress::for_bytes(b"absent"));
        assert!(matches!(
            store.resolve(&id).await,
            Err(ResolveError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn resolution_follows_anchored_head() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        let ledger = FsLedger::open(dir.path()).unwrap();
        let keyring = KeyRing::generate();

        let v1 = DocumentBuilder::new(keyring.public_keys()).build();
        let genesis_address = store.publish(&v1).await.unwrap();
        let id = TesseraId::from_content_address(genesis_address);

        let v2 = DocumentBuilder::new(keyring.public_keys())
            .version(2)
            .created_at(v1.created_at)
            .build();
        let v2_address = store.publish(&v2).await.unwrap();

        // Published but unanchored: still v1.
        assert_eq!(store.resolve(&id).await.unwrap().version, 1);

        let from = keyring.public_keys().management.to_hex();
        let params = ledger.build_publish_tx(&v2_address, &from).await;
        let tx = SignedAnchorTx::sign(params, &keyring);
        ledger.broadcast(&tx).await.unwrap();

        assert_eq!(store.resolve(&id).await.unwrap().version, 2);

        // Replay is refused.
        assert!(ledger.broadcast(&tx).await.is_err());
    }

    #[test]
    fn local_state_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let keyring = KeyRing::generate();
        let document = DocumentBuilder::new(keyring.public_keys()).build();
        let address = ContentAddress::for_bytes(&document.canonical_bytes());
        let state = LocalIdentityState {
            identifier: TesseraId::from_content_address(address.clone()),
            document,
            content_address: address,
            keyring: keyring.export(),
        };

        save_state(dir.path(), &state).unwrap();
        let loaded = load_state(dir.path()).unwrap();
        assert_eq!(loaded.identifier, state.identifier);
        assert_eq!(loaded.keyring.signing_seed, state.keyring.signing_seed);
    }

    #[test]
    fn load_state_without_init_is_a_helpful_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_state(dir.path()).unwrap_err();
        assert!(err.to_string().contains("tessera init"));
    }
}
