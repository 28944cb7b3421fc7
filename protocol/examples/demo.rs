//! Interactive demo of the full TESSERA identity lifecycle.
//!
//! Walks through delegate setup, identity creation with a recovery network,
//! delegate rotation with an anchored republication, total key loss, and
//! social recovery through two of three delegates.
//!
//! Run with:
//!   cargo run --example demo --release

use std::sync::Arc;

use serde_json::json;

use tessera_protocol::identity::controller::{Identity, IdentityController};
use tessera_protocol::identity::delegates;
use tessera_protocol::identity::tessera_id::TesseraId;
use tessera_protocol::transport::memory::{
    JsonAssertionEncoder, LedgerResolver, MemoryLedger, MemoryStore,
};
use tessera_protocol::transport::AnchorTransactionBuilder;

// ---------------------------------------------------------------------------
// Display helpers
// ---------------------------------------------------------------------------

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";

fn section(num: u32, title: &str) {
    println!();
    println!("{BOLD}{CYAN}===[ Step {num} ]========================================================{RESET}");
    println!("{BOLD}  {title}{RESET}");
}

fn detail(text: &str) {
    println!("{DIM}{CYAN}  >> {text}{RESET}");
}

fn ok(text: &str) {
    println!("{GREEN}  ok: {text}{RESET}");
}

#[tokio::main]
async fn main() {
    println!();
    println!("{BOLD}  TESSERA — decentralized identity with social key recovery{RESET}");

    let store = Arc::new(MemoryStore::new());
    let ledger = Arc::new(MemoryLedger::new());
    let resolver = Arc::new(LedgerResolver::new(store.clone(), ledger.clone()));
    let controller = IdentityController::new(
        resolver,
        store.clone(),
        ledger.clone(),
        Arc::new(JsonAssertionEncoder::new()),
    );

    // --- Step 1: delegates exist first -----------------------------------
    section(1, "Three friends create their own identities");
    let mut delegate_identities: Vec<Identity> = Vec::new();
    let mut delegate_ids: Vec<TesseraId> = Vec::new();
    for name in ["delia", "derek", "dana"] {
        let identity = controller.create(name, None).await.expect("create");
        detail(&format!("{name}: {}", identity.id()));
        delegate_ids.push(identity.id().clone());
        delegate_identities.push(identity);
    }
    ok("delegate identities published");

    // --- Step 2: Alice, with a recovery network --------------------------
    section(2, "Alice creates an identity guarded by her three friends");
    let alice = controller
        .create("alice", Some(delegate_ids.as_slice()))
        .await
        .expect("create alice");
    detail(&format!("identifier: {}", alice.id()));
    detail(&format!(
        "recovery network entries: {}",
        alice.document().recovery_network.as_ref().unwrap().entries().len()
    ));
    let list = delegates::decrypt_list(
        alice.keyring(),
        alice.document().encrypted_delegates.as_ref().unwrap(),
    )
    .expect("owner reads own list");
    detail(&format!("only alice can read her delegate list ({} entries)", list.len()));
    ok("document v1 published with sealed shares");

    // --- Step 3: rotate delegates and anchor -----------------------------
    section(3, "Alice rotates one delegate and anchors the update");
    let replacement = controller.create("noel", None).await.expect("create noel");
    let mut new_ids = delegate_ids.clone();
    new_ids[2] = replacement.id().clone();

    let mut alice = alice;
    let pending = controller
        .update_delegates(&mut alice, &new_ids)
        .await
        .expect("update delegates");
    detail(&format!("document v{} published", alice.document().version));
    detail(&format!(
        "signed anchor tx {} (estimated fee: {} units) — not yet broadcast",
        &pending.tx.id[..16],
        pending.cost.fee
    ));
    let receipt = ledger.broadcast(&pending.tx).await.expect("broadcast");
    ok(&format!("anchored at ledger position {}", receipt.position));

    // --- Step 4: disaster ------------------------------------------------
    section(4, "Alice's laptop dies. All local key material is gone");
    let alice_id = alice.id().clone();
    drop(alice);
    println!("{YELLOW}  all that survives is the identifier itself{RESET}");

    // --- Step 5: social recovery -----------------------------------------
    section(5, "Two of three delegates return their shares");
    let mut session = controller
        .begin_recovery(&alice_id)
        .await
        .expect("begin recovery");

    let share_a = controller
        .assist_recovery(&delegate_identities[0], &alice_id)
        .await
        .expect("delia assists");
    detail("delia opened her sealed envelope and returned share 1");
    session.add_share(share_a);

    match session.attempt() {
        Err(e) => detail(&format!("one share is not enough: {e}")),
        Ok(_) => unreachable!("below threshold"),
    }

    let share_b = controller
        .assist_recovery(&replacement, &alice_id)
        .await
        .expect("noel assists");
    detail("noel opened his sealed envelope and returned share 3");
    session.add_share(share_b);

    let alice = session.attempt().expect("recovery");
    ok("key material reconstructed and verified against the published document");

    // --- Step 6: back in business ----------------------------------------
    section(6, "The recovered identity signs assertions again");
    let bob = controller.create("bob", None).await.expect("create bob");
    let token = controller
        .sign_assertion(&alice, &json!({"msg": "back from the dead"}), Some(bob.id()))
        .expect("sign");
    let payload = controller
        .verify_assertion(&bob, &token, None)
        .await
        .expect("verify");
    ok(&format!("bob verified alice's assertion: {payload}"));

    println!();
    println!("{BOLD}{GREEN}  lifecycle complete — create, rotate, anchor, lose, recover.{RESET}");
    println!();
}
