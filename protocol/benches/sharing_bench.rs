// Secret-sharing and envelope benchmarks for the TESSERA protocol.
//
// Covers the recovery hot path: splitting the 96-byte recoverable secret,
// reconstruction from a threshold subset, sealed-envelope transport, and
// context signing.

use criterion::{criterion_group, criterion_main, Criterion};

use tessera_protocol::crypto::sealed::{self, EncryptionKeypair};
use tessera_protocol::identity::keyring::{KeyRing, SigningContext};
use tessera_protocol::identity::sharing::{reconstruct, split_secret};

fn bench_split(c: &mut Criterion) {
    let ring = KeyRing::generate();
    let secret = ring.recoverable_secret();

    c.bench_function("sharing/split_96_bytes", |b| {
        b.iter(|| split_secret(&secret).unwrap());
    });
}

fn bench_reconstruct(c: &mut Criterion) {
    let ring = KeyRing::generate();
    let shares = split_secret(&ring.recoverable_secret()).unwrap();
    let threshold_subset = &shares[..2];

    c.bench_function("sharing/reconstruct_2_of_3", |b| {
        b.iter(|| reconstruct(threshold_subset).unwrap());
    });
}

fn bench_seal_open(c: &mut Criterion) {
    let recipient = EncryptionKeypair::generate();
    let payload = vec![0xA5u8; 256];

    c.bench_function("sealed/seal_256_bytes", |b| {
        b.iter(|| sealed::seal(&recipient.public_key(), &payload).unwrap());
    });

    let envelope = sealed::seal(&recipient.public_key(), &payload).unwrap();
    c.bench_function("sealed/open_256_bytes", |b| {
        b.iter(|| sealed::open(&envelope, &recipient).unwrap());
    });
}

fn bench_context_signing(c: &mut Criterion) {
    let ring = KeyRing::generate();
    let payload = b"anchor content address Qm... from nonce 42";

    c.bench_function("keyring/sign_management", |b| {
        b.iter(|| ring.sign(SigningContext::Management, payload));
    });

    let keys = ring.public_keys();
    let signature = ring.sign(SigningContext::Management, payload);
    c.bench_function("keyring/verify_management", |b| {
        b.iter(|| keys.verify(SigningContext::Management, payload, &signature));
    });
}

criterion_group!(
    benches,
    bench_split,
    bench_reconstruct,
    bench_seal_open,
    bench_context_signing
);
criterion_main!(benches);
