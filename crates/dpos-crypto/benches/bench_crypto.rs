// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BENCHMARK SUITE — dpos-crypto
//
// Measures performance of signer recovery, the hottest path on the header
// verification side (every header in a batch needs one recovery).
//
// ZERO production code changes — benchmark-only file.
// Run: cargo bench -p dpos-crypto
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dpos_crypto::recovery::{recover_address, recover_signer, SignerCache};
use dpos_crypto::keccak256;
use secp256k1::{Message, SecretKey, SECP256K1};

fn sign(seal_hash: &dpos_crypto::Hash32, sk: &SecretKey) -> [u8; 65] {
    let message = Message::from_digest_slice(&seal_hash.0).unwrap();
    let (recovery_id, compact) = SECP256K1.sign_ecdsa_recoverable(&message, sk).serialize_compact();
    let mut sig = [0u8; 65];
    sig[..64].copy_from_slice(&compact);
    sig[64] = recovery_id.to_i32() as u8;
    sig
}

fn bench_keccak256(c: &mut Criterion) {
    let data = vec![0xABu8; 600]; // representative header size
    c.bench_function("crypto/keccak256_header", |b| {
        b.iter(|| black_box(keccak256(&data)))
    });
}

fn bench_recover_address(c: &mut Criterion) {
    let sk = SecretKey::from_slice(&[11u8; 32]).unwrap();
    let seal_hash = keccak256(b"representative-seal-hash-input");
    let sig = sign(&seal_hash, &sk);

    c.bench_function("crypto/recover_address", |b| {
        b.iter(|| black_box(recover_address(&seal_hash, &sig).unwrap()))
    });
}

fn bench_recover_signer_cache_hit(c: &mut Criterion) {
    let sk = SecretKey::from_slice(&[22u8; 32]).unwrap();
    let seal_hash = keccak256(b"cached-seal-hash");
    let sig = sign(&seal_hash, &sk);
    let mut extra = vec![0u8; 32];
    extra.extend_from_slice(&sig);

    let cache = SignerCache::new(4096);
    let header_hash = keccak256(b"header-for-cache-bench");
    // Warm the cache once.
    recover_signer(&cache, header_hash, seal_hash, &extra).unwrap();

    c.bench_function("crypto/recover_signer_cache_hit", |b| {
        b.iter(|| black_box(recover_signer(&cache, header_hash, seal_hash, &extra).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_keccak256,
    bench_recover_address,
    bench_recover_signer_cache_hit,
);
criterion_main!(benches);
