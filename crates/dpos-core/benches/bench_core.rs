// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BENCHMARK SUITE — dpos-core
//
// ZERO production code changes — benchmark-only file.
// Run: cargo bench -p dpos-core
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dpos_core::coin::CoinTrie;
use dpos_core::extra::HeaderExtra;
use dpos_core::header::RawHeader;
use dpos_core::reward::{block_reward_for_year, PledgeItem};
use dpos_crypto::{Address, Hash32};

fn sample_header(extra_len: usize) -> RawHeader {
    let mut extra = vec![0xABu8; 32];
    extra.extend(vec![0x01u8; extra_len]);
    extra.extend(vec![0u8; 65]);
    RawHeader {
        parent_hash: Hash32::ZERO,
        uncle_hash: Hash32::ZERO,
        coinbase: Address::ZERO,
        state_root: Hash32::ZERO,
        tx_hash: Hash32::ZERO,
        receipt_hash: Hash32::ZERO,
        bloom: vec![0u8; 256],
        difficulty: 1,
        number: 1000,
        gas_limit: 8_000_000,
        gas_used: 21_000,
        time: 1_700_000_000,
        extra,
        mix_digest: Hash32::ZERO,
        nonce: [0u8; 8],
        base_fee: None,
    }
}

fn bench_seal_hash(c: &mut Criterion) {
    let header = sample_header(512);
    c.bench_function("header/seal_hash", |b| b.iter(|| black_box(header.seal_hash())));
}

fn bench_header_extra_encode_decode(c: &mut Criterion) {
    let mut extra = HeaderExtra::default();
    extra.signer_queue = (0..21).map(|i| Address([i as u8; 20])).collect();

    c.bench_function("header_extra/encode", |b| b.iter(|| black_box(extra.encode())));

    let bytes = extra.encode();
    c.bench_function("header_extra/decode", |b| {
        b.iter(|| black_box(HeaderExtra::decode(&bytes).unwrap()))
    });
}

fn bench_coin_trie_root(c: &mut Criterion) {
    let mut group = c.benchmark_group("coin/root");
    for num_accounts in [100, 1_000, 10_000] {
        let mut trie = CoinTrie::new();
        for i in 0..num_accounts {
            let mut addr = [0u8; 20];
            addr[..8].copy_from_slice(&(i as u64).to_be_bytes());
            trie.set(Address(addr), (i as u128 + 1) * 1_000_000_000_000_000_000);
        }
        group.bench_with_input(
            BenchmarkId::new("accounts", num_accounts),
            &num_accounts,
            |b, _| b.iter(|| black_box(trie.root())),
        );
    }
    group.finish();
}

fn bench_block_reward_schedule(c: &mut Criterion) {
    c.bench_function("reward/block_reward_for_year", |b| {
        b.iter(|| {
            for year in 1..15 {
                black_box(block_reward_for_year(year));
            }
        })
    });
}

fn bench_pledge_item_payable_amount(c: &mut Criterion) {
    let item = PledgeItem {
        start_height: 100,
        lock_period: 3000,
        rls_period: 200,
        interval: 10,
        amount: 10_000,
        playment: 0,
    };
    c.bench_function("reward/pledge_item_payable_amount", |b| {
        b.iter(|| black_box(item.payable_amount(3150)))
    });
}

criterion_group!(
    benches,
    bench_seal_hash,
    bench_header_extra_encode_decode,
    bench_coin_trie_root,
    bench_block_reward_schedule,
    bench_pledge_item_payable_amount,
);
criterion_main!(benches);
