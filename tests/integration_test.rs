// ========================================
// INTEGRATION TESTS FOR THE DPOS ENGINE
// ========================================
//
// Exercises the crates together end to end: elect a signer queue from a
// pledge book, seal and verify a run of headers, confirm the coin trie and
// reward ledger evolve consistently, and round-trip a ledger book through
// sled persistence.
//
// Usage:
//   cargo test --test integration_test -- --nocapture
//
// ========================================

use std::sync::Arc;

use dpos_consensus::elector::elect_signer_queue;
use dpos_consensus::ledger::{open_ledger_db, LockKind};
use dpos_consensus::snapshot::Snapshot;
use dpos_consensus::Engine;
use dpos_core::extra::HeaderExtra;
use dpos_core::header::RawHeader;
use dpos_core::ChainConfig;
use dpos_crypto::{keccak256, Address, Hash32};
use secp256k1::{Message, SecretKey, SECP256K1};

fn sign(seal_hash: &Hash32, sk: &SecretKey) -> [u8; 65] {
    let message = Message::from_digest_slice(&seal_hash.0).unwrap();
    let (recovery_id, compact) = SECP256K1.sign_ecdsa_recoverable(&message, sk).serialize_compact();
    let mut sig = [0u8; 65];
    sig[..64].copy_from_slice(&compact);
    sig[64] = recovery_id.to_i32() as u8;
    sig
}

fn addr_from_sk(sk: &SecretKey) -> Address {
    let pubkey = sk.public_key(SECP256K1);
    let uncompressed = pubkey.serialize_uncompressed();
    let mut xy = [0u8; 64];
    xy.copy_from_slice(&uncompressed[1..65]);
    dpos_crypto::address_from_uncompressed_pubkey(&xy)
}

fn sealed_header(sk: &SecretKey, number: u64, difficulty: u64, extra_payload: HeaderExtra, parent_hash: Hash32) -> RawHeader {
    let vanity = [0u8; 32];
    let coinbase = addr_from_sk(sk);
    let mut header = RawHeader {
        parent_hash,
        uncle_hash: Hash32::ZERO,
        coinbase,
        state_root: Hash32::ZERO,
        tx_hash: Hash32::ZERO,
        receipt_hash: Hash32::ZERO,
        bloom: vec![0u8; 256],
        difficulty,
        number,
        gas_limit: 8_000_000,
        gas_used: 0,
        time: 1_700_000_000 + number * 10,
        extra: RawHeader::assemble_extra(&vanity, &extra_payload, &[0u8; 65]),
        mix_digest: Hash32::ZERO,
        nonce: [0u8; 8],
        base_fee: None,
    };
    let seal_hash = header.seal_hash();
    let sig = sign(&seal_hash, sk);
    header.extra = RawHeader::assemble_extra(&vanity, &extra_payload, &sig);
    header
}

#[test]
fn three_signer_rotation_seals_and_verifies_a_chain() {
    println!("\n=== TEST 1: Three-signer rotation seals and verifies a chain ===\n");

    let cfg = ChainConfig::default();
    let mut genesis = Snapshot::genesis(&cfg);

    let keys: Vec<SecretKey> = (1..=3u8).map(|b| SecretKey::from_slice(&[b; 32]).unwrap()).collect();
    let signers: Vec<Address> = keys.iter().map(addr_from_sk).collect();

    for (i, signer) in signers.iter().enumerate() {
        genesis.create_pos_pledge(*signer, *signer, 5_000 * dpos_core::TOKEN_DECIMALS, 0);
        println!("validator {i} pledged with address {signer}");
    }
    genesis.refresh_tally(&cfg);

    let queue = elect_signer_queue(&genesis, &cfg);
    assert_eq!(queue.len(), 3, "all three pledged signers should be elected");
    genesis.signers = queue.clone();

    let engine = Engine::new(cfg.clone());
    let mut parent = Arc::new(genesis);

    for number in 1..=3u64 {
        let signer_addr = parent.signers[(number as usize) % parent.signers.len()];
        let sk = keys
            .iter()
            .find(|k| addr_from_sk(k) == signer_addr)
            .expect("signer key must be known");

        let mut extra = HeaderExtra::default();
        extra.signer_queue = parent.signers.clone();
        extra.coin_data_root = parent.coin.root();
        extra.grant_profit_hash = dpos_core::extra::grant_profit_hash(&extra.grant_profit);

        let time = 1_700_000_000 + number * 10;
        let difficulty = engine.calc_difficulty(&parent, time, &signer_addr);
        let header = sealed_header(sk, number, difficulty, extra, parent.hash);

        let next = engine.apply_header(&header, &parent, vec![]).expect("header should verify and apply");
        println!("block {number} sealed by {signer_addr}, reward balance now {}", next.reward_lock.reward_balance(&signer_addr));
        assert!(next.reward_lock.reward_balance(&signer_addr) > 0);
        parent = next;
    }

    assert_eq!(parent.number, 3);
    println!("\nTEST PASSED: chain of 3 headers verified and applied\n");
}

#[tokio::test]
async fn batch_header_verification_rejects_a_forged_signature() {
    println!("\n=== TEST 2: Batch verification rejects a forged signer ===\n");

    let cfg = ChainConfig::default();
    let sk = SecretKey::from_slice(&[42u8; 32]).unwrap();
    let signer = addr_from_sk(&sk);
    let forger = SecretKey::from_slice(&[43u8; 32]).unwrap();

    let mut genesis = Snapshot::genesis(&cfg);
    genesis.signers = vec![signer];
    let parent = Arc::new(genesis);

    let engine = Engine::new(cfg.clone());

    let good_extra = {
        let mut e = HeaderExtra::default();
        e.coin_data_root = parent.coin.root();
        e.signer_queue = parent.signers.clone();
        e
    };
    let good_header = sealed_header(&sk, 1, 2, good_extra.clone(), Hash32::ZERO);
    let forged_header = sealed_header(&forger, 2, 2, good_extra, Hash32::ZERO);

    let results = engine.verify_headers_batch(vec![good_header, forged_header], parent).await;
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok(), "legitimately signed header should verify");
    assert!(results[1].is_err(), "header signed by a non-signer must be rejected");

    println!("TEST PASSED: forged signer correctly rejected\n");
}

#[test]
fn ledger_book_survives_a_restart_via_sled() {
    println!("\n=== TEST 3: Reward ledger survives persistence round-trip ===\n");

    let dir = tempfile::tempdir().unwrap();
    let target = Address([9; 20]);
    let snapshot_hash = keccak256(b"checkpoint-at-height-360");

    {
        let db = open_ledger_db(dir.path()).unwrap();
        let mut book = dpos_consensus::ledger::LockData::default();
        book.add_reward(target, 12_345);
        book.flush_reward_to_pledge(target, 100, 0, 200, 10);
        book.persist(&db, LockKind::Signer, &snapshot_hash).unwrap();
        println!("persisted reward book for {target} under checkpoint {snapshot_hash}");
    }

    {
        let db = open_ledger_db(dir.path()).unwrap();
        let loaded = dpos_consensus::ledger::LockData::load(&db, LockKind::Signer, &snapshot_hash).unwrap();
        assert_eq!(loaded.revenue[&target].total_locked(), 12_345);
        println!("recovered reward book after reopening the database");
    }

    println!("TEST PASSED: ledger persistence round-trips through sled\n");
}
