// Pledge & Reward Ledger (C3): five LockData books (signer, flow,
// inspire, pos-exit, flow-exit reward) keyed by target address, with an
// L1/L2 disk-spill pattern for cold entries — grounded on checkpoint.rs's
// sled-backed persistence with lock-retry-on-open.

use dpos_core::reward::PledgeItem;
use dpos_crypto::{Address, Hash32};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LockKind {
    Signer,
    Flow,
    Inspire,
    PosExit,
    FlowExit,
}

impl LockKind {
    fn namespace(self) -> &'static str {
        match self {
            LockKind::Signer => "signer",
            LockKind::Flow => "flow",
            LockKind::Inspire => "inspire",
            LockKind::PosExit => "pos-exit",
            LockKind::FlowExit => "flow-exit",
        }
    }
}

/// One target's bookkeeping within a single `LockData` book: an
/// un-materialised reward balance plus any number of locked `PledgeItem`
/// tranches, indexed by the height they were created at.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RevenueEntry {
    pub reward_balance: u128,
    pub lock_balance: BTreeMap<u64, Vec<PledgeItem>>,
}

impl RevenueEntry {
    pub fn total_locked(&self) -> u128 {
        self.lock_balance
            .values()
            .flatten()
            .map(|item| item.amount - item.playment)
            .sum()
    }
}

/// One of the five reward books (§3's `revenue` ledger set).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockData {
    pub revenue: BTreeMap<Address, RevenueEntry>,
    /// Confirmation keys already applied — makes `confirm` idempotent (P9).
    pub applied_confirmations: BTreeSet<Hash32>,
    /// Hashes of entries spilled to the L1 (warm) disk tier.
    pub l1_cache_keys: Vec<Hash32>,
    /// Hashes of entries spilled to the L2 (cold) disk tier.
    pub l2_cache_keys: Vec<Hash32>,
}

impl LockData {
    pub fn reward_balance(&self, target: &Address) -> u128 {
        self.revenue.get(target).map(|e| e.reward_balance).unwrap_or(0)
    }

    pub fn add_reward(&mut self, target: Address, amount: u128) {
        self.revenue.entry(target).or_default().reward_balance += amount;
    }

    /// Materialise the accrued reward balance into a new `PledgeItem`,
    /// zeroing the balance (§3's flush invariant).
    pub fn flush_reward_to_pledge(
        &mut self,
        target: Address,
        height: u64,
        lock_period: u64,
        rls_period: u64,
        interval: u64,
    ) {
        let entry = self.revenue.entry(target).or_default();
        if entry.reward_balance == 0 {
            return;
        }
        let amount = std::mem::take(&mut entry.reward_balance);
        entry.lock_balance.entry(height).or_default().push(PledgeItem {
            start_height: height,
            lock_period,
            rls_period,
            interval,
            amount,
            playment: 0,
        });
    }

    /// Apply a GrantProfit confirmation exactly once per `confirmation_key`
    /// (P9: re-applying the same batch is a no-op after the first time).
    pub fn confirm(&mut self, target: Address, confirmation_key: Hash32, height: u64, amount: u128) {
        if !self.applied_confirmations.insert(confirmation_key) {
            return;
        }
        let entry = self.revenue.entry(target).or_default();
        let mut remaining = amount;
        for items in entry.lock_balance.values_mut() {
            for item in items.iter_mut() {
                if remaining == 0 {
                    break;
                }
                let due = item.payable_amount(height).min(remaining);
                item.playment += due;
                remaining -= due;
            }
        }
        for items in entry.lock_balance.values_mut() {
            items.retain(|item| !item.is_fully_paid());
        }
        entry.lock_balance.retain(|_, items| !items.is_empty());
    }

    /// Total currently payable across every tranche for `target` at `height`.
    pub fn payable_at(&self, target: &Address, height: u64) -> u128 {
        self.revenue
            .get(target)
            .map(|e| e.lock_balance.values().flatten().map(|i| i.payable_amount(height)).sum())
            .unwrap_or(0)
    }

    fn sled_key(kind: LockKind, tier: &str, snapshot_hash: &Hash32) -> String {
        format!("alien-{}-{}-{}", kind.namespace(), tier, snapshot_hash.to_hex())
    }

    /// Spill this book to the L1 tier, keyed by snapshot hash.
    pub fn persist(&self, db: &sled::Db, kind: LockKind, snapshot_hash: &Hash32) -> Result<(), LedgerError> {
        let bytes = bincode::serialize(self).map_err(|e| LedgerError::PersistenceFailed(e.to_string()))?;
        db.insert(Self::sled_key(kind, "l1", snapshot_hash).as_bytes(), bytes)
            .map_err(|e| LedgerError::PersistenceFailed(e.to_string()))?;
        Ok(())
    }

    /// Load a previously spilled book, or an empty one if absent.
    pub fn load(db: &sled::Db, kind: LockKind, snapshot_hash: &Hash32) -> Result<Self, LedgerError> {
        match db
            .get(Self::sled_key(kind, "l1", snapshot_hash).as_bytes())
            .map_err(|e| LedgerError::PersistenceFailed(e.to_string()))?
        {
            Some(bytes) => bincode::deserialize(&bytes).map_err(|e| LedgerError::PersistenceFailed(e.to_string())),
            None => Ok(Self::default()),
        }
    }

    /// Spill a book to the colder L2 tier once it has gone untouched for a
    /// full checkpoint interval, recording the snapshot hash it was
    /// archived under so a later `load` can find it.
    pub fn persist_to_l2(&mut self, db: &sled::Db, kind: LockKind, snapshot_hash: Hash32) -> Result<(), LedgerError> {
        let bytes = bincode::serialize(self).map_err(|e| LedgerError::PersistenceFailed(e.to_string()))?;
        db.insert(Self::sled_key(kind, "l2", &snapshot_hash).as_bytes(), bytes)
            .map_err(|e| LedgerError::PersistenceFailed(e.to_string()))?;
        self.l2_cache_keys.push(snapshot_hash);
        Ok(())
    }
}

/// Retry-with-backoff sled open, matching the host-persistence pattern
/// used for finality checkpoints: a stale lock from a killed process
/// should not be a hard failure on the first attempt.
pub fn open_ledger_db<P: AsRef<Path>>(path: P) -> Result<sled::Db, LedgerError> {
    let path_ref = path.as_ref();
    let delays_ms = [500u64, 1000, 2000];

    match sled::open(path_ref) {
        Ok(db) => return Ok(db),
        Err(e) if is_lock_error(&e) => {
            eprintln!("ledger db lock held at {} — retrying", path_ref.display());
        }
        Err(e) => return Err(LedgerError::PersistenceFailed(e.to_string())),
    }

    for delay in delays_ms {
        std::thread::sleep(std::time::Duration::from_millis(delay));
        match sled::open(path_ref) {
            Ok(db) => return Ok(db),
            Err(e) if is_lock_error(&e) => continue,
            Err(e) => return Err(LedgerError::PersistenceFailed(e.to_string())),
        }
    }

    Err(LedgerError::PersistenceFailed("ledger db lock acquisition timed out".into()))
}

fn is_lock_error(e: &sled::Error) -> bool {
    let msg = e.to_string();
    msg.contains("Resource temporarily unavailable") || msg.contains("WouldBlock") || msg.contains("lock")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_reward_creates_pledge_item_and_zeroes_balance() {
        let mut book = LockData::default();
        let target = Address([1; 20]);
        book.add_reward(target, 5_000);
        assert_eq!(book.reward_balance(&target), 5_000);
        book.flush_reward_to_pledge(target, 100, 3000, 200, 10);
        assert_eq!(book.reward_balance(&target), 0);
        assert_eq!(book.revenue[&target].total_locked(), 5_000);
    }

    #[test]
    fn confirm_is_idempotent_under_repeated_application() {
        let mut book = LockData::default();
        let target = Address([2; 20]);
        book.add_reward(target, 10_000);
        book.flush_reward_to_pledge(target, 0, 0, 200, 10);

        let key = Hash32([9; 32]);
        book.confirm(target, key, 10, 10_000);
        let after_first = book.payable_at(&target, 10);

        book.confirm(target, key, 10, 10_000);
        let after_second = book.payable_at(&target, 10);

        assert_eq!(after_first, after_second);
    }

    #[test]
    fn fully_paid_items_are_removed() {
        let mut book = LockData::default();
        let target = Address([3; 20]);
        book.add_reward(target, 100);
        book.flush_reward_to_pledge(target, 0, 0, 0, 0);
        book.confirm(target, Hash32([1; 32]), 1, 100);
        assert!(book.revenue[&target].lock_balance.is_empty());
    }

    #[test]
    fn persist_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_ledger_db(dir.path()).unwrap();
        let mut book = LockData::default();
        let target = Address([4; 20]);
        book.add_reward(target, 777);
        let snap_hash = Hash32([5; 32]);
        book.persist(&db, LockKind::Signer, &snap_hash).unwrap();

        let loaded = LockData::load(&db, LockKind::Signer, &snap_hash).unwrap();
        assert_eq!(loaded.reward_balance(&target), 777);
    }
}
