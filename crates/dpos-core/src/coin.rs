// Coin state (C5): address -> balance, backed by a minimal trie subset
// (insert/delete/iterate/root — §4.10, §9 explicitly allows implementing
// only the needed subset when no reusable MPT library fits).

use dpos_crypto::{keccak256, Address, Hash32};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoinError {
    NotEnoughCoin { address: Address, balance: u128, requested: u128 },
}

impl fmt::Display for CoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoinError::NotEnoughCoin { address, balance, requested } => write!(
                f,
                "not enough Coin: {address} has {balance}, requested {requested}"
            ),
        }
    }
}

impl std::error::Error for CoinError {}

/// A deterministic address -> balance trie.
///
/// `BTreeMap` keeps iteration and root computation deterministic across
/// nodes without depending on hashing order of a real MPT implementation;
/// the Merkle root is a Keccak-256 fold over the sorted `(address,
/// balance)` pairs, which gives the same tamper-evidence and
/// order-independence guarantees the header's `CoinDataRoot` field needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoinTrie {
    balances: BTreeMap<Address, u128>,
}

impl CoinTrie {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &Address) -> u128 {
        self.balances.get(address).copied().unwrap_or(0)
    }

    pub fn set(&mut self, address: Address, balance: u128) {
        if balance == 0 {
            self.balances.remove(&address);
        } else {
            self.balances.insert(address, balance);
        }
    }

    pub fn add(&mut self, address: Address, amount: u128) {
        let balance = self.get(&address).saturating_add(amount);
        self.set(address, balance);
    }

    pub fn sub(&mut self, address: Address, amount: u128) -> Result<(), CoinError> {
        let balance = self.get(&address);
        if balance < amount {
            return Err(CoinError::NotEnoughCoin {
                address,
                balance,
                requested: amount,
            });
        }
        self.set(address, balance - amount);
        Ok(())
    }

    pub fn del(&mut self, address: &Address) {
        self.balances.remove(address);
    }

    /// Deep copy — a snapshot's coin state owns its own trie (§3's
    /// ownership note: copies are deep copies).
    pub fn copy(&self) -> Self {
        self.clone()
    }

    pub fn root(&self) -> Hash32 {
        let mut buf = Vec::with_capacity(self.balances.len() * 52);
        for (addr, balance) in &self.balances {
            buf.extend_from_slice(&addr.0);
            buf.extend_from_slice(&balance.to_be_bytes());
        }
        keccak256(&buf)
    }

    pub fn get_all(&self) -> impl Iterator<Item = (&Address, &u128)> {
        self.balances.iter()
    }

    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_round_trip() {
        let mut trie = CoinTrie::new();
        let addr = Address([1; 20]);
        trie.set(addr, 500);
        assert_eq!(trie.get(&addr), 500);
    }

    #[test]
    fn zero_balance_is_absent_from_get_all() {
        let mut trie = CoinTrie::new();
        let addr = Address([1; 20]);
        trie.set(addr, 500);
        trie.set(addr, 0);
        assert_eq!(trie.get_all().count(), 0);
        assert_eq!(trie.get(&addr), 0);
    }

    #[test]
    fn sub_fails_on_insufficient_balance() {
        let mut trie = CoinTrie::new();
        let addr = Address([1; 20]);
        trie.set(addr, 100);
        let err = trie.sub(addr, 200).unwrap_err();
        assert_eq!(
            err,
            CoinError::NotEnoughCoin {
                address: addr,
                balance: 100,
                requested: 200
            }
        );
        assert_eq!(trie.get(&addr), 100);
    }

    #[test]
    fn add_then_sub_is_a_no_op_on_balance() {
        let mut trie = CoinTrie::new();
        let addr = Address([2; 20]);
        trie.add(addr, 1_000);
        trie.sub(addr, 1_000).unwrap();
        assert_eq!(trie.get(&addr), 0);
    }

    #[test]
    fn root_is_order_independent_and_sensitive_to_content() {
        let mut a = CoinTrie::new();
        a.set(Address([1; 20]), 10);
        a.set(Address([2; 20]), 20);

        let mut b = CoinTrie::new();
        b.set(Address([2; 20]), 20);
        b.set(Address([1; 20]), 10);

        assert_eq!(a.root(), b.root());

        let mut c = a.clone();
        c.set(Address([1; 20]), 11);
        assert_ne!(a.root(), c.root());
    }

    #[test]
    fn copy_is_independent_of_original() {
        let mut a = CoinTrie::new();
        a.set(Address([1; 20]), 10);
        let mut b = a.copy();
        b.set(Address([1; 20]), 999);
        assert_eq!(a.get(&Address([1; 20])), 10);
        assert_eq!(b.get(&Address([1; 20])), 999);
    }
}
