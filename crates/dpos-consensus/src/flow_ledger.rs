// Flow-Report Ledger (C4): per-miner accumulated bandwidth-usage reports,
// split into a current-day and previous-day bucket, plus the `pofrpten`
// ingest path (§4.9) that turns signed client flow reports into debits
// against the coin trie.

use dpos_core::coin::CoinTrie;
use dpos_core::extra::FlowReportRecord;
use dpos_crypto::recovery::recover_address;
use dpos_crypto::{keccak256, Address};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowReportError {
    Malformed(String),
    SignatureInvalid,
    StaleReport { report_number: u64, current_height: u64 },
    InsufficientBalance { miner: Address, required: u128, available: u128 },
}

impl fmt::Display for FlowReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowReportError::Malformed(s) => write!(f, "malformed flow report entry: {s}"),
            FlowReportError::SignatureInvalid => write!(f, "flow report signature did not recover"),
            FlowReportError::StaleReport { report_number, current_height } => write!(
                f,
                "flow report {report_number} is outside the current/previous day window at height {current_height}"
            ),
            FlowReportError::InsufficientBalance { miner, required, available } => write!(
                f,
                "miner {miner} owes {required} but reporter only has {available}"
            ),
        }
    }
}

impl std::error::Error for FlowReportError {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowReport {
    pub flow1: u64,
    pub flow2: u64,
}

/// `pof_miner` (§3): the day-bucketed flow-report ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowLedger {
    pub day_start_time: u64,
    pub flow_total_prev: u64,
    /// miner -> chain id -> accumulated report for the current day.
    pub current: BTreeMap<Address, BTreeMap<u64, FlowReport>>,
    pub previous: BTreeMap<Address, BTreeMap<u64, FlowReport>>,
}

impl FlowLedger {
    pub fn record(&mut self, miner: Address, chain: u64, flow1: u64, flow2: u64) {
        let entry = self.current.entry(miner).or_default().entry(chain).or_default();
        entry.flow1 += flow1;
        entry.flow2 += flow2;
    }

    /// Roll the current day into `previous`, starting a fresh `current`.
    /// `flow_total_prev` captures the total flow1 of the day being closed.
    pub fn rotate_day(&mut self, new_day_start: u64) {
        self.flow_total_prev = self.total_flow1(&self.current);
        self.previous = std::mem::take(&mut self.current);
        self.day_start_time = new_day_start;
    }

    pub fn total_flow1(&self, book: &BTreeMap<Address, BTreeMap<u64, FlowReport>>) -> u64 {
        book.values().flatten().map(|(_, r)| r.flow1).sum()
    }

    pub fn miner_report(&self, miner: &Address) -> FlowReport {
        self.current
            .get(miner)
            .map(|chains| {
                chains.values().fold(FlowReport::default(), |mut acc, r| {
                    acc.flow1 += r.flow1;
                    acc.flow2 += r.flow2;
                    acc
                })
            })
            .unwrap_or_default()
    }
}

struct ParsedEntry {
    report_number: u64,
    device_id: Address,
    flow_bytes: u64,
    signature: [u8; 65],
}

fn parse_entry(raw: &str) -> Result<ParsedEntry, FlowReportError> {
    let parts: Vec<&str> = raw.split(',').collect();
    if parts.len() != 4 {
        return Err(FlowReportError::Malformed(raw.to_string()));
    }
    let report_number: u64 = parts[0]
        .parse()
        .map_err(|_| FlowReportError::Malformed(raw.to_string()))?;
    let device_bytes = hex::decode(parts[1].trim_start_matches("0x"))
        .map_err(|_| FlowReportError::Malformed(raw.to_string()))?;
    let device_id = Address::from_slice(&device_bytes).map_err(|e| FlowReportError::Malformed(e.to_string()))?;
    let flow_bytes: u64 = parts[2]
        .parse()
        .map_err(|_| FlowReportError::Malformed(raw.to_string()))?;
    let sig_bytes = hex::decode(parts[3].trim_start_matches("0x"))
        .map_err(|_| FlowReportError::Malformed(raw.to_string()))?;
    if sig_bytes.len() != 65 {
        return Err(FlowReportError::Malformed(raw.to_string()));
    }
    let mut signature = [0u8; 65];
    signature.copy_from_slice(&sig_bytes);
    Ok(ParsedEntry { report_number, device_id, flow_bytes, signature })
}

/// Ingest one `pofrpten` transaction payload: `flowValue|flowValue|...`,
/// each `reportNumber,deviceId,flowBytes,sig65`. Domain separation for the
/// signature is the recipient miner address's lower-hex text (§9).
///
/// Failed entries are silently skipped — the batch is best-effort (§4.9).
pub fn ingest_pofrpten(
    ledger: &mut FlowLedger,
    coin: &mut CoinTrie,
    payload: &str,
    current_height: u64,
    blocks_per_day: u64,
    miner: Address,
    pof_price: u128,
) -> Vec<FlowReportRecord> {
    let mut applied = Vec::new();
    let current_day = current_height / blocks_per_day.max(1);

    for raw in payload.split('|').filter(|s| !s.is_empty()) {
        let entry = match parse_entry(raw) {
            Ok(e) => e,
            Err(_) => continue,
        };

        let report_day = entry.report_number / blocks_per_day.max(1);
        if entry.report_number > current_height || (current_day.saturating_sub(report_day)) > 1 {
            continue;
        }

        let message = format!(
            "{}{}{}{}",
            miner.to_hex(),
            entry.report_number,
            entry.device_id.to_hex(),
            entry.flow_bytes
        );
        let seal_hash = keccak256(message.as_bytes());
        let from = match recover_address(&seal_hash, &entry.signature) {
            Ok(addr) => addr,
            Err(_) => continue,
        };

        let cost = (entry.flow_bytes as u128).saturating_mul(pof_price);
        let balance = coin.get(&from);
        if balance < cost {
            continue;
        }
        if coin.sub(from, cost).is_err() {
            continue;
        }

        ledger.record(miner, 0, entry.flow_bytes, 0);
        applied.push(FlowReportRecord {
            target: from,
            miner,
            flow1: entry.flow_bytes,
            flow2: 0,
        });
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::{Message, SecretKey, SECP256K1};

    fn sign(seal_hash: &dpos_crypto::Hash32, sk: &SecretKey) -> [u8; 65] {
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

    #[test]
    fn valid_signed_entry_debits_coin_and_records_flow() {
        let mut ledger = FlowLedger::default();
        let mut coin = CoinTrie::new();
        let sk = SecretKey::from_slice(&[3u8; 32]).unwrap();
        let from = addr_from_sk(&sk);
        coin.set(from, 1_000_000);

        let miner = Address([9; 20]);
        let device_id = Address([7; 20]);
        let report_number = 100u64;
        let flow_bytes = 5_000u64;
        let message = format!("{}{}{}{}", miner.to_hex(), report_number, device_id.to_hex(), flow_bytes);
        let seal_hash = keccak256(message.as_bytes());
        let sig = sign(&seal_hash, &sk);

        let payload = format!("{},{},{},{}", report_number, hex::encode(device_id.0), flow_bytes, hex::encode(sig));
        let applied = ingest_pofrpten(&mut ledger, &mut coin, &payload, 100, 28_800, miner, 10);

        assert_eq!(applied.len(), 1);
        assert_eq!(coin.get(&from), 1_000_000 - 5_000 * 10);
        assert_eq!(ledger.miner_report(&miner).flow1, flow_bytes);
    }

    #[test]
    fn malformed_entries_are_skipped_not_fatal() {
        let mut ledger = FlowLedger::default();
        let mut coin = CoinTrie::new();
        let applied = ingest_pofrpten(&mut ledger, &mut coin, "garbage,entry", 100, 28_800, Address::ZERO, 1);
        assert!(applied.is_empty());
    }

    #[test]
    fn rotate_day_moves_current_into_previous() {
        let mut ledger = FlowLedger::default();
        ledger.record(Address([1; 20]), 0, 100, 0);
        ledger.rotate_day(86_400);
        assert_eq!(ledger.flow_total_prev, 100);
        assert!(ledger.current.is_empty());
        assert_eq!(ledger.previous[&Address([1; 20])][&0].flow1, 100);
    }
}
