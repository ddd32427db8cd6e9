// Finalizer (C10): assembles a new block's `extra` field from the current
// snapshot, the pending custom txs, and any election/payout updates due at
// this height (§4.7). Produces an unsigned extra — the trailing 65 bytes
// are a zero placeholder a host-side `Seal` call will overwrite.

use dpos_core::extra::{
    CandEntrustExitRecord, CandEntrustRecord, CandManagerChangeRecord, CandPledgeRecord,
    CandRateChangeRecord, CandidatePunishRecord, ClaimedBandwidthRecord, ConfirmationRecord,
    DeclareRecord, DepositConfig, DeviceBindRecord, ExchangeRecord, FlowMinerPriceRequest,
    FlowPledgeRequest, HeaderExtra, LockParameterRecord, ManagerAddressRecord, ProposalRecord,
    VoteRecord,
};
use dpos_core::header::{RawHeader, SIGNATURE_LEN, VANITY_LEN};
use dpos_core::ChainConfig;
use dpos_crypto::Address;

use crate::elector::elect_signer_queue;
use crate::interpreter::{self, CustomTx};
use crate::payout::due_payouts;
use crate::snapshot::Snapshot;

/// Build the `HeaderExtra` for a block at `number`, given the parent
/// snapshot and the custom txs this block will carry. Mutates a working
/// copy of `parent` to derive the resulting state but does not return it —
/// callers re-derive the authoritative next snapshot via `Snapshot::apply`
/// once the block is sealed, so both production and replay share one path.
pub fn build_extra(parent: &Snapshot, number: u64, time: u64, txs: &[CustomTx], cfg: &ChainConfig) -> HeaderExtra {
    let mut working = parent.copy();
    let mut extra = HeaderExtra::default();

    for tx in txs {
        if let Some(log) = interpreter::interpret(&mut working, tx, number, cfg) {
            extra.flow_report.extend(log.flow_reports);
            record_tx_effect(&mut extra, tx, &working);
        }
    }

    if number % cfg.max_signer_count == 1 || parent.signers.is_empty() {
        let queue = elect_signer_queue(&working, cfg);
        extra.signer_queue = queue;
    } else {
        extra.signer_queue = parent.signers.clone();
    }

    extra.signer_missing = missing_signers(parent, number, cfg);
    extra.loop_start_time = time - (time % (cfg.period_secs * cfg.max_signer_count.max(1)));
    extra.cand_auto_exit = working.detect_auto_exits(number, cfg);

    let payouts = due_payouts(&working, number, cfg);
    extra.grant_profit_hash = dpos_core::extra::grant_profit_hash(&payouts);
    extra.grant_profit = payouts;

    extra.coin_data_root = working.coin.root();
    extra
}

/// Translate one successfully-interpreted tx into the `HeaderExtra` record
/// type a replaying node's `Snapshot::fold_extra` expects (§4.7). Looks up
/// the post-mutation `working` snapshot rather than re-deriving amounts,
/// since the interpreter already validated and applied every precondition
/// this tx needed.
fn record_tx_effect(extra: &mut HeaderExtra, tx: &CustomTx, working: &Snapshot) {
    let fields: Vec<&str> = tx.data.split(':').collect();
    match fields.as_slice() {
        ["ufo", "1", "event", "vote", candidate] => {
            if let Some(candidate) = interpreter::parse_addr(candidate) {
                let stake = working.coin.get(&tx.sender);
                extra.votes.push(VoteRecord { voter: tx.sender, candidate, stake });
            }
        }
        ["ufo", "1", "event", "confirm", n] => {
            if let Ok(block_number) = n.parse() {
                extra.confirmations.push(ConfirmationRecord { signer: tx.sender, block_number });
            }
        }
        ["token", "1", "Exch", addr, amount] => {
            if let (Some(to), Ok(amount)) = (interpreter::parse_addr(addr), amount.parse()) {
                extra.exchange_coin.push(ExchangeRecord { from: tx.sender, to, amount });
            }
        }
        ["token", "1", "Bind", device, kind, rest @ ..]
        | ["token", "1", "Unbind", device, kind, rest @ ..]
        | ["token", "1", "Rebind", device, kind, rest @ ..] => {
            if let (Some(device), Ok(kind)) = (interpreter::parse_addr(device), kind.parse::<u8>()) {
                if let Some(revenue) = working.revenue_binding(kind, &device) {
                    let _ = rest;
                    extra.device_bind.push(DeviceBindRecord {
                        device,
                        revenue_address: revenue.revenue_addr,
                        revenue_contract: Address::default(),
                        multi_sig: false,
                        kind,
                    });
                }
            }
        }
        ["token", "1", "CandReq", miner] => {
            if let Some(miner) = interpreter::parse_addr(miner) {
                if let Some(pledge) = working.pos_pledge.get(&miner) {
                    extra.cand_pledge.push(CandPledgeRecord {
                        miner,
                        manager: pledge.manager,
                        amount: pledge.total_amount(),
                    });
                }
            }
        }
        ["token", "1", "CandExit", miner] => {
            if let Some(miner) = interpreter::parse_addr(miner) {
                extra.candidate_exit.push(miner);
            }
        }
        ["token", "1", "CandChaRate", miner, rate] => {
            if let (Some(miner), Ok(dis_rate)) = (interpreter::parse_addr(miner), rate.parse()) {
                extra.cand_rate_change.push(CandRateChangeRecord { miner, dis_rate });
            }
        }
        ["token", "1", "CandEntrust", miner, amount] => {
            if let (Some(miner), Ok(amount)) = (interpreter::parse_addr(miner), amount.parse()) {
                extra.cand_entrust.push(CandEntrustRecord {
                    miner,
                    from: tx.sender,
                    amount,
                    tx_hash: dpos_crypto::keccak256(tx.data.as_bytes()),
                });
            }
        }
        ["token", "1", "CandETExit", miner, hash] => {
            if let Some(miner) = interpreter::parse_addr(miner) {
                if let Ok(bytes) = hex::decode(hash.trim_start_matches("0x")) {
                    if let Ok(detail_hash) = dpos_crypto::Hash32::from_slice(&bytes) {
                        extra.cand_entrust_exit.push(CandEntrustExitRecord {
                            miner,
                            detail_hash,
                            start_height: number,
                        });
                    }
                }
            }
        }
        ["token", "1", "CandChaMan", miner, new_manager] => {
            if let Some(miner) = interpreter::parse_addr(miner) {
                if let Some(new_manager) = interpreter::parse_addr(new_manager) {
                    extra.cand_manager_change.push(CandManagerChangeRecord {
                        miner,
                        old_manager: tx.sender,
                        new_manager,
                    });
                }
            }
        }
        ["token", "1", "CandPnsh", miner] => {
            if let Some(miner) = interpreter::parse_addr(miner) {
                let credit_restored = working.punished.get(&miner).copied().unwrap_or(0);
                extra.candidate_punish.push(CandidatePunishRecord { miner, credit_restored });
            }
        }
        ["token", "1", "pofReq", miner, bw_hex, price] => {
            if let Some(miner) = interpreter::parse_addr(miner) {
                if let (Ok(bandwidth), Ok(price)) =
                    (u64::from_str_radix(bw_hex.trim_start_matches("0x"), 16), price.parse())
                {
                    extra.flow_pledge_request.push(FlowPledgeRequest { miner, bandwidth, price });
                }
            }
        }
        ["token", "1", "pofExit", miner] => {
            if let Some(miner) = interpreter::parse_addr(miner) {
                extra.flow_miner_exit.push(miner);
            }
        }
        ["token", "1", "pofchbw", miner, bw_hex] => {
            if let Some(miner) = interpreter::parse_addr(miner) {
                if let Ok(bandwidth) = u64::from_str_radix(bw_hex.trim_start_matches("0x"), 16) {
                    extra.claimed_bandwidth.push(ClaimedBandwidthRecord { miner, bandwidth });
                }
            }
        }
        ["token", "1", "pofprice", miner, price] => {
            if let Some(miner) = interpreter::parse_addr(miner) {
                if let Ok(price) = price.parse() {
                    extra.flow_miner_price_request.push(FlowMinerPriceRequest { miner, price });
                }
            }
        }
        ["ufo", "1", "event", "proposal", hash] => {
            if let Ok(bytes) = hex::decode(hash.trim_start_matches("0x")) {
                if let Ok(proposal_hash) = dpos_crypto::Hash32::from_slice(&bytes) {
                    extra.proposals.push(ProposalRecord { proposer: tx.sender, hash: proposal_hash, deposit: 0 });
                }
            }
        }
        ["ufo", "1", "event", "declare", "hash", hash, "decision", decision] => {
            if let Ok(bytes) = hex::decode(hash.trim_start_matches("0x")) {
                if let Ok(proposal_hash) = dpos_crypto::Hash32::from_slice(&bytes) {
                    extra.declares.push(DeclareRecord {
                        candidate: tx.sender,
                        proposal_hash,
                        decision: decision == "yes",
                    });
                }
            }
        }
        ["SSC", "1", "ExchRate", rate] => {
            if let Ok(rate) = rate.parse() {
                extra.exch_rate = rate;
            }
        }
        ["SSC", "1", "OffLine", addr] => {
            if let Some(addr) = interpreter::parse_addr(addr) {
                extra.off_line.push(addr);
            }
        }
        ["SSC", "1", "Deposit", kind, amount] => {
            if let (Ok(kind), Ok(amount)) = (kind.parse(), amount.parse()) {
                extra.deposit.push(DepositConfig { kind, amount });
            }
        }
        ["SSC", "1", kind @ ("CndLock" | "PofLock" | "RwdLock"), lock_period, rls_period, interval] => {
            if let (Ok(lock_period), Ok(rls_period), Ok(interval)) =
                (lock_period.parse(), rls_period.parse(), interval.parse())
            {
                let lock_kind = match kind {
                    "CndLock" => dpos_core::LOCK_KIND_CND,
                    "PofLock" => dpos_core::LOCK_KIND_POF,
                    _ => dpos_core::LOCK_KIND_RWD,
                };
                extra.lock_parameters.push(LockParameterRecord { kind: lock_kind, lock_period, rls_period, interval });
            }
        }
        ["SSC", "1", "Manager", kind, manager] => {
            if let (Ok(kind), Some(manager)) = (kind.parse(), interpreter::parse_addr(manager)) {
                extra.manager_address.push(ManagerAddressRecord { kind, manager });
            }
        }
        _ => {}
    }
}

/// Signers in the current queue who have not sealed a block within the
/// last full rotation (§4.4's missing-signer derivation).
fn missing_signers(parent: &Snapshot, number: u64, cfg: &ChainConfig) -> Vec<Address> {
    if parent.signers.is_empty() || number < cfg.max_signer_count {
        return Vec::new();
    }
    parent.signers_missing_from_window()
}

/// Assemble the placeholder (unsigned) `extra` bytes for a header the host
/// is about to seal. The host signs `seal_hash` separately and calls
/// `RawHeader::assemble_extra` again with the real signature.
pub fn assemble_unsigned_extra(vanity: &[u8; VANITY_LEN], extra: &HeaderExtra) -> Vec<u8> {
    let placeholder = [0u8; SIGNATURE_LEN];
    RawHeader::assemble_extra(vanity, extra, &placeholder)
}
