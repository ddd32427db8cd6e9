// Custom-Tx Interpreter (C7): parses colon-delimited ASCII transaction
// data with the `ufo`/`token`/`SSC` prefixes and dispatches to handlers
// that mutate a snapshot under strict preconditions. Failed preconditions
// leave state unchanged and emit no log (§4.3, §7's absorbed-error policy).

use dpos_core::extra::FlowReportRecord;
use dpos_core::ChainConfig;
use dpos_crypto::{keccak256, Address, Hash32};

use crate::flow_ledger::ingest_pofrpten;
use crate::snapshot::Snapshot;

/// A single in-band transaction as seen by the interpreter: who sent it,
/// the colon-delimited ASCII payload, and any value attached (for
/// balance-gated preconditions like `CandReq`'s deposit).
#[derive(Debug, Clone)]
pub struct CustomTx {
    pub sender: Address,
    pub data: String,
    pub value: u128,
}

/// A synthetic receipt log: a deterministic 3-topic signature derived
/// from the operation's Keccak prefix (§4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxLog {
    pub topics: [Hash32; 3],
    pub category: &'static str,
    /// Populated only for `pofrpten` (§4.9): the individual flow-report
    /// entries that passed signature/balance checks this call, for the
    /// finalizer to copy into `HeaderExtra::flow_report` (§4.7). Every
    /// other handler leaves this empty — their effects are plain snapshot
    /// mutations a replaying node reproduces by re-running this same
    /// interpreter over the same txs, not by re-folding a record list.
    pub flow_reports: Vec<FlowReportRecord>,
}

fn log_for(category: &'static str, sender: Address, target: Address) -> TxLog {
    TxLog {
        topics: [
            keccak256(category.as_bytes()),
            keccak256(&sender.0),
            keccak256(&target.0),
        ],
        category,
        flow_reports: Vec::new(),
    }
}

/// Outcome of interpreting one transaction: `None` means every handler's
/// preconditions failed (absorbed, not fatal) and state is unchanged.
pub type InterpretResult = Option<TxLog>;

/// Dispatch `tx.data` against `snapshot`, mutating it in place on success.
pub fn interpret(snapshot: &mut Snapshot, tx: &CustomTx, height: u64, cfg: &ChainConfig) -> InterpretResult {
    let fields: Vec<&str> = tx.data.split(':').collect();
    match fields.as_slice() {
        ["ufo", "1", "event", "vote", candidate] => handle_vote(snapshot, tx, candidate, cfg),
        ["ufo", "1", "event", "confirm", n] => handle_confirm(snapshot, tx, n, height, cfg),
        ["ufo", "1", "event", "proposal", hash] => handle_proposal(snapshot, tx, hash, cfg),
        ["ufo", "1", "event", "declare", "hash", hash, "decision", decision] => {
            handle_declare(snapshot, tx, hash, decision)
        }
        ["token", "1", "Exch", addr, amount] => handle_exch(snapshot, tx, addr, amount),
        ["token", "1", "Bind", device, kind, rest @ ..] => handle_bind(snapshot, tx, "Bind", device, kind, rest),
        ["token", "1", "Unbind", device, kind, rest @ ..] => handle_bind(snapshot, tx, "Unbind", device, kind, rest),
        ["token", "1", "Rebind", device, kind, rest @ ..] => handle_bind(snapshot, tx, "Rebind", device, kind, rest),
        ["token", "1", "CandReq", miner] => handle_cand_req(snapshot, tx, miner, cfg),
        ["token", "1", "CandExit", miner] => handle_cand_exit(snapshot, tx, miner, height, cfg),
        ["token", "1", "CandETExit", miner, hash] => handle_cand_et_exit(snapshot, tx, miner, hash, height, cfg),
        ["token", "1", "CandChaRate", miner, rate] => handle_cand_cha_rate(snapshot, tx, miner, rate),
        ["token", "1", "CandChaMan", miner, new_manager] => handle_cand_cha_man(snapshot, tx, miner, new_manager, cfg),
        ["token", "1", "CandEntrust", miner, amount] => handle_cand_entrust(snapshot, tx, miner, amount, cfg),
        ["token", "1", "CandPnsh", miner] => handle_cand_pnsh(snapshot, tx, miner, cfg),
        ["token", "1", "pofReq", miner, bw_hex, price] => handle_pof_req(snapshot, tx, miner, bw_hex, price),
        ["token", "1", "pofExit", miner] => handle_pof_exit(snapshot, tx, miner),
        ["token", "1", "pofchbw", miner, bw_hex] => handle_pofchbw(snapshot, tx, miner, bw_hex),
        ["token", "1", "pofprice", miner, price] => handle_pofprice(snapshot, tx, miner, price),
        ["token", "1", "pofrpten", payload] => handle_pofrpten(snapshot, tx, payload, height, cfg),
        ["SSC", "1", kind, rest @ ..] => handle_ssc(snapshot, tx, kind, rest),
        // Unrecognised category: ignored per §6 ("unknown categories are ignored").
        _ => None,
    }
}

pub(crate) fn parse_addr(s: &str) -> Option<Address> {
    let bytes = hex::decode(s.trim_start_matches("0x")).ok()?;
    Address::from_slice(&bytes).ok()
}

fn handle_vote(snapshot: &mut Snapshot, tx: &CustomTx, candidate: &str, cfg: &ChainConfig) -> InterpretResult {
    let candidate = parse_addr(candidate)?;
    if !snapshot.candidates.contains(&candidate) {
        return None;
    }
    if snapshot.coin.get(&tx.sender) <= cfg.min_voter_balance {
        return None;
    }
    snapshot.votes.insert(tx.sender, candidate);
    Some(log_for("ufo:vote", tx.sender, candidate))
}

fn handle_confirm(snapshot: &mut Snapshot, tx: &CustomTx, n: &str, height: u64, cfg: &ChainConfig) -> InterpretResult {
    let n: u64 = n.parse().ok()?;
    if !snapshot.signers.contains(&tx.sender) {
        return None;
    }
    if height.saturating_sub(n) > cfg.max_signer_count {
        return None;
    }
    Some(log_for("ufo:confirm", tx.sender, tx.sender))
}

fn handle_proposal(snapshot: &mut Snapshot, tx: &CustomTx, hash: &str, cfg: &ChainConfig) -> InterpretResult {
    if snapshot.coin.get(&tx.sender) < cfg.proposal_deposit {
        return None;
    }
    snapshot.coin.sub(tx.sender, cfg.proposal_deposit).ok()?;
    let hash_bytes = hex::decode(hash.trim_start_matches("0x")).ok()?;
    let target = Hash32::from_slice(&hash_bytes).unwrap_or(Hash32::ZERO);
    Some(log_for("ufo:proposal", tx.sender, Address(target.0[..20].try_into().unwrap())))
}

fn handle_declare(snapshot: &mut Snapshot, tx: &CustomTx, _hash: &str, decision: &str) -> InterpretResult {
    if !snapshot.candidates.contains(&tx.sender) {
        return None;
    }
    let _yes = decision == "yes";
    Some(log_for("ufo:declare", tx.sender, tx.sender))
}

fn handle_exch(snapshot: &mut Snapshot, tx: &CustomTx, addr: &str, amount: &str) -> InterpretResult {
    let target = parse_addr(addr)?;
    let amount: u128 = amount.parse().ok()?;
    if snapshot.coin.get(&tx.sender) < amount {
        return None;
    }
    snapshot.coin.sub(tx.sender, amount).ok()?;
    Some(log_for("token:exch", tx.sender, target))
}

fn handle_bind(
    snapshot: &mut Snapshot,
    tx: &CustomTx,
    op: &str,
    device: &str,
    kind: &str,
    rest: &[&str],
) -> InterpretResult {
    let device = parse_addr(device)?;
    let kind: u8 = kind.parse().ok()?;
    let manager = if kind == 0 {
        snapshot.system_config.manager_address.get(&0).copied()
    } else {
        snapshot.system_config.manager_address.get(&1).copied()
    };
    if let Some(manager) = manager {
        if manager != tx.sender && op != "Bind" {
            // Rebind/Unbind without the bound manager's authority is a no-op (S5).
            if snapshot
                .revenue_binding(kind, &device)
                .map(|b| b.revenue_addr != tx.sender)
                .unwrap_or(true)
            {
                return None;
            }
        }
    }
    let new_revenue = parse_addr(rest.first()?)?;
    snapshot.set_revenue_binding(kind, device, new_revenue);
    Some(log_for("token:bind", tx.sender, device))
}

fn handle_cand_req(snapshot: &mut Snapshot, tx: &CustomTx, miner: &str, cfg: &ChainConfig) -> InterpretResult {
    let miner = parse_addr(miner)?;
    if miner == tx.sender {
        return None;
    }
    if snapshot.pos_pledge.contains_key(&miner) {
        return None;
    }
    // §4.3: one address can only ever pledge (or be pledged as) a single
    // miner, and a manager of one pledge can't also become a miner or
    // manager of another.
    if snapshot.holds_pos_pledge_detail(&tx.sender) || snapshot.holds_pos_pledge_detail(&miner) {
        return None;
    }
    if snapshot.is_pos_pledge_manager(&tx.sender) || snapshot.is_pos_pledge_manager(&miner) {
        return None;
    }
    let deposit = snapshot
        .system_config
        .deposits
        .get(&dpos_core::LOCK_KIND_CND)
        .copied()
        .unwrap_or(cfg.min_cnd_pledge_balance);
    if snapshot.coin.get(&tx.sender) < deposit {
        return None;
    }
    snapshot.coin.sub(tx.sender, deposit).ok()?;
    snapshot.create_pos_pledge(miner, tx.sender, deposit, 0);
    Some(log_for("token:cand_req", tx.sender, miner))
}

fn handle_cand_exit(snapshot: &mut Snapshot, tx: &CustomTx, miner: &str, height: u64, cfg: &ChainConfig) -> InterpretResult {
    let miner = parse_addr(miner)?;
    let pledge = snapshot.pos_pledge.get(&miner)?;
    let is_manager = pledge.manager == tx.sender;
    let is_system_manager = snapshot
        .system_config
        .manager_address
        .get(&0)
        .map(|m| *m == tx.sender)
        .unwrap_or(false)
        && snapshot.tally.contains_key(&miner);
    if !is_manager && !is_system_manager {
        return None;
    }
    if height.saturating_sub(pledge.active_height) < cfg.auto_exit_blocks() {
        return None;
    }
    snapshot.enqueue_full_cand_exit(miner, height);
    Some(log_for("token:cand_exit", tx.sender, miner))
}

fn handle_cand_et_exit(snapshot: &mut Snapshot, tx: &CustomTx, miner: &str, hash: &str, height: u64, cfg: &ChainConfig) -> InterpretResult {
    let miner = parse_addr(miner)?;
    let hash_bytes = hex::decode(hash.trim_start_matches("0x")).ok()?;
    let detail_hash = Hash32::from_slice(&hash_bytes).ok()?;
    let pledge = snapshot.pos_pledge.get(&miner)?;
    let detail = pledge.detail.get(&detail_hash)?;
    if detail.address != tx.sender {
        return None;
    }
    snapshot.schedule_entrust_exit(miner, detail_hash, height, cfg);
    Some(log_for("token:cand_et_exit", tx.sender, miner))
}

fn handle_cand_cha_rate(snapshot: &mut Snapshot, tx: &CustomTx, miner: &str, rate: &str) -> InterpretResult {
    let miner = parse_addr(miner)?;
    let rate: u64 = rate.parse().ok()?;
    if rate == 0 || rate > 10_000 {
        return None;
    }
    let pledge = snapshot.pos_pledge.get_mut(&miner)?;
    if pledge.manager != tx.sender {
        return None;
    }
    pledge.dis_rate = rate;
    Some(log_for("token:cand_cha_rate", tx.sender, miner))
}

fn handle_cand_cha_man(snapshot: &mut Snapshot, tx: &CustomTx, miner: &str, new_manager: &str, cfg: &ChainConfig) -> InterpretResult {
    let miner = parse_addr(miner)?;
    let new_manager = parse_addr(new_manager)?;
    let pledge = snapshot.pos_pledge.get(&miner)?;
    if pledge.manager != tx.sender {
        return None;
    }
    let new_mgr_stake: u128 = pledge
        .detail
        .values()
        .filter(|d| d.address == new_manager)
        .map(|d| d.amount)
        .sum();
    if new_mgr_stake < cfg.min_cnd_pledge_balance {
        return None;
    }
    if snapshot.pos_pledge.contains_key(&new_manager) {
        return None;
    }
    let is_other_manager = snapshot.pos_pledge.values().any(|p| p.manager == new_manager);
    if is_other_manager {
        return None;
    }
    snapshot.pos_pledge.get_mut(&miner).unwrap().manager = new_manager;
    Some(log_for("token:cand_cha_man", tx.sender, miner))
}

fn handle_cand_entrust(snapshot: &mut Snapshot, tx: &CustomTx, miner: &str, amount: &str, cfg: &ChainConfig) -> InterpretResult {
    let miner = parse_addr(miner)?;
    let amount: u128 = amount.parse().ok()?;
    if !snapshot.pos_pledge.contains_key(&miner) {
        return None;
    }
    if amount < cfg.min_cnd_entrust_pledge_balance {
        return None;
    }
    if snapshot.pos_pledge.contains_key(&tx.sender) {
        return None;
    }
    if snapshot.committed_to_other_miner(tx.sender, miner) {
        return None;
    }
    if snapshot.coin.get(&tx.sender) < amount {
        return None;
    }
    snapshot.coin.sub(tx.sender, amount).ok()?;
    snapshot.append_entrust_detail(miner, tx.sender, amount);
    Some(log_for("token:cand_entrust", tx.sender, miner))
}

/// Pay down a miner's accumulated punishment: the deposit scales with the
/// penalty itself (`fullCredit - credit`), not with the miner's remaining
/// health, and fully restores `punished` on success (§4.3).
fn handle_cand_pnsh(snapshot: &mut Snapshot, tx: &CustomTx, miner: &str, cfg: &ChainConfig) -> InterpretResult {
    let miner = parse_addr(miner)?;
    let credit = *snapshot.punished.get(&miner).unwrap_or(&cfg.default_full_credit);
    if credit >= cfg.default_full_credit {
        return None;
    }
    let penalty = cfg.default_full_credit - credit;
    let base_deposit = snapshot
        .system_config
        .deposits
        .get(&dpos_core::LOCK_KIND_CND)
        .copied()
        .unwrap_or(cfg.min_cnd_pledge_balance);
    let deposit = base_deposit * penalty as u128 / cfg.default_full_credit as u128;
    if snapshot.coin.get(&tx.sender) < deposit {
        return None;
    }
    snapshot.coin.sub(tx.sender, deposit).ok()?;
    snapshot.punished.insert(miner, cfg.default_full_credit);
    Some(log_for("token:cand_pnsh", tx.sender, miner))
}

fn handle_pof_req(snapshot: &mut Snapshot, tx: &CustomTx, miner: &str, bw_hex: &str, price: &str) -> InterpretResult {
    let miner = parse_addr(miner)?;
    let bandwidth = u64::from_str_radix(bw_hex.trim_start_matches("0x"), 16).ok()?;
    let price: u128 = price.parse().ok()?;
    if snapshot.pof_pledge.contains_key(&miner) {
        return None;
    }
    let base_price = snapshot.system_config.exch_rate as u128;
    if base_price > 0 && (price < base_price / 10 || price > base_price * 10) {
        return None;
    }
    let required = (bandwidth as u128).saturating_mul(price);
    if snapshot.coin.get(&tx.sender) < required {
        return None;
    }
    snapshot.coin.sub(tx.sender, required).ok()?;
    snapshot.create_pof_pledge(miner, tx.sender, required, bandwidth, price);
    Some(log_for("token:pof_req", tx.sender, miner))
}

fn handle_pof_exit(snapshot: &mut Snapshot, tx: &CustomTx, miner: &str) -> InterpretResult {
    let miner = parse_addr(miner)?;
    let pledge = snapshot.pof_pledge.get_mut(&miner)?;
    if pledge.manager != tx.sender || pledge.status == crate::snapshot::PofStatus::Exit {
        return None;
    }
    pledge.status = crate::snapshot::PofStatus::Exit;
    Some(log_for("token:pof_exit", tx.sender, miner))
}

fn handle_pofchbw(snapshot: &mut Snapshot, tx: &CustomTx, miner: &str, bw_hex: &str) -> InterpretResult {
    let miner = parse_addr(miner)?;
    let new_bw = u64::from_str_radix(bw_hex.trim_start_matches("0x"), 16).ok()?;
    let pledge = snapshot.pof_pledge.get(&miner)?;
    if pledge.manager != tx.sender {
        return None;
    }
    if new_bw > pledge.bandwidth {
        let delta = (new_bw - pledge.bandwidth) as u128 * pledge.pof_price;
        if snapshot.coin.get(&tx.sender) < delta {
            return None;
        }
        snapshot.coin.sub(tx.sender, delta).ok()?;
    }
    snapshot.pof_pledge.get_mut(&miner).unwrap().bandwidth = new_bw;
    Some(log_for("token:pofchbw", tx.sender, miner))
}

fn handle_pofprice(snapshot: &mut Snapshot, tx: &CustomTx, miner: &str, price: &str) -> InterpretResult {
    let miner = parse_addr(miner)?;
    let price: u128 = price.parse().ok()?;
    let base_price = snapshot.system_config.exch_rate as u128;
    if base_price > 0 && (price < base_price / 10 || price > base_price * 10) {
        return None;
    }
    let pledge = snapshot.pof_pledge.get_mut(&miner)?;
    if pledge.manager != tx.sender {
        return None;
    }
    pledge.pof_price = price;
    Some(log_for("token:pofprice", tx.sender, miner))
}

/// `token:1:pofrpten:<payload>` (§4.3/§4.9): the sender must itself be a
/// pof miner; each `reportNumber,deviceId,flowBytes,sig65` entry in
/// `payload` is validated and applied independently — a bad entry is
/// skipped, not fatal to the rest of the batch.
fn handle_pofrpten(snapshot: &mut Snapshot, tx: &CustomTx, payload: &str, height: u64, cfg: &ChainConfig) -> InterpretResult {
    let pledge = snapshot.pof_pledge.get(&tx.sender)?;
    let pof_price = pledge.pof_price;
    let blocks_per_day = cfg.blocks_per_day();
    let applied = ingest_pofrpten(
        &mut snapshot.pof_miner,
        &mut snapshot.coin,
        payload,
        height,
        blocks_per_day,
        tx.sender,
        pof_price,
    );
    if applied.is_empty() {
        return None;
    }
    let mut log = log_for("token:pofrpten", tx.sender, tx.sender);
    log.flow_reports = applied;
    Some(log)
}

fn handle_ssc(snapshot: &mut Snapshot, tx: &CustomTx, kind: &str, rest: &[&str]) -> InterpretResult {
    if snapshot.system_config.manager_address.get(&255).map(|m| *m != tx.sender).unwrap_or(true) {
        return None;
    }
    match kind {
        "ExchRate" => {
            let rate: u64 = rest.first()?.parse().ok()?;
            snapshot.system_config.exch_rate = rate;
        }
        "OffLine" => {
            let addr = parse_addr(rest.first()?)?;
            snapshot.system_config.off_line.insert(addr);
        }
        "Deposit" => {
            let deposit_kind: u8 = rest.first()?.parse().ok()?;
            let amount: u128 = rest.get(1)?.parse().ok()?;
            snapshot.system_config.deposits.insert(deposit_kind, amount);
        }
        "CndLock" | "PofLock" | "RwdLock" => {
            let lock_period: u64 = rest.first()?.parse().ok()?;
            let rls_period: u64 = rest.get(1)?.parse().ok()?;
            let interval: u64 = rest.get(2)?.parse().ok()?;
            let lock_kind = match kind {
                "CndLock" => dpos_core::LOCK_KIND_CND,
                "PofLock" => dpos_core::LOCK_KIND_POF,
                _ => dpos_core::LOCK_KIND_RWD,
            };
            snapshot.system_config.lock_parameters.insert(
                lock_kind,
                dpos_core::LockParams { lock_period, rls_period, interval },
            );
        }
        "Manager" => {
            let manager_kind: u8 = rest.first()?.parse().ok()?;
            let addr = parse_addr(rest.get(1)?)?;
            snapshot.system_config.manager_address.insert(manager_kind, addr);
        }
        _ => return None,
    }
    Some(log_for("ssc:config", tx.sender, tx.sender))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Snapshot;

    fn cfg() -> ChainConfig {
        ChainConfig::default()
    }

    #[test]
    fn exch_fails_on_insufficient_balance_and_leaves_state_unchanged() {
        let mut snapshot = Snapshot::genesis(&cfg());
        let sender = Address([1; 20]);
        let tx = CustomTx {
            sender,
            data: format!("token:1:Exch:{}:{}", hex::encode(Address([2; 20]).0), 1000),
            value: 0,
        };
        let result = interpret(&mut snapshot, &tx, 1, &cfg());
        assert!(result.is_none());
        assert_eq!(snapshot.coin.get(&sender), 0);
    }

    #[test]
    fn exch_succeeds_and_debits_sender() {
        let mut snapshot = Snapshot::genesis(&cfg());
        let sender = Address([1; 20]);
        snapshot.coin.set(sender, 5000);
        let tx = CustomTx {
            sender,
            data: format!("token:1:Exch:{}:{}", hex::encode(Address([2; 20]).0), 1000),
            value: 0,
        };
        let result = interpret(&mut snapshot, &tx, 1, &cfg());
        assert!(result.is_some());
        assert_eq!(snapshot.coin.get(&sender), 4000);
    }

    #[test]
    fn unknown_category_is_ignored() {
        let mut snapshot = Snapshot::genesis(&cfg());
        let tx = CustomTx { sender: Address([1; 20]), data: "mystery:1:2:3".to_string(), value: 0 };
        assert!(interpret(&mut snapshot, &tx, 1, &cfg()).is_none());
    }

    #[test]
    fn cand_req_creates_pos_pledge_once() {
        let config = cfg();
        let mut snapshot = Snapshot::genesis(&config);
        let sender = Address([1; 20]);
        let miner = Address([2; 20]);
        snapshot.coin.set(sender, config.min_cnd_pledge_balance * 2);
        let tx = CustomTx {
            sender,
            data: format!("token:1:CandReq:{}", hex::encode(miner.0)),
            value: 0,
        };
        assert!(interpret(&mut snapshot, &tx, 1, &config).is_some());
        assert!(snapshot.pos_pledge.contains_key(&miner));
        // second request for the same miner is a no-op.
        assert!(interpret(&mut snapshot, &tx, 2, &config).is_none());
    }

    #[test]
    fn cand_req_rejects_a_manager_already_pledging_another_miner() {
        let config = cfg();
        let mut snapshot = Snapshot::genesis(&config);
        let sender = Address([1; 20]);
        snapshot.coin.set(sender, config.min_cnd_pledge_balance * 4);

        let first_miner = Address([2; 20]);
        let tx1 = CustomTx { sender, data: format!("token:1:CandReq:{}", hex::encode(first_miner.0)), value: 0 };
        assert!(interpret(&mut snapshot, &tx1, 1, &config).is_some());

        // the same manager can't also become (or back) a second miner.
        let second_miner = Address([3; 20]);
        let tx2 = CustomTx { sender, data: format!("token:1:CandReq:{}", hex::encode(second_miner.0)), value: 0 };
        assert!(interpret(&mut snapshot, &tx2, 2, &config).is_none());
        assert!(!snapshot.pos_pledge.contains_key(&second_miner));
    }

    #[test]
    fn cand_req_rejects_sender_as_its_own_miner() {
        let config = cfg();
        let mut snapshot = Snapshot::genesis(&config);
        let sender = Address([1; 20]);
        snapshot.coin.set(sender, config.min_cnd_pledge_balance * 2);
        let tx = CustomTx { sender, data: format!("token:1:CandReq:{}", hex::encode(sender.0)), value: 0 };
        assert!(interpret(&mut snapshot, &tx, 1, &config).is_none());
    }

    #[test]
    fn cand_pnsh_deposit_scales_with_penalty_not_remaining_credit() {
        let config = cfg();
        let mut snapshot = Snapshot::genesis(&config);
        let sender = Address([1; 20]);
        let miner = Address([2; 20]);
        // remaining credit is low, so the penalty (fullCredit - credit) is high.
        snapshot.punished.insert(miner, config.default_full_credit / 4);
        let expected_penalty = config.default_full_credit - config.default_full_credit / 4;
        let expected_deposit = config.min_cnd_pledge_balance * expected_penalty as u128 / config.default_full_credit as u128;
        snapshot.coin.set(sender, expected_deposit);
        let tx = CustomTx { sender, data: format!("token:1:CandPnsh:{}", hex::encode(miner.0)), value: 0 };
        assert!(interpret(&mut snapshot, &tx, 1, &config).is_some());
        assert_eq!(snapshot.coin.get(&sender), 0);
        assert_eq!(*snapshot.punished.get(&miner).unwrap(), config.default_full_credit);
    }

    #[test]
    fn cand_pnsh_is_a_no_op_once_credit_is_already_full() {
        let config = cfg();
        let mut snapshot = Snapshot::genesis(&config);
        let sender = Address([1; 20]);
        let miner = Address([2; 20]);
        snapshot.coin.set(sender, config.min_cnd_pledge_balance);
        let tx = CustomTx { sender, data: format!("token:1:CandPnsh:{}", hex::encode(miner.0)), value: 0 };
        assert!(interpret(&mut snapshot, &tx, 1, &config).is_none());
        assert_eq!(snapshot.coin.get(&sender), config.min_cnd_pledge_balance);
    }

    #[test]
    fn cand_pnsh_rejects_insufficient_balance() {
        let config = cfg();
        let mut snapshot = Snapshot::genesis(&config);
        let sender = Address([1; 20]);
        let miner = Address([2; 20]);
        snapshot.punished.insert(miner, 0);
        let tx = CustomTx { sender, data: format!("token:1:CandPnsh:{}", hex::encode(miner.0)), value: 0 };
        assert!(interpret(&mut snapshot, &tx, 1, &config).is_none());
        assert_eq!(*snapshot.punished.get(&miner).unwrap(), 0);
    }

    #[test]
    fn ssc_deposit_overrides_the_candidate_deposit_amount() {
        let config = cfg();
        let mut snapshot = Snapshot::genesis(&config);
        let admin = Address([250; 20]);
        snapshot.system_config.manager_address.insert(255, admin);
        let tx = CustomTx {
            sender: admin,
            data: format!("SSC:1:Deposit:{}:{}", dpos_core::LOCK_KIND_CND, 777u128),
            value: 0,
        };
        assert!(interpret(&mut snapshot, &tx, 1, &config).is_some());
        assert_eq!(snapshot.system_config.deposits.get(&dpos_core::LOCK_KIND_CND), Some(&777));
    }

    #[test]
    fn ssc_rwd_lock_overrides_the_configured_lock_schedule() {
        let config = cfg();
        let mut snapshot = Snapshot::genesis(&config);
        let admin = Address([250; 20]);
        snapshot.system_config.manager_address.insert(255, admin);
        let tx = CustomTx { sender: admin, data: "SSC:1:RwdLock:7:30:1".to_string(), value: 0 };
        assert!(interpret(&mut snapshot, &tx, 1, &config).is_some());
        let params = snapshot.system_config.lock_parameters.get(&dpos_core::LOCK_KIND_RWD).unwrap();
        assert_eq!(*params, dpos_core::LockParams { lock_period: 7, rls_period: 30, interval: 1 });
    }

    #[test]
    fn ssc_rejects_senders_other_than_the_configured_manager() {
        let config = cfg();
        let mut snapshot = Snapshot::genesis(&config);
        let admin = Address([250; 20]);
        snapshot.system_config.manager_address.insert(255, admin);
        let impostor = Address([251; 20]);
        let tx = CustomTx { sender: impostor, data: "SSC:1:ExchRate:500".to_string(), value: 0 };
        assert!(interpret(&mut snapshot, &tx, 1, &config).is_none());
        assert_eq!(snapshot.system_config.exch_rate, 0);
    }

    #[test]
    fn pofrpten_requires_sender_to_be_a_pof_miner() {
        let config = cfg();
        let mut snapshot = Snapshot::genesis(&config);
        let tx = CustomTx {
            sender: Address([1; 20]),
            data: "token:1:pofrpten:100,0102030405060708090a0b0c0d0e0f1011121314,5000,00".to_string(),
            value: 0,
        };
        assert!(interpret(&mut snapshot, &tx, 1, &config).is_none());
    }

    #[test]
    fn pofrpten_dispatches_to_flow_ledger_and_debits_coin() {
        use secp256k1::{Message, SecretKey, SECP256K1};

        let config = cfg();
        let mut snapshot = Snapshot::genesis(&config);
        let miner = Address([9; 20]);
        snapshot.create_pof_pledge(miner, Address([2; 20]), 1_000, 1_000, 10);

        let sk = SecretKey::from_slice(&[6u8; 32]).unwrap();
        let pubkey = sk.public_key(SECP256K1);
        let uncompressed = pubkey.serialize_uncompressed();
        let mut xy = [0u8; 64];
        xy.copy_from_slice(&uncompressed[1..65]);
        let from = dpos_crypto::address_from_uncompressed_pubkey(&xy);
        snapshot.coin.set(from, 1_000_000);

        let device_id = Address([7; 20]);
        let report_number = 100u64;
        let flow_bytes = 500u64;
        let message = format!("{}{}{}{}", miner.to_hex(), report_number, device_id.to_hex(), flow_bytes);
        let seal_hash = keccak256(message.as_bytes());
        let msg = Message::from_digest_slice(&seal_hash.0).unwrap();
        let (recovery_id, compact) = SECP256K1.sign_ecdsa_recoverable(&msg, &sk).serialize_compact();
        let mut sig = [0u8; 65];
        sig[..64].copy_from_slice(&compact);
        sig[64] = recovery_id.to_i32() as u8;

        let payload = format!("{},{},{},{}", report_number, hex::encode(device_id.0), flow_bytes, hex::encode(sig));
        let tx = CustomTx { sender: miner, data: format!("token:1:pofrpten:{payload}"), value: 0 };

        let result = interpret(&mut snapshot, &tx, 100, &config).unwrap();
        assert_eq!(result.flow_reports.len(), 1);
        assert_eq!(snapshot.coin.get(&from), 1_000_000 - flow_bytes as u128 * 10);
    }
}
