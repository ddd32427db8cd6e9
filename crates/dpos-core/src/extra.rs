// HeaderExtra payload (C1): the versioned structure carried inside every
// header's extra-data, between the vanity prefix and the trailing
// signature. Two payloads compare equal iff their list-typed fields are
// set-equal (order-insensitive) — P6/S6.

use dpos_crypto::{Address, Hash32};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraDecodeError(pub String);

impl fmt::Display for ExtraDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "header extra decode error: {}", self.0)
    }
}

impl std::error::Error for ExtraDecodeError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VoteRecord {
    pub voter: Address,
    pub candidate: Address,
    pub stake: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PredecessorVote {
    pub voter: Address,
    pub candidate: Address,
    pub delta: i128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ConfirmationRecord {
    pub signer: Address,
    pub block_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProposalRecord {
    pub proposer: Address,
    pub hash: Hash32,
    pub deposit: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DeclareRecord {
    pub candidate: Address,
    pub proposal_hash: Hash32,
    pub decision: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SideChainConfirmation {
    pub side_chain_id: u64,
    pub block_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SideChainCharging {
    pub side_chain_id: u64,
    pub target: Address,
    pub amount: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ExchangeRecord {
    pub from: Address,
    pub to: Address,
    pub amount: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DeviceBindRecord {
    pub device: Address,
    pub revenue_address: Address,
    pub revenue_contract: Address,
    pub multi_sig: bool,
    pub kind: u8, // 0 = normal (PoS), 1 = pof
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CandidatePunishRecord {
    pub miner: Address,
    pub credit_restored: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MinerStakeRecord {
    pub miner: Address,
    pub stake: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ClaimedBandwidthRecord {
    pub miner: Address,
    pub bandwidth: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DepositConfig {
    pub kind: u8,
    pub amount: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct IspQosRecord {
    pub isp: u8,
    pub qos: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LockParameterRecord {
    pub kind: u8,
    pub lock_period: u64,
    pub rls_period: u64,
    pub interval: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ManagerAddressRecord {
    pub kind: u8,
    pub manager: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LockRewardRecord {
    pub target: Address,
    pub kind: u8,
    pub amount: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GrantProfitRecord {
    pub target: Address,
    pub kind: u8,
    pub amount: u128,
    pub height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowReportRecord {
    pub target: Address,
    pub miner: Address,
    pub flow1: u64,
    pub flow2: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CandPledgeRecord {
    pub miner: Address,
    pub manager: Address,
    pub amount: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CandEntrustRecord {
    pub miner: Address,
    pub from: Address,
    pub amount: u128,
    pub tx_hash: Hash32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CandEntrustExitRecord {
    pub miner: Address,
    pub detail_hash: Hash32,
    pub start_height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CandRateChangeRecord {
    pub miner: Address,
    pub dis_rate: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CandManagerChangeRecord {
    pub miner: Address,
    pub old_manager: Address,
    pub new_manager: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowPledgeRequest {
    pub miner: Address,
    pub bandwidth: u64,
    pub price: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowMinerPriceRequest {
    pub miner: Address,
    pub price: u128,
}

/// An unrecognised custom-tx prefix/category, carried through unchanged.
/// The "oplog" extensibility mechanism (§9): unknown categories are never
/// rejected, merely ignored by every handler that doesn't know them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UnknownOp {
    pub tag: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct HeaderExtra {
    pub votes: Vec<VoteRecord>,
    pub modify_predecessor_votes: Vec<PredecessorVote>,
    pub confirmations: Vec<ConfirmationRecord>,
    pub proposals: Vec<ProposalRecord>,
    pub declares: Vec<DeclareRecord>,
    pub loop_start_time: u64,
    pub signer_queue: Vec<Address>,
    pub signer_missing: Vec<Address>,
    pub confirmed_block_number: u64,
    pub side_chain_confirmations: Vec<SideChainConfirmation>,
    pub side_chain_charging: Vec<SideChainCharging>,
    pub exchange_coin: Vec<ExchangeRecord>,
    pub device_bind: Vec<DeviceBindRecord>,
    pub candidate_punish: Vec<CandidatePunishRecord>,
    pub miner_stake: Vec<MinerStakeRecord>,
    pub candidate_exit: Vec<Address>,
    pub claimed_bandwidth: Vec<ClaimedBandwidthRecord>,
    pub flow_miner_exit: Vec<Address>,
    pub exch_rate: u64,
    pub off_line: Vec<Address>,
    pub deposit: Vec<DepositConfig>,
    pub isp_qos: Vec<IspQosRecord>,
    pub lock_parameters: Vec<LockParameterRecord>,
    pub manager_address: Vec<ManagerAddressRecord>,
    pub flow_harvest: u128,
    pub inspire_harvest: u128,
    pub lock_reward: Vec<LockRewardRecord>,
    pub grant_profit: Vec<GrantProfitRecord>,
    pub flow_report: Vec<FlowReportRecord>,
    pub coin_data_root: Hash32,
    pub grant_profit_hash: Hash32,
    pub cand_pledge: Vec<CandPledgeRecord>,
    pub cand_entrust: Vec<CandEntrustRecord>,
    pub cand_entrust_exit: Vec<CandEntrustExitRecord>,
    pub cand_auto_exit: Vec<Address>,
    pub cand_rate_change: Vec<CandRateChangeRecord>,
    pub cand_manager_change: Vec<CandManagerChangeRecord>,
    pub flow_pledge_request: Vec<FlowPledgeRequest>,
    pub flow_miner_price_request: Vec<FlowMinerPriceRequest>,
    pub unknown: Vec<UnknownOp>,
}

/// Sorts each element's canonical byte encoding and compares the
/// resulting multisets — set-semantic equality regardless of input order.
pub fn multiset_eq<T: Serialize>(a: &[T], b: &[T]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut ea: Vec<Vec<u8>> = a.iter().map(|x| bincode::serialize(x).unwrap()).collect();
    let mut eb: Vec<Vec<u8>> = b.iter().map(|x| bincode::serialize(x).unwrap()).collect();
    ea.sort();
    eb.sort();
    ea == eb
}

/// Keccak-256 fold over a block's pay-out records (§4.7/§9's
/// `GrantProfitHash`), sorted by canonical encoding first so the result
/// doesn't depend on the order `due_payouts` happened to emit them in.
pub fn grant_profit_hash(records: &[GrantProfitRecord]) -> Hash32 {
    let mut encoded: Vec<Vec<u8>> = records.iter().map(|r| bincode::serialize(r).unwrap()).collect();
    encoded.sort();
    let mut buf = Vec::new();
    for rec in &encoded {
        buf.extend_from_slice(rec);
    }
    dpos_crypto::keccak256(&buf)
}

impl HeaderExtra {
    pub fn encode(&self) -> Vec<u8> {
        bincode::serialize(self).expect("HeaderExtra encoding is infallible")
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ExtraDecodeError> {
        bincode::deserialize(bytes).map_err(|e| ExtraDecodeError(e.to_string()))
    }

    /// P6/S6: equality under set semantics for every list-typed field,
    /// scalar equality for everything else.
    pub fn set_equal(&self, other: &HeaderExtra) -> bool {
        self.loop_start_time == other.loop_start_time
            && self.signer_queue == other.signer_queue
            && self.confirmed_block_number == other.confirmed_block_number
            && self.exch_rate == other.exch_rate
            && self.flow_harvest == other.flow_harvest
            && self.inspire_harvest == other.inspire_harvest
            && self.coin_data_root == other.coin_data_root
            && self.grant_profit_hash == other.grant_profit_hash
            && multiset_eq(&self.votes, &other.votes)
            && multiset_eq(&self.modify_predecessor_votes, &other.modify_predecessor_votes)
            && multiset_eq(&self.confirmations, &other.confirmations)
            && multiset_eq(&self.proposals, &other.proposals)
            && multiset_eq(&self.declares, &other.declares)
            && multiset_eq(&self.signer_missing, &other.signer_missing)
            && multiset_eq(&self.side_chain_confirmations, &other.side_chain_confirmations)
            && multiset_eq(&self.side_chain_charging, &other.side_chain_charging)
            && multiset_eq(&self.exchange_coin, &other.exchange_coin)
            && multiset_eq(&self.device_bind, &other.device_bind)
            && multiset_eq(&self.candidate_punish, &other.candidate_punish)
            && multiset_eq(&self.miner_stake, &other.miner_stake)
            && multiset_eq(&self.candidate_exit, &other.candidate_exit)
            && multiset_eq(&self.claimed_bandwidth, &other.claimed_bandwidth)
            && multiset_eq(&self.flow_miner_exit, &other.flow_miner_exit)
            && multiset_eq(&self.off_line, &other.off_line)
            && multiset_eq(&self.deposit, &other.deposit)
            && multiset_eq(&self.isp_qos, &other.isp_qos)
            && multiset_eq(&self.lock_parameters, &other.lock_parameters)
            && multiset_eq(&self.manager_address, &other.manager_address)
            && multiset_eq(&self.lock_reward, &other.lock_reward)
            && multiset_eq(&self.grant_profit, &other.grant_profit)
            && multiset_eq(&self.flow_report, &other.flow_report)
            && multiset_eq(&self.cand_pledge, &other.cand_pledge)
            && multiset_eq(&self.cand_entrust, &other.cand_entrust)
            && multiset_eq(&self.cand_entrust_exit, &other.cand_entrust_exit)
            && multiset_eq(&self.cand_auto_exit, &other.cand_auto_exit)
            && multiset_eq(&self.cand_rate_change, &other.cand_rate_change)
            && multiset_eq(&self.cand_manager_change, &other.cand_manager_change)
            && multiset_eq(&self.flow_pledge_request, &other.flow_pledge_request)
            && multiset_eq(&self.flow_miner_price_request, &other.flow_miner_price_request)
            && multiset_eq(&self.unknown, &other.unknown)
    }

    /// Returns the name of the first list field that differs, for S6's
    /// "diagnostic error naming the list" requirement. `None` means equal.
    pub fn diff_field(&self, other: &HeaderExtra) -> Option<&'static str> {
        macro_rules! check {
            ($field:ident) => {
                if !multiset_eq(&self.$field, &other.$field) {
                    return Some(stringify!($field));
                }
            };
        }
        check!(votes);
        check!(modify_predecessor_votes);
        check!(confirmations);
        check!(proposals);
        check!(declares);
        check!(signer_missing);
        check!(side_chain_confirmations);
        check!(side_chain_charging);
        check!(exchange_coin);
        check!(device_bind);
        check!(candidate_punish);
        check!(miner_stake);
        check!(candidate_exit);
        check!(claimed_bandwidth);
        check!(flow_miner_exit);
        check!(off_line);
        check!(deposit);
        check!(isp_qos);
        check!(lock_parameters);
        check!(manager_address);
        check!(lock_reward);
        check!(grant_profit);
        check!(flow_report);
        check!(cand_pledge);
        check!(cand_entrust);
        check!(cand_entrust_exit);
        check!(cand_auto_exit);
        check!(cand_rate_change);
        check!(cand_manager_change);
        check!(flow_pledge_request);
        check!(flow_miner_price_request);
        check!(unknown);
        if self.signer_queue != other.signer_queue
            || self.loop_start_time != other.loop_start_time
            || self.confirmed_block_number != other.confirmed_block_number
            || self.exch_rate != other.exch_rate
            || self.coin_data_root != other.coin_data_root
            || self.grant_profit_hash != other.grant_profit_hash
        {
            return Some("scalar_fields");
        }
        None
    }
}
