// Reward schedule (§4.8): block-reward-by-year decay, the inspire-reward
// APR table, flow/pof per-MB issuance, and the PledgeItem lock-schedule
// payable-amount function (S4).
//
// Every curve here is pure integer math (divide-before-multiply, no
// floats) to keep the figures reproducible bit-for-bit across platforms.
// The pof per-EB issuance curve is a genuine fractional exponential
// (`0.5^(ebIndex/80)`); rather than `f64::powf`, its per-step decay ratio
// is precomputed as a fixed-point constant and raised to an integer power
// via exponentiation by squaring — the per-MB figure now feeds into
// `grant_profit_hash`, which every verifying node must recompute
// identically, so it can't be left to IEEE-754 rounding behavior that
// isn't guaranteed bit-identical across every target the same way integer
// ops are.

use serde::{Deserialize, Serialize};

const YEAR1_REWARD_WEI: u128 = 380_500_000_000_000_000;
const DECAY_RATIO_NUM: u128 = 8501;
const DECAY_RATIO_DEN: u128 = 10000;
const YEAR10_PLUS_REWARD_WEI: u128 = 88_100_000_000_000_000;

/// Block reward for `year` (1-indexed), in wei at 1e18 scale.
pub fn block_reward_for_year(year: u64) -> u128 {
    if year == 0 {
        return YEAR1_REWARD_WEI;
    }
    if year >= 10 {
        return YEAR10_PLUS_REWARD_WEI;
    }
    let mut reward = YEAR1_REWARD_WEI;
    for _ in 1..year {
        reward = reward * DECAY_RATIO_NUM / DECAY_RATIO_DEN;
    }
    reward
}

/// 1-indexed ceiling-division year for `number` within `blocks_per_year`.
pub fn year_for_block(number: u64, blocks_per_year: u64) -> u64 {
    let bpy = blocks_per_year.max(1);
    if number == 0 {
        1
    } else {
        (number + bpy - 1) / bpy
    }
}

/// Inspire-reward APR table, basis points per year (§4.8); years beyond
/// the table reuse the final published rate.
const INSPIRE_APR_BPS: [u64; 7] = [1500, 1275, 1084, 921, 783, 666, 1109];

pub fn inspire_apr_bps(year: u64) -> u64 {
    let idx = (year.max(1) - 1) as usize;
    INSPIRE_APR_BPS[idx.min(INSPIRE_APR_BPS.len() - 1)]
}

/// `apr_bps * pledge_amount / (365 * 10000)` — §4.8's per-miner inspire reward.
pub fn inspire_reward(apr_bps: u64, pledge_amount: u128) -> u128 {
    pledge_amount * apr_bps as u128 / (365 * 10_000)
}

const MB_PER_EB: u128 = 1024 * 1024 * 1024 * 1024;

/// Fixed-point scale for the pof decay ratio below.
const EB_DECAY_SCALE: u128 = 1_000_000_000;

/// `2^(-1/80)` scaled by `EB_DECAY_SCALE` — the per-exabyte-index decay
/// ratio whose 80th power halves the remaining issuance. Precomputed once
/// so `pof_cumulative_issuance` never touches a float.
const EB_DECAY_RATIO: u128 = 991_373_083;

/// `base^exp`, both `base` and the result scaled by `scale` — exponentiation
/// by squaring, so `eb_index` in the thousands stays cheap.
fn pow_fixed(base: u128, exp: u64, scale: u128) -> u128 {
    let mut result = scale;
    let mut b = base;
    let mut e = exp;
    while e > 0 {
        if e & 1 == 1 {
            result = result * b / scale;
        }
        b = b * b / scale;
        e >>= 1;
    }
    result
}

/// Cumulative pof-reward issuance through exabyte index `eb_index`:
/// `totalPofReward * (1 - 0.5^(eb_index/80))`.
pub fn pof_cumulative_issuance(total_pof_reward: u128, eb_index: u64) -> u128 {
    let decayed = pow_fixed(EB_DECAY_RATIO, eb_index, EB_DECAY_SCALE);
    let fraction_scaled = EB_DECAY_SCALE.saturating_sub(decayed);
    total_pof_reward.saturating_mul(fraction_scaled) / EB_DECAY_SCALE
}

/// Per-MB reward at exabyte index `eb_index`, truncated to 18 decimals
/// (i.e. to whole-wei precision, which `as u128` already gives us).
pub fn pof_per_mb_reward(total_pof_reward: u128, eb_index: u64) -> u128 {
    let slice_n = pof_cumulative_issuance(total_pof_reward, eb_index);
    let slice_prev = if eb_index == 0 {
        0
    } else {
        pof_cumulative_issuance(total_pof_reward, eb_index - 1)
    };
    slice_n.saturating_sub(slice_prev) / MB_PER_EB
}

/// `min(reported flow, claimed bandwidth * 10800)` — the flow a miner is
/// actually paid for (§4.8).
pub fn valid_flow(reported_flow1: u64, claimed_bandwidth: u64) -> u64 {
    reported_flow1.min(claimed_bandwidth.saturating_mul(10_800))
}

/// Price adjustment in basis points: ±`trafficPricingFactor`=5% when the
/// miner's declared price differs from the base price.
pub fn traffic_price_bps(pof_price: u128, base_price: u128) -> u64 {
    if base_price == 0 {
        return 10_000;
    }
    let ratio_bps = (pof_price * 10_000 / base_price) as u64;
    match ratio_bps.cmp(&10_000) {
        std::cmp::Ordering::Greater => (ratio_bps as u128 * 10_500 / 10_000) as u64,
        std::cmp::Ordering::Less => (ratio_bps as u128 * 9_500 / 10_000) as u64,
        std::cmp::Ordering::Equal => 10_000,
    }
}

/// A single miner's flow-reward for one accrual window.
pub fn flow_reward(
    miner_valid_flow: u64,
    per_mb_wei: u128,
    pof_price: u128,
    base_price: u128,
    flow_adjustment_bps: u64,
) -> u128 {
    let traffic_bps = traffic_price_bps(pof_price, base_price) as u128;
    (miner_valid_flow as u128) * per_mb_wei * traffic_bps / 10_000 * flow_adjustment_bps as u128
        / 10_000
}

/// Bytes in one exabyte (2^60) — the unit `eb_index` counts in.
pub const EB_BYTES: u128 = 1_152_921_504_606_846_976;

/// Exabyte index for `cumulative_valid_flow_bytes` already issued against,
/// feeding `pof_per_mb_reward`'s decay curve.
pub fn eb_index_for(cumulative_valid_flow_bytes: u128) -> u64 {
    (cumulative_valid_flow_bytes / EB_BYTES) as u64
}

/// A lock/release schedule: blocks withheld before release starts, the
/// release window length, and the release-step interval (§3's
/// `PledgeItem` parameters, reusable across the deposit/lock SSC kinds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockParams {
    pub lock_period: u64,
    pub rls_period: u64,
    pub interval: u64,
}

/// SSC `Deposit`/`*Lock` kinds (§4.3's table): candidate pledge, pof
/// pledge, and signer/flow/inspire reward release.
pub const LOCK_KIND_CND: u8 = 0;
pub const LOCK_KIND_POF: u8 = 1;
pub const LOCK_KIND_RWD: u8 = 2;

/// A single locked reward tranche (§3's LockData.lock_balance entries).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PledgeItem {
    pub start_height: u64,
    pub lock_period: u64,
    pub rls_period: u64,
    pub interval: u64,
    pub amount: u128,
    pub playment: u128,
}

impl PledgeItem {
    pub fn is_fully_paid(&self) -> bool {
        self.playment >= self.amount
    }

    /// The amount owed (but not yet paid) at `height` — the pure function
    /// behind P4/S4.
    pub fn payable_amount(&self, height: u64) -> u128 {
        if height < self.start_height + self.lock_period {
            return 0;
        }
        if self.rls_period == 0
            || self.interval == 0
            || height >= self.start_height + self.lock_period + self.rls_period
        {
            return self.amount.saturating_sub(self.playment);
        }
        let elapsed = height - self.start_height - self.lock_period;
        let steps = elapsed / self.interval;
        let total_steps = (self.rls_period + self.interval - 1) / self.interval;
        let released_so_far = self.amount * steps as u128 / total_steps.max(1) as u128;
        released_so_far.saturating_sub(self.playment)
    }
}
