// Signer-Queue Elector (C8): derives the next signer rotation by combining
// the main-tally and secondary-tally (miner) pools, weighting each
// candidate by stake, sign-count, and credit, then ordering the selection
// with a history-hash-seeded pairing so the result is reproducible from
// any replaying node without relying on wall-clock or unseeded
// randomness (§4.5, S1).

use dpos_core::ChainConfig;
use dpos_crypto::Address;

use crate::snapshot::Snapshot;

/// One candidate's inputs into the election weight formula.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    addr: Address,
    stake: u128,
}

/// Elect the next signer queue from `snapshot`'s tally pools.
///
/// Below `DefaultOfficialMaxSignerCount` (or when the combined pools don't
/// outnumber the seats to fill), falls back to a plain top-`MaxSignerCount`
/// take by stake — the weighted/shuffled election only matters once there
/// are more eligible candidates than seats (§4.5's small-network carve-out).
pub fn elect_signer_queue(snapshot: &Snapshot, cfg: &ChainConfig) -> Vec<Address> {
    let main_pool = eligible_pool(snapshot, &snapshot.tally, cfg);
    let second_pool: Vec<Candidate> = eligible_pool(snapshot, &snapshot.tally_miner, cfg)
        .into_iter()
        .filter(|c| snapshot.pos_pledge.contains_key(&c.addr))
        .collect();

    if main_pool.is_empty() && second_pool.is_empty() {
        return snapshot.signers.clone();
    }

    let seats = cfg.max_signer_count as usize;
    let selected = if cfg.max_signer_count >= dpos_core::DEFAULT_OFFICIAL_MAX_SIGNER_COUNT {
        select_weighted(snapshot, &main_pool, &second_pool, cfg)
    } else {
        top_n_by_stake(&main_pool, seats)
    };

    order_by_history(&selected, snapshot, seats)
}

/// Candidates whose credit is above the election floor and not off-line
/// (§4.5 step 1/2): falls back to the unfiltered pool if the filter would
/// empty it out.
fn eligible_pool(snapshot: &Snapshot, pool: &std::collections::BTreeMap<Address, u128>, cfg: &ChainConfig) -> Vec<Candidate> {
    let filtered: Vec<Candidate> = pool
        .iter()
        .filter(|(addr, _)| {
            let credit = snapshot.punished.get(*addr).copied().unwrap_or(cfg.default_full_credit);
            credit >= cfg.min_cal_signer_queue_credit && !snapshot.system_config.off_line.contains(*addr)
        })
        .map(|(addr, stake)| Candidate { addr: *addr, stake: *stake })
        .collect();

    if filtered.is_empty() {
        pool.iter().map(|(addr, stake)| Candidate { addr: *addr, stake: *stake }).collect()
    } else {
        filtered
    }
}

fn top_n_by_stake(pool: &[Candidate], n: usize) -> Vec<Address> {
    let mut sorted = pool.to_vec();
    sorted.sort_by(|a, b| b.stake.cmp(&a.stake).then(a.addr.cmp(&b.addr)));
    sorted.into_iter().take(n).map(|c| c.addr).collect()
}

/// Mean of `stake`, excluding one maximum and one minimum entry — the
/// §4.5 step 3 "trim the extremes before averaging" filter input.
fn trimmed_mean(pool: &[Candidate]) -> u128 {
    if pool.len() <= 2 {
        return pool.iter().map(|c| c.stake).sum::<u128>() / pool.len().max(1) as u128;
    }
    let max = pool.iter().map(|c| c.stake).max().unwrap_or(0);
    let min = pool.iter().map(|c| c.stake).min().unwrap_or(0);
    let mut sum: u128 = pool.iter().map(|c| c.stake).sum();
    let mut count = pool.len() as u128;
    // remove exactly one instance of the max and one of the min.
    sum = sum.saturating_sub(max).saturating_sub(min);
    count = count.saturating_sub(2).max(1);
    sum / count
}

/// §4.5 step 3's literal `*1e18` scale factor, also the fixed-point scale
/// `activity` is carried at.
const WEIGHT_SCALE: u128 = 1_000_000_000_000_000_000;

/// Fixed-point resolution for the `stake/sumStake` share below. 1e6 is far
/// more headroom than the election ordering needs, and keeps
/// `stake.saturating_mul(SHARE_SCALE)` well clear of the `u128` ceiling even
/// for whole-network stake totals.
const SHARE_SCALE: u128 = 1_000_000;

/// Integer square root via Newton's method — deterministic across
/// platforms, unlike `f64::sqrt`.
fn isqrt(n: u128) -> u128 {
    if n == 0 {
        return 0;
    }
    let mut x = n;
    let mut y = x.div_ceil(2);
    while y < x {
        x = y;
        y = (x + n / x) / 2;
    }
    x
}

/// Weight a candidate per §4.5 step 3:
/// `sqrt(1/(signCount+1)) * (stake/sumStake) * (1000-punish) * 1e18`.
///
/// Computed as fixed-point integer math rather than `f64::sqrt` so the
/// election order is reproducible bit-for-bit across platforms — this
/// feeds signer-queue selection directly, a consensus-critical path that
/// can't tolerate architecture-dependent float rounding.
fn weight_of(snapshot: &Snapshot, c: &Candidate, sum_stake: u128, cfg: &ChainConfig) -> u128 {
    if sum_stake == 0 {
        return 0;
    }
    let sign_count = snapshot.tally_signer.get(&c.addr).copied().unwrap_or(0) as u128;
    let activity = isqrt(WEIGHT_SCALE.saturating_mul(WEIGHT_SCALE) / (sign_count + 1));
    let stake_share = c.stake.saturating_mul(SHARE_SCALE) / sum_stake;
    // `punished` here tracks remaining credit (§3: starts at
    // `default_full_credit`, decays toward zero on missed slots), the
    // inverse of the spec's penalty-counts-up convention, so the
    // `(1000-punish)` term of §4.5 step 3 is simply the credit itself.
    let credit_factor = snapshot.punished.get(&c.addr).copied().unwrap_or(cfg.default_full_credit);
    (activity.saturating_mul(stake_share) / SHARE_SCALE).saturating_mul(credit_factor)
}

fn weighted_rank(snapshot: &Snapshot, pool: &[Candidate], target: usize, cfg: &ChainConfig) -> Vec<Address> {
    if pool.is_empty() || target == 0 {
        return Vec::new();
    }
    let mean = trimmed_mean(pool);
    let floor = mean.saturating_mul(75) / 100;
    let filtered: Vec<Candidate> = pool.iter().filter(|c| c.stake >= floor).copied().collect();
    let filtered = if filtered.is_empty() { pool.to_vec() } else { filtered };

    let sum_stake: u128 = filtered.iter().map(|c| c.stake).sum();
    let mut weighted: Vec<(Address, u128)> = filtered
        .iter()
        .map(|c| (c.addr, weight_of(snapshot, c, sum_stake, cfg)))
        .collect();
    weighted.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    if weighted.len() >= target {
        weighted.into_iter().take(target).map(|(a, _)| a).collect()
    } else {
        // round-robin padding: cycle the pool until `target` seats are
        // filled when it is smaller than its allotment (§4.5 step 3).
        let mut out = Vec::with_capacity(target);
        let mut i = 0;
        while out.len() < target {
            out.push(weighted[i % weighted.len()].0);
            i += 1;
        }
        out
    }
}

/// Combine the weighted main/secondary selections per §4.5 step 3's
/// `ceil(9*Q/21)` / `12*Q/21` target split.
fn select_weighted(snapshot: &Snapshot, main_pool: &[Candidate], second_pool: &[Candidate], cfg: &ChainConfig) -> Vec<Address> {
    let q = cfg.max_signer_count;
    let main_target = ((9 * q + 20) / 21) as usize;
    let second_target = (12 * q / 21) as usize;

    let mut selected = weighted_rank(snapshot, main_pool, main_target, cfg);
    let mut from_second = weighted_rank(snapshot, second_pool, second_target, cfg);
    selected.append(&mut from_second);
    selected.dedup();
    selected
}

/// Pair each selected address with a history-hash slot by index, then sort
/// by `(hash desc, address desc)` for a deterministic, reproducible order
/// (§4.5 step 4). Truncates/pads to `seats`.
fn order_by_history(selected: &[Address], snapshot: &Snapshot, seats: usize) -> Vec<Address> {
    if selected.is_empty() {
        return Vec::new();
    }
    let history = &snapshot.history_hash;
    let mut paired: Vec<(Address, [u8; 32])> = selected
        .iter()
        .enumerate()
        .map(|(i, addr)| {
            let slot = if history.is_empty() {
                [0u8; 32]
            } else {
                history[i % history.len()].0
            };
            (*addr, slot)
        })
        .collect();
    paired.sort_by(|a, b| b.1.cmp(&a.1).then(b.0.cmp(&a.0)));
    paired.truncate(seats);
    paired.into_iter().map(|(a, _)| a).collect()
}

/// Whether `signer` is the in-turn signer at `time` given `queue` —
/// `queue[((time - loop_start_time) / period_secs) mod len(queue)] ==
/// signer` (§4.5/§4.6's difficulty tie-break input). Keyed off elapsed
/// time-slots rather than block number, since the two diverge as soon as
/// the chain has ever missed a slot (`signer_missing`/`history_hash`
/// exist precisely because that happens).
pub fn inturn(queue: &[Address], time: u64, loop_start_time: u64, period_secs: u64, signer: &Address) -> bool {
    if queue.is_empty() || period_secs == 0 {
        return false;
    }
    let elapsed_slots = time.saturating_sub(loop_start_time) / period_secs;
    let idx = (elapsed_slots as usize) % queue.len();
    queue.get(idx) == Some(signer)
}

/// A deterministic loop-start time: the header time of the first block in
/// the signer's current rotation (§4.5's `loopStartTime` field).
pub fn loop_start_time(queue_len: usize, number: u64, period_secs: u64, genesis_time: u64) -> u64 {
    if queue_len == 0 {
        return genesis_time;
    }
    let loop_index = number / queue_len as u64;
    genesis_time + loop_index * queue_len as u64 * period_secs
}
