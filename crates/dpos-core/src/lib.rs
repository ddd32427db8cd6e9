// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DPOS-CORE — header codec, coin trie, consensus constants
//
// Shared primitives consumed by dpos-consensus: the canonical header
// seal-hash and extra-data envelope (C1), the coin trie (C5), the
// block-reward / lock-schedule math (§4.8), and the `ChainConfig` all of
// it is threaded through instead of process-global constants (§9).
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub mod coin;
pub mod extra;
pub mod header;
pub mod reward;

pub use dpos_crypto::{Address, Hash32};
pub use reward::{LockParams, LOCK_KIND_CND, LOCK_KIND_POF, LOCK_KIND_RWD};

/// Serde adapter for u128 ↔ TOML: serialize as string, deserialize from
/// string or integer. TOML has no native u128; round-trip through strings.
pub mod u128_toml {
    use serde::{de, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(val: &u128, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&val.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u128, D::Error> {
        struct U128Visitor;
        impl<'de> de::Visitor<'de> for U128Visitor {
            type Value = u128;
            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a u128 as a string or integer")
            }
            fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
                v.parse().map_err(E::custom)
            }
            fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
                Ok(v as u128)
            }
        }
        d.deserialize_any(U128Visitor)
    }
}

/// Block period in seconds (time between blocks when in-turn).
pub const DEFAULT_PERIOD_SECS: u64 = 10;
/// Signer rotation length ("loop").
pub const DEFAULT_MAX_SIGNER_COUNT: u64 = 21;
/// Minimum MaxSignerCount below which the §4.5 weighted-pool election is
/// skipped in favor of a plain top-N take.
pub const DEFAULT_OFFICIAL_MAX_SIGNER_COUNT: u64 = 21;
/// Blocks per governance epoch.
pub const DEFAULT_EPOCH_BLOCKS: u64 = 60_480;
/// Snapshot persistence interval.
pub const DEFAULT_CHECKPOINT_INTERVAL: u64 = 360;
/// `MaxSignerCount * LCRS`: how often tally is refreshed from pos_pledge.
pub const DEFAULT_LCRS: u64 = 3;

/// 1 token = 1e18 base units, matching the wei-scale values in spec.md §4.8/§6.
pub const TOKEN_DECIMALS: u128 = 1_000_000_000_000_000_000;

pub const DEFAULT_MIN_VOTER_BALANCE: u128 = 100 * TOKEN_DECIMALS;
pub const DEFAULT_PROPOSAL_DEPOSIT: u128 = 10_000 * TOKEN_DECIMALS;
pub const DEFAULT_MIN_CND_PLEDGE_BALANCE: u128 = 100 * TOKEN_DECIMALS;
pub const DEFAULT_MIN_CND_ENTRUST_PLEDGE_BALANCE: u128 = TOKEN_DECIMALS;

pub const DEFAULT_TOTAL_BLOCK_REWARD: u128 = 100_000_000 * TOKEN_DECIMALS;
pub const DEFAULT_TOTAL_POF_REWARD: u128 = 198_000_000 * TOKEN_DECIMALS;
pub const DEFAULT_TOTAL_INSPIRE_REWARD: u128 = 22_000_000 * TOKEN_DECIMALS;
pub const DEFAULT_MINER_REWARD_PER_THOUSAND: u64 = 618;

pub const DEFAULT_FULL_CREDIT: u64 = 1000;
/// Minimum credit to remain eligible for the signer-queue election pools.
pub const DEFAULT_MIN_CAL_SIGNER_QUEUE_CREDIT: u64 = 800;
pub const DEFAULT_MISSING_PUBLISH_CREDIT: u64 = 50;
pub const DEFAULT_SIGN_REWARD_CREDIT: u64 = 10;
pub const DEFAULT_AUTO_REWARD_CREDIT: u64 = 1;

/// Candidate auto-exit grace window, in days, before forced exit.
pub const DEFAULT_AUTO_EXIT_DAYS: u64 = 30;

/// Default lock/release schedules for the three SSC-configurable deposit
/// kinds, used until an SSC `CndLock`/`PofLock`/`RwdLock` tx overrides them.
pub const DEFAULT_CND_LOCK: LockParams = LockParams { lock_period: 0, rls_period: 1, interval: 1 };
pub const DEFAULT_POF_LOCK: LockParams = LockParams { lock_period: 0, rls_period: 1, interval: 1 };
pub const DEFAULT_RWD_LOCK: LockParams = LockParams { lock_period: 0, rls_period: 1, interval: 1 };

/// Seconds after each day boundary at which flow reward accrues (§4.8).
pub const DEFAULT_FLOW_REWARD_OFFSET_SECS: u64 = 7_200;
/// Seconds after each day boundary at which inspire reward accrues (§4.8).
pub const DEFAULT_INSPIRE_REWARD_OFFSET_SECS: u64 = 14_400;

/// Tunable consensus parameters. Threaded through the engine explicitly
/// rather than kept as process globals (§9's design note).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub period_secs: u64,
    pub max_signer_count: u64,
    pub epoch_blocks: u64,
    pub checkpoint_interval: u64,
    pub lcrs: u64,

    #[serde(with = "u128_toml")]
    pub min_voter_balance: u128,
    #[serde(with = "u128_toml")]
    pub proposal_deposit: u128,
    #[serde(with = "u128_toml")]
    pub min_cnd_pledge_balance: u128,
    #[serde(with = "u128_toml")]
    pub min_cnd_entrust_pledge_balance: u128,

    #[serde(with = "u128_toml")]
    pub total_block_reward: u128,
    #[serde(with = "u128_toml")]
    pub total_pof_reward: u128,
    #[serde(with = "u128_toml")]
    pub total_inspire_reward: u128,
    pub miner_reward_per_thousand: u64,

    pub default_full_credit: u64,
    pub min_cal_signer_queue_credit: u64,
    pub missing_publish_credit: u64,
    pub sign_reward_credit: u64,
    pub auto_reward_credit: u64,

    /// Installation-configured alternative hex prefix (§6).
    pub alt_hex_prefix: String,

    /// Height at and after which `coinbase == recovered signer` is enforced (§4.6).
    pub bug_fix_block_number: u64,
    /// Height at and after which the Trantor signer-missing derivation and
    /// punish-score reset apply (§4.4/§4.6).
    pub trantor_block_number: u64,

    pub auto_exit_days: u64,

    pub default_cnd_lock: LockParams,
    pub default_pof_lock: LockParams,
    pub default_rwd_lock: LockParams,

    /// Seconds past each day boundary at which flow reward accrues (§4.8).
    pub flow_reward_offset_secs: u64,
    /// Seconds past each day boundary at which inspire reward accrues (§4.8).
    pub inspire_reward_offset_secs: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            period_secs: DEFAULT_PERIOD_SECS,
            max_signer_count: DEFAULT_MAX_SIGNER_COUNT,
            epoch_blocks: DEFAULT_EPOCH_BLOCKS,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            lcrs: DEFAULT_LCRS,
            min_voter_balance: DEFAULT_MIN_VOTER_BALANCE,
            proposal_deposit: DEFAULT_PROPOSAL_DEPOSIT,
            min_cnd_pledge_balance: DEFAULT_MIN_CND_PLEDGE_BALANCE,
            min_cnd_entrust_pledge_balance: DEFAULT_MIN_CND_ENTRUST_PLEDGE_BALANCE,
            total_block_reward: DEFAULT_TOTAL_BLOCK_REWARD,
            total_pof_reward: DEFAULT_TOTAL_POF_REWARD,
            total_inspire_reward: DEFAULT_TOTAL_INSPIRE_REWARD,
            miner_reward_per_thousand: DEFAULT_MINER_REWARD_PER_THOUSAND,
            default_full_credit: DEFAULT_FULL_CREDIT,
            min_cal_signer_queue_credit: DEFAULT_MIN_CAL_SIGNER_QUEUE_CREDIT,
            missing_publish_credit: DEFAULT_MISSING_PUBLISH_CREDIT,
            sign_reward_credit: DEFAULT_SIGN_REWARD_CREDIT,
            auto_reward_credit: DEFAULT_AUTO_REWARD_CREDIT,
            alt_hex_prefix: dpos_crypto::DEFAULT_ALT_HEX_PREFIX.to_string(),
            bug_fix_block_number: 0,
            trantor_block_number: 0,
            auto_exit_days: DEFAULT_AUTO_EXIT_DAYS,
            default_cnd_lock: DEFAULT_CND_LOCK,
            default_pof_lock: DEFAULT_POF_LOCK,
            default_rwd_lock: DEFAULT_RWD_LOCK,
            flow_reward_offset_secs: DEFAULT_FLOW_REWARD_OFFSET_SECS,
            inspire_reward_offset_secs: DEFAULT_INSPIRE_REWARD_OFFSET_SECS,
        }
    }
}

impl ChainConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let config: ChainConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn blocks_per_year(&self) -> u64 {
        (365 * 24 * 3600) / self.period_secs.max(1)
    }

    pub fn blocks_per_day(&self) -> u64 {
        (24 * 3600) / self.period_secs.max(1)
    }

    pub fn is_trantor(&self, number: u64) -> bool {
        number >= self.trantor_block_number
    }

    pub fn is_bug_fix_active(&self, number: u64) -> bool {
        number > self.bug_fix_block_number
    }

    pub fn auto_exit_blocks(&self) -> u64 {
        self.auto_exit_days * self.blocks_per_day()
    }

    /// Default lock/release schedule for SSC deposit `kind`, before any
    /// `CndLock`/`PofLock`/`RwdLock` override is on record.
    pub fn lock_params_for(&self, kind: u8) -> LockParams {
        match kind {
            LOCK_KIND_CND => self.default_cnd_lock,
            LOCK_KIND_POF => self.default_pof_lock,
            _ => self.default_rwd_lock,
        }
    }

    pub fn flow_reward_offset_blocks(&self) -> u64 {
        self.flow_reward_offset_secs / self.period_secs.max(1)
    }

    pub fn inspire_reward_offset_blocks(&self) -> u64 {
        self.inspire_reward_offset_secs / self.period_secs.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let cfg = ChainConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let back: ChainConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.max_signer_count, cfg.max_signer_count);
        assert_eq!(back.total_block_reward, cfg.total_block_reward);
    }

    #[test]
    fn trantor_predicate_is_height_gated() {
        let mut cfg = ChainConfig::default();
        cfg.trantor_block_number = 1000;
        assert!(!cfg.is_trantor(999));
        assert!(cfg.is_trantor(1000));
        assert!(cfg.is_trantor(1001));
    }
}
