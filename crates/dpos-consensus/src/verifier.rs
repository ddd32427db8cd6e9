// Header Verifier (C9): the cascading set of checks a header must pass
// before its effects are folded into a snapshot (§4.6). Ordered cheapest
// (and most decode-independent) first so a malformed header never reaches
// signature recovery or state comparison.

use dpos_core::header::RawHeader;
use dpos_core::ChainConfig;
use dpos_crypto::recovery::{recover_signer, SignerCache};
use dpos_crypto::{Address, Hash32};

use crate::elector::{elect_signer_queue, inturn};
use crate::error::HeaderError;
use crate::snapshot::Snapshot;

pub const DIFF_INTURN: u64 = 2;
pub const DIFF_NOTURN: u64 = 1;

/// Verify `header` against its already-applied parent `snapshot` (the
/// snapshot derived from every ancestor up to and including the parent).
/// `now` is the verifier's wall-clock reading, used to reject future-dated
/// headers. Returns the recovered signer on success.
pub fn verify_header(header: &RawHeader, parent: &Snapshot, cfg: &ChainConfig, sig_cache: &SignerCache, now: u64) -> Result<Address, HeaderError> {
    verify_structural(header)?;
    verify_temporal(header, parent, cfg, now)?;
    verify_topology(header, parent)?;

    let extra = header.decode_extra()?;
    let seal_hash = header.seal_hash();
    let header_hash = header.hash();
    let signer = recover_signer(sig_cache, header_hash, seal_hash, &header.extra)
        .map_err(|e| HeaderError::Authorisation(leak(e.to_string())))?;

    verify_authorisation(header, &signer, parent, cfg)?;
    verify_difficulty(header, &signer, parent, cfg)?;
    verify_extra_consistency(header, &extra, parent, cfg)?;

    Ok(signer)
}

fn leak(s: String) -> &'static str {
    Box::leak(s.into_boxed_str())
}

fn verify_structural(header: &RawHeader) -> Result<(), HeaderError> {
    if header.extra.len() < dpos_core::header::MIN_EXTRA_LEN {
        return Err(HeaderError::Structural("extra-data shorter than vanity+signature"));
    }
    if header.bloom.len() != 256 {
        return Err(HeaderError::Structural("bloom filter is not 256 bytes"));
    }
    if header.mix_digest != Hash32::ZERO {
        return Err(HeaderError::Structural("mix_digest must be zero"));
    }
    if header.uncle_hash != Hash32::ZERO {
        return Err(HeaderError::Structural("uncle_hash must be the empty-uncle sentinel"));
    }
    Ok(())
}

fn verify_temporal(header: &RawHeader, parent: &Snapshot, cfg: &ChainConfig, now: u64) -> Result<(), HeaderError> {
    if cfg.period_secs == 0 {
        return Err(HeaderError::Config("period_secs must be non-zero"));
    }
    if header.time > now {
        return Err(HeaderError::Temporal("header timestamp is in the future"));
    }
    if parent.time > header.time {
        return Err(HeaderError::Temporal("header timestamp does not exceed parent timestamp"));
    }
    Ok(())
}

fn verify_topology(header: &RawHeader, parent: &Snapshot) -> Result<(), HeaderError> {
    if parent.number > 0 && header.number != parent.number + 1 {
        return Err(HeaderError::ChainTopology("header number is not parent+1"));
    }
    Ok(())
}

fn verify_authorisation(header: &RawHeader, signer: &Address, parent: &Snapshot, cfg: &ChainConfig) -> Result<(), HeaderError> {
    if !parent.signers.is_empty() && !parent.signers.contains(signer) {
        return Err(HeaderError::Authorisation("recovered signer is not in the active signer queue"));
    }
    if cfg.is_bug_fix_active(header.number) && header.coinbase != *signer {
        return Err(HeaderError::Authorisation("coinbase must equal the recovered signer past the bug-fix height"));
    }
    if parent.recent_signers.last() == Some(signer) && header.time.saturating_sub(parent.time) < cfg.period_secs {
        return Err(HeaderError::Authorisation("the same signer cannot seal two blocks within one period"));
    }
    Ok(())
}

fn verify_difficulty(header: &RawHeader, signer: &Address, parent: &Snapshot, cfg: &ChainConfig) -> Result<(), HeaderError> {
    if parent.signers.is_empty() {
        return Ok(());
    }
    let expected = if inturn(&parent.signers, header.time, parent.loop_start_time, cfg.period_secs, signer) {
        DIFF_INTURN
    } else {
        DIFF_NOTURN
    };
    if header.difficulty != expected {
        return Err(HeaderError::ChainTopology("difficulty does not match in-turn/not-in-turn expectation"));
    }
    Ok(())
}

fn verify_extra_consistency(header: &RawHeader, extra: &dpos_core::extra::HeaderExtra, parent: &Snapshot, cfg: &ChainConfig) -> Result<(), HeaderError> {
    if parent.signers.is_empty() {
        return Ok(());
    }
    if extra.signer_missing.iter().any(|m| !parent.signers.contains(m)) {
        return Err(HeaderError::Structural("signer_missing lists an address outside the active signer queue"));
    }
    if header.number >= parent.signers.len() as u64 {
        let expected = parent.signers_missing_from_window();
        if !dpos_core::extra::multiset_eq(&expected, &extra.signer_missing) {
            return Err(HeaderError::Authorisation("signer_missing does not match the derived missing-signer list"));
        }
    }

    if header.number % cfg.max_signer_count == 1 {
        let expected = elect_signer_queue(parent, cfg);
        if extra.signer_queue != expected {
            return Err(HeaderError::Authorisation("signer_queue does not match the freshly-elected queue at a rotation boundary"));
        }
    } else if extra.signer_queue != parent.signers {
        return Err(HeaderError::Authorisation("signer_queue must carry over the parent's signer queue outside a rotation boundary"));
    }
    Ok(())
}

/// After a header's effects have been folded, check the resulting coin
/// root against the value the header claims (§4.6's post-apply check).
pub fn verify_state_root(extra: &dpos_core::extra::HeaderExtra, next: &Snapshot) -> Result<(), HeaderError> {
    let computed = next.coin.root();
    if extra.coin_data_root != computed {
        return Err(HeaderError::ChainTopology("coin_data_root does not match the recomputed coin trie root"));
    }
    verify_grant_profit_hash(extra)
}

/// Recompute the Keccak-256 fold over `extra.grant_profit` and check it
/// against the header's own claimed `grant_profit_hash` (§4.7/§9) —
/// catches a header whose pay-out list was tampered with independently of
/// its hash field.
fn verify_grant_profit_hash(extra: &dpos_core::extra::HeaderExtra) -> Result<(), HeaderError> {
    let computed = dpos_core::extra::grant_profit_hash(&extra.grant_profit);
    if extra.grant_profit_hash != computed {
        return Err(HeaderError::ChainTopology("grant_profit_hash does not match the recomputed pay-out fold"));
    }
    Ok(())
}
