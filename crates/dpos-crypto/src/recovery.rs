// Signer recovery (C2): recovers the 20-byte signer address from the
// trailing 65-byte secp256k1 signature carried in a header's extra-data,
// and caches the result by header hash so re-verification (e.g. during
// batch header verification) never repeats the recovery.

use crate::{address_from_uncompressed_pubkey, Address, CryptoError, Hash32};
use lru::LruCache;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, SECP256K1};
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Default capacity of the signer-recovery LRU, matching §4.2's "≈4096".
pub const DEFAULT_SIGCACHE_CAPACITY: usize = 4096;

/// Extract the trailing 65-byte signature from a header's extra-data.
///
/// Panics if `extra.len() < 65` — per §4.2, callers are required to have
/// already validated extra-data length (structural checks happen before
/// recovery is ever attempted in the verifier/engine).
pub fn signature_tail(extra: &[u8]) -> [u8; 65] {
    assert!(
        extra.len() >= 65,
        "signature_tail called on extra shorter than 65 bytes: {}",
        extra.len()
    );
    let mut sig = [0u8; 65];
    sig.copy_from_slice(&extra[extra.len() - 65..]);
    sig
}

/// Recover the signer address from a seal hash and a 65-byte
/// `r(32) || s(32) || recovery_id(1)` secp256k1 signature.
pub fn recover_address(seal_hash: &Hash32, sig65: &[u8; 65]) -> Result<Address, CryptoError> {
    let recovery_id =
        RecoveryId::from_i32(sig65[64] as i32).map_err(|_| CryptoError::InvalidSignature)?;
    let recoverable = RecoverableSignature::from_compact(&sig65[..64], recovery_id)
        .map_err(|_| CryptoError::InvalidSignature)?;
    let message =
        Message::from_digest_slice(&seal_hash.0).map_err(|_| CryptoError::InvalidSignature)?;
    let pubkey = SECP256K1
        .recover_ecdsa(&message, &recoverable)
        .map_err(|_| CryptoError::RecoveryFailed)?;
    let uncompressed = pubkey.serialize_uncompressed();
    // uncompressed = [0x04, X(32), Y(32)]; address hashes X‖Y only.
    let mut xy = [0u8; 64];
    xy.copy_from_slice(&uncompressed[1..65]);
    Ok(address_from_uncompressed_pubkey(&xy))
}

/// ARC-style LRU of `header hash -> recovered signer`.
///
/// Implemented as a single `lru::LruCache` behind a mutex: an
/// approximation of the two-queue ARC policy, adequate because cache
/// entries are immutable once inserted (§5's shared-resource policy).
pub struct SignerCache {
    inner: Mutex<LruCache<Hash32, Address>>,
}

impl SignerCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).expect("capacity must be non-zero");
        Self {
            inner: Mutex::new(LruCache::new(cap)),
        }
    }

    pub fn get(&self, header_hash: &Hash32) -> Option<Address> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(header_hash)
            .copied()
    }

    pub fn insert(&self, header_hash: Hash32, signer: Address) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .put(header_hash, signer);
    }
}

impl Default for SignerCache {
    fn default() -> Self {
        Self::new(DEFAULT_SIGCACHE_CAPACITY)
    }
}

/// Recover the signer for `header_hash`, consulting (and populating) `cache`.
///
/// `seal_hash` is the canonical hash signed over (extra minus the trailing
/// signature); `extra` is the full extra-data, used only to pull the
/// signature tail out.
pub fn recover_signer(
    cache: &SignerCache,
    header_hash: Hash32,
    seal_hash: Hash32,
    extra: &[u8],
) -> Result<Address, CryptoError> {
    if let Some(addr) = cache.get(&header_hash) {
        return Ok(addr);
    }
    if extra.len() < 65 {
        return Err(CryptoError::ExtraTooShort {
            min: 65,
            got: extra.len(),
        });
    }
    let sig = signature_tail(extra);
    let signer = recover_address(&seal_hash, &sig)?;
    cache.insert(header_hash, signer);
    Ok(signer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::{Keypair, SecretKey};

    fn sign(seal_hash: &Hash32, sk: &SecretKey) -> [u8; 65] {
        let keypair = Keypair::from_secret_key(SECP256K1, sk);
        let message = Message::from_digest_slice(&seal_hash.0).unwrap();
        let (recovery_id, compact) = SECP256K1
            .sign_ecdsa_recoverable(&message, &keypair.secret_key())
            .serialize_compact();
        let mut sig = [0u8; 65];
        sig[..64].copy_from_slice(&compact);
        sig[64] = recovery_id.to_i32() as u8;
        sig
    }

    #[test]
    fn recovers_signer_matching_public_key() {
        let sk = SecretKey::from_slice(&[7u8; 32]).unwrap();
        let pubkey = sk.public_key(SECP256K1);
        let uncompressed = pubkey.serialize_uncompressed();
        let mut xy = [0u8; 64];
        xy.copy_from_slice(&uncompressed[1..65]);
        let expected = address_from_uncompressed_pubkey(&xy);

        let seal_hash = crate::keccak256(b"block-seal-data");
        let sig = sign(&seal_hash, &sk);
        let recovered = recover_address(&seal_hash, &sig).unwrap();
        assert_eq!(recovered, expected);
    }

    #[test]
    fn cache_hits_avoid_recomputation() {
        let cache = SignerCache::new(4);
        let sk = SecretKey::from_slice(&[9u8; 32]).unwrap();
        let seal_hash = crate::keccak256(b"cached-block");
        let sig = sign(&seal_hash, &sk);
        let mut extra = vec![0u8; 32];
        extra.extend_from_slice(&sig);

        let header_hash = crate::keccak256(b"header-1");
        let first = recover_signer(&cache, header_hash, seal_hash, &extra).unwrap();
        // Corrupt extra after caching — cache hit must still return the same signer.
        let mut bad_extra = extra.clone();
        bad_extra[32] ^= 0xFF;
        let second = recover_signer(&cache, header_hash, seal_hash, &bad_extra).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    #[should_panic]
    fn signature_tail_panics_on_short_extra() {
        let _ = signature_tail(&[0u8; 10]);
    }

    #[test]
    fn recover_signer_rejects_short_extra() {
        let cache = SignerCache::new(4);
        let seal_hash = crate::keccak256(b"x");
        let header_hash = crate::keccak256(b"h");
        let err = recover_signer(&cache, header_hash, seal_hash, &[0u8; 10]).unwrap_err();
        assert_eq!(
            err,
            CryptoError::ExtraTooShort {
                min: 65,
                got: 10
            }
        );
    }
}
