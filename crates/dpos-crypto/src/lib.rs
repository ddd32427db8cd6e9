// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DPOS-CRYPTO — hashing, addresses and signature recovery
//
// Keccak-256 hashing, secp256k1 signer recovery with an LRU result cache,
// and the fixed-width Address/Hash types shared by the codec and snapshot
// layers. No signing here: the engine only ever recovers signer identity
// from an already-sealed header; producing the seal is a host concern.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;

pub mod error;
pub mod recovery;

pub use error::CryptoError;
pub use recovery::{recover_signer, SignerCache};

/// A 20-byte account/signer address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 20 {
            return Err(CryptoError::InvalidLength {
                expected: 20,
                got: bytes.len(),
            });
        }
        let mut buf = [0u8; 20];
        buf.copy_from_slice(bytes);
        Ok(Address(buf))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Canonical `0x`-prefixed lower-hex text form.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl Default for Address {
    fn default() -> Self {
        Address::ZERO
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A 32-byte Keccak-256 digest (block hash, seal hash, snapshot id, ...).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash32(pub [u8; 32]);

impl Hash32 {
    pub const ZERO: Hash32 = Hash32([0u8; 32]);

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidLength {
                expected: 32,
                got: bytes.len(),
            });
        }
        let mut buf = [0u8; 32];
        buf.copy_from_slice(bytes);
        Ok(Hash32(buf))
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl Default for Hash32 {
    fn default() -> Self {
        Hash32::ZERO
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Keccak-256 over an arbitrary byte sequence.
pub fn keccak256(data: &[u8]) -> Hash32 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    Hash32(hasher.finalize().into())
}

/// Keccak-256 over the X‖Y coordinates of an uncompressed public key,
/// taking the last 20 bytes — the standard address-from-pubkey derivation.
pub fn address_from_uncompressed_pubkey(pubkey_xy: &[u8; 64]) -> Address {
    let digest = keccak256(pubkey_xy);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&digest.0[12..]);
    Address(addr)
}

/// The single installation-configured alternative hex prefix (besides `0x`/`0X`).
/// Threaded through `ChainConfig` in `dpos-core`; defaulted here for standalone use.
pub const DEFAULT_ALT_HEX_PREFIX: &str = "los";

/// Strip any of `0x`, `0X`, or `alt_prefix` from user-supplied hex text,
/// returning the canonical (prefix-less) hex body.
pub fn strip_hex_prefix<'a>(input: &'a str, alt_prefix: &str) -> &'a str {
    if let Some(rest) = input.strip_prefix("0x") {
        rest
    } else if let Some(rest) = input.strip_prefix("0X") {
        rest
    } else if !alt_prefix.is_empty() {
        input.strip_prefix(alt_prefix).unwrap_or(input)
    } else {
        input
    }
}

/// Render hex text in the canonical `0x`-prefixed in-memory form, regardless
/// of which external prefix (or none) the caller used.
pub fn to_canonical_hex(input: &str, alt_prefix: &str) -> String {
    format!("0x{}", strip_hex_prefix(input, alt_prefix))
}
