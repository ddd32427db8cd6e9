// Header codec (C1): the canonical seal-hash and the extra-data envelope
// `[32-byte vanity][encoded HeaderExtra][65-byte signature]`.

use crate::extra::HeaderExtra;
use dpos_crypto::{keccak256, Address, Hash32};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const VANITY_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = 65;
pub const MIN_EXTRA_LEN: usize = VANITY_LEN + SIGNATURE_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    ExtraTooShort { min: usize, got: usize },
    DecodeFailed(String),
}

impl fmt::Display for HeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderError::ExtraTooShort { min, got } => {
                write!(f, "header extra too short: need at least {min} bytes, got {got}")
            }
            HeaderError::DecodeFailed(msg) => write!(f, "header extra decode failed: {msg}"),
        }
    }
}

impl std::error::Error for HeaderError {}

/// The subset of header fields that feed the seal-hash and verifier (§4.1, §4.6).
/// Fields outside this struct (tx root, receipt root, bloom, ...) are owned by
/// the host chain and passed in only where this crate needs their bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawHeader {
    pub parent_hash: Hash32,
    pub uncle_hash: Hash32,
    pub coinbase: Address,
    pub state_root: Hash32,
    pub tx_hash: Hash32,
    pub receipt_hash: Hash32,
    pub bloom: Vec<u8>,
    pub difficulty: u64,
    pub number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub time: u64,
    pub extra: Vec<u8>,
    pub mix_digest: Hash32,
    pub nonce: [u8; 8],
    pub base_fee: Option<u128>,
}

impl RawHeader {
    /// Keccak-256 over the canonical field sequence with the trailing
    /// signature stripped from `extra` — the hash the signature is over.
    ///
    /// Panics if `extra.len() < 65`; callers validate structural length
    /// (§4.6) before ever reaching seal-hash computation.
    pub fn seal_hash(&self) -> Hash32 {
        let signed_extra = &self.extra[..self.extra.len() - SIGNATURE_LEN];
        let mut buf = Vec::with_capacity(256 + signed_extra.len());
        buf.extend_from_slice(&self.parent_hash.0);
        buf.extend_from_slice(&self.uncle_hash.0);
        buf.extend_from_slice(&self.coinbase.0);
        buf.extend_from_slice(&self.state_root.0);
        buf.extend_from_slice(&self.tx_hash.0);
        buf.extend_from_slice(&self.receipt_hash.0);
        buf.extend_from_slice(&self.bloom);
        buf.extend_from_slice(&self.difficulty.to_be_bytes());
        buf.extend_from_slice(&self.number.to_be_bytes());
        buf.extend_from_slice(&self.gas_limit.to_be_bytes());
        buf.extend_from_slice(&self.gas_used.to_be_bytes());
        buf.extend_from_slice(&self.time.to_be_bytes());
        buf.extend_from_slice(signed_extra);
        buf.extend_from_slice(&self.mix_digest.0);
        buf.extend_from_slice(&self.nonce);
        if let Some(fee) = self.base_fee {
            buf.extend_from_slice(&fee.to_be_bytes());
        }
        keccak256(&buf)
    }

    /// Full header hash (includes the signature), the value other blocks
    /// reference as `parent_hash`.
    pub fn hash(&self) -> Hash32 {
        let mut buf = Vec::with_capacity(256 + self.extra.len());
        buf.extend_from_slice(&self.parent_hash.0);
        buf.extend_from_slice(&self.uncle_hash.0);
        buf.extend_from_slice(&self.coinbase.0);
        buf.extend_from_slice(&self.state_root.0);
        buf.extend_from_slice(&self.tx_hash.0);
        buf.extend_from_slice(&self.receipt_hash.0);
        buf.extend_from_slice(&self.bloom);
        buf.extend_from_slice(&self.difficulty.to_be_bytes());
        buf.extend_from_slice(&self.number.to_be_bytes());
        buf.extend_from_slice(&self.gas_limit.to_be_bytes());
        buf.extend_from_slice(&self.gas_used.to_be_bytes());
        buf.extend_from_slice(&self.time.to_be_bytes());
        buf.extend_from_slice(&self.extra);
        buf.extend_from_slice(&self.mix_digest.0);
        buf.extend_from_slice(&self.nonce);
        if let Some(fee) = self.base_fee {
            buf.extend_from_slice(&fee.to_be_bytes());
        }
        keccak256(&buf)
    }

    pub fn vanity(&self) -> Result<&[u8], HeaderError> {
        if self.extra.len() < MIN_EXTRA_LEN {
            return Err(HeaderError::ExtraTooShort {
                min: MIN_EXTRA_LEN,
                got: self.extra.len(),
            });
        }
        Ok(&self.extra[..VANITY_LEN])
    }

    pub fn signature(&self) -> Result<&[u8], HeaderError> {
        if self.extra.len() < MIN_EXTRA_LEN {
            return Err(HeaderError::ExtraTooShort {
                min: MIN_EXTRA_LEN,
                got: self.extra.len(),
            });
        }
        Ok(&self.extra[self.extra.len() - SIGNATURE_LEN..])
    }

    /// The encoded `HeaderExtra` payload bytes, between the vanity prefix
    /// and the trailing signature.
    pub fn payload_bytes(&self) -> Result<&[u8], HeaderError> {
        if self.extra.len() < MIN_EXTRA_LEN {
            return Err(HeaderError::ExtraTooShort {
                min: MIN_EXTRA_LEN,
                got: self.extra.len(),
            });
        }
        Ok(&self.extra[VANITY_LEN..self.extra.len() - SIGNATURE_LEN])
    }

    pub fn decode_extra(&self) -> Result<HeaderExtra, HeaderError> {
        let bytes = self.payload_bytes()?;
        HeaderExtra::decode(bytes).map_err(|e| HeaderError::DecodeFailed(e.to_string()))
    }

    /// Assemble a new `extra` field from a vanity, an encoded payload, and
    /// a signature (or a 65 zero-byte placeholder before signing).
    pub fn assemble_extra(vanity: &[u8; VANITY_LEN], payload: &HeaderExtra, sig: &[u8; SIGNATURE_LEN]) -> Vec<u8> {
        let encoded = payload.encode();
        let mut extra = Vec::with_capacity(VANITY_LEN + encoded.len() + SIGNATURE_LEN);
        extra.extend_from_slice(vanity);
        extra.extend_from_slice(&encoded);
        extra.extend_from_slice(sig);
        extra
    }
}
