// Error taxonomy (§7). Names are chosen to match the spec's abstract
// categories; every variant maps to exactly one of header-fatal,
// tx-absorbed, or persistence-abort propagation policy.

use std::fmt;

/// Errors that are fatal to the header under review — the caller drops
/// the block and never retries (§7's header-level propagation policy).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    Structural(&'static str),
    Temporal(&'static str),
    ChainTopology(&'static str),
    Authorisation(&'static str),
    Config(&'static str),
    Decode(String),
}

impl fmt::Display for HeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderError::Structural(msg) => write!(f, "header structural error: {msg}"),
            HeaderError::Temporal(msg) => write!(f, "header temporal error: {msg}"),
            HeaderError::ChainTopology(msg) => write!(f, "chain topology error: {msg}"),
            HeaderError::Authorisation(msg) => write!(f, "authorisation error: {msg}"),
            HeaderError::Config(msg) => write!(f, "config error: {msg}"),
            HeaderError::Decode(msg) => write!(f, "extra-data decode error: {msg}"),
        }
    }
}

impl std::error::Error for HeaderError {}

impl From<dpos_core::header::HeaderError> for HeaderError {
    fn from(e: dpos_core::header::HeaderError) -> Self {
        HeaderError::Decode(e.to_string())
    }
}

/// Ledger/coin errors — mutation preconditions failing deep inside the
/// snapshot's books.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    NotEnoughCoin,
    RootMismatch { expected: String, got: String },
    PersistenceFailed(String),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::NotEnoughCoin => write!(f, "not enough coin"),
            LedgerError::RootMismatch { expected, got } => {
                write!(f, "root mismatch: expected {expected}, got {got}")
            }
            LedgerError::PersistenceFailed(msg) => write!(f, "ledger persistence failed: {msg}"),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<dpos_core::coin::CoinError> for LedgerError {
    fn from(_: dpos_core::coin::CoinError) -> Self {
        LedgerError::NotEnoughCoin
    }
}

/// Top-level engine error, the type every `Engine` facade method returns.
#[derive(Debug)]
pub enum EngineError {
    Header(HeaderError),
    Ledger(LedgerError),
    SideChain(&'static str),
    Persistence(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Header(e) => write!(f, "{e}"),
            EngineError::Ledger(e) => write!(f, "{e}"),
            EngineError::SideChain(msg) => write!(f, "side-chain error: {msg}"),
            EngineError::Persistence(e) => write!(f, "persistence error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<HeaderError> for EngineError {
    fn from(e: HeaderError) -> Self {
        EngineError::Header(e)
    }
}

impl From<LedgerError> for EngineError {
    fn from(e: LedgerError) -> Self {
        EngineError::Ledger(e)
    }
}
