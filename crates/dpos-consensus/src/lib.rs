// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DPOS-CONSENSUS — the delegated proof-of-stake engine
//
// Ledgers (C3/C4), the coin/snapshot state machine (C5/C6), the custom-tx
// interpreter (C7), signer-queue election (C8), header verification (C9),
// block finalization (C10), scheduled pay-outs (C11), and the `Engine`
// facade (C12) a host chain drives.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub mod elector;
pub mod engine;
pub mod error;
pub mod finalizer;
pub mod flow_ledger;
pub mod interpreter;
pub mod ledger;
pub mod payout;
pub mod snapshot;
pub mod verifier;

pub use engine::Engine;
pub use error::{EngineError, HeaderError, LedgerError};
pub use interpreter::CustomTx;
pub use snapshot::Snapshot;
