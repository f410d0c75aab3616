//! Identity and authorization ledger for autonomous agents.
//!
//! Each agent gets a durable identity keyed by the signer that registered
//! it, a mutable authority, a set of dual-signed backup wallets that can
//! later claim that authority, a public reputation aggregate, and a
//! replay-protected log of work validations.
//!
//! ```text
//! SignedRequest ──authenticate──▶ SignerSet
//!        │                            │
//!        └──── Ledger::execute ◀──────┘
//!                   │
//!              signer nonces (spent in the same transaction)
//!                   │
//!     identity / link / authority / reputation / validation
//!                   │
//!              KeyedStore::transact  (all-or-nothing)
//!                   │
//!              LedgerEvent broadcast (after commit, in commit order)
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod ledger;
pub mod reputation;
pub mod request;
pub mod store;
pub mod validation;

pub use config::LedgerConfig;
pub use error::{ConfigError, LedgerError, StoreError};
pub use events::LedgerEvent;
pub use identity::{
    AgentId, AgentIdentity, Eip191Verifier, SignatureVerifier, SignerId, SignerProof, SignerSet,
    WalletLink,
};
pub use ledger::Ledger;
pub use reputation::AgentReputation;
pub use request::{Operation, Outcome, RequestProof, SignedRequest, SignerNonce};
pub use store::{AnyStore, FileStore, KeyedStore, MemoryStore, RecordKey};
pub use validation::{TaskHash, ValidationRecord, task_hash};
