//! Error types for the ledger.
//!
//! Every failure is a normal outcome of misuse or a lost race. A call that
//! returns an error has committed nothing.

use crate::identity::SignerId;
use crate::store::RecordKey;

/// Errors surfaced by ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The signer is proven but lacks the capability the operation needs.
    #[error("Unauthorized: {signer} may not {action}")]
    Unauthorized {
        signer: SignerId,
        action: &'static str,
    },

    /// A required signer proof is absent from the request.
    #[error("Missing signature from {0}")]
    MissingSignature(SignerId),

    /// A supplied proof did not verify against the request payload.
    #[error("Invalid signature from {signer}: {reason}")]
    InvalidSignature { signer: SignerId, reason: String },

    /// A signed request spent a nonce other than the signer's next one.
    #[error("Stale nonce from {signer}: expected {expected}, got {got}")]
    StaleNonce {
        signer: SignerId,
        expected: u64,
        got: u64,
    },

    /// A create targeted an occupied deterministic key.
    #[error("{kind} already exists at {key}")]
    AlreadyExists { kind: &'static str, key: RecordKey },

    /// A referenced record does not exist.
    #[error("{kind} not found at {key}")]
    NotFound { kind: &'static str, key: RecordKey },

    #[error("{field} is {len} bytes, limit is {max}")]
    UriTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Counter overflow in {0}")]
    CounterOverflow(&'static str),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl LedgerError {
    /// Short stable name for logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "unauthorized",
            Self::MissingSignature(_) => "missing_signature",
            Self::InvalidSignature { .. } => "invalid_signature",
            Self::StaleNonce { .. } => "stale_nonce",
            Self::AlreadyExists { .. } => "already_exists",
            Self::NotFound { .. } => "not_found",
            Self::UriTooLong { .. } => "uri_too_long",
            Self::CounterOverflow(_) => "counter_overflow",
            Self::Store(_) => "store",
        }
    }
}

/// Storage backend errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Codec error for {kind}: {source}")]
    Codec {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt snapshot {path}: {reason}")]
    Corrupt {
        path: std::path::PathBuf,
        reason: String,
    },
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: '{value}'")]
    InvalidEnv { key: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, LedgerError>;
