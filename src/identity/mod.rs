//! Agent identity registry.
//!
//! Provides owner-keyed identity records, the wallets linked to them, and
//! the authority transfer that lets a linked wallet take over.
//!
//! # Architecture
//!
//! Each identity has:
//! - An `owner`: the registering signer. Immutable, and the only seed of
//!   the identity's record key, so the identity stays addressable after
//!   the owner key is lost.
//! - An `authority`: the signer currently allowed to edit metadata and
//!   manage links. Starts as the owner.
//! - Any number of wallet links, each cosigned by the authority of the day
//!   and by the wallet itself. A linked wallet can later claim authority on
//!   its own signature alone; that is the recovery path.
//!
//! ```text
//! agent(owner) ─── authority ──▶ signer
//!      ▲
//!      └── wallet(W1) ── wallet(W2) ...   (one link per wallet, globally)
//! ```

pub mod authority;
pub mod link;
pub mod signer;
pub mod wallet;

pub use link::WalletLink;
pub use signer::{SignerId, SignerSet};
pub use wallet::{Eip191Verifier, SignatureVerifier, SignerProof, WalletError, sign_payload, signer_id};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::events::LedgerEvent;
use crate::ledger::Ledger;
use crate::store::{KeyedStore, Record, RecordKey, Txn};

/// Record key of an identity, derived from its owner.
pub type AgentId = RecordKey;

/// Durable identity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    /// Registering signer. Never changes.
    pub owner: SignerId,

    /// Signer currently empowered to mutate this identity.
    pub authority: SignerId,

    /// Opaque pointer to off-ledger metadata.
    pub metadata_uri: String,

    /// Verification flag. No ledger operation sets it yet.
    pub is_verified: bool,

    pub verified_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Record for AgentIdentity {
    const NAMESPACE: &'static [u8] = b"agent";
    const KIND: &'static str = "agent identity";
}

impl AgentIdentity {
    /// Identity key for `owner`.
    pub fn key_for(owner: &SignerId) -> AgentId {
        RecordKey::derive(Self::NAMESPACE, &[owner.as_slice()])
    }

    /// This identity's own key.
    pub fn agent_id(&self) -> AgentId {
        Self::key_for(&self.owner)
    }

    pub fn is_authority(&self, signer: &SignerId) -> bool {
        self.authority == *signer
    }
}

impl<S: KeyedStore> Ledger<S> {
    /// Register a new identity for `owner`.
    ///
    /// The owner's proof is required. Fails with `AlreadyExists` if the
    /// owner has registered before; the existing record is left alone.
    pub fn register(
        &self,
        signers: &SignerSet,
        owner: SignerId,
        metadata_uri: impl Into<String>,
    ) -> Result<AgentIdentity> {
        let metadata_uri = metadata_uri.into();
        self.commit("register", |txn| {
            self.stage_register(txn, signers, owner, metadata_uri)
        })
    }

    pub(crate) fn stage_register(
        &self,
        txn: &mut Txn<'_>,
        signers: &SignerSet,
        owner: SignerId,
        metadata_uri: String,
    ) -> Result<(AgentIdentity, LedgerEvent)> {
        signers.require(&owner)?;
        self.check_uri("metadata_uri", &metadata_uri)?;

        let now = Utc::now();
        let identity = AgentIdentity {
            owner,
            authority: owner,
            metadata_uri,
            is_verified: false,
            verified_at: None,
            created_at: now,
            updated_at: now,
        };
        let agent_id = identity.agent_id();
        txn.create_if_absent(&agent_id, &identity)?;

        let event = LedgerEvent::AgentRegistered {
            agent_id,
            owner,
            metadata_uri: identity.metadata_uri.clone(),
        };
        Ok((identity, event))
    }

    /// Replace the identity's metadata URI.
    ///
    /// `signer` must be proven and must be the current authority.
    pub fn update_metadata(
        &self,
        signers: &SignerSet,
        agent_id: &AgentId,
        signer: SignerId,
        metadata_uri: impl Into<String>,
    ) -> Result<AgentIdentity> {
        let metadata_uri = metadata_uri.into();
        self.commit("update_metadata", |txn| {
            self.stage_update_metadata(txn, signers, agent_id, signer, metadata_uri)
        })
    }

    pub(crate) fn stage_update_metadata(
        &self,
        txn: &mut Txn<'_>,
        signers: &SignerSet,
        agent_id: &AgentId,
        signer: SignerId,
        metadata_uri: String,
    ) -> Result<(AgentIdentity, LedgerEvent)> {
        signers.require(&signer)?;
        self.check_uri("metadata_uri", &metadata_uri)?;

        let mut identity: AgentIdentity = txn.load(agent_id)?;
        if !identity.is_authority(&signer) {
            return Err(LedgerError::Unauthorized {
                signer,
                action: "update metadata",
            });
        }
        identity.metadata_uri = metadata_uri;
        identity.updated_at = Utc::now();
        txn.update_if_exists(agent_id, &identity)?;

        let event = LedgerEvent::MetadataUpdated {
            agent_id: *agent_id,
            metadata_uri: identity.metadata_uri.clone(),
        };
        Ok((identity, event))
    }

    /// Look up an identity by key.
    pub fn identity(&self, agent_id: &AgentId) -> Result<AgentIdentity> {
        self.store().transact(|txn| txn.load(agent_id))
    }

    /// Look up the identity registered by `owner`.
    pub fn identity_by_owner(&self, owner: &SignerId) -> Result<AgentIdentity> {
        self.identity(&AgentIdentity::key_for(owner))
    }
}
