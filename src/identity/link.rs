//! Wallet links.
//!
//! A link binds one wallet to one identity. The record is keyed by the
//! wallet alone, so a wallet can serve at most one identity at a time.
//! Creating a link needs both the current authority and the new wallet to
//! have signed; either party may remove it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AgentId, AgentIdentity, SignerId, SignerSet};
use crate::error::{LedgerError, Result};
use crate::events::LedgerEvent;
use crate::ledger::Ledger;
use crate::store::{KeyedStore, Record, RecordKey, Txn};

/// Binding between a wallet and an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletLink {
    pub agent_id: AgentId,
    pub wallet: SignerId,
    /// Authority that approved the link.
    pub linked_by: SignerId,
    pub linked_at: DateTime<Utc>,
}

impl Record for WalletLink {
    const NAMESPACE: &'static [u8] = b"wallet";
    const KIND: &'static str = "wallet link";
}

impl WalletLink {
    pub fn key_for(wallet: &SignerId) -> RecordKey {
        RecordKey::derive(Self::NAMESPACE, &[wallet.as_slice()])
    }
}

impl<S: KeyedStore> Ledger<S> {
    /// Link `new_wallet` to the identity.
    ///
    /// Checks run in a fixed order so the reported error is stable:
    /// authority proof, identity lookup, authority match, wallet proof,
    /// then link creation.
    pub fn link_wallet(
        &self,
        signers: &SignerSet,
        agent_id: &AgentId,
        authority: SignerId,
        new_wallet: SignerId,
    ) -> Result<WalletLink> {
        self.commit("link_wallet", |txn| {
            self.stage_link_wallet(txn, signers, agent_id, authority, new_wallet)
        })
    }

    /// Remove the link for `wallet`.
    ///
    /// `caller` must be proven and be either the identity's authority or the
    /// linked wallet itself. A link that belongs to another identity is
    /// reported as `NotFound` for this one. Returns the removed link.
    pub fn unlink_wallet(
        &self,
        signers: &SignerSet,
        agent_id: &AgentId,
        wallet: SignerId,
        caller: SignerId,
    ) -> Result<WalletLink> {
        self.commit("unlink_wallet", |txn| {
            self.stage_unlink_wallet(txn, signers, agent_id, wallet, caller)
        })
    }

    /// The link record for `wallet`.
    pub fn wallet_link(&self, wallet: &SignerId) -> Result<WalletLink> {
        self.store()
            .transact(|txn| txn.load(&WalletLink::key_for(wallet)))
    }

    /// Identity that `wallet` is linked to.
    pub fn resolve_wallet(&self, wallet: &SignerId) -> Result<(AgentId, AgentIdentity)> {
        let (link, identity) = self.resolve_link(wallet)?;
        Ok((link.agent_id, identity))
    }

    /// The link for `wallet` and the identity it points at, read together.
    pub fn resolve_link(&self, wallet: &SignerId) -> Result<(WalletLink, AgentIdentity)> {
        self.store().transact(|txn| {
            let link: WalletLink = txn.load(&WalletLink::key_for(wallet))?;
            let identity: AgentIdentity = txn.load(&link.agent_id)?;
            Ok((link, identity))
        })
    }

    pub(crate) fn stage_link_wallet(
        &self,
        txn: &mut Txn<'_>,
        signers: &SignerSet,
        agent_id: &AgentId,
        authority: SignerId,
        new_wallet: SignerId,
    ) -> Result<(WalletLink, LedgerEvent)> {
        signers.require(&authority)?;
        let identity: AgentIdentity = txn.load(agent_id)?;
        if !identity.is_authority(&authority) {
            return Err(LedgerError::Unauthorized {
                signer: authority,
                action: "link wallet",
            });
        }
        signers.require(&new_wallet)?;

        let link = WalletLink {
            agent_id: *agent_id,
            wallet: new_wallet,
            linked_by: authority,
            linked_at: Utc::now(),
        };
        txn.create_if_absent(&WalletLink::key_for(&new_wallet), &link)?;

        let event = LedgerEvent::WalletLinked {
            agent_id: *agent_id,
            wallet: new_wallet,
            linked_by: authority,
        };
        Ok((link, event))
    }

    pub(crate) fn stage_unlink_wallet(
        &self,
        txn: &mut Txn<'_>,
        signers: &SignerSet,
        agent_id: &AgentId,
        wallet: SignerId,
        caller: SignerId,
    ) -> Result<(WalletLink, LedgerEvent)> {
        let link_key = WalletLink::key_for(&wallet);

        signers.require(&caller)?;
        let identity: AgentIdentity = txn.load(agent_id)?;
        let link: WalletLink = txn.load(&link_key)?;
        if link.agent_id != *agent_id {
            return Err(LedgerError::NotFound {
                kind: WalletLink::KIND,
                key: link_key,
            });
        }
        if !identity.is_authority(&caller) && caller != wallet {
            return Err(LedgerError::Unauthorized {
                signer: caller,
                action: "unlink wallet",
            });
        }
        let removed = txn.delete::<WalletLink>(&link_key)?;

        let event = LedgerEvent::WalletUnlinked {
            agent_id: *agent_id,
            wallet,
            removed_by: caller,
        };
        Ok((removed, event))
    }
}
