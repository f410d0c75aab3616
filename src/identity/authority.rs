//! Authority transfer.
//!
//! The recovery path: a wallet linked while the old authority was still
//! reachable claims authority with its own signature alone. The identity is
//! always found through its owner-derived key, so the claim works even when
//! the owner and current authority keys are both gone.

use chrono::Utc;

use super::{AgentId, AgentIdentity, SignerId, SignerSet, WalletLink};
use crate::error::{LedgerError, Result};
use crate::events::LedgerEvent;
use crate::ledger::Ledger;
use crate::store::{KeyedStore, Record, Txn};

impl<S: KeyedStore> Ledger<S> {
    /// Make `new_authority` the identity's authority.
    ///
    /// Requires only `new_authority`'s proof and a live link binding that
    /// wallet to this identity. Fails with `NotFound` when no such link
    /// exists. `owner` is never touched.
    pub fn transfer_authority(
        &self,
        signers: &SignerSet,
        agent_id: &AgentId,
        new_authority: SignerId,
    ) -> Result<AgentIdentity> {
        self.commit("transfer_authority", |txn| {
            self.stage_transfer_authority(txn, signers, agent_id, new_authority)
        })
    }

    pub(crate) fn stage_transfer_authority(
        &self,
        txn: &mut Txn<'_>,
        signers: &SignerSet,
        agent_id: &AgentId,
        new_authority: SignerId,
    ) -> Result<(AgentIdentity, LedgerEvent)> {
        let link_key = WalletLink::key_for(&new_authority);

        signers.require(&new_authority)?;
        let mut identity: AgentIdentity = txn.load(agent_id)?;

        match txn.get::<WalletLink>(&link_key)? {
            Some(link) if link.agent_id == *agent_id && link.wallet == new_authority => {}
            _ => {
                return Err(LedgerError::NotFound {
                    kind: WalletLink::KIND,
                    key: link_key,
                });
            }
        }

        let previous = identity.authority;
        identity.authority = new_authority;
        identity.updated_at = Utc::now();
        txn.update_if_exists(agent_id, &identity)?;

        let event = LedgerEvent::AuthorityTransferred {
            agent_id: *agent_id,
            previous,
            authority: new_authority,
        };
        Ok((identity, event))
    }
}
