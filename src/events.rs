//! Committed-state notifications.
//!
//! One event per successful mutation, published after the store commits
//! and in commit order. Failed calls publish nothing.

use serde::Serialize;

use crate::identity::{AgentId, SignerId};
use crate::validation::TaskHash;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    AgentRegistered {
        agent_id: AgentId,
        owner: SignerId,
        metadata_uri: String,
    },
    MetadataUpdated {
        agent_id: AgentId,
        metadata_uri: String,
    },
    WalletLinked {
        agent_id: AgentId,
        wallet: SignerId,
        linked_by: SignerId,
    },
    WalletUnlinked {
        agent_id: AgentId,
        wallet: SignerId,
        removed_by: SignerId,
    },
    AuthorityTransferred {
        agent_id: AgentId,
        previous: SignerId,
        authority: SignerId,
    },
    FeedbackSubmitted {
        agent_id: AgentId,
        reviewer: SignerId,
        positive: bool,
        comment: String,
        new_score: u16,
    },
    WorkValidated {
        agent_id: AgentId,
        validator: SignerId,
        task_hash: TaskHash,
        passed: bool,
        evidence_uri: String,
    },
}

impl LedgerEvent {
    /// Identity the event concerns.
    pub fn agent_id(&self) -> &AgentId {
        match self {
            Self::AgentRegistered { agent_id, .. }
            | Self::MetadataUpdated { agent_id, .. }
            | Self::WalletLinked { agent_id, .. }
            | Self::WalletUnlinked { agent_id, .. }
            | Self::AuthorityTransferred { agent_id, .. }
            | Self::FeedbackSubmitted { agent_id, .. }
            | Self::WorkValidated { agent_id, .. } => agent_id,
        }
    }

    /// Write the audit line for this committed mutation.
    pub(crate) fn audit(&self) {
        match self {
            Self::AgentRegistered {
                agent_id, owner, ..
            } => tracing::info!(target: "audit", op = "register", agent_id = %agent_id, owner = %owner),
            Self::MetadataUpdated { agent_id, .. } => {
                tracing::info!(target: "audit", op = "update_metadata", agent_id = %agent_id)
            }
            Self::WalletLinked {
                agent_id,
                wallet,
                linked_by,
            } => tracing::info!(
                target: "audit",
                op = "link_wallet",
                agent_id = %agent_id,
                wallet = %wallet,
                linked_by = %linked_by,
            ),
            Self::WalletUnlinked {
                agent_id,
                wallet,
                removed_by,
            } => tracing::info!(
                target: "audit",
                op = "unlink_wallet",
                agent_id = %agent_id,
                wallet = %wallet,
                removed_by = %removed_by,
            ),
            Self::AuthorityTransferred {
                agent_id,
                previous,
                authority,
            } => tracing::info!(
                target: "audit",
                op = "transfer_authority",
                agent_id = %agent_id,
                previous = %previous,
                authority = %authority,
            ),
            Self::FeedbackSubmitted {
                agent_id,
                reviewer,
                positive,
                new_score,
                ..
            } => tracing::info!(
                target: "audit",
                op = "submit_feedback",
                agent_id = %agent_id,
                reviewer = %reviewer,
                positive,
                score = new_score,
            ),
            Self::WorkValidated {
                agent_id,
                validator,
                task_hash,
                passed,
                ..
            } => tracing::info!(
                target: "audit",
                op = "validate_work",
                agent_id = %agent_id,
                validator = %validator,
                task_hash = %task_hash,
                passed,
            ),
        }
    }
}
