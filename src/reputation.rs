//! Reputation ledger.
//!
//! Public feedback aggregate, one per identity, created on first feedback.
//! Any proven signer may submit. Submissions are not deduplicated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::events::LedgerEvent;
use crate::identity::{AgentId, AgentIdentity, SignerId, SignerSet};
use crate::ledger::Ledger;
use crate::store::{KeyedStore, Record, RecordKey, Txn};

/// Score of an identity whose every interaction was positive.
pub const MAX_SCORE: u16 = 10_000;

/// Feedback aggregate for one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentReputation {
    pub agent_id: AgentId,
    pub total_interactions: u64,
    pub positive_feedback: u64,
    pub negative_feedback: u64,
    /// Positive share in basis points, rounded down.
    pub reputation_score: u16,
    pub last_updated: DateTime<Utc>,
}

impl Record for AgentReputation {
    const NAMESPACE: &'static [u8] = b"reputation";
    const KIND: &'static str = "agent reputation";
}

impl AgentReputation {
    pub fn key_for(agent_id: &AgentId) -> RecordKey {
        RecordKey::derive(Self::NAMESPACE, &[agent_id.as_slice()])
    }

    /// Empty aggregate, as it exists before the first feedback.
    pub fn new(agent_id: AgentId, now: DateTime<Utc>) -> Self {
        Self {
            agent_id,
            total_interactions: 0,
            positive_feedback: 0,
            negative_feedback: 0,
            reputation_score: 0,
            last_updated: now,
        }
    }

    /// Count one interaction and recompute the score.
    pub fn record(&mut self, positive: bool, now: DateTime<Utc>) -> Result<()> {
        let total = self
            .total_interactions
            .checked_add(1)
            .ok_or(LedgerError::CounterOverflow("total_interactions"))?;
        if positive {
            self.positive_feedback = self
                .positive_feedback
                .checked_add(1)
                .ok_or(LedgerError::CounterOverflow("positive_feedback"))?;
        } else {
            self.negative_feedback = self
                .negative_feedback
                .checked_add(1)
                .ok_or(LedgerError::CounterOverflow("negative_feedback"))?;
        }
        self.total_interactions = total;
        self.reputation_score = score(self.positive_feedback, self.total_interactions);
        self.last_updated = now;
        Ok(())
    }
}

/// `floor(positive * 10000 / total)`, or 0 with no interactions.
pub fn score(positive: u64, total: u64) -> u16 {
    if total == 0 {
        return 0;
    }
    let bps = u128::from(positive) * u128::from(MAX_SCORE) / u128::from(total);
    // positive <= total keeps this within MAX_SCORE.
    u16::try_from(bps).unwrap_or(MAX_SCORE).min(MAX_SCORE)
}

impl<S: KeyedStore> Ledger<S> {
    /// Record one piece of feedback about an identity.
    ///
    /// `comment` goes out on the event feed only.
    pub fn submit_feedback(
        &self,
        signers: &SignerSet,
        agent_id: &AgentId,
        reviewer: SignerId,
        positive: bool,
        comment: impl Into<String>,
    ) -> Result<AgentReputation> {
        let comment = comment.into();
        self.commit("submit_feedback", |txn| {
            self.stage_submit_feedback(txn, signers, agent_id, reviewer, positive, comment)
        })
    }

    pub(crate) fn stage_submit_feedback(
        &self,
        txn: &mut Txn<'_>,
        signers: &SignerSet,
        agent_id: &AgentId,
        reviewer: SignerId,
        positive: bool,
        comment: String,
    ) -> Result<(AgentReputation, LedgerEvent)> {
        let key = AgentReputation::key_for(agent_id);

        signers.require(&reviewer)?;
        txn.load::<AgentIdentity>(agent_id)?;

        let now = Utc::now();
        let existing = txn.get::<AgentReputation>(&key)?;
        let created = existing.is_none();
        let mut reputation = existing.unwrap_or_else(|| AgentReputation::new(*agent_id, now));
        reputation.record(positive, now)?;

        if created {
            txn.create_if_absent(&key, &reputation)?;
        } else {
            txn.update_if_exists(&key, &reputation)?;
        }

        let event = LedgerEvent::FeedbackSubmitted {
            agent_id: *agent_id,
            reviewer,
            positive,
            comment,
            new_score: reputation.reputation_score,
        };
        Ok((reputation, event))
    }

    /// Current aggregate, or `None` before any feedback.
    pub fn reputation(&self, agent_id: &AgentId) -> Result<Option<AgentReputation>> {
        self.store()
            .transact(|txn| txn.get(&AgentReputation::key_for(agent_id)))
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::Address;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;

    fn signer(byte: u8) -> SignerId {
        SignerId::new(Address::repeat_byte(byte))
    }

    fn signed_by(ids: &[SignerId]) -> SignerSet {
        SignerSet::trusted(ids.iter().copied())
    }

    #[test]
    fn test_score_rounds_down() {
        assert_eq!(score(0, 0), 0);
        assert_eq!(score(1, 1), 10_000);
        assert_eq!(score(1, 2), 5_000);
        assert_eq!(score(1, 3), 3_333);
        assert_eq!(score(2, 3), 6_666);
        assert_eq!(score(0, 7), 0);
        assert_eq!(score(u64::MAX, u64::MAX), 10_000);
    }

    #[test]
    fn test_feedback_creates_then_updates_aggregate() {
        let ledger = Ledger::in_memory();
        let (owner, reviewer) = (signer(1), signer(2));
        let agent_id = ledger
            .register(&signed_by(&[owner]), owner, "https://agent")
            .unwrap()
            .agent_id();
        assert_eq!(ledger.reputation(&agent_id).unwrap(), None);

        let first = ledger
            .submit_feedback(&signed_by(&[reviewer]), &agent_id, reviewer, true, "great")
            .unwrap();
        assert_eq!(first.total_interactions, 1);
        assert_eq!(first.reputation_score, 10_000);

        let second = ledger
            .submit_feedback(&signed_by(&[reviewer]), &agent_id, reviewer, false, "meh")
            .unwrap();
        assert_eq!(second.total_interactions, 2);
        assert_eq!(second.positive_feedback, 1);
        assert_eq!(second.negative_feedback, 1);
        assert_eq!(second.reputation_score, 5_000);
        assert_eq!(ledger.reputation(&agent_id).unwrap(), Some(second));
    }

    #[test]
    fn test_feedback_needs_identity_and_reviewer_proof() {
        let ledger = Ledger::in_memory();
        let (owner, reviewer) = (signer(1), signer(2));

        let err = ledger
            .submit_feedback(
                &signed_by(&[reviewer]),
                &AgentIdentity::key_for(&owner),
                reviewer,
                true,
                "",
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { kind: "agent identity", .. }));

        let agent_id = ledger
            .register(&signed_by(&[owner]), owner, "https://agent")
            .unwrap()
            .agent_id();
        let err = ledger
            .submit_feedback(&SignerSet::default(), &agent_id, reviewer, true, "")
            .unwrap_err();
        assert!(matches!(err, LedgerError::MissingSignature(_)));
        assert_eq!(ledger.reputation(&agent_id).unwrap(), None);
    }

    #[test]
    fn test_record_overflow_leaves_aggregate_unchanged() {
        let mut reputation = AgentReputation::new(AgentIdentity::key_for(&signer(1)), Utc::now());
        reputation.total_interactions = u64::MAX;
        reputation.positive_feedback = u64::MAX;
        let before = reputation.clone();

        let err = reputation.record(true, Utc::now()).unwrap_err();
        assert!(matches!(err, LedgerError::CounterOverflow("total_interactions")));
        assert_eq!(reputation, before);
    }

    proptest! {
        #[test]
        fn prop_counters_and_score_stay_consistent(votes in prop::collection::vec(any::<bool>(), 1..64)) {
            let mut reputation = AgentReputation::new(AgentIdentity::key_for(&signer(1)), Utc::now());
            for positive in &votes {
                reputation.record(*positive, Utc::now()).unwrap();
            }

            let positives = votes.iter().filter(|v| **v).count() as u64;
            prop_assert_eq!(reputation.total_interactions, votes.len() as u64);
            prop_assert_eq!(reputation.positive_feedback, positives);
            prop_assert_eq!(
                reputation.total_interactions,
                reputation.positive_feedback + reputation.negative_feedback
            );
            prop_assert_eq!(
                u64::from(reputation.reputation_score),
                positives * 10_000 / votes.len() as u64
            );
            prop_assert!(reputation.reputation_score <= MAX_SCORE);
        }
    }
}
