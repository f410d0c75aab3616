//! Validation ledger.
//!
//! Replay-protected attestations of completed work. The record key is
//! derived from `(agent_id, task_hash)`, so the first validator to attest a
//! task wins and the record is never rewritten.

use alloy::primitives::B256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::events::LedgerEvent;
use crate::identity::{AgentId, AgentIdentity, SignerId, SignerSet};
use crate::ledger::Ledger;
use crate::store::{KeyedStore, Record, RecordKey, Txn};

/// 32-byte content hash identifying a task.
pub type TaskHash = B256;

/// SHA-256 of task content.
pub fn task_hash(content: impl AsRef<[u8]>) -> TaskHash {
    let digest: [u8; 32] = Sha256::digest(content.as_ref()).into();
    B256::from(digest)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub agent_id: AgentId,
    pub task_hash: TaskHash,
    pub validator: SignerId,
    pub passed: bool,
    pub evidence_uri: String,
    pub validated_at: DateTime<Utc>,
}

impl Record for ValidationRecord {
    const NAMESPACE: &'static [u8] = b"validation";
    const KIND: &'static str = "validation record";
}

impl ValidationRecord {
    pub fn key_for(agent_id: &AgentId, task_hash: &TaskHash) -> RecordKey {
        RecordKey::derive(Self::NAMESPACE, &[agent_id.as_slice(), task_hash.as_slice()])
    }
}

impl<S: KeyedStore> Ledger<S> {
    /// Attest the outcome of a task performed by an identity.
    ///
    /// Fails with `AlreadyExists` if the task was already attested, whatever
    /// the validator or outcome of the new attempt.
    pub fn validate_work(
        &self,
        signers: &SignerSet,
        agent_id: &AgentId,
        validator: SignerId,
        task_hash: TaskHash,
        passed: bool,
        evidence_uri: impl Into<String>,
    ) -> Result<ValidationRecord> {
        let evidence_uri = evidence_uri.into();
        self.commit("validate_work", |txn| {
            self.stage_validate_work(txn, signers, agent_id, validator, task_hash, passed, evidence_uri)
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn stage_validate_work(
        &self,
        txn: &mut Txn<'_>,
        signers: &SignerSet,
        agent_id: &AgentId,
        validator: SignerId,
        task_hash: TaskHash,
        passed: bool,
        evidence_uri: String,
    ) -> Result<(ValidationRecord, LedgerEvent)> {
        signers.require(&validator)?;
        self.check_uri("evidence_uri", &evidence_uri)?;
        txn.load::<AgentIdentity>(agent_id)?;

        let record = ValidationRecord {
            agent_id: *agent_id,
            task_hash,
            validator,
            passed,
            evidence_uri,
            validated_at: Utc::now(),
        };
        txn.create_if_absent(&ValidationRecord::key_for(agent_id, &task_hash), &record)?;

        let event = LedgerEvent::WorkValidated {
            agent_id: *agent_id,
            validator,
            task_hash,
            passed,
            evidence_uri: record.evidence_uri.clone(),
        };
        Ok((record, event))
    }

    /// The attestation for `(agent_id, task_hash)`.
    pub fn validation(&self, agent_id: &AgentId, task_hash: &TaskHash) -> Result<ValidationRecord> {
        self.store()
            .transact(|txn| txn.load(&ValidationRecord::key_for(agent_id, task_hash)))
    }
}
