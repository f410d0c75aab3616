//! Signed requests and dispatch.
//!
//! A request is an [`Operation`] plus the proofs of everyone who signed
//! it. Each signer signs the operation together with its own nonce:
//!
//! ```text
//! payload = "agent-ledger/op/v1" || json({ nonce, operation })
//! ```
//!
//! The verified signers form the request's [`SignerSet`]. Each operation
//! then states which of them it needs.
//!
//! # Replay protection
//!
//! The ledger keeps a [`SignerNonce`] per signer. A proof is accepted only
//! when its nonce equals the signer's next nonce, and every nonce in the
//! request is bumped in the same transaction as the operation. A request
//! that commits can never run again. A request that fails consumes
//! nothing, so its signers' nonces are still free for a fresh request.

use alloy::signers::local::PrivateKeySigner;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::events::LedgerEvent;
use crate::identity::{
    AgentId, AgentIdentity, SignatureVerifier, SignerId, SignerProof, SignerSet, WalletError,
    WalletLink, sign_payload,
};
use crate::ledger::Ledger;
use crate::reputation::AgentReputation;
use crate::store::{KeyedStore, Record, RecordKey, Txn};
use crate::validation::{TaskHash, ValidationRecord};

/// Domain tag prefixed to every signing payload.
pub const OPERATION_DOMAIN: &[u8] = b"agent-ledger/op/v1";

/// A ledger mutation, as signed by its participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Register {
        owner: SignerId,
        metadata_uri: String,
    },
    UpdateMetadata {
        agent_id: AgentId,
        signer: SignerId,
        metadata_uri: String,
    },
    LinkWallet {
        agent_id: AgentId,
        authority: SignerId,
        new_wallet: SignerId,
    },
    UnlinkWallet {
        agent_id: AgentId,
        wallet: SignerId,
        caller: SignerId,
    },
    TransferAuthority {
        agent_id: AgentId,
        new_authority: SignerId,
    },
    SubmitFeedback {
        agent_id: AgentId,
        reviewer: SignerId,
        positive: bool,
        #[serde(default)]
        comment: String,
    },
    ValidateWork {
        agent_id: AgentId,
        validator: SignerId,
        task_hash: TaskHash,
        passed: bool,
        #[serde(default)]
        evidence_uri: String,
    },
}

#[derive(Serialize)]
struct Envelope<'a> {
    nonce: u64,
    operation: &'a Operation,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::UpdateMetadata { .. } => "update_metadata",
            Self::LinkWallet { .. } => "link_wallet",
            Self::UnlinkWallet { .. } => "unlink_wallet",
            Self::TransferAuthority { .. } => "transfer_authority",
            Self::SubmitFeedback { .. } => "submit_feedback",
            Self::ValidateWork { .. } => "validate_work",
        }
    }

    /// Bytes a participant signs when spending `nonce`.
    pub fn signing_payload(&self, nonce: u64) -> Vec<u8> {
        let envelope = Envelope {
            nonce,
            operation: self,
        };
        let json = serde_json::to_vec(&envelope).expect("operation serialization cannot fail");
        let mut payload = Vec::with_capacity(OPERATION_DOMAIN.len() + json.len());
        payload.extend_from_slice(OPERATION_DOMAIN);
        payload.extend_from_slice(&json);
        payload
    }
}

/// Next nonce a signer must spend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerNonce {
    pub signer: SignerId,
    pub next: u64,
}

impl Record for SignerNonce {
    const NAMESPACE: &'static [u8] = b"nonce";
    const KIND: &'static str = "signer nonce";
}

impl SignerNonce {
    pub fn key_for(signer: &SignerId) -> RecordKey {
        RecordKey::derive(Self::NAMESPACE, &[signer.as_slice()])
    }
}

/// One signer's proof over the operation and the nonce it spends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestProof {
    pub nonce: u64,
    #[serde(flatten)]
    pub proof: SignerProof,
}

impl RequestProof {
    pub fn signer(&self) -> SignerId {
        self.proof.signer
    }
}

/// Sign `operation` with a local key, spending `nonce`.
pub async fn sign_operation(
    signer: &PrivateKeySigner,
    operation: &Operation,
    nonce: u64,
) -> std::result::Result<RequestProof, WalletError> {
    let proof = sign_payload(signer, &operation.signing_payload(nonce)).await?;
    Ok(RequestProof { nonce, proof })
}

/// An operation with the proofs of its signers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedRequest {
    pub operation: Operation,
    #[serde(default)]
    pub proofs: Vec<RequestProof>,
}

impl SignedRequest {
    /// Build a request signed by every `(key, nonce)` in `signers`.
    pub async fn sign(
        operation: Operation,
        signers: &[(&PrivateKeySigner, u64)],
    ) -> std::result::Result<Self, WalletError> {
        let mut proofs = Vec::with_capacity(signers.len());
        for (signer, nonce) in signers {
            proofs.push(sign_operation(signer, &operation, *nonce).await?);
        }
        Ok(Self { operation, proofs })
    }

    /// Verify every proof and collect the proven signers.
    ///
    /// One bad proof fails the whole request with `InvalidSignature`.
    /// Nonces are not checked here; that needs the store.
    pub fn authenticate(&self, verifier: &dyn SignatureVerifier) -> Result<SignerSet> {
        let mut signers = SignerSet::default();
        for RequestProof { nonce, proof } in &self.proofs {
            verifier
                .verify(&self.operation.signing_payload(*nonce), proof)
                .map_err(|e| LedgerError::InvalidSignature {
                    signer: proof.signer,
                    reason: e.to_string(),
                })?;
            signers.insert(proof.signer);
        }
        Ok(signers)
    }
}

/// Check and bump the nonce of every proof in `proofs`.
fn spend_nonces(txn: &mut Txn<'_>, proofs: &[RequestProof]) -> Result<()> {
    for proof in proofs {
        let signer = proof.signer();
        let key = SignerNonce::key_for(&signer);
        let current = txn.get::<SignerNonce>(&key)?;
        let expected = current.as_ref().map_or(0, |n| n.next);
        if proof.nonce != expected {
            return Err(LedgerError::StaleNonce {
                signer,
                expected,
                got: proof.nonce,
            });
        }

        let next = SignerNonce {
            signer,
            next: expected
                .checked_add(1)
                .ok_or(LedgerError::CounterOverflow("nonce"))?,
        };
        if current.is_some() {
            txn.update_if_exists(&key, &next)?;
        } else {
            txn.create_if_absent(&key, &next)?;
        }
    }
    Ok(())
}

/// Result of an executed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Identity(AgentIdentity),
    Linked(WalletLink),
    Unlinked(WalletLink),
    Reputation(AgentReputation),
    Validation(ValidationRecord),
}

impl<S: KeyedStore> Ledger<S> {
    /// Authenticate `request` and run its operation.
    ///
    /// The nonces and the operation commit together or not at all.
    pub fn execute(
        &self,
        verifier: &dyn SignatureVerifier,
        request: &SignedRequest,
    ) -> Result<Outcome> {
        let op = request.operation.name();
        let signers = request.authenticate(verifier).inspect_err(|e| {
            tracing::warn!(op, error = %e, "Request failed authentication")
        })?;
        tracing::debug!(op, signers = signers.len(), "Executing signed request");

        self.commit(op, |txn| {
            spend_nonces(txn, &request.proofs)?;
            self.stage_operation(txn, &signers, request.operation.clone())
        })
    }

    /// Next nonce `signer` must spend.
    pub fn nonce(&self, signer: &SignerId) -> Result<u64> {
        self.store().transact(|txn| {
            Ok(txn
                .get::<SignerNonce>(&SignerNonce::key_for(signer))?
                .map_or(0, |n| n.next))
        })
    }

    fn stage_operation(
        &self,
        txn: &mut Txn<'_>,
        signers: &SignerSet,
        operation: Operation,
    ) -> Result<(Outcome, LedgerEvent)> {
        match operation {
            Operation::Register {
                owner,
                metadata_uri,
            } => self
                .stage_register(txn, signers, owner, metadata_uri)
                .map(|(identity, event)| (Outcome::Identity(identity), event)),
            Operation::UpdateMetadata {
                agent_id,
                signer,
                metadata_uri,
            } => self
                .stage_update_metadata(txn, signers, &agent_id, signer, metadata_uri)
                .map(|(identity, event)| (Outcome::Identity(identity), event)),
            Operation::LinkWallet {
                agent_id,
                authority,
                new_wallet,
            } => self
                .stage_link_wallet(txn, signers, &agent_id, authority, new_wallet)
                .map(|(link, event)| (Outcome::Linked(link), event)),
            Operation::UnlinkWallet {
                agent_id,
                wallet,
                caller,
            } => self
                .stage_unlink_wallet(txn, signers, &agent_id, wallet, caller)
                .map(|(link, event)| (Outcome::Unlinked(link), event)),
            Operation::TransferAuthority {
                agent_id,
                new_authority,
            } => self
                .stage_transfer_authority(txn, signers, &agent_id, new_authority)
                .map(|(identity, event)| (Outcome::Identity(identity), event)),
            Operation::SubmitFeedback {
                agent_id,
                reviewer,
                positive,
                comment,
            } => self
                .stage_submit_feedback(txn, signers, &agent_id, reviewer, positive, comment)
                .map(|(reputation, event)| (Outcome::Reputation(reputation), event)),
            Operation::ValidateWork {
                agent_id,
                validator,
                task_hash,
                passed,
                evidence_uri,
            } => self
                .stage_validate_work(txn, signers, &agent_id, validator, task_hash, passed, evidence_uri)
                .map(|(record, event)| (Outcome::Validation(record), event)),
        }
    }
}
