//! Signer proofs over request payloads.
//!
//! A proof is an EIP-191 `personal_sign` signature by a wallet over the
//! canonical bytes of an operation. The ledger never handles private keys;
//! it only recovers the signing address and compares it with the claimed
//! signer. Signing helpers here are for clients and tests.

use alloy::primitives::{Bytes, Signature};
use alloy::signers::local::PrivateKeySigner;
use serde::{Deserialize, Serialize};

use super::SignerId;

/// A claimed signer together with its signature over a request payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerProof {
    pub signer: SignerId,
    /// 65-byte `r || s || v` signature.
    pub signature: Bytes,
}

/// Capability that checks a proof against a payload.
///
/// Injected into the ledger so the signature scheme can be swapped per
/// deployment.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, payload: &[u8], proof: &SignerProof) -> Result<(), WalletError>;
}

/// EIP-191 (`personal_sign`) verifier using secp256k1 address recovery.
#[derive(Debug, Clone, Copy, Default)]
pub struct Eip191Verifier;

impl SignatureVerifier for Eip191Verifier {
    fn verify(&self, payload: &[u8], proof: &SignerProof) -> Result<(), WalletError> {
        let signature = Signature::try_from(proof.signature.as_ref())
            .map_err(|e| WalletError::MalformedSignature(e.to_string()))?;
        let recovered = signature
            .recover_address_from_msg(payload)
            .map_err(|e| WalletError::RecoveryFailed(e.to_string()))?;

        if recovered != proof.signer.address() {
            return Err(WalletError::SignerMismatch {
                claimed: proof.signer,
                recovered: SignerId::from(recovered),
            });
        }
        Ok(())
    }
}

/// Signer identity of a local key.
pub fn signer_id(signer: &PrivateKeySigner) -> SignerId {
    SignerId::from(signer.address())
}

/// Sign `payload` with a local key, producing a proof.
///
/// Uses EIP-191 personal_sign (prefixed message signing).
pub async fn sign_payload(
    signer: &PrivateKeySigner,
    payload: &[u8],
) -> Result<SignerProof, WalletError> {
    use alloy::signers::Signer;

    let signature = signer
        .sign_message(payload)
        .await
        .map_err(|e| WalletError::SigningFailed(e.to_string()))?;

    Ok(SignerProof {
        signer: signer_id(signer),
        signature: Bytes::copy_from_slice(&signature.as_bytes()),
    })
}

/// Wallet and proof errors.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("malformed signature: {0}")]
    MalformedSignature(String),
    #[error("signature recovery failed: {0}")]
    RecoveryFailed(String),
    #[error("signed by {recovered}, not {claimed}")]
    SignerMismatch {
        claimed: SignerId,
        recovered: SignerId,
    },
    #[error("signing failed: {0}")]
    SigningFailed(String),
}
