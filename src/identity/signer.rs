//! Signer identities and request-scoped signer sets.

use std::collections::BTreeSet;
use std::str::FromStr;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};

/// A signer identity: the Ethereum address of a secp256k1 key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignerId(Address);

impl SignerId {
    pub const fn new(address: Address) -> Self {
        Self(address)
    }

    pub fn address(&self) -> Address {
        self.0
    }

    /// Raw 20 address bytes, used as a key derivation seed.
    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl From<Address> for SignerId {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

impl std::fmt::Display for SignerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.to_checksum(None))
    }
}

impl FromStr for SignerId {
    type Err = <Address as FromStr>::Err;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Address::from_str(s).map(Self)
    }
}

/// The set of signers whose proofs were verified for one request.
///
/// Operations declare what they need from it ("authority present AND new
/// wallet present") instead of verifying signatures inline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignerSet(BTreeSet<SignerId>);

impl SignerSet {
    /// Build a set from signers the caller has already verified.
    pub fn trusted(signers: impl IntoIterator<Item = SignerId>) -> Self {
        Self(signers.into_iter().collect())
    }

    pub fn contains(&self, signer: &SignerId) -> bool {
        self.0.contains(signer)
    }

    /// Fail with `MissingSignature` unless `signer` is proven.
    pub fn require(&self, signer: &SignerId) -> Result<()> {
        if self.contains(signer) {
            Ok(())
        } else {
            Err(LedgerError::MissingSignature(*signer))
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SignerId> {
        self.0.iter()
    }

    pub(crate) fn insert(&mut self, signer: SignerId) {
        self.0.insert(signer);
    }
}

impl FromIterator<SignerId> for SignerSet {
    fn from_iter<I: IntoIterator<Item = SignerId>>(iter: I) -> Self {
        Self::trusted(iter)
    }
}
