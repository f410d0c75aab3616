//! Deterministic keyed store.
//!
//! Every record lives at a [`RecordKey`] derived from a namespace tag plus
//! the record's natural key fields, the same way a program-derived address
//! is computed from seeds. Callers never choose addresses; they recompute
//! them. That gives "first writer wins" semantics without an allocator.
//!
//! # Atomicity
//!
//! All access goes through [`KeyedStore::transact`]. The closure sees a
//! [`Txn`] that stages writes over the committed state; the staged writes
//! are applied only when the closure returns `Ok`. A failed call therefore
//! leaves no partial state behind.
//!
//! ```text
//! transact(|txn| {
//!     txn.get / load            -> staged value, else committed value
//!     txn.create_if_absent      -> AlreadyExists if occupied
//!     txn.update_if_exists      -> NotFound if vacant
//!     txn.delete                -> NotFound if vacant
//! })  Ok  => commit write set
//!     Err => drop write set
//! ```

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::collections::BTreeMap;
use std::str::FromStr;

use alloy::primitives::B256;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::{StoreBackend, StoreConfig};
use crate::error::{LedgerError, Result, StoreError};

/// Domain separator mixed into every derived key.
const KEY_DOMAIN: &[u8] = b"agent-ledger/record/v1";

/// Content-derived address of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey(B256);

impl RecordKey {
    /// Derive a key from a namespace tag and an ordered list of seeds.
    ///
    /// Each component is length-prefixed so `["ab", "c"]` and `["a", "bc"]`
    /// never collide.
    pub fn derive(namespace: &[u8], seeds: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(KEY_DOMAIN);
        hasher.update((namespace.len() as u32).to_be_bytes());
        hasher.update(namespace);
        for seed in seeds {
            hasher.update((seed.len() as u32).to_be_bytes());
            hasher.update(seed);
        }
        let digest: [u8; 32] = hasher.finalize().into();
        Self(B256::from(digest))
    }

    pub fn as_b256(&self) -> &B256 {
        &self.0
    }

    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl From<B256> for RecordKey {
    fn from(value: B256) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&alloy::primitives::hex::encode_prefixed(self.0))
    }
}

impl FromStr for RecordKey {
    type Err = <B256 as FromStr>::Err;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        B256::from_str(s).map(Self)
    }
}

// Hex strings on the wire, so keys also work as JSON map keys.
impl Serialize for RecordKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RecordKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_str(&raw).map_err(serde::de::Error::custom)
    }
}

/// A typed record stored under a namespace.
pub trait Record: Serialize + DeserializeOwned {
    /// Namespace tag used as the first derivation component.
    const NAMESPACE: &'static [u8];
    /// Human-readable record kind for errors and logs.
    const KIND: &'static str;
}

/// A staged view over the committed records.
pub struct Txn<'a> {
    committed: &'a BTreeMap<RecordKey, Value>,
    staged: BTreeMap<RecordKey, Option<Value>>,
}

impl<'a> Txn<'a> {
    pub(crate) fn new(committed: &'a BTreeMap<RecordKey, Value>) -> Self {
        Self {
            committed,
            staged: BTreeMap::new(),
        }
    }

    fn current(&self, key: &RecordKey) -> Option<&Value> {
        match self.staged.get(key) {
            Some(staged) => staged.as_ref(),
            None => self.committed.get(key),
        }
    }

    /// Whether any record occupies `key`.
    pub fn contains(&self, key: &RecordKey) -> bool {
        self.current(key).is_some()
    }

    pub fn get<R: Record>(&self, key: &RecordKey) -> Result<Option<R>> {
        self.current(key).map(decode::<R>).transpose()
    }

    /// Like [`Txn::get`], but a vacant key is `NotFound`.
    pub fn load<R: Record>(&self, key: &RecordKey) -> Result<R> {
        self.get(key)?.ok_or(LedgerError::NotFound {
            kind: R::KIND,
            key: *key,
        })
    }

    pub fn create_if_absent<R: Record>(&mut self, key: &RecordKey, record: &R) -> Result<()> {
        if self.contains(key) {
            return Err(LedgerError::AlreadyExists {
                kind: R::KIND,
                key: *key,
            });
        }
        self.staged.insert(*key, Some(encode(record)?));
        Ok(())
    }

    pub fn update_if_exists<R: Record>(&mut self, key: &RecordKey, record: &R) -> Result<()> {
        if !self.contains(key) {
            return Err(LedgerError::NotFound {
                kind: R::KIND,
                key: *key,
            });
        }
        self.staged.insert(*key, Some(encode(record)?));
        Ok(())
    }

    /// Remove the record at `key`, returning what was there.
    pub fn delete<R: Record>(&mut self, key: &RecordKey) -> Result<R> {
        let removed = self.load::<R>(key)?;
        self.staged.insert(*key, None);
        Ok(removed)
    }

    pub(crate) fn into_writes(self) -> BTreeMap<RecordKey, Option<Value>> {
        self.staged
    }
}

fn encode<R: Record>(record: &R) -> Result<Value> {
    serde_json::to_value(record)
        .map_err(|source| StoreError::Codec {
            kind: R::KIND,
            source,
        })
        .map_err(LedgerError::from)
}

fn decode<R: Record>(value: &Value) -> Result<R> {
    serde_json::from_value(value.clone())
        .map_err(|source| StoreError::Codec {
            kind: R::KIND,
            source,
        })
        .map_err(LedgerError::from)
}

pub(crate) fn apply_writes(
    records: &mut BTreeMap<RecordKey, Value>,
    writes: BTreeMap<RecordKey, Option<Value>>,
) {
    for (key, write) in writes {
        match write {
            Some(value) => {
                records.insert(key, value);
            }
            None => {
                records.remove(&key);
            }
        }
    }
}

/// Strongly-consistent storage with all-or-nothing transactions.
pub trait KeyedStore: Send + Sync {
    /// Run `op` atomically. Its staged writes commit only if it returns `Ok`.
    fn transact<T>(&self, op: impl FnOnce(&mut Txn<'_>) -> Result<T>) -> Result<T>;

    /// Number of committed records.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A store selected at runtime from configuration.
#[derive(Debug)]
pub enum AnyStore {
    Memory(MemoryStore),
    File(FileStore),
}

impl AnyStore {
    /// Open the backend named by `config`.
    pub fn open(config: &StoreConfig) -> std::result::Result<Self, StoreError> {
        match config.backend {
            StoreBackend::Memory => Ok(Self::Memory(MemoryStore::default())),
            StoreBackend::File => Ok(Self::File(FileStore::open(config.resolved_path())?)),
        }
    }
}

impl KeyedStore for AnyStore {
    fn transact<T>(&self, op: impl FnOnce(&mut Txn<'_>) -> Result<T>) -> Result<T> {
        match self {
            Self::Memory(store) => store.transact(op),
            Self::File(store) => store.transact(op),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Memory(store) => store.len(),
            Self::File(store) => store.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        value: u32,
    }

    impl Record for Counter {
        const NAMESPACE: &'static [u8] = b"counter";
        const KIND: &'static str = "counter";
    }

    #[test]
    fn test_derive_is_deterministic_and_separated() {
        let a = RecordKey::derive(b"agent", &[b"owner-1"]);
        assert_eq!(a, RecordKey::derive(b"agent", &[b"owner-1"]));
        assert_ne!(a, RecordKey::derive(b"wallet", &[b"owner-1"]));
        assert_ne!(
            RecordKey::derive(b"v", &[b"ab", b"c"]),
            RecordKey::derive(b"v", &[b"a", b"bc"])
        );
    }

    #[test]
    fn test_record_key_hex_round_trip() {
        let key = RecordKey::derive(b"agent", &[b"owner-1"]);
        let text = key.to_string();
        assert!(text.starts_with("0x"));
        assert_eq!(text.len(), 66);
        assert_eq!(text.parse::<RecordKey>().unwrap(), key);

        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{text}\""));
        assert_eq!(serde_json::from_str::<RecordKey>(&json).unwrap(), key);
    }

    #[test]
    fn test_txn_reads_its_own_writes() {
        let committed = BTreeMap::new();
        let key = RecordKey::derive(Counter::NAMESPACE, &[b"a"]);
        let mut txn = Txn::new(&committed);

        assert!(txn.get::<Counter>(&key).unwrap().is_none());
        txn.create_if_absent(&key, &Counter { value: 1 }).unwrap();
        assert_eq!(txn.load::<Counter>(&key).unwrap().value, 1);

        txn.update_if_exists(&key, &Counter { value: 2 }).unwrap();
        assert_eq!(txn.load::<Counter>(&key).unwrap().value, 2);

        let removed = txn.delete::<Counter>(&key).unwrap();
        assert_eq!(removed.value, 2);
        assert!(!txn.contains(&key));
    }

    #[test]
    fn test_txn_primitives_reject_wrong_occupancy() {
        let committed = BTreeMap::new();
        let key = RecordKey::derive(Counter::NAMESPACE, &[b"a"]);
        let mut txn = Txn::new(&committed);

        assert!(matches!(
            txn.update_if_exists(&key, &Counter { value: 1 }),
            Err(LedgerError::NotFound { .. })
        ));
        assert!(matches!(
            txn.delete::<Counter>(&key),
            Err(LedgerError::NotFound { .. })
        ));

        txn.create_if_absent(&key, &Counter { value: 1 }).unwrap();
        assert!(matches!(
            txn.create_if_absent(&key, &Counter { value: 9 }),
            Err(LedgerError::AlreadyExists { kind: "counter", .. })
        ));
        assert_eq!(txn.load::<Counter>(&key).unwrap().value, 1);
    }

    #[test]
    fn test_apply_writes_inserts_and_removes() {
        let key_a = RecordKey::derive(Counter::NAMESPACE, &[b"a"]);
        let key_b = RecordKey::derive(Counter::NAMESPACE, &[b"b"]);
        let mut records = BTreeMap::new();
        records.insert(key_a, serde_json::json!({ "value": 1 }));

        let mut writes = BTreeMap::new();
        writes.insert(key_a, None);
        writes.insert(key_b, Some(serde_json::json!({ "value": 2 })));
        apply_writes(&mut records, writes);

        assert!(!records.contains_key(&key_a));
        assert_eq!(records[&key_b]["value"], 2);
    }
}
