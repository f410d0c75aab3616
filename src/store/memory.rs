//! In-process keyed store.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde_json::Value;

use super::{KeyedStore, RecordKey, Txn, apply_writes};
use crate::error::Result;

/// Volatile store backed by an ordered map.
///
/// Transactions hold the map lock for their whole duration, so each call
/// observes and commits a consistent state.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<RecordKey, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyedStore for MemoryStore {
    fn transact<T>(&self, op: impl FnOnce(&mut Txn<'_>) -> Result<T>) -> Result<T> {
        let mut records = self.records.lock();
        let mut txn = Txn::new(&records);
        let out = op(&mut txn)?;
        let writes = txn.into_writes();
        apply_writes(&mut records, writes);
        Ok(out)
    }

    fn len(&self) -> usize {
        self.records.lock().len()
    }
}
