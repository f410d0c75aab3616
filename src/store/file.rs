//! File-backed keyed store.
//!
//! Holds the full record map in memory and persists a JSON snapshot on
//! every committing transaction. The snapshot is written to a temp file and
//! renamed over the previous one, so a crash leaves either the old or the
//! new state on disk, never a torn file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{KeyedStore, RecordKey, Txn, apply_writes};
use crate::error::{Result, StoreError};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    records: &'a BTreeMap<RecordKey, Value>,
}

#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    #[serde(default)]
    records: BTreeMap<RecordKey, Value>,
}

/// Durable store persisted as a single JSON snapshot.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    records: Mutex<BTreeMap<RecordKey, Value>>,
}

impl FileStore {
    /// Open the snapshot at `path`, starting empty if it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> std::result::Result<Self, StoreError> {
        let path = path.into();
        let records = if path.is_file() {
            load_snapshot(&path)?
        } else {
            BTreeMap::new()
        };

        tracing::debug!("Opened ledger snapshot {} ({} records)", path.display(), records.len());

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// Default snapshot location (`~/.agent-ledger/ledger.json`).
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".agent-ledger")
            .join("ledger.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, records: &BTreeMap<RecordKey, Value>) -> std::result::Result<(), StoreError> {
        let snapshot = SnapshotRef {
            version: SNAPSHOT_VERSION,
            records,
        };
        let data = serde_json::to_vec_pretty(&snapshot).map_err(|source| StoreError::Codec {
            kind: "snapshot",
            source,
        })?;
        atomic_write(&self.path, &data)
    }
}

impl KeyedStore for FileStore {
    fn transact<T>(&self, op: impl FnOnce(&mut Txn<'_>) -> Result<T>) -> Result<T> {
        let mut records = self.records.lock();
        let mut txn = Txn::new(&records);
        let out = op(&mut txn)?;
        let writes = txn.into_writes();
        if writes.is_empty() {
            return Ok(out);
        }

        // Persist first; memory only advances once the disk has.
        let mut next = records.clone();
        apply_writes(&mut next, writes);
        self.persist(&next)?;
        *records = next;
        Ok(out)
    }

    fn len(&self) -> usize {
        self.records.lock().len()
    }
}

fn load_snapshot(path: &Path) -> std::result::Result<BTreeMap<RecordKey, Value>, StoreError> {
    let data = std::fs::read(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let snapshot: Snapshot = serde_json::from_slice(&data).map_err(|e| StoreError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(StoreError::Corrupt {
            path: path.to_path_buf(),
            reason: format!("unsupported snapshot version {}", snapshot.version),
        });
    }
    Ok(snapshot.records)
}

/// Atomic write: write to tmp file, then rename.
fn atomic_write(path: &Path, data: &[u8]) -> std::result::Result<(), StoreError> {
    let io_err = |source: std::io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::error::LedgerError;
    use crate::store::Record;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Entry {
        label: String,
    }

    impl Record for Entry {
        const NAMESPACE: &'static [u8] = b"entry";
        const KIND: &'static str = "entry";
    }

    fn entry(label: &str) -> Entry {
        Entry {
            label: label.to_string(),
        }
    }

    #[test]
    fn test_reopen_sees_committed_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.json");
        let key = RecordKey::derive(Entry::NAMESPACE, &[b"one"]);

        {
            let store = FileStore::open(&path).unwrap();
            store
                .transact(|txn| txn.create_if_absent(&key, &entry("first")))
                .unwrap();
        }

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        let loaded: Entry = reopened.transact(|txn| txn.load(&key)).unwrap();
        assert_eq!(loaded, entry("first"));
    }

    #[test]
    fn test_failed_transaction_leaves_disk_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let store = FileStore::open(&path).unwrap();

        let result: Result<()> = store.transact(|txn| {
            txn.create_if_absent(&RecordKey::derive(b"entry", &[b"x"]), &entry("x"))?;
            Err(LedgerError::CounterOverflow("test"))
        });

        assert!(result.is_err());
        assert!(!path.exists());
        assert!(store.is_empty());
    }

    #[test]
    fn test_read_only_transaction_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let store = FileStore::open(&path).unwrap();

        let missing: Option<Entry> = store
            .transact(|txn| txn.get(&RecordKey::derive(b"entry", &[b"nope"])))
            .unwrap();

        assert!(missing.is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_rejects_unknown_snapshot_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, r#"{"version": 99, "records": {}}"#).unwrap();

        let err = FileStore::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
