//! The ledger handle.
//!
//! `Ledger` owns the injected store and the event feed. Component
//! operations live next to their records (`identity`, `identity::link`,
//! `identity::authority`, `reputation`, `validation`) as `impl` blocks on
//! this type. Each one is written as a stage over a [`Txn`] and goes
//! through [`Ledger::commit`], so it runs inside a single
//! [`KeyedStore::transact`] and a signed request can run its nonce
//! bookkeeping in that same transaction.
//!
//! # Event order
//!
//! `commit` holds the ledger's commit lock from the start of the
//! transaction until the event is on the feed. Mutations through one
//! `Ledger` are therefore published in the order they committed.

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::config::{LedgerConfig, LimitsConfig};
use crate::error::{LedgerError, Result, StoreError};
use crate::events::LedgerEvent;
use crate::store::{AnyStore, KeyedStore, MemoryStore, Txn};

pub struct Ledger<S = MemoryStore> {
    store: S,
    limits: LimitsConfig,
    events: broadcast::Sender<LedgerEvent>,
    commits: Mutex<()>,
}

impl<S: KeyedStore> Ledger<S> {
    pub fn new(store: S, config: &LedgerConfig) -> Self {
        let (events, _) = broadcast::channel(config.events.capacity.max(1));
        Self {
            store,
            limits: config.limits.clone(),
            events,
            commits: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Subscribe to events committed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    /// Run `stage` in one transaction, then audit and publish its event.
    ///
    /// A stage that fails commits nothing and publishes nothing.
    pub(crate) fn commit<T>(
        &self,
        op: &'static str,
        stage: impl FnOnce(&mut Txn<'_>) -> Result<(T, LedgerEvent)>,
    ) -> Result<T> {
        let _order = self.commits.lock();
        let (value, event) = self.store.transact(stage).inspect_err(rejected(op))?;
        event.audit();
        // No subscribers is fine.
        let _ = self.events.send(event);
        Ok(value)
    }

    pub(crate) fn check_uri(&self, field: &'static str, uri: &str) -> Result<()> {
        let max = self.limits.max_uri_len;
        if uri.len() > max {
            return Err(LedgerError::UriTooLong {
                field,
                len: uri.len(),
                max,
            });
        }
        Ok(())
    }
}

impl Ledger<MemoryStore> {
    /// Volatile ledger with default limits.
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new(), &LedgerConfig::default())
    }
}

impl Ledger<AnyStore> {
    /// Open the store named in `config`.
    pub fn open(config: &LedgerConfig) -> std::result::Result<Self, StoreError> {
        let store = AnyStore::open(&config.store)?;
        Ok(Self::new(store, config))
    }
}

impl<S> std::fmt::Debug for Ledger<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("limits", &self.limits)
            .field("subscribers", &self.events.receiver_count())
            .finish_non_exhaustive()
    }
}

/// Log a rejected call at debug level and pass the error through.
fn rejected(op: &'static str) -> impl Fn(&LedgerError) {
    move |err: &LedgerError| {
        tracing::debug!(op, error = %err, kind = err.kind(), "Rejected ledger call")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StoreBackend, StoreConfig};

    #[test]
    fn test_check_uri_bounds() {
        let config = LedgerConfig {
            limits: LimitsConfig { max_uri_len: 8 },
            ..Default::default()
        };
        let ledger = Ledger::new(MemoryStore::new(), &config);

        assert!(ledger.check_uri("metadata_uri", "ipfs://x").is_ok());
        assert!(matches!(
            ledger.check_uri("metadata_uri", "ipfs://xy"),
            Err(LedgerError::UriTooLong { len: 9, max: 8, .. })
        ));
    }

    #[test]
    fn test_open_file_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = LedgerConfig {
            store: StoreConfig {
                backend: StoreBackend::File,
                path: Some(dir.path().join("ledger.json")),
            },
            ..Default::default()
        };

        let ledger = Ledger::open(&config).unwrap();
        assert!(matches!(ledger.store(), AnyStore::File(_)));
        assert!(ledger.store().is_empty());
    }
}
