//! Main ledger orchestration layer
//!
//! This module ties together the resource store, the event log, storage and
//! metrics. Every state change goes through [`Ledger::execute`], which either
//! applies a transaction's writes and events as a whole or not at all.
//!
//! # Example
//!
//! ```no_run
//! use coin_ledger::{address::ROOT_ADDRESS, genesis, Ledger, Signer, StaticRoles};
//! use std::sync::Arc;
//!
//! fn main() -> coin_ledger::Result<()> {
//!     let mut ledger = Ledger::in_memory(Arc::new(StaticRoles::new()));
//!     let root = Signer::new(ROOT_ADDRESS);
//!
//!     ledger.execute(|txn| {
//!         genesis::initialize(txn, &root)?;
//!         genesis::finish(txn, &root)
//!     })?;
//!
//!     assert_eq!(ledger.version(), 1);
//!     Ok(())
//! }
//! ```

use crate::{
    event::{EventLog, EventSink},
    metrics::Metrics,
    reconfig::NewEpochEvent,
    roles::RoleOracle,
    store::{ChangeSet, ResourceStore, Transaction},
    Config, Result, Storage,
};
use std::fmt;
use std::sync::Arc;

/// Main ledger interface
pub struct Ledger {
    /// Committed resources
    store: ResourceStore,

    /// Committed events
    events: EventLog,

    /// Role oracle handed to every transaction
    roles: Arc<dyn RoleOracle>,

    /// Durable backend, if persistence is enabled
    storage: Option<Arc<Storage>>,

    /// Committed change sets not yet written to storage
    pending: Vec<ChangeSet>,

    /// Write each change set to storage as it commits
    auto_flush: bool,

    /// Metrics, if attached
    metrics: Option<Metrics>,
}

impl Ledger {
    /// Ledger without persistence
    pub fn in_memory(roles: Arc<dyn RoleOracle>) -> Self {
        Self {
            store: ResourceStore::new(),
            events: EventLog::new(),
            roles,
            storage: None,
            pending: Vec::new(),
            auto_flush: true,
            metrics: None,
        }
    }

    /// Open ledger with configuration
    ///
    /// With storage enabled the committed state and event streams are
    /// restored from RocksDB and versioning resumes after the last persisted
    /// version. With batching enabled change sets are only written on
    /// [`Ledger::flush`].
    pub fn open(config: &Config, roles: Arc<dyn RoleOracle>) -> Result<Self> {
        if !config.storage.enabled {
            return Ok(Self::in_memory(roles));
        }

        let storage = Storage::open(config)?;
        let version = storage.latest_version()?;
        let store = ResourceStore::restore(storage.load_resources()?, version);

        let mut events = EventLog::new();
        for event in storage.load_events()? {
            events.emit(event)?;
        }

        tracing::info!(
            version,
            resources = store.len(),
            events = events.len(),
            "Ledger restored"
        );

        Ok(Self {
            store,
            events,
            roles,
            storage: Some(Arc::new(storage)),
            pending: Vec::new(),
            auto_flush: !config.batching.enabled,
            metrics: None,
        })
    }

    /// Attach metrics
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run `f` as one transaction
    ///
    /// Writes and events become visible only if `f` returns `Ok`. On error
    /// the store, the event log and the version are left untouched.
    pub fn execute<T>(&mut self, f: impl FnOnce(&mut Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut txn = Transaction::new(&self.store, self.roles.as_ref());
        match f(&mut txn) {
            Ok(out) => {
                let change_set = txn.into_change_set(self.store.version() + 1);
                self.commit(change_set)?;
                Ok(out)
            }
            Err(err) => {
                drop(txn);
                if let Some(metrics) = &self.metrics {
                    metrics.record_abort();
                }
                tracing::debug!(error = %err, category = ?err.category(), "Transaction aborted");
                Err(err)
            }
        }
    }

    /// Run `f` against the committed state and discard whatever it writes
    pub fn view<T>(&self, f: impl FnOnce(&mut Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut txn = Transaction::new(&self.store, self.roles.as_ref());
        f(&mut txn)
    }

    fn commit(&mut self, change_set: ChangeSet) -> Result<()> {
        // Everything that can fail runs before the change set is persisted
        // or applied
        self.events.check_append(&change_set.events)?;
        let epochs = change_set
            .events
            .iter()
            .filter(|event| event.is::<NewEpochEvent>())
            .map(|event| event.decode::<NewEpochEvent>().map(|e| e.epoch))
            .collect::<Result<Vec<u64>>>()?;

        if self.auto_flush {
            if let Some(storage) = &self.storage {
                storage.write_change_sets(std::slice::from_ref(&change_set))?;
                if let Some(metrics) = &self.metrics {
                    metrics.record_batch_flush(1);
                }
            }
        }

        for event in &change_set.events {
            self.events.emit(event.clone())?;
        }
        self.store.apply(&change_set);

        if let Some(metrics) = &self.metrics {
            metrics.record_commit(change_set.events.len());
            if let Some(epoch) = epochs.last() {
                metrics.set_epoch(*epoch);
            }
        }

        tracing::debug!(
            version = change_set.version,
            writes = change_set.writes.len(),
            events = change_set.events.len(),
            "Transaction committed"
        );

        if self.storage.is_some() && !self.auto_flush {
            self.pending.push(change_set);
        }
        Ok(())
    }

    /// Write buffered change sets to storage in one batch
    ///
    /// Returns the number of change sets written. On failure the buffer is
    /// kept so the next flush retries.
    pub fn flush(&mut self) -> Result<usize> {
        let storage = match &self.storage {
            Some(storage) if !self.pending.is_empty() => storage,
            _ => return Ok(0),
        };

        storage.write_change_sets(&self.pending)?;
        let flushed = self.pending.len();
        self.pending.clear();

        if let Some(metrics) = &self.metrics {
            metrics.record_batch_flush(flushed);
        }
        Ok(flushed)
    }

    /// Flush buffered change sets and close storage
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        match self.storage.take().map(Arc::try_unwrap) {
            Some(Ok(storage)) => storage.close(),
            Some(Err(_)) => {
                tracing::warn!("Storage still shared, closing with the last handle");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Committed change sets waiting for [`Ledger::flush`]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Version of the last committed change set
    pub fn version(&self) -> u64 {
        self.store.version()
    }

    /// Committed resource store
    pub fn store(&self) -> &ResourceStore {
        &self.store
    }

    /// Committed events
    pub fn event_log(&self) -> &EventLog {
        &self.events
    }

    /// Durable backend, if any
    pub fn storage(&self) -> Option<&Arc<Storage>> {
        self.storage.as_ref()
    }
}

impl fmt::Debug for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ledger")
            .field("version", &self.store.version())
            .field("resources", &self.store.len())
            .field("events", &self.events.len())
            .field("persistent", &self.storage.is_some())
            .field("pending", &self.pending.len())
            .finish()
    }
}
