//! Global resource store and transactions
//!
//! Resources are kept as bincode bytes keyed by `(address, type)`. A
//! [`Transaction`] reads through to the committed store and buffers its own
//! writes and events in an overlay. The overlay is turned into a
//! [`ChangeSet`] only when the transaction succeeds; dropping it discards
//! everything.
//!
//! # Invariants
//!
//! - At most one resource per `(address, type)`
//! - Reads inside a transaction observe that transaction's own writes
//! - A failed transaction leaves no trace in the store or the event log

use crate::{
    event::{ContractEvent, EventHandle, EventPayload},
    roles::RoleOracle,
    types::{AccountAddress, StateKey, TypeTag},
    Error, Result,
};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Value stored under a `(address, type)` key
///
/// Only crate-owned record types implement this. Linear values such as coins
/// and capabilities never do, so they cannot be minted by deserializing
/// bytes.
pub(crate) trait Resource: Serialize + DeserializeOwned {
    /// Type tag the resource is stored under
    fn type_tag() -> TypeTag;
}

/// Single write in a change set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Create or overwrite
    Put(Vec<u8>),
    /// Remove
    Delete,
}

/// Effects of one committed transaction
#[derive(Debug, Clone)]
pub struct ChangeSet {
    /// Store version produced by this change set
    pub version: u64,
    /// Resource writes
    pub writes: BTreeMap<StateKey, WriteOp>,
    /// Events in emission order
    pub events: Vec<ContractEvent>,
}

impl ChangeSet {
    /// Whether the change set carries no writes and no events
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.events.is_empty()
    }
}

/// Committed resource state
#[derive(Debug, Default)]
pub struct ResourceStore {
    resources: BTreeMap<StateKey, Vec<u8>>,
    version: u64,
}

impl ResourceStore {
    /// Create an empty store at version 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from persisted resources
    pub fn restore(resources: impl IntoIterator<Item = (StateKey, Vec<u8>)>, version: u64) -> Self {
        Self {
            resources: resources.into_iter().collect(),
            version,
        }
    }

    /// Version of the last applied change set
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of stored resources
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the store holds no resources
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Raw bytes of a resource
    pub fn get_bytes(&self, key: &StateKey) -> Option<&[u8]> {
        self.resources.get(key).map(Vec::as_slice)
    }

    /// Iterate all resources in key order
    pub fn iter(&self) -> impl Iterator<Item = (&StateKey, &[u8])> {
        self.resources.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Apply a committed change set
    pub fn apply(&mut self, change_set: &ChangeSet) {
        for (key, op) in &change_set.writes {
            match op {
                WriteOp::Put(bytes) => {
                    self.resources.insert(key.clone(), bytes.clone());
                }
                WriteOp::Delete => {
                    self.resources.remove(key);
                }
            }
        }
        self.version = change_set.version;
    }
}

/// In-flight transaction against the store
pub struct Transaction<'a> {
    base: &'a ResourceStore,
    roles: &'a dyn RoleOracle,
    writes: BTreeMap<StateKey, WriteOp>,
    events: Vec<ContractEvent>,
}

impl fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("base_version", &self.base.version())
            .field("writes", &self.writes.len())
            .field("events", &self.events.len())
            .finish()
    }
}

impl<'a> Transaction<'a> {
    /// Start a transaction over the committed store
    pub fn new(base: &'a ResourceStore, roles: &'a dyn RoleOracle) -> Self {
        Self {
            base,
            roles,
            writes: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    /// Role oracle for authorization checks
    pub fn roles(&self) -> &dyn RoleOracle {
        self.roles
    }

    /// Events emitted so far
    pub fn pending_events(&self) -> &[ContractEvent] {
        &self.events
    }

    /// Number of buffered writes
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    fn read_bytes(&self, key: &StateKey) -> Option<&[u8]> {
        match self.writes.get(key) {
            Some(WriteOp::Put(bytes)) => Some(bytes.as_slice()),
            Some(WriteOp::Delete) => None,
            None => self.base.get_bytes(key),
        }
    }

    fn key_for<R: Resource>(address: AccountAddress) -> StateKey {
        StateKey::new(address, R::type_tag())
    }

    pub(crate) fn exists<R: Resource>(&self, address: AccountAddress) -> bool {
        self.read_bytes(&Self::key_for::<R>(address)).is_some()
    }

    pub(crate) fn try_get<R: Resource>(&self, address: AccountAddress) -> Result<Option<R>> {
        match self.read_bytes(&Self::key_for::<R>(address)) {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn get<R: Resource>(&self, address: AccountAddress) -> Result<R> {
        self.try_get(address)?
            .ok_or_else(|| Error::NotPublished(Self::key_for::<R>(address).to_string()))
    }

    /// Publish a new resource; fails if one is already there
    pub(crate) fn move_to<R: Resource>(&mut self, address: AccountAddress, resource: &R) -> Result<()> {
        let key = Self::key_for::<R>(address);
        if self.read_bytes(&key).is_some() {
            return Err(Error::AlreadyPublished(key.to_string()));
        }
        self.writes.insert(key, WriteOp::Put(bincode::serialize(resource)?));
        Ok(())
    }

    /// Overwrite an existing resource
    pub(crate) fn save<R: Resource>(&mut self, address: AccountAddress, resource: &R) -> Result<()> {
        let key = Self::key_for::<R>(address);
        if self.read_bytes(&key).is_none() {
            return Err(Error::NotPublished(key.to_string()));
        }
        self.writes.insert(key, WriteOp::Put(bincode::serialize(resource)?));
        Ok(())
    }

    /// Remove and return a resource
    pub(crate) fn move_from<R: Resource>(&mut self, address: AccountAddress) -> Result<R> {
        let resource = self.get::<R>(address)?;
        self.writes.insert(Self::key_for::<R>(address), WriteOp::Delete);
        Ok(resource)
    }

    /// Read-modify-write of a resource
    pub(crate) fn modify<R, T>(
        &mut self,
        address: AccountAddress,
        f: impl FnOnce(&mut R) -> Result<T>,
    ) -> Result<T>
    where
        R: Resource,
    {
        let mut resource = self.get::<R>(address)?;
        let out = f(&mut resource)?;
        self.save(address, &resource)?;
        Ok(out)
    }

    /// Append an event to the stream behind `handle`
    pub(crate) fn emit_event<E: EventPayload>(&mut self, handle: &mut EventHandle, payload: &E) -> Result<()> {
        let event = ContractEvent::new(
            *handle.key(),
            handle.count(),
            E::type_tag(),
            bincode::serialize(payload)?,
        );
        handle.bump();
        self.events.push(event);
        Ok(())
    }

    /// Finish the transaction and hand back its effects
    pub fn into_change_set(self, version: u64) -> ChangeSet {
        ChangeSet {
            version,
            writes: self.writes,
            events: self.events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::StaticRoles;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Counter {
        value: u64,
    }

    impl Resource for Counter {
        fn type_tag() -> TypeTag {
            TypeTag::new("Test", "Counter")
        }
    }

    fn addr() -> AccountAddress {
        AccountAddress::from_u128(0xC0FFEE)
    }

    #[test]
    fn test_move_to_and_read_own_write() {
        let store = ResourceStore::new();
        let roles = StaticRoles::new();
        let mut txn = Transaction::new(&store, &roles);

        assert!(!txn.exists::<Counter>(addr()));
        txn.move_to(addr(), &Counter { value: 1 }).unwrap();
        assert!(txn.exists::<Counter>(addr()));
        assert_eq!(txn.get::<Counter>(addr()).unwrap().value, 1);

        let err = txn.move_to(addr(), &Counter { value: 2 }).unwrap_err();
        assert!(matches!(err, Error::AlreadyPublished(_)));
    }

    #[test]
    fn test_apply_change_set() {
        let mut store = ResourceStore::new();
        let roles = StaticRoles::new();

        let mut txn = Transaction::new(&store, &roles);
        txn.move_to(addr(), &Counter { value: 7 }).unwrap();
        let change_set = txn.into_change_set(1);
        store.apply(&change_set);

        assert_eq!(store.version(), 1);
        assert_eq!(store.len(), 1);

        let mut txn = Transaction::new(&store, &roles);
        txn.modify::<Counter, _>(addr(), |c| {
            c.value += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(txn.get::<Counter>(addr()).unwrap().value, 8);
        let removed: Counter = txn.move_from(addr()).unwrap();
        assert_eq!(removed.value, 8);
        assert!(!txn.exists::<Counter>(addr()));

        let change_set = txn.into_change_set(2);
        store.apply(&change_set);
        assert!(store.is_empty());
    }

    #[test]
    fn test_dropped_transaction_leaves_store_untouched() {
        let store = ResourceStore::new();
        let roles = StaticRoles::new();
        {
            let mut txn = Transaction::new(&store, &roles);
            txn.move_to(addr(), &Counter { value: 1 }).unwrap();
            assert_eq!(txn.pending_writes(), 1);
        }
        assert!(store.is_empty());
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn test_missing_resource() {
        let store = ResourceStore::new();
        let roles = StaticRoles::new();
        let mut txn = Transaction::new(&store, &roles);

        assert!(matches!(txn.get::<Counter>(addr()), Err(Error::NotPublished(_))));
        assert!(matches!(
            txn.save(addr(), &Counter { value: 0 }),
            Err(Error::NotPublished(_))
        ));
        assert!(txn.try_get::<Counter>(addr()).unwrap().is_none());
    }
}
