//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `resources` - Committed resource bytes (key: address || type tag)
//! - `events` - Event streams (key: event key || sequence number)
//! - `meta` - Latest committed version
//!
//! Every call to [`Storage::write_change_sets`] is a single `WriteBatch`, so a
//! crash never leaves half a transaction on disk.

use crate::{
    error::{Error, Result},
    event::{ContractEvent, EventKey},
    store::{ChangeSet, WriteOp},
    types::StateKey,
    Config,
};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB,
};
use std::sync::Arc;

/// Column family names
const CF_RESOURCES: &str = "resources";
const CF_EVENTS: &str = "events";
const CF_META: &str = "meta";

const KEY_LATEST_VERSION: &[u8] = b"latest_version";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").field("path", &self.db.path()).finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.storage.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.storage.max_write_buffer_number);

        if config.storage.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_RESOURCES, Self::cf_options_resources()),
            ColumnFamilyDescriptor::new(CF_EVENTS, Self::cf_options_events()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened RocksDB");

        Ok(Self { db: Arc::new(db) })
    }

    fn cf_options_resources() -> Options {
        let mut opts = Options::default();
        // Resources are read on every restore, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_events() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    fn event_storage_key(key: &EventKey, sequence_number: u64) -> Vec<u8> {
        let mut bytes = key.to_bytes();
        bytes.extend_from_slice(&sequence_number.to_be_bytes());
        bytes
    }

    /// Persist change sets atomically, in order
    pub fn write_change_sets(&self, change_sets: &[ChangeSet]) -> Result<()> {
        let last = match change_sets.last() {
            Some(last) => last.version,
            None => return Ok(()),
        };

        let cf_resources = self.cf_handle(CF_RESOURCES)?;
        let cf_events = self.cf_handle(CF_EVENTS)?;
        let cf_meta = self.cf_handle(CF_META)?;

        let mut batch = WriteBatch::default();
        let mut event_count = 0usize;

        for change_set in change_sets {
            for (key, op) in &change_set.writes {
                match op {
                    WriteOp::Put(bytes) => batch.put_cf(&cf_resources, key.to_bytes(), bytes),
                    WriteOp::Delete => batch.delete_cf(&cf_resources, key.to_bytes()),
                }
            }
            for event in &change_set.events {
                let key = Self::event_storage_key(event.key(), event.sequence_number());
                batch.put_cf(&cf_events, key, bincode::serialize(event)?);
                event_count += 1;
            }
        }
        batch.put_cf(&cf_meta, KEY_LATEST_VERSION, last.to_be_bytes());

        self.db.write(batch)?;

        tracing::debug!(
            change_sets = change_sets.len(),
            events = event_count,
            version = last,
            "Change sets persisted"
        );
        Ok(())
    }

    /// Latest persisted version, 0 for a fresh database
    pub fn latest_version(&self) -> Result<u64> {
        let cf = self.cf_handle(CF_META)?;
        match self.db.get_cf(&cf, KEY_LATEST_VERSION)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Storage("corrupt latest version".to_string()))?;
                Ok(u64::from_be_bytes(raw))
            }
            None => Ok(0),
        }
    }

    /// All persisted resources
    pub fn load_resources(&self) -> Result<Vec<(StateKey, Vec<u8>)>> {
        let cf = self.cf_handle(CF_RESOURCES)?;
        let mut resources = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, value) = item?;
            let key = StateKey::from_bytes(&key)
                .ok_or_else(|| Error::Storage("corrupt resource key".to_string()))?;
            resources.push((key, value.into_vec()));
        }
        Ok(resources)
    }

    /// All persisted events, grouped by stream and ordered by sequence number
    pub fn load_events(&self) -> Result<Vec<ContractEvent>> {
        let cf = self.cf_handle(CF_EVENTS)?;
        let mut events = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item?;
            events.push(bincode::deserialize(&value)?);
        }
        Ok(events)
    }

    /// Event stream of one handle, in sequence order
    pub fn events_by_key(&self, key: &EventKey) -> Result<Vec<ContractEvent>> {
        let cf = self.cf_handle(CF_EVENTS)?;
        let prefix = key.to_bytes();

        let mut events = Vec::new();
        for item in self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix.as_slice(), Direction::Forward))
        {
            let (storage_key, value) = item?;
            if !storage_key.starts_with(prefix.as_slice()) {
                break;
            }
            events.push(bincode::deserialize(&value)?);
        }
        Ok(events)
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("RocksDB closed gracefully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountAddress, TypeTag};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn test_config() -> (Config, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (config, temp_dir)
    }

    fn state_key(n: u128) -> StateKey {
        StateKey::new(AccountAddress::from_u128(n), TypeTag::new("Test", "Counter"))
    }

    fn event(key: EventKey, sequence_number: u64) -> ContractEvent {
        ContractEvent::new(
            key,
            sequence_number,
            TypeTag::new("Test", "Ping"),
            sequence_number.to_le_bytes().to_vec(),
        )
    }

    fn change_set(version: u64, writes: Vec<(StateKey, WriteOp)>, events: Vec<ContractEvent>) -> ChangeSet {
        ChangeSet {
            version,
            writes: writes.into_iter().collect::<BTreeMap<_, _>>(),
            events,
        }
    }

    #[test]
    fn test_storage_open() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        assert!(storage.db.cf_handle(CF_RESOURCES).is_some());
        assert!(storage.db.cf_handle(CF_EVENTS).is_some());
        assert_eq!(storage.latest_version().unwrap(), 0);
    }

    #[test]
    fn test_write_and_load_resources() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        storage
            .write_change_sets(&[
                change_set(1, vec![(state_key(1), WriteOp::Put(vec![1]))], vec![]),
                change_set(
                    2,
                    vec![
                        (state_key(2), WriteOp::Put(vec![2])),
                        (state_key(1), WriteOp::Delete),
                    ],
                    vec![],
                ),
            ])
            .unwrap();

        assert_eq!(storage.latest_version().unwrap(), 2);
        assert_eq!(storage.load_resources().unwrap(), vec![(state_key(2), vec![2])]);
    }

    #[test]
    fn test_events_by_key() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let address = AccountAddress::from_u128(0xA);
        let first = EventKey::new(0, address);
        let second = EventKey::new(1, address);

        storage
            .write_change_sets(&[change_set(
                1,
                vec![],
                vec![event(first, 0), event(second, 0), event(first, 1)],
            )])
            .unwrap();
        storage
            .write_change_sets(&[change_set(2, vec![], vec![event(first, 2)])])
            .unwrap();

        let stream = storage.events_by_key(&first).unwrap();
        let sequence: Vec<u64> = stream.iter().map(|e| e.sequence_number()).collect();
        assert_eq!(sequence, vec![0, 1, 2]);
        assert_eq!(storage.events_by_key(&second).unwrap().len(), 1);
        assert_eq!(storage.load_events().unwrap().len(), 4);
    }

    #[test]
    fn test_reopen_keeps_data() {
        let (config, _temp) = test_config();
        {
            let storage = Storage::open(&config).unwrap();
            storage
                .write_change_sets(&[change_set(5, vec![(state_key(9), WriteOp::Put(vec![9]))], vec![])])
                .unwrap();
            storage.close().unwrap();
        }

        let storage = Storage::open(&config).unwrap();
        assert_eq!(storage.latest_version().unwrap(), 5);
        assert_eq!(storage.load_resources().unwrap().len(), 1);
    }
}
