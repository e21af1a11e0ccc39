//! Event handles and the event sink
//!
//! Each handle owns one append-only stream identified by an [`EventKey`].
//! Emission bumps the handle's counter, which becomes the event's sequence
//! number, so every stream is totally ordered. The core never reads events
//! back; sinks are write-only from its point of view.

use crate::{
    store::{Resource, Transaction},
    types::{AccountAddress, TypeTag},
    Error, Result,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Globally unique stream identifier: `(creation_number, address)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventKey {
    creation_number: u64,
    address: AccountAddress,
}

impl EventKey {
    /// Create new event key
    pub fn new(creation_number: u64, address: AccountAddress) -> Self {
        Self {
            creation_number,
            address,
        }
    }

    /// Per-address creation number
    pub fn creation_number(&self) -> u64 {
        self.creation_number
    }

    /// Address that created the stream
    pub fn address(&self) -> AccountAddress {
        self.address
    }

    /// Storage key prefix: `creation_number || address`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut key = self.creation_number.to_be_bytes().to_vec();
        key.extend_from_slice(self.address.as_bytes());
        key
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.address, self.creation_number)
    }
}

/// Handle to an event stream, stored inside the resource that emits on it
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHandle {
    counter: u64,
    key: EventKey,
}

impl EventHandle {
    /// Stream key
    pub fn key(&self) -> &EventKey {
        &self.key
    }

    /// Number of events emitted so far
    pub fn count(&self) -> u64 {
        self.counter
    }

    pub(crate) fn bump(&mut self) {
        self.counter += 1;
    }
}

/// Per-address source of fresh event keys
#[derive(Debug, Serialize, Deserialize)]
struct EventHandleGenerator {
    counter: u64,
}

impl Resource for EventHandleGenerator {
    fn type_tag() -> TypeTag {
        TypeTag::new("Event", "EventHandleGenerator")
    }
}

/// Create a new, empty event handle owned by `address`
pub(crate) fn new_event_handle(txn: &mut Transaction<'_>, address: AccountAddress) -> Result<EventHandle> {
    let creation_number = match txn.try_get::<EventHandleGenerator>(address)? {
        Some(mut generator) => {
            let n = generator.counter;
            generator.counter += 1;
            txn.save(address, &generator)?;
            n
        }
        None => {
            txn.move_to(address, &EventHandleGenerator { counter: 1 })?;
            0
        }
    };

    Ok(EventHandle {
        counter: 0,
        key: EventKey::new(creation_number, address),
    })
}

/// Typed event body
pub trait EventPayload: Serialize + DeserializeOwned {
    /// Type tag recorded with every emitted event
    fn type_tag() -> TypeTag;
}

/// Event as emitted into a sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEvent {
    key: EventKey,
    sequence_number: u64,
    type_tag: TypeTag,
    data: Vec<u8>,
}

impl ContractEvent {
    /// Create new event
    pub fn new(key: EventKey, sequence_number: u64, type_tag: TypeTag, data: Vec<u8>) -> Self {
        Self {
            key,
            sequence_number,
            type_tag,
            data,
        }
    }

    /// Stream the event belongs to
    pub fn key(&self) -> &EventKey {
        &self.key
    }

    /// Position within the stream
    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    /// Payload type
    pub fn type_tag(&self) -> &TypeTag {
        &self.type_tag
    }

    /// Raw bincode payload
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Whether the payload is of type `E`
    pub fn is<E: EventPayload>(&self) -> bool {
        self.type_tag == E::type_tag()
    }

    /// Decode the payload as `E`
    pub fn decode<E: EventPayload>(&self) -> Result<E> {
        if !self.is::<E>() {
            return Err(Error::InvalidArgument(format!(
                "event is {}, not {}",
                self.type_tag,
                E::type_tag()
            )));
        }
        Ok(bincode::deserialize(&self.data)?)
    }
}

/// Append-only destination for committed events
pub trait EventSink: Send {
    /// Append one event; events arrive in commit order
    fn emit(&mut self, event: ContractEvent) -> Result<()>;
}

/// In-memory event sink that keeps every stream
#[derive(Debug, Default)]
pub struct EventLog {
    streams: BTreeMap<EventKey, Vec<ContractEvent>>,
    total: usize,
}

impl EventLog {
    /// Create empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Events of a single stream in sequence order
    pub fn events_by_key(&self, key: &EventKey) -> &[ContractEvent] {
        self.streams.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Decoded events of type `E` across all streams
    pub fn events_of<E: EventPayload>(&self) -> Result<Vec<E>> {
        self.streams
            .values()
            .flatten()
            .filter(|event| event.is::<E>())
            .map(|event| event.decode::<E>())
            .collect()
    }

    /// Fail unless `events` extend their streams without gaps
    ///
    /// Nothing is appended; [`Ledger`](crate::Ledger) checks a whole change
    /// set before any of it becomes visible.
    pub fn check_append(&self, events: &[ContractEvent]) -> Result<()> {
        let mut next: BTreeMap<&EventKey, u64> = BTreeMap::new();
        for event in events {
            let expected = next
                .entry(&event.key)
                .or_insert_with(|| self.events_by_key(&event.key).len() as u64);
            if event.sequence_number != *expected {
                return Err(sequence_gap(&event.key, *expected, event.sequence_number));
            }
            *expected += 1;
        }
        Ok(())
    }

    /// Total number of events
    pub fn len(&self) -> usize {
        self.total
    }

    /// Whether no event has been emitted
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

impl EventSink for EventLog {
    fn emit(&mut self, event: ContractEvent) -> Result<()> {
        let stream = self.streams.entry(event.key).or_default();
        let expected = stream.len() as u64;
        if event.sequence_number != expected {
            return Err(sequence_gap(&event.key, expected, event.sequence_number));
        }
        stream.push(event);
        self.total += 1;
        Ok(())
    }
}

fn sequence_gap(key: &EventKey, expected: u64, got: u64) -> Error {
    Error::State(format!(
        "event stream {} expected sequence {}, got {}",
        key, expected, got
    ))
}
