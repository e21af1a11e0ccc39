//! Versioned on-chain configuration and epoch changes
//!
//! Every configuration type `T` is published once under the root address and
//! can only be changed by whoever holds `ModifyCapability<T>`. A successful
//! change triggers a reconfiguration, which bumps the epoch and emits a
//! [`NewEpochEvent`] for epoch-sensitive consumers outside the core.
//!
//! # Invariants
//!
//! - `epoch` grows by exactly one per accepted reconfiguration
//! - `last_reconfiguration_time` strictly increases across epochs
//! - Several changes at the same timestamp collapse into one epoch bump

use crate::{
    address::ROOT_ADDRESS,
    event::{self, EventHandle, EventPayload},
    roles,
    store::{Resource, Transaction},
    timestamp,
    types::{Signer, TypeTag},
    Error, Result,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// Payload that can be published as on-chain configuration
///
/// Payloads are plain data: `get` hands out copies.
pub trait ConfigPayload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Fully qualified type name, used in storage keys
    const NAME: &'static str;
}

/// Epoch bookkeeping singleton under root
#[derive(Debug, Serialize, Deserialize)]
struct Configuration {
    epoch: u64,
    last_reconfiguration_time: u64,
    events: EventHandle,
}

impl Resource for Configuration {
    fn type_tag() -> TypeTag {
        TypeTag::new("DiemConfig", "Configuration")
    }
}

/// Presence under root turns reconfiguration off
#[derive(Debug, Serialize, Deserialize)]
struct DisableReconfiguration {}

impl Resource for DisableReconfiguration {
    fn type_tag() -> TypeTag {
        TypeTag::new("DiemConfig", "DisableReconfiguration")
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ConfigRecord<T> {
    payload: T,
}

impl<T: ConfigPayload> Resource for ConfigRecord<T> {
    fn type_tag() -> TypeTag {
        TypeTag::generic("DiemConfig", "DiemConfig", &[T::NAME])
    }
}

/// Stored form of a modify capability
#[derive(Debug, Serialize, Deserialize)]
struct ModifyCapabilityRecord<T> {
    #[serde(skip)]
    marker: PhantomData<fn() -> T>,
}

impl<T: ConfigPayload> Resource for ModifyCapabilityRecord<T> {
    fn type_tag() -> TypeTag {
        TypeTag::generic("DiemConfig", "ModifyConfigCapability", &[T::NAME])
    }
}

/// Permission to change configuration `T`
///
/// Only [`publish_new_config_and_capability`] creates one. It can be moved
/// into an account with [`publish_modify_capability`] but never copied.
#[must_use]
pub struct ModifyCapability<T: ConfigPayload> {
    marker: PhantomData<fn() -> T>,
}

impl<T: ConfigPayload> ModifyCapability<T> {
    pub(crate) fn new() -> Self {
        Self {
            marker: PhantomData,
        }
    }
}

impl<T: ConfigPayload> fmt::Debug for ModifyCapability<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModifyCapability<{}>", T::NAME)
    }
}

/// Emitted whenever the epoch changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEpochEvent {
    /// The new epoch
    pub epoch: u64,
}

impl EventPayload for NewEpochEvent {
    fn type_tag() -> TypeTag {
        TypeTag::new("DiemConfig", "NewEpochEvent")
    }
}

/// Create the `Configuration` singleton at epoch 0
pub fn initialize(txn: &mut Transaction<'_>, root: &Signer) -> Result<()> {
    roles::assert_root(txn, root)?;
    if txn.exists::<Configuration>(ROOT_ADDRESS) {
        return Err(Error::AlreadyPublished(
            "configuration already initialized".to_string(),
        ));
    }

    let events = event::new_event_handle(txn, ROOT_ADDRESS)?;
    txn.move_to(
        ROOT_ADDRESS,
        &Configuration {
            epoch: 0,
            last_reconfiguration_time: 0,
            events,
        },
    )?;
    tracing::info!("Configuration initialized at epoch 0");
    Ok(())
}

/// Publish configuration `T` and return the capability to modify it
pub fn publish_new_config_and_capability<T: ConfigPayload>(
    txn: &mut Transaction<'_>,
    root: &Signer,
    payload: T,
) -> Result<ModifyCapability<T>> {
    roles::assert_root(txn, root)?;
    txn.move_to(ROOT_ADDRESS, &ConfigRecord { payload })?;
    tracing::info!(config = T::NAME, "Published configuration");
    Ok(ModifyCapability::new())
}

/// Publish configuration `T`, keeping the modify capability under root
pub fn publish_new_config<T: ConfigPayload>(
    txn: &mut Transaction<'_>,
    root: &Signer,
    payload: T,
) -> Result<()> {
    let capability = publish_new_config_and_capability(txn, root, payload)?;
    publish_modify_capability(txn, root, capability)
}

/// Store a modify capability under `account`
pub fn publish_modify_capability<T: ConfigPayload>(
    txn: &mut Transaction<'_>,
    account: &Signer,
    capability: ModifyCapability<T>,
) -> Result<()> {
    let ModifyCapability { marker } = capability;
    txn.move_to(account.address(), &ModifyCapabilityRecord::<T> { marker })
}

/// Current value of configuration `T`
pub fn get<T: ConfigPayload>(txn: &Transaction<'_>) -> Result<T> {
    match txn.try_get::<ConfigRecord<T>>(ROOT_ADDRESS)? {
        Some(record) => Ok(record.payload),
        None => Err(Error::NotPublished(format!("configuration {}", T::NAME))),
    }
}

/// Whether configuration `T` has been published
pub fn is_published<T: ConfigPayload>(txn: &Transaction<'_>) -> bool {
    txn.exists::<ConfigRecord<T>>(ROOT_ADDRESS)
}

/// Replace configuration `T`; `account` must hold its modify capability
pub fn set<T: ConfigPayload>(txn: &mut Transaction<'_>, account: &Signer, payload: T) -> Result<()> {
    if !txn.exists::<ModifyCapabilityRecord<T>>(account.address()) {
        return Err(Error::Authorization(format!(
            "{} cannot modify {}",
            account.address(),
            T::NAME
        )));
    }
    write_config(txn, payload)
}

/// Replace configuration `T` by presenting the capability directly
pub fn set_with_capability<T: ConfigPayload>(
    txn: &mut Transaction<'_>,
    _capability: &ModifyCapability<T>,
    payload: T,
) -> Result<()> {
    write_config(txn, payload)
}

fn write_config<T: ConfigPayload>(txn: &mut Transaction<'_>, payload: T) -> Result<()> {
    if !txn.exists::<Configuration>(ROOT_ADDRESS) {
        return Err(Error::NotPublished(
            "configuration not initialized".to_string(),
        ));
    }
    txn.modify::<ConfigRecord<T>, _>(ROOT_ADDRESS, |record| {
        record.payload = payload;
        Ok(())
    })?;
    reconfigure_(txn)
}

/// Force a reconfiguration
pub fn reconfigure(txn: &mut Transaction<'_>, root: &Signer) -> Result<()> {
    roles::assert_root(txn, root)?;
    reconfigure_(txn)
}

fn reconfigure_(txn: &mut Transaction<'_>) -> Result<()> {
    if timestamp::is_genesis(txn)
        || timestamp::now_microseconds(txn)? == 0
        || !reconfiguration_enabled(txn)
    {
        return Ok(());
    }

    let now = timestamp::now_microseconds(txn)?;
    let mut config = txn.get::<Configuration>(ROOT_ADDRESS)?;

    // Same block: changes collapse into the epoch already announced
    if now == config.last_reconfiguration_time {
        return Ok(());
    }
    if now < config.last_reconfiguration_time {
        return Err(Error::InvalidBlockTime {
            now,
            last: config.last_reconfiguration_time,
        });
    }

    config.last_reconfiguration_time = now;
    config.epoch += 1;
    let epoch = config.epoch;
    txn.emit_event(&mut config.events, &NewEpochEvent { epoch })?;
    txn.save(ROOT_ADDRESS, &config)?;

    tracing::info!(epoch, time = now, "New epoch");
    Ok(())
}

/// Announce the first epoch at the end of genesis
pub fn emit_genesis_reconfiguration_event(txn: &mut Transaction<'_>, root: &Signer) -> Result<()> {
    roles::assert_root(txn, root)?;
    let mut config = txn.get::<Configuration>(ROOT_ADDRESS)?;
    if config.epoch != 0 || config.last_reconfiguration_time != 0 {
        return Err(Error::State(format!(
            "genesis reconfiguration requires epoch 0, found {}",
            config.epoch
        )));
    }

    config.epoch = 1;
    txn.emit_event(&mut config.events, &NewEpochEvent { epoch: 1 })?;
    txn.save(ROOT_ADDRESS, &config)?;
    tracing::info!("Genesis reconfiguration emitted");
    Ok(())
}

/// Turn reconfiguration off
pub fn disable_reconfiguration(txn: &mut Transaction<'_>, root: &Signer) -> Result<()> {
    roles::assert_root(txn, root)?;
    if !reconfiguration_enabled(txn) {
        return Err(Error::State("reconfiguration already disabled".to_string()));
    }
    txn.move_to(ROOT_ADDRESS, &DisableReconfiguration {})
}

/// Turn reconfiguration back on
pub fn enable_reconfiguration(txn: &mut Transaction<'_>, root: &Signer) -> Result<()> {
    roles::assert_root(txn, root)?;
    if reconfiguration_enabled(txn) {
        return Err(Error::State("reconfiguration already enabled".to_string()));
    }
    txn.move_from::<DisableReconfiguration>(ROOT_ADDRESS)?;
    Ok(())
}

/// Whether reconfiguration is enabled
pub fn reconfiguration_enabled(txn: &Transaction<'_>) -> bool {
    !txn.exists::<DisableReconfiguration>(ROOT_ADDRESS)
}

/// Current epoch
pub fn current_epoch(txn: &Transaction<'_>) -> Result<u64> {
    Ok(txn.get::<Configuration>(ROOT_ADDRESS)?.epoch)
}

/// Time of the last accepted reconfiguration
pub fn last_reconfiguration_time(txn: &Transaction<'_>) -> Result<u64> {
    Ok(txn.get::<Configuration>(ROOT_ADDRESS)?.last_reconfiguration_time)
}
