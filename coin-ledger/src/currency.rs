//! Currency and coin engine
//!
//! Each currency type `C` has one `CurrencyInfo<C>` record at the
//! currency-info address. Value moves around as [`Coin<C>`], a linear value:
//! it cannot be cloned, and the only sanctioned way to get rid of one is to
//! deposit it, burn it, or pass it through [`Coin::destroy_zero`]. A failed
//! operation never swallows a coin: by-value operations hand it back in
//! [`Refused`], and the preburn entry points borrow it and drain it only
//! once the request is recorded.
//!
//! Minting and burning are gated by [`MintCapability`] and
//! [`BurnCapability`]. Whoever holds the typed capability may use it; the
//! address-based entry points look the capability up under the caller.
//!
//! # Preburn
//!
//! Dealers escrow coins in a per-account queue before they are burned:
//!
//! ```text
//! preburn_to(dealer, coin) ──▶ PreburnQueue<C> ──burn(amount)──────▶ destroyed
//!                                   │
//!                                   └──cancel_burn(amount)──▶ coin returned
//! ```
//!
//! `burn` and `cancel_burn` pick the first queued request whose value equals
//! the amount exactly. This is not FIFO: with several outstanding requests
//! the one matching the amount is served, and among equal amounts the lowest
//! queue index wins.
//!
//! # Invariants
//!
//! - `total_supply` equals minted minus burned value and fits in `u128`
//! - `preburn_total` equals the value escrowed in queues and `Preburn` slots
//! - A queue never holds more than [`MAX_OUTSTANDING_PREBURNS`] requests,
//!   and never a zero-value one

use crate::{
    address::CURRENCY_INFO_ADDRESS,
    event::{self, EventHandle, EventPayload},
    fixed_point::FixedPoint32,
    registered_currencies, roles,
    store::{Resource, Transaction},
    timestamp,
    types::{AccountAddress, Signer, TypeTag},
    Error, Refused, Result,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// Upper bound for `scaling_factor`
pub const MAX_SCALING_FACTOR: u64 = 10_000_000_000;

/// Upper bound on outstanding preburn requests per dealer and currency
pub const MAX_OUTSTANDING_PREBURNS: usize = 256;

/// Marker for a currency type
///
/// ```
/// use coin_ledger::currency::CurrencyType;
///
/// pub struct XUS;
///
/// impl CurrencyType for XUS {
///     const TAG: &'static str = "0x1::XUS::XUS";
/// }
/// ```
pub trait CurrencyType: Send + Sync + 'static {
    /// Fully qualified type name, used in storage keys
    const TAG: &'static str;
}

// ---------------------------------------------------------------------------
// Linear values
// ---------------------------------------------------------------------------

/// Amount of currency `C`
#[must_use = "coins must be deposited, burned, or destroyed with destroy_zero"]
pub struct Coin<C: CurrencyType> {
    value: u64,
    marker: PhantomData<fn() -> C>,
}

impl<C: CurrencyType> Coin<C> {
    fn new(value: u64) -> Self {
        Self {
            value,
            marker: PhantomData,
        }
    }

    /// A coin holding nothing
    pub fn zero() -> Self {
        Self::new(0)
    }

    /// Value held by the coin
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Split off a new coin of `amount`
    pub fn withdraw(&mut self, amount: u64) -> Result<Coin<C>> {
        if amount > self.value {
            return Err(Error::InsufficientBalance {
                requested: amount,
                available: self.value,
            });
        }
        self.value -= amount;
        Ok(Coin::new(amount))
    }

    /// Move the whole value into a new coin, leaving this one at zero
    pub fn withdraw_all(&mut self) -> Coin<C> {
        Coin::new(self.take())
    }

    /// Split into `(remainder, coin of amount)`
    pub fn split(
        mut self,
        amount: u64,
    ) -> std::result::Result<(Coin<C>, Coin<C>), Refused<Coin<C>>> {
        match self.withdraw(amount) {
            Ok(other) => Ok((self, other)),
            Err(error) => Err(Refused::new(error, self)),
        }
    }

    /// Merge `other` into this coin
    ///
    /// `other` is consumed only if the merge succeeds; on overflow it comes
    /// back inside the error.
    pub fn deposit(&mut self, mut other: Coin<C>) -> std::result::Result<(), Refused<Coin<C>>> {
        match self.value.checked_add(other.value) {
            Some(sum) => {
                other.take();
                self.value = sum;
                Ok(())
            }
            None => {
                let error = Error::Overflow(format!("{} + {} exceeds u64", self.value, other.value));
                Err(Refused::new(error, other))
            }
        }
    }

    /// Destroy a coin that holds nothing; a non-zero coin is handed back
    pub fn destroy_zero(self) -> std::result::Result<(), Refused<Coin<C>>> {
        if self.value != 0 {
            return Err(Refused::new(Error::NonZeroDestruction(self.value), self));
        }
        Ok(())
    }

    fn take(&mut self) -> u64 {
        std::mem::take(&mut self.value)
    }
}

impl<C: CurrencyType> Drop for Coin<C> {
    fn drop(&mut self) {
        if self.value != 0 {
            tracing::warn!(
                currency = C::TAG,
                value = self.value,
                "Coin with non-zero value dropped"
            );
        }
    }
}

impl<C: CurrencyType> fmt::Debug for Coin<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coin")
            .field("currency", &C::TAG)
            .field("value", &self.value)
            .finish()
    }
}

/// Permission to mint currency `C`
#[must_use]
pub struct MintCapability<C: CurrencyType> {
    marker: PhantomData<fn() -> C>,
}

/// Permission to burn currency `C`
#[must_use]
pub struct BurnCapability<C: CurrencyType> {
    marker: PhantomData<fn() -> C>,
}

impl<C: CurrencyType> MintCapability<C> {
    fn new() -> Self {
        Self {
            marker: PhantomData,
        }
    }
}

impl<C: CurrencyType> BurnCapability<C> {
    fn new() -> Self {
        Self {
            marker: PhantomData,
        }
    }
}

impl<C: CurrencyType> fmt::Debug for MintCapability<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MintCapability<{}>", C::TAG)
    }
}

impl<C: CurrencyType> fmt::Debug for BurnCapability<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BurnCapability<{}>", C::TAG)
    }
}

impl<C: CurrencyType> fmt::Debug for Preburn<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Preburn")
            .field("currency", &C::TAG)
            .field("to_burn", &self.to_burn.value())
            .finish()
    }
}

/// Single-slot preburn escrow
#[must_use = "preburns must be burned or destroyed with destroy_preburn"]
pub struct Preburn<C: CurrencyType> {
    to_burn: Coin<C>,
}

impl<C: CurrencyType> Preburn<C> {
    fn empty() -> Self {
        Self {
            to_burn: Coin::zero(),
        }
    }

    /// Value waiting to be burned
    pub fn value(&self) -> u64 {
        self.to_burn.value()
    }
}

// ---------------------------------------------------------------------------
// Stored records
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct CurrencyInfo<C> {
    total_supply: u128,
    preburn_total: u64,
    exchange_rate: FixedPoint32,
    is_synthetic: bool,
    scaling_factor: u64,
    fractional_part: u64,
    currency_code: Vec<u8>,
    can_mint: bool,
    mint_events: EventHandle,
    burn_events: EventHandle,
    preburn_events: EventHandle,
    cancel_burn_events: EventHandle,
    exchange_rate_update_events: EventHandle,
    #[serde(skip)]
    marker: PhantomData<fn() -> C>,
}

impl<C: CurrencyType> Resource for CurrencyInfo<C> {
    fn type_tag() -> TypeTag {
        TypeTag::generic("Diem", "CurrencyInfo", &[C::TAG])
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct MintCapabilityRecord<C> {
    #[serde(skip)]
    marker: PhantomData<fn() -> C>,
}

impl<C: CurrencyType> Resource for MintCapabilityRecord<C> {
    fn type_tag() -> TypeTag {
        TypeTag::generic("Diem", "MintCapability", &[C::TAG])
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct BurnCapabilityRecord<C> {
    #[serde(skip)]
    marker: PhantomData<fn() -> C>,
}

impl<C: CurrencyType> Resource for BurnCapabilityRecord<C> {
    fn type_tag() -> TypeTag {
        TypeTag::generic("Diem", "BurnCapability", &[C::TAG])
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PreburnRequestRecord {
    value: u64,
    metadata: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PreburnQueue<C> {
    requests: Vec<PreburnRequestRecord>,
    #[serde(skip)]
    marker: PhantomData<fn() -> C>,
}

impl<C: CurrencyType> PreburnQueue<C> {
    fn empty() -> Self {
        Self {
            requests: Vec::new(),
            marker: PhantomData,
        }
    }
}

impl<C: CurrencyType> Resource for PreburnQueue<C> {
    fn type_tag() -> TypeTag {
        TypeTag::generic("Diem", "PreburnQueue", &[C::TAG])
    }
}

/// Outstanding preburn request as seen by callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreburnRequestInfo {
    /// Escrowed value
    pub amount: u64,
    /// Opaque data supplied by the dealer
    pub metadata: Vec<u8>,
}

/// Parameters for [`register_currency`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyRegistration {
    /// Currency code, e.g. `b"XUS"`
    pub currency_code: Vec<u8>,
    /// Rate to the base unit
    pub exchange_rate: FixedPoint32,
    /// Synthetic currencies do not emit mint, burn and preburn events
    pub is_synthetic: bool,
    /// On-chain units per whole unit of the currency
    pub scaling_factor: u64,
    /// Smallest fraction shown to users
    pub fractional_part: u64,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Value minted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintEvent {
    /// Minted amount
    pub amount: u64,
    /// Currency code
    pub currency_code: Vec<u8>,
}

/// Preburned value destroyed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurnEvent {
    /// Burned amount
    pub amount: u64,
    /// Currency code
    pub currency_code: Vec<u8>,
    /// Dealer whose preburn was burned
    pub preburn_address: AccountAddress,
}

/// Value moved into preburn escrow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreburnEvent {
    /// Escrowed amount
    pub amount: u64,
    /// Currency code
    pub currency_code: Vec<u8>,
    /// Dealer holding the escrow
    pub preburn_address: AccountAddress,
}

/// Preburn request withdrawn without burning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelBurnEvent {
    /// Returned amount
    pub amount: u64,
    /// Currency code
    pub currency_code: Vec<u8>,
    /// Dealer whose preburn was cancelled
    pub preburn_address: AccountAddress,
}

/// Exchange rate changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToXDXExchangeRateUpdateEvent {
    /// Currency code
    pub currency_code: Vec<u8>,
    /// Raw `FixedPoint32` value of the new rate
    pub new_to_xdx_exchange_rate: u64,
}

impl EventPayload for MintEvent {
    fn type_tag() -> TypeTag {
        TypeTag::new("Diem", "MintEvent")
    }
}

impl EventPayload for BurnEvent {
    fn type_tag() -> TypeTag {
        TypeTag::new("Diem", "BurnEvent")
    }
}

impl EventPayload for PreburnEvent {
    fn type_tag() -> TypeTag {
        TypeTag::new("Diem", "PreburnEvent")
    }
}

impl EventPayload for CancelBurnEvent {
    fn type_tag() -> TypeTag {
        TypeTag::new("Diem", "CancelBurnEvent")
    }
}

impl EventPayload for ToXDXExchangeRateUpdateEvent {
    fn type_tag() -> TypeTag {
        TypeTag::new("Diem", "ToXDXExchangeRateUpdateEvent")
    }
}

// ---------------------------------------------------------------------------
// Registration and capabilities
// ---------------------------------------------------------------------------

fn currency_info<C: CurrencyType>(txn: &Transaction<'_>) -> Result<CurrencyInfo<C>> {
    txn.try_get::<CurrencyInfo<C>>(CURRENCY_INFO_ADDRESS)?
        .ok_or_else(|| Error::CurrencyNotRegistered(C::TAG.to_string()))
}

fn save_currency_info<C: CurrencyType>(txn: &mut Transaction<'_>, info: &CurrencyInfo<C>) -> Result<()> {
    txn.save(CURRENCY_INFO_ADDRESS, info)
}

/// Register currency `C` and return its mint and burn capabilities
pub fn register_currency<C: CurrencyType>(
    txn: &mut Transaction<'_>,
    root: &Signer,
    registration: CurrencyRegistration,
) -> Result<(MintCapability<C>, BurnCapability<C>)> {
    roles::assert_root(txn, root)?;
    if txn.exists::<CurrencyInfo<C>>(CURRENCY_INFO_ADDRESS) {
        return Err(Error::AlreadyPublished(format!("currency {}", C::TAG)));
    }
    if registration.scaling_factor == 0 || registration.scaling_factor > MAX_SCALING_FACTOR {
        return Err(Error::InvalidArgument(format!(
            "scaling factor {} outside (0, {}]",
            registration.scaling_factor, MAX_SCALING_FACTOR
        )));
    }
    registered_currencies::add_currency_code(txn, &registration.currency_code)?;

    let info = CurrencyInfo::<C> {
        total_supply: 0,
        preburn_total: 0,
        exchange_rate: registration.exchange_rate,
        is_synthetic: registration.is_synthetic,
        scaling_factor: registration.scaling_factor,
        fractional_part: registration.fractional_part,
        currency_code: registration.currency_code,
        can_mint: true,
        mint_events: event::new_event_handle(txn, CURRENCY_INFO_ADDRESS)?,
        burn_events: event::new_event_handle(txn, CURRENCY_INFO_ADDRESS)?,
        preburn_events: event::new_event_handle(txn, CURRENCY_INFO_ADDRESS)?,
        cancel_burn_events: event::new_event_handle(txn, CURRENCY_INFO_ADDRESS)?,
        exchange_rate_update_events: event::new_event_handle(txn, CURRENCY_INFO_ADDRESS)?,
        marker: PhantomData,
    };
    txn.move_to(CURRENCY_INFO_ADDRESS, &info)?;

    tracing::info!(
        currency = C::TAG,
        code = %String::from_utf8_lossy(&info.currency_code),
        synthetic = info.is_synthetic,
        "Registered currency"
    );
    Ok((MintCapability::new(), BurnCapability::new()))
}

/// Store a mint capability under `account`
pub fn publish_mint_capability<C: CurrencyType>(
    txn: &mut Transaction<'_>,
    account: &Signer,
    capability: MintCapability<C>,
) -> Result<()> {
    let MintCapability { marker } = capability;
    txn.move_to(account.address(), &MintCapabilityRecord::<C> { marker })
}

/// Store a burn capability under `account`
pub fn publish_burn_capability<C: CurrencyType>(
    txn: &mut Transaction<'_>,
    account: &Signer,
    capability: BurnCapability<C>,
) -> Result<()> {
    let BurnCapability { marker } = capability;
    txn.move_to(account.address(), &BurnCapabilityRecord::<C> { marker })
}

/// Take the burn capability stored under `account`
pub fn remove_burn_capability<C: CurrencyType>(
    txn: &mut Transaction<'_>,
    account: &Signer,
) -> Result<BurnCapability<C>> {
    let BurnCapabilityRecord { marker } = txn.move_from::<BurnCapabilityRecord<C>>(account.address())?;
    Ok(BurnCapability { marker })
}

/// Whether `address` holds the mint capability for `C`
pub fn has_mint_capability<C: CurrencyType>(txn: &Transaction<'_>, address: AccountAddress) -> bool {
    txn.exists::<MintCapabilityRecord<C>>(address)
}

/// Whether `address` holds the burn capability for `C`
pub fn has_burn_capability<C: CurrencyType>(txn: &Transaction<'_>, address: AccountAddress) -> bool {
    txn.exists::<BurnCapabilityRecord<C>>(address)
}

fn stored_mint_capability<C: CurrencyType>(
    txn: &Transaction<'_>,
    account: &Signer,
) -> Result<MintCapability<C>> {
    if !has_mint_capability::<C>(txn, account.address()) {
        return Err(Error::Authorization(format!(
            "{} does not hold MintCapability<{}>",
            account.address(),
            C::TAG
        )));
    }
    Ok(MintCapability::new())
}

fn stored_burn_capability<C: CurrencyType>(
    txn: &Transaction<'_>,
    account: &Signer,
) -> Result<BurnCapability<C>> {
    if !has_burn_capability::<C>(txn, account.address()) {
        return Err(Error::Authorization(format!(
            "{} does not hold BurnCapability<{}>",
            account.address(),
            C::TAG
        )));
    }
    Ok(BurnCapability::new())
}

// ---------------------------------------------------------------------------
// Mint
// ---------------------------------------------------------------------------

/// Mint with the capability stored under `account`
pub fn mint<C: CurrencyType>(txn: &mut Transaction<'_>, account: &Signer, amount: u64) -> Result<Coin<C>> {
    let capability = stored_mint_capability::<C>(txn, account)?;
    mint_with_capability(txn, amount, &capability)
}

/// Mint `amount` of `C`
pub fn mint_with_capability<C: CurrencyType>(
    txn: &mut Transaction<'_>,
    amount: u64,
    _capability: &MintCapability<C>,
) -> Result<Coin<C>> {
    timestamp::assert_operating(txn)?;
    let mut info = currency_info::<C>(txn)?;
    if !info.can_mint {
        return Err(Error::MintingNotAllowed(C::TAG.to_string()));
    }

    info.total_supply = info
        .total_supply
        .checked_add(amount as u128)
        .ok_or_else(|| Error::Overflow(format!("total supply of {} exceeds u128", C::TAG)))?;

    if !info.is_synthetic {
        let event = MintEvent {
            amount,
            currency_code: info.currency_code.clone(),
        };
        txn.emit_event(&mut info.mint_events, &event)?;
    }
    save_currency_info(txn, &info)?;

    tracing::debug!(currency = C::TAG, amount, total_supply = %info.total_supply, "Minted");
    Ok(Coin::new(amount))
}

// ---------------------------------------------------------------------------
// Preburn queue
// ---------------------------------------------------------------------------

/// Create an empty preburn queue for a dealer ahead of its first preburn
pub fn publish_preburn_queue_to_account<C: CurrencyType>(
    txn: &mut Transaction<'_>,
    account: &Signer,
    root: &Signer,
) -> Result<()> {
    roles::assert_root(txn, root)?;
    roles::assert_designated_dealer(txn, account.address())?;
    assert_is_currency::<C>(txn)?;
    txn.move_to(account.address(), &PreburnQueue::<C>::empty())
}

/// Escrow the whole of `coin` in the dealer's preburn queue
///
/// The coin is drained only once the request is queued; on error it keeps
/// its value.
pub fn preburn_to<C: CurrencyType>(
    txn: &mut Transaction<'_>,
    account: &Signer,
    coin: &mut Coin<C>,
) -> Result<()> {
    preburn_to_with_metadata(txn, account, coin, Vec::new())
}

/// Escrow the whole of `coin` with dealer-supplied metadata
pub fn preburn_to_with_metadata<C: CurrencyType>(
    txn: &mut Transaction<'_>,
    account: &Signer,
    coin: &mut Coin<C>,
    metadata: Vec<u8>,
) -> Result<()> {
    timestamp::assert_operating(txn)?;
    if coin.value() == 0 {
        return Err(Error::EmptyPreburn);
    }
    let dealer = account.address();
    roles::assert_designated_dealer(txn, dealer)?;
    let mut info = currency_info::<C>(txn)?;

    let mut queue = txn
        .try_get::<PreburnQueue<C>>(dealer)?
        .unwrap_or_else(PreburnQueue::empty);
    if queue.requests.len() >= MAX_OUTSTANDING_PREBURNS {
        return Err(Error::QueueFull {
            address: dealer.to_string(),
            limit: MAX_OUTSTANDING_PREBURNS,
        });
    }

    let amount = coin.value();
    info.preburn_total = info
        .preburn_total
        .checked_add(amount)
        .ok_or_else(|| Error::Overflow(format!("preburn total of {} exceeds u64", C::TAG)))?;

    queue.requests.push(PreburnRequestRecord {
        value: amount,
        metadata,
    });
    if txn.exists::<PreburnQueue<C>>(dealer) {
        txn.save(dealer, &queue)?;
    } else {
        txn.move_to(dealer, &queue)?;
    }

    if !info.is_synthetic {
        let event = PreburnEvent {
            amount,
            currency_code: info.currency_code.clone(),
            preburn_address: dealer,
        };
        txn.emit_event(&mut info.preburn_events, &event)?;
    }
    save_currency_info(txn, &info)?;
    coin.take();

    tracing::debug!(
        currency = C::TAG,
        dealer = %dealer,
        amount,
        outstanding = queue.requests.len(),
        "Preburn queued"
    );
    Ok(())
}

/// Remove the first request whose value equals `amount`
fn remove_preburn_request<C: CurrencyType>(
    txn: &mut Transaction<'_>,
    preburn_address: AccountAddress,
    amount: u64,
) -> Result<Coin<C>> {
    let not_found = || Error::PreburnNotFound {
        address: preburn_address.to_string(),
        amount,
    };

    let mut queue = txn
        .try_get::<PreburnQueue<C>>(preburn_address)?
        .ok_or_else(not_found)?;
    let index = queue
        .requests
        .iter()
        .position(|request| request.value == amount)
        .ok_or_else(not_found)?;

    let request = queue.requests.remove(index);
    txn.save(preburn_address, &queue)?;
    Ok(Coin::new(request.value))
}

/// Burn with the capability stored under `account`
pub fn burn<C: CurrencyType>(
    txn: &mut Transaction<'_>,
    account: &Signer,
    preburn_address: AccountAddress,
    amount: u64,
) -> Result<()> {
    let capability = stored_burn_capability::<C>(txn, account)?;
    burn_with_capability(txn, preburn_address, amount, &capability)
}

/// Burn the queued request of exactly `amount` held by `preburn_address`
pub fn burn_with_capability<C: CurrencyType>(
    txn: &mut Transaction<'_>,
    preburn_address: AccountAddress,
    amount: u64,
    _capability: &BurnCapability<C>,
) -> Result<()> {
    timestamp::assert_operating(txn)?;
    let mut info = currency_info::<C>(txn)?;
    remove_preburn_request::<C>(txn, preburn_address, amount)?.take();
    retire_preburned(&mut info, amount)?;

    if !info.is_synthetic {
        let event = BurnEvent {
            amount,
            currency_code: info.currency_code.clone(),
            preburn_address,
        };
        txn.emit_event(&mut info.burn_events, &event)?;
    }
    save_currency_info(txn, &info)?;

    tracing::debug!(currency = C::TAG, dealer = %preburn_address, amount, "Burned");
    Ok(())
}

fn retire_preburned<C: CurrencyType>(info: &mut CurrencyInfo<C>, amount: u64) -> Result<()> {
    info.total_supply = info
        .total_supply
        .checked_sub(amount as u128)
        .ok_or_else(|| Error::State(format!("burn of {} exceeds total supply", amount)))?;
    release_preburned(info, amount)
}

fn release_preburned<C: CurrencyType>(info: &mut CurrencyInfo<C>, amount: u64) -> Result<()> {
    info.preburn_total = info
        .preburn_total
        .checked_sub(amount)
        .ok_or_else(|| Error::State(format!("release of {} exceeds preburn total", amount)))?;
    Ok(())
}

/// Cancel with the capability stored under `account`
pub fn cancel_burn<C: CurrencyType>(
    txn: &mut Transaction<'_>,
    account: &Signer,
    preburn_address: AccountAddress,
    amount: u64,
) -> Result<Coin<C>> {
    let capability = stored_burn_capability::<C>(txn, account)?;
    cancel_burn_with_capability(txn, preburn_address, amount, &capability)
}

/// Withdraw the queued request of exactly `amount` and hand the coin back
pub fn cancel_burn_with_capability<C: CurrencyType>(
    txn: &mut Transaction<'_>,
    preburn_address: AccountAddress,
    amount: u64,
    _capability: &BurnCapability<C>,
) -> Result<Coin<C>> {
    timestamp::assert_operating(txn)?;
    let mut info = currency_info::<C>(txn)?;
    let coin = remove_preburn_request::<C>(txn, preburn_address, amount)?;

    release_preburned(&mut info, amount)?;

    if !info.is_synthetic {
        let event = CancelBurnEvent {
            amount,
            currency_code: info.currency_code.clone(),
            preburn_address,
        };
        txn.emit_event(&mut info.cancel_burn_events, &event)?;
    }
    save_currency_info(txn, &info)?;

    tracing::debug!(currency = C::TAG, dealer = %preburn_address, amount, "Burn cancelled");
    Ok(coin)
}

// ---------------------------------------------------------------------------
// Single-slot preburn
// ---------------------------------------------------------------------------

/// Create an empty escrow slot for `C`
pub fn create_preburn<C: CurrencyType>(txn: &Transaction<'_>, root: &Signer) -> Result<Preburn<C>> {
    roles::assert_root(txn, root)?;
    assert_is_currency::<C>(txn)?;
    Ok(Preburn::empty())
}

/// Move the whole of `coin` into an empty escrow slot
///
/// On error the coin keeps its value.
pub fn preburn_with_resource<C: CurrencyType>(
    txn: &mut Transaction<'_>,
    coin: &mut Coin<C>,
    preburn: &mut Preburn<C>,
    preburn_address: AccountAddress,
) -> Result<()> {
    timestamp::assert_operating(txn)?;
    if coin.value() == 0 {
        return Err(Error::EmptyPreburn);
    }
    if preburn.value() != 0 {
        return Err(Error::State(format!(
            "preburn slot for {} already holds {}",
            preburn_address,
            preburn.value()
        )));
    }

    let mut info = currency_info::<C>(txn)?;
    let amount = coin.value();
    info.preburn_total = info
        .preburn_total
        .checked_add(amount)
        .ok_or_else(|| Error::Overflow(format!("preburn total of {} exceeds u64", C::TAG)))?;

    if !info.is_synthetic {
        let event = PreburnEvent {
            amount,
            currency_code: info.currency_code.clone(),
            preburn_address,
        };
        txn.emit_event(&mut info.preburn_events, &event)?;
    }
    save_currency_info(txn, &info)?;
    preburn.to_burn = coin.withdraw_all();
    Ok(())
}

/// Burn whatever the escrow slot holds
pub fn burn_with_resource_cap<C: CurrencyType>(
    txn: &mut Transaction<'_>,
    preburn: &mut Preburn<C>,
    preburn_address: AccountAddress,
    _capability: &BurnCapability<C>,
) -> Result<()> {
    timestamp::assert_operating(txn)?;
    let amount = preburn.value();
    if amount == 0 {
        return Err(Error::EmptyPreburn);
    }

    let mut info = currency_info::<C>(txn)?;
    retire_preburned(&mut info, amount)?;

    if !info.is_synthetic {
        let event = BurnEvent {
            amount,
            currency_code: info.currency_code.clone(),
            preburn_address,
        };
        txn.emit_event(&mut info.burn_events, &event)?;
    }
    save_currency_info(txn, &info)?;
    preburn.to_burn.take();
    Ok(())
}

/// Preburn and burn the whole of `coin` in one step
///
/// On error the coin keeps its value.
pub fn burn_now<C: CurrencyType>(
    txn: &mut Transaction<'_>,
    coin: &mut Coin<C>,
    preburn_address: AccountAddress,
    capability: &BurnCapability<C>,
) -> Result<()> {
    let mut preburn = Preburn::empty();
    preburn_with_resource(txn, coin, &mut preburn, preburn_address)?;
    if let Err(err) = burn_with_resource_cap(txn, &mut preburn, preburn_address, capability) {
        *coin = preburn.to_burn.withdraw_all();
        return Err(err);
    }
    Ok(())
}

/// Destroy an empty escrow slot; a non-empty one is handed back
pub fn destroy_preburn<C: CurrencyType>(
    preburn: Preburn<C>,
) -> std::result::Result<(), Refused<Preburn<C>>> {
    if preburn.value() != 0 {
        return Err(Refused::new(Error::NonZeroDestruction(preburn.value()), preburn));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Administration
// ---------------------------------------------------------------------------

/// Set the exchange rate of `C` to the base unit
pub fn update_exchange_rate<C: CurrencyType>(
    txn: &mut Transaction<'_>,
    root: &Signer,
    rate: FixedPoint32,
) -> Result<()> {
    roles::assert_root(txn, root)?;
    let mut info = currency_info::<C>(txn)?;
    info.exchange_rate = rate;

    let event = ToXDXExchangeRateUpdateEvent {
        currency_code: info.currency_code.clone(),
        new_to_xdx_exchange_rate: rate.raw_value(),
    };
    txn.emit_event(&mut info.exchange_rate_update_events, &event)?;
    save_currency_info(txn, &info)?;

    tracing::info!(currency = C::TAG, rate = %rate, "Exchange rate updated");
    Ok(())
}

/// Enable or disable minting of `C`
pub fn update_minting_ability<C: CurrencyType>(
    txn: &mut Transaction<'_>,
    root: &Signer,
    can_mint: bool,
) -> Result<()> {
    roles::assert_root(txn, root)?;
    let mut info = currency_info::<C>(txn)?;
    info.can_mint = can_mint;
    save_currency_info(txn, &info)?;

    tracing::info!(currency = C::TAG, can_mint, "Minting ability updated");
    Ok(())
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Whether `C` is registered
pub fn is_currency<C: CurrencyType>(txn: &Transaction<'_>) -> bool {
    txn.exists::<CurrencyInfo<C>>(CURRENCY_INFO_ADDRESS)
}

/// Fail unless `C` is registered
pub fn assert_is_currency<C: CurrencyType>(txn: &Transaction<'_>) -> Result<()> {
    if !is_currency::<C>(txn) {
        return Err(Error::CurrencyNotRegistered(C::TAG.to_string()));
    }
    Ok(())
}

/// Total value in circulation, including preburned value
pub fn market_cap<C: CurrencyType>(txn: &Transaction<'_>) -> Result<u128> {
    Ok(currency_info::<C>(txn)?.total_supply)
}

/// Value currently escrowed for burning
pub fn preburn_value<C: CurrencyType>(txn: &Transaction<'_>) -> Result<u64> {
    Ok(currency_info::<C>(txn)?.preburn_total)
}

/// Whether minting is enabled
pub fn can_mint<C: CurrencyType>(txn: &Transaction<'_>) -> Result<bool> {
    Ok(currency_info::<C>(txn)?.can_mint)
}

/// Exchange rate to the base unit
pub fn exchange_rate<C: CurrencyType>(txn: &Transaction<'_>) -> Result<FixedPoint32> {
    Ok(currency_info::<C>(txn)?.exchange_rate)
}

/// `from_value` converted to the base unit at the current rate
pub fn approx_base_for_value<C: CurrencyType>(txn: &Transaction<'_>, from_value: u64) -> Result<u64> {
    currency_info::<C>(txn)?.exchange_rate.multiply_u64(from_value)
}

/// Scaling factor of `C`
pub fn scaling_factor<C: CurrencyType>(txn: &Transaction<'_>) -> Result<u64> {
    Ok(currency_info::<C>(txn)?.scaling_factor)
}

/// Fractional part of `C`
pub fn fractional_part<C: CurrencyType>(txn: &Transaction<'_>) -> Result<u64> {
    Ok(currency_info::<C>(txn)?.fractional_part)
}

/// Currency code of `C`
pub fn currency_code<C: CurrencyType>(txn: &Transaction<'_>) -> Result<Vec<u8>> {
    Ok(currency_info::<C>(txn)?.currency_code)
}

/// Whether `C` is synthetic
pub fn is_synthetic_currency<C: CurrencyType>(txn: &Transaction<'_>) -> Result<bool> {
    Ok(currency_info::<C>(txn)?.is_synthetic)
}

/// Outstanding preburn requests of a dealer, zero if no queue exists
pub fn preburn_queue_len<C: CurrencyType>(txn: &Transaction<'_>, dealer: AccountAddress) -> Result<usize> {
    Ok(txn
        .try_get::<PreburnQueue<C>>(dealer)?
        .map_or(0, |queue| queue.requests.len()))
}

/// Outstanding preburn requests of a dealer in queue order
pub fn preburn_requests<C: CurrencyType>(
    txn: &Transaction<'_>,
    dealer: AccountAddress,
) -> Result<Vec<PreburnRequestInfo>> {
    let queue = match txn.try_get::<PreburnQueue<C>>(dealer)? {
        Some(queue) => queue,
        None => return Ok(Vec::new()),
    };
    Ok(queue
        .requests
        .into_iter()
        .map(|request| PreburnRequestInfo {
            amount: request.value,
            metadata: request.metadata,
        })
        .collect())
}
