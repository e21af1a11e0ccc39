//! Coin Ledger Core
//!
//! Multi-currency ledger with linear coins, mint and burn capabilities,
//! a preburn queue, a versioned configuration store with epoch-based
//! reconfiguration, and a two-phase clock.
//!
//! # Architecture
//!
//! - **Resource store**: typed resources under `(address, type)` keys
//! - **Transactions**: all-or-nothing overlays, see [`Ledger::execute`]
//! - **Event streams**: per-handle sequence numbers, append-only
//! - **Single writer**: one Tokio task owns the [`Ledger`]
//!
//! # Invariants
//!
//! - Supply conservation: total supply == minted - burned
//! - Preburn accounting: preburn total == value held in escrow
//! - Epochs only move forward, at most once per block timestamp
//! - A failed transaction changes nothing

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod address;
pub mod config;
pub mod currency;
pub mod error;
pub mod event;
pub mod fixed_point;
pub mod genesis;
pub mod ledger;
pub mod metrics;
pub mod reconfig;
pub mod registered_currencies;
pub mod roles;
pub mod storage;
pub mod store;
pub mod timestamp;
pub mod types;

// Re-exports
pub use config::Config;
pub use currency::{BurnCapability, Coin, CurrencyType, MintCapability, Preburn};
pub use error::{Error, ErrorCategory, Refused, Result};
pub use event::{ContractEvent, EventKey, EventLog, EventSink};
pub use fixed_point::FixedPoint32;
pub use ledger::Ledger;
pub use roles::{RoleOracle, StaticRoles};
pub use storage::Storage;
pub use store::{ChangeSet, Transaction};
pub use types::{AccountAddress, Signer, StateKey, TypeTag};
