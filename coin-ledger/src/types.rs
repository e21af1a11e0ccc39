//! Core types for the ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Stable byte keys for RocksDB column families
//! - Memory safety (no unsafe code)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of an account address in bytes
pub const ADDRESS_LENGTH: usize = 16;

/// Account address owning resources in the global store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountAddress([u8; ADDRESS_LENGTH]);

impl AccountAddress {
    /// The all-zero address
    pub const ZERO: AccountAddress = AccountAddress([0u8; ADDRESS_LENGTH]);

    /// Create from raw bytes
    pub const fn new(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Create from a 128-bit integer (big-endian)
    pub const fn from_u128(value: u128) -> Self {
        Self(value.to_be_bytes())
    }

    /// Parse a `0x`-prefixed hex literal such as `0xA550C18`
    pub fn from_hex_literal(literal: &str) -> Option<Self> {
        let digits = literal.strip_prefix("0x")?;
        if digits.is_empty() || digits.len() > ADDRESS_LENGTH * 2 {
            return None;
        }
        u128::from_str_radix(digits, 16).ok().map(Self::from_u128)
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Integer form of the address
    pub fn to_u128(&self) -> u128 {
        u128::from_be_bytes(self.0)
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.to_u128())
    }
}

/// Authenticated transaction sender
///
/// The surrounding execution environment authenticates the sender and hands
/// the core a `Signer`. The core only compares addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signer {
    address: AccountAddress,
}

impl Signer {
    /// Create a signer for an authenticated address
    pub fn new(address: AccountAddress) -> Self {
        Self { address }
    }

    /// Address of the signer
    pub fn address(&self) -> AccountAddress {
        self.address
    }
}

/// Fully qualified resource or event type name
///
/// Rendered as `0x1::Module::Name<Param, ...>` so keys stay readable in
/// storage dumps.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeTag(String);

impl TypeTag {
    /// Non-generic type under the core code address
    pub fn new(module: &str, name: &str) -> Self {
        Self(format!("0x1::{}::{}", module, name))
    }

    /// Generic type instantiated with the given parameters
    pub fn generic(module: &str, name: &str, params: &[&str]) -> Self {
        Self(format!("0x1::{}::{}<{}>", module, name, params.join(", ")))
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key of a resource in the global store: `(address, type)`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateKey {
    /// Owning address
    pub address: AccountAddress,
    /// Resource type
    pub type_tag: TypeTag,
}

impl StateKey {
    /// Create new state key
    pub fn new(address: AccountAddress, type_tag: TypeTag) -> Self {
        Self { address, type_tag }
    }

    /// Storage key: `address || type_tag`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut key = self.address.as_bytes().to_vec();
        key.extend_from_slice(self.type_tag.as_str().as_bytes());
        key
    }

    /// Parse a storage key produced by [`StateKey::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() <= ADDRESS_LENGTH {
            return None;
        }
        let (addr, tag) = bytes.split_at(ADDRESS_LENGTH);
        let address = AccountAddress::new(addr.try_into().ok()?);
        let tag = std::str::from_utf8(tag).ok()?;
        Some(Self {
            address,
            type_tag: TypeTag(tag.to_string()),
        })
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.type_tag)
    }
}
