//! Error types for the ledger
//!
//! Every error aborts the enclosing transaction. Nothing is retried inside
//! the core; callers outside decide what to do from [`Error::category`].

use std::fmt;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Caller lacks the required address, role or capability
    #[error("Authorization error: {0}")]
    Authorization(String),

    /// Resource is not published under the address
    #[error("Resource not published: {0}")]
    NotPublished(String),

    /// Resource is already published under the address
    #[error("Resource already published: {0}")]
    AlreadyPublished(String),

    /// Operation is invalid for the current lifecycle state
    #[error("Invalid state: {0}")]
    State(String),

    /// Clock has not left genesis yet
    #[error("Clock is not operating")]
    NotOperating,

    /// Minting is disabled for the currency
    #[error("Minting not allowed for {0}")]
    MintingNotAllowed(String),

    /// Currency type was never registered
    #[error("Currency not registered: {0}")]
    CurrencyNotRegistered(String),

    /// Currency code already present in the registry
    #[error("Duplicate currency code: {0}")]
    DuplicateCurrencyCode(String),

    /// Argument outside its allowed range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Arithmetic overflow
    #[error("Overflow: {0}")]
    Overflow(String),

    /// Withdrawal larger than the coin
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        /// Amount requested
        requested: u64,
        /// Amount held by the coin
        available: u64,
    },

    /// Attempt to destroy a coin that still holds value
    #[error("Cannot destroy coin with non-zero value {0}")]
    NonZeroDestruction(u64),

    /// Attempt to preburn a zero-value coin
    #[error("Cannot preburn a zero-value coin")]
    EmptyPreburn,

    /// Preburn queue at capacity
    #[error("Preburn queue for {address} is full ({limit} outstanding requests)")]
    QueueFull {
        /// Dealer address
        address: String,
        /// Queue capacity
        limit: usize,
    },

    /// No preburn request with the exact amount
    #[error("No preburn request of {amount} found for {address}")]
    PreburnNotFound {
        /// Dealer address
        address: String,
        /// Requested amount
        amount: u64,
    },

    /// Clock update violates monotonicity
    #[error("Timestamp error: {0}")]
    Timestamp(String),

    /// Reconfiguration would move time backwards
    #[error("Invalid block time: now {now} is before last reconfiguration {last}")]
    InvalidBlockTime {
        /// Current clock reading
        now: u64,
        /// Last reconfiguration time
        last: u64,
    },

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error taxonomy shared by every operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing address, role or capability
    Authorization,
    /// Resource missing
    NotPublished,
    /// Resource already present
    AlreadyPublished,
    /// Lifecycle mismatch
    State,
    /// Bad input
    InvalidArgument,
    /// Arithmetic bound exceeded
    Overflow,
    /// Not enough value
    InsufficientBalance,
    /// Non-zero value discarded
    NonZeroDestruction,
    /// Preburn queue capacity
    QueueFull,
    /// Preburn lookup failed
    EntryNotFound,
    /// Clock monotonicity
    Timestamp,
    /// Reconfiguration time regression
    InvalidBlockTime,
    /// Storage, serialization, IO or actor failure
    Internal,
}

impl Error {
    /// Map the error onto its category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Authorization(_) => ErrorCategory::Authorization,
            Error::NotPublished(_) | Error::CurrencyNotRegistered(_) => {
                ErrorCategory::NotPublished
            }
            Error::AlreadyPublished(_) | Error::DuplicateCurrencyCode(_) => {
                ErrorCategory::AlreadyPublished
            }
            Error::State(_) | Error::NotOperating | Error::MintingNotAllowed(_) => {
                ErrorCategory::State
            }
            Error::InvalidArgument(_) | Error::EmptyPreburn => ErrorCategory::InvalidArgument,
            Error::Overflow(_) => ErrorCategory::Overflow,
            Error::InsufficientBalance { .. } => ErrorCategory::InsufficientBalance,
            Error::NonZeroDestruction(_) => ErrorCategory::NonZeroDestruction,
            Error::QueueFull { .. } => ErrorCategory::QueueFull,
            Error::PreburnNotFound { .. } => ErrorCategory::EntryNotFound,
            Error::Timestamp(_) => ErrorCategory::Timestamp,
            Error::InvalidBlockTime { .. } => ErrorCategory::InvalidBlockTime,
            Error::Storage(_)
            | Error::Serialization(_)
            | Error::Concurrency(_)
            | Error::Config(_)
            | Error::Io(_) => ErrorCategory::Internal,
        }
    }
}

/// Failed operation on a linear value
///
/// Coins and escrow slots cannot be dropped without losing value, so an
/// operation that consumes one hands it back alongside the error.
#[derive(Debug)]
pub struct Refused<T> {
    error: Error,
    value: T,
}

impl<T> Refused<T> {
    pub(crate) fn new(error: Error, value: T) -> Self {
        Self { error, value }
    }

    /// Why the operation failed
    pub fn error(&self) -> &Error {
        &self.error
    }

    /// Take back the value the operation was given
    pub fn into_inner(self) -> T {
        self.value
    }

    /// Split into the error and the returned value
    pub fn into_parts(self) -> (Error, T) {
        (self.error, self.value)
    }
}

impl<T> fmt::Display for Refused<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl<T: fmt::Debug> std::error::Error for Refused<T> {}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            Error::PreburnNotFound {
                address: "0xdd".to_string(),
                amount: 5
            }
            .category(),
            ErrorCategory::EntryNotFound
        );
        assert_eq!(Error::NotOperating.category(), ErrorCategory::State);
        assert_eq!(
            Error::DuplicateCurrencyCode("XUS".to_string()).category(),
            ErrorCategory::AlreadyPublished
        );
    }

    #[test]
    fn test_refused_returns_value() {
        let refused = Refused::new(Error::NonZeroDestruction(4), vec![4u8]);
        assert_eq!(refused.to_string(), refused.error().to_string());
        assert_eq!(refused.error().category(), ErrorCategory::NonZeroDestruction);
        let (error, value) = refused.into_parts();
        assert!(matches!(error, Error::NonZeroDestruction(4)));
        assert_eq!(value, vec![4]);
    }

    #[test]
    fn test_display() {
        let err = Error::InsufficientBalance {
            requested: 10,
            available: 3,
        };
        assert_eq!(err.to_string(), "Insufficient balance: requested 10, available 3");
    }
}
