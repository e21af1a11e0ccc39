//! Well-known system addresses
//!
//! Singleton resources live at fixed addresses. The checks here are plain
//! address comparisons; role membership is answered by [`crate::roles`].

use crate::{
    types::{AccountAddress, Signer},
    Error, Result,
};

/// Root authority (also holds the clock and configuration singletons)
pub const ROOT_ADDRESS: AccountAddress = AccountAddress::from_u128(0xA550C18);

/// Address the VM uses when it acts on its own behalf
pub const VM_RESERVED_ADDRESS: AccountAddress = AccountAddress::ZERO;

/// Holder of every `CurrencyInfo<T>`
pub const CURRENCY_INFO_ADDRESS: AccountAddress = AccountAddress::from_u128(0xA550C18);

/// Address the framework code is published under
pub const CORE_CODE_ADDRESS: AccountAddress = AccountAddress::from_u128(0x1);

/// Sink for value that leaves circulation
pub const BURN_SINK_ADDRESS: AccountAddress = AccountAddress::from_u128(0xDEAD);

/// Fail unless the signer is the root authority
pub fn assert_is_root(account: &Signer) -> Result<()> {
    if account.address() != ROOT_ADDRESS {
        return Err(Error::Authorization(format!(
            "{} is not the root authority",
            account.address()
        )));
    }
    Ok(())
}

/// Fail unless the signer is the VM
pub fn assert_is_vm(account: &Signer) -> Result<()> {
    if account.address() != VM_RESERVED_ADDRESS {
        return Err(Error::Authorization(format!(
            "{} is not the VM",
            account.address()
        )));
    }
    Ok(())
}

/// Fail unless the signer is the core-code account
pub fn assert_is_core_code(account: &Signer) -> Result<()> {
    if account.address() != CORE_CODE_ADDRESS {
        return Err(Error::Authorization(format!(
            "{} is not the core code address",
            account.address()
        )));
    }
    Ok(())
}
