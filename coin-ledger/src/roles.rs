//! Role oracle consumed by the core
//!
//! Account creation and role bootstrap live outside the core. The core only
//! asks yes/no questions about an address.

use crate::{
    address,
    store::Transaction,
    types::{AccountAddress, Signer},
    Error, Result,
};
use std::collections::HashSet;

/// Answers role membership questions for the core
pub trait RoleOracle: Send + Sync {
    /// Address holds the root authority role
    fn is_root(&self, address: AccountAddress) -> bool;

    /// Address is a designated dealer (may hold preburn queues)
    fn is_designated_dealer(&self, address: AccountAddress) -> bool;

    /// Address is the VM principal
    fn is_vm_principal(&self, address: AccountAddress) -> bool;
}

/// Fixed role table
///
/// Root and VM are the well-known addresses; dealers are listed explicitly.
#[derive(Debug, Clone, Default)]
pub struct StaticRoles {
    dealers: HashSet<AccountAddress>,
}

impl StaticRoles {
    /// Create a table with no designated dealers
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a designated dealer
    pub fn with_dealer(mut self, dealer: AccountAddress) -> Self {
        self.dealers.insert(dealer);
        self
    }
}

impl RoleOracle for StaticRoles {
    fn is_root(&self, address: AccountAddress) -> bool {
        address == address::ROOT_ADDRESS
    }

    fn is_designated_dealer(&self, address: AccountAddress) -> bool {
        self.dealers.contains(&address)
    }

    fn is_vm_principal(&self, address: AccountAddress) -> bool {
        address == address::VM_RESERVED_ADDRESS
    }
}

/// Signer must be the root address and hold the root role
pub(crate) fn assert_root(txn: &Transaction<'_>, account: &Signer) -> Result<()> {
    address::assert_is_root(account)?;
    if !txn.roles().is_root(account.address()) {
        return Err(Error::Authorization(format!(
            "{} lacks the root role",
            account.address()
        )));
    }
    Ok(())
}

/// Signer must be the VM address and hold the VM role
pub(crate) fn assert_vm(txn: &Transaction<'_>, account: &Signer) -> Result<()> {
    address::assert_is_vm(account)?;
    if !txn.roles().is_vm_principal(account.address()) {
        return Err(Error::Authorization(format!(
            "{} lacks the VM role",
            account.address()
        )));
    }
    Ok(())
}

/// Address must be a designated dealer
pub(crate) fn assert_designated_dealer(txn: &Transaction<'_>, address: AccountAddress) -> Result<()> {
    if !txn.roles().is_designated_dealer(address) {
        return Err(Error::Authorization(format!(
            "{} is not a designated dealer",
            address
        )));
    }
    Ok(())
}
