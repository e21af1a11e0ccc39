//! Global clock
//!
//! The clock has two phases. During genesis no time resource exists; root
//! starts the operating phase at time 0, and from then on only the VM may
//! move time forward. Time is supplied by the block metadata, never read from
//! the host.
//!
//! ```text
//! Genesis ──mark_operating_started(root)──▶ Operating(t)
//!                                             │
//!                 advance_time(vm, proposer, t') with t' > t
//!                 (or t' == t when the VM itself proposes)
//! ```

use crate::{
    address::{self, ROOT_ADDRESS},
    roles,
    store::{Resource, Transaction},
    types::{AccountAddress, Signer, TypeTag},
    Error, Result,
};
use serde::{Deserialize, Serialize};

/// Conversion factor between seconds and microseconds
pub const MICRO_CONVERSION_FACTOR: u64 = 1_000_000;

/// Current on-chain time, published under root once operating
#[derive(Debug, Serialize, Deserialize)]
struct CurrentTimeMicroseconds {
    microseconds: u64,
}

impl Resource for CurrentTimeMicroseconds {
    fn type_tag() -> TypeTag {
        TypeTag::new("DiemTimestamp", "CurrentTimeMicroseconds")
    }
}

/// Leave genesis and start the clock at 0
pub fn mark_operating_started(txn: &mut Transaction<'_>, root: &Signer) -> Result<()> {
    assert_genesis(txn)?;
    roles::assert_root(txn, root)?;

    txn.move_to(ROOT_ADDRESS, &CurrentTimeMicroseconds { microseconds: 0 })?;
    tracing::info!("Clock entered operating phase");
    Ok(())
}

/// Update the clock from block metadata
///
/// A block proposed by the VM itself (the reserved address) must repeat the
/// current time; any other proposer must strictly advance it.
pub fn advance_time(
    txn: &mut Transaction<'_>,
    account: &Signer,
    proposer: AccountAddress,
    timestamp: u64,
) -> Result<()> {
    assert_operating(txn)?;
    roles::assert_vm(txn, account)?;

    txn.modify::<CurrentTimeMicroseconds, _>(ROOT_ADDRESS, |clock| {
        let now = clock.microseconds;
        if proposer == address::VM_RESERVED_ADDRESS {
            if timestamp != now {
                return Err(Error::Timestamp(format!(
                    "VM block must keep time at {}, got {}",
                    now, timestamp
                )));
            }
        } else if timestamp <= now {
            return Err(Error::Timestamp(format!(
                "time must advance past {}, got {}",
                now, timestamp
            )));
        }
        clock.microseconds = timestamp;
        Ok(())
    })?;

    tracing::debug!(timestamp, proposer = %proposer, "Clock updated");
    Ok(())
}

/// Current time in microseconds
pub fn now_microseconds(txn: &Transaction<'_>) -> Result<u64> {
    match txn.try_get::<CurrentTimeMicroseconds>(ROOT_ADDRESS)? {
        Some(clock) => Ok(clock.microseconds),
        None => Err(Error::NotOperating),
    }
}

/// Current time in whole seconds
pub fn now_seconds(txn: &Transaction<'_>) -> Result<u64> {
    Ok(now_microseconds(txn)? / MICRO_CONVERSION_FACTOR)
}

/// Still in genesis
pub fn is_genesis(txn: &Transaction<'_>) -> bool {
    !txn.exists::<CurrentTimeMicroseconds>(ROOT_ADDRESS)
}

/// Clock has started
pub fn is_operating(txn: &Transaction<'_>) -> bool {
    !is_genesis(txn)
}

/// Fail unless still in genesis
pub fn assert_genesis(txn: &Transaction<'_>) -> Result<()> {
    if !is_genesis(txn) {
        return Err(Error::State("clock already operating".to_string()));
    }
    Ok(())
}

/// Fail unless the clock is operating
pub fn assert_operating(txn: &Transaction<'_>) -> Result<()> {
    if !is_operating(txn) {
        return Err(Error::NotOperating);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{roles::StaticRoles, store::ResourceStore};

    fn root() -> Signer {
        Signer::new(ROOT_ADDRESS)
    }

    fn vm() -> Signer {
        Signer::new(address::VM_RESERVED_ADDRESS)
    }

    const PROPOSER: AccountAddress = AccountAddress::from_u128(0x7A11);

    #[test]
    fn test_genesis_phase() {
        let store = ResourceStore::new();
        let roles = StaticRoles::new();
        let txn = Transaction::new(&store, &roles);

        assert!(is_genesis(&txn));
        assert!(assert_genesis(&txn).is_ok());
        assert!(matches!(now_microseconds(&txn), Err(Error::NotOperating)));
        assert!(matches!(assert_operating(&txn), Err(Error::NotOperating)));
    }

    #[test]
    fn test_mark_operating_started() {
        let store = ResourceStore::new();
        let roles = StaticRoles::new();
        let mut txn = Transaction::new(&store, &roles);

        let outsider = Signer::new(AccountAddress::from_u128(0xB0B));
        assert!(matches!(
            mark_operating_started(&mut txn, &outsider),
            Err(Error::Authorization(_))
        ));

        mark_operating_started(&mut txn, &root()).unwrap();
        assert!(is_operating(&txn));
        assert_eq!(now_microseconds(&txn).unwrap(), 0);

        // One-way transition
        assert!(matches!(
            mark_operating_started(&mut txn, &root()),
            Err(Error::State(_))
        ));
    }

    #[test]
    fn test_advance_time() {
        let store = ResourceStore::new();
        let roles = StaticRoles::new();
        let mut txn = Transaction::new(&store, &roles);

        assert!(matches!(
            advance_time(&mut txn, &vm(), PROPOSER, 10),
            Err(Error::NotOperating)
        ));

        mark_operating_started(&mut txn, &root()).unwrap();

        assert!(matches!(
            advance_time(&mut txn, &root(), PROPOSER, 10),
            Err(Error::Authorization(_))
        ));

        advance_time(&mut txn, &vm(), PROPOSER, 2_500_000).unwrap();
        assert_eq!(now_microseconds(&txn).unwrap(), 2_500_000);
        assert_eq!(now_seconds(&txn).unwrap(), 2);

        assert!(matches!(
            advance_time(&mut txn, &vm(), PROPOSER, 2_500_000),
            Err(Error::Timestamp(_))
        ));
        assert!(matches!(
            advance_time(&mut txn, &vm(), PROPOSER, 1),
            Err(Error::Timestamp(_))
        ));
        assert_eq!(now_microseconds(&txn).unwrap(), 2_500_000);
    }

    #[test]
    fn test_vm_proposer_must_repeat_time() {
        let store = ResourceStore::new();
        let roles = StaticRoles::new();
        let mut txn = Transaction::new(&store, &roles);
        mark_operating_started(&mut txn, &root()).unwrap();
        advance_time(&mut txn, &vm(), PROPOSER, 100).unwrap();

        advance_time(&mut txn, &vm(), address::VM_RESERVED_ADDRESS, 100).unwrap();
        assert!(matches!(
            advance_time(&mut txn, &vm(), address::VM_RESERVED_ADDRESS, 101),
            Err(Error::Timestamp(_))
        ));
        assert_eq!(now_microseconds(&txn).unwrap(), 100);
    }
}
