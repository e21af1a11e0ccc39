//! Genesis bootstrap
//!
//! Genesis runs in two steps so that currencies and initial config values can
//! be registered in between, while reconfiguration is still silent:
//!
//! ```text
//! initialize(root) ─▶ register currencies, publish configs ─▶ finish(root)
//! ```

use crate::{reconfig, registered_currencies, store::Transaction, timestamp, types::Signer, Result};

/// Publish the configuration singleton and the empty currency registry
pub fn initialize(txn: &mut Transaction<'_>, root: &Signer) -> Result<()> {
    timestamp::assert_genesis(txn)?;
    reconfig::initialize(txn, root)?;
    registered_currencies::initialize(txn, root)?;
    tracing::info!("Genesis initialized");
    Ok(())
}

/// Start the clock and open epoch 1
pub fn finish(txn: &mut Transaction<'_>, root: &Signer) -> Result<()> {
    timestamp::mark_operating_started(txn, root)?;
    reconfig::emit_genesis_reconfiguration_event(txn, root)?;
    tracing::info!("Genesis finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        address::ROOT_ADDRESS, reconfig::NewEpochEvent, roles::StaticRoles, store::ResourceStore,
        types::AccountAddress, Error,
    };

    #[test]
    fn test_genesis_sequence() {
        let store = ResourceStore::new();
        let roles = StaticRoles::new();
        let mut txn = Transaction::new(&store, &roles);
        let root = Signer::new(ROOT_ADDRESS);

        initialize(&mut txn, &root).unwrap();
        assert!(timestamp::is_genesis(&txn));
        assert_eq!(reconfig::current_epoch(&txn).unwrap(), 0);
        assert!(registered_currencies::registered(&txn).unwrap().currency_codes().is_empty());

        finish(&mut txn, &root).unwrap();
        assert!(timestamp::is_operating(&txn));
        assert_eq!(reconfig::current_epoch(&txn).unwrap(), 1);

        let events = txn.pending_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].decode::<NewEpochEvent>().unwrap().epoch, 1);

        assert!(matches!(finish(&mut txn, &root), Err(Error::State(_))));
        assert!(matches!(initialize(&mut txn, &root), Err(Error::State(_))));
    }

    #[test]
    fn test_genesis_requires_root() {
        let store = ResourceStore::new();
        let roles = StaticRoles::new();
        let mut txn = Transaction::new(&store, &roles);

        let outsider = Signer::new(AccountAddress::from_u128(0x42));
        assert!(matches!(initialize(&mut txn, &outsider), Err(Error::Authorization(_))));
    }
}
