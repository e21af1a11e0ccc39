//! Registry of currency codes
//!
//! The set of codes is itself a configuration value, so adding a currency
//! after genesis goes through [`reconfig`] and starts a new epoch.

use crate::{
    address::ROOT_ADDRESS,
    reconfig::{self, ConfigPayload, ModifyCapability},
    roles,
    store::{Resource, Transaction},
    types::{Signer, TypeTag},
    Error, Result,
};
use serde::{Deserialize, Serialize};

/// Longest accepted currency code, exclusive
pub const MAX_CURRENCY_CODE_LENGTH: usize = 128;

/// Codes of every registered currency, in registration order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredCurrencies {
    currency_codes: Vec<Vec<u8>>,
}

impl RegisteredCurrencies {
    /// Registered codes
    pub fn currency_codes(&self) -> &[Vec<u8>] {
        &self.currency_codes
    }

    /// Whether `code` is registered
    pub fn contains(&self, code: &[u8]) -> bool {
        self.currency_codes.iter().any(|c| c.as_slice() == code)
    }
}

impl ConfigPayload for RegisteredCurrencies {
    const NAME: &'static str = "0x1::RegisteredCurrencies::RegisteredCurrencies";
}

/// Root keeps the registry's modify capability here
#[derive(Debug, Serialize, Deserialize)]
struct RegistrationCapability {}

impl Resource for RegistrationCapability {
    fn type_tag() -> TypeTag {
        TypeTag::new("RegisteredCurrencies", "RegistrationCapability")
    }
}

/// Publish the empty registry
pub fn initialize(txn: &mut Transaction<'_>, root: &Signer) -> Result<()> {
    roles::assert_root(txn, root)?;
    let capability =
        reconfig::publish_new_config_and_capability(txn, root, RegisteredCurrencies::default())?;
    // The capability now lives inside the registration record
    let _: ModifyCapability<RegisteredCurrencies> = capability;
    txn.move_to(ROOT_ADDRESS, &RegistrationCapability {})
}

/// Codes are non-empty uppercase ASCII letters and digits
pub fn is_valid_currency_code(code: &[u8]) -> bool {
    !code.is_empty()
        && code.len() < MAX_CURRENCY_CODE_LENGTH
        && code
            .iter()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

/// Add a code to the registry
pub(crate) fn add_currency_code(txn: &mut Transaction<'_>, code: &[u8]) -> Result<()> {
    if !txn.exists::<RegistrationCapability>(ROOT_ADDRESS) {
        return Err(Error::NotPublished(
            "currency registry not initialized".to_string(),
        ));
    }
    if !is_valid_currency_code(code) {
        return Err(Error::InvalidArgument(format!(
            "invalid currency code {:?}",
            String::from_utf8_lossy(code)
        )));
    }

    let mut registered = reconfig::get::<RegisteredCurrencies>(txn)?;
    if registered.contains(code) {
        return Err(Error::DuplicateCurrencyCode(
            String::from_utf8_lossy(code).into_owned(),
        ));
    }
    registered.currency_codes.push(code.to_vec());

    let capability = ModifyCapability::<RegisteredCurrencies>::new();
    reconfig::set_with_capability(txn, &capability, registered)
}

/// Current registry contents
pub fn registered(txn: &Transaction<'_>) -> Result<RegisteredCurrencies> {
    reconfig::get::<RegisteredCurrencies>(txn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{roles::StaticRoles, store::ResourceStore};

    fn root() -> Signer {
        Signer::new(ROOT_ADDRESS)
    }

    #[test]
    fn test_valid_codes() {
        assert!(is_valid_currency_code(b"XUS"));
        assert!(is_valid_currency_code(b"TST1"));
        assert!(!is_valid_currency_code(b""));
        assert!(!is_valid_currency_code(b"xus"));
        assert!(!is_valid_currency_code(b"X-S"));
        assert!(!is_valid_currency_code(&[b'A'; MAX_CURRENCY_CODE_LENGTH]));
    }

    #[test]
    fn test_add_and_reject_duplicate() {
        let store = ResourceStore::new();
        let roles = StaticRoles::new();
        let mut txn = Transaction::new(&store, &roles);
        reconfig::initialize(&mut txn, &root()).unwrap();
        initialize(&mut txn, &root()).unwrap();

        add_currency_code(&mut txn, b"XUS").unwrap();
        add_currency_code(&mut txn, b"TST").unwrap();
        assert!(matches!(
            add_currency_code(&mut txn, b"XUS"),
            Err(Error::DuplicateCurrencyCode(_))
        ));

        let registry = registered(&txn).unwrap();
        assert_eq!(registry.currency_codes(), &[b"XUS".to_vec(), b"TST".to_vec()]);
    }

    #[test]
    fn test_requires_initialize() {
        let store = ResourceStore::new();
        let roles = StaticRoles::new();
        let mut txn = Transaction::new(&store, &roles);

        assert!(matches!(
            add_currency_code(&mut txn, b"XUS"),
            Err(Error::NotPublished(_))
        ));
        initialize(&mut txn, &root()).unwrap();
        assert!(matches!(initialize(&mut txn, &root()), Err(Error::AlreadyPublished(_))));
    }
}
