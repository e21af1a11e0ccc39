//! End-to-end scenarios against an in-memory ledger

use coin_ledger::{
    address::{ROOT_ADDRESS, VM_RESERVED_ADDRESS},
    currency::{self, BurnEvent, CurrencyRegistration, MintEvent, PreburnEvent, MAX_OUTSTANDING_PREBURNS},
    genesis,
    reconfig::{self, ConfigPayload, NewEpochEvent},
    timestamp, AccountAddress, Coin, CurrencyType, Error, ErrorCategory, FixedPoint32, Ledger, Signer,
    StaticRoles,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

struct TST;

impl CurrencyType for TST {
    const TAG: &'static str = "0x1::TST::TST";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct GasSchedule {
    fee: u64,
}

impl ConfigPayload for GasSchedule {
    const NAME: &'static str = "0x1::GasSchedule::GasSchedule";
}

const HOLDER: AccountAddress = AccountAddress::from_u128(0xA);
const DEALER: AccountAddress = AccountAddress::from_u128(0xD);
const PROPOSER: AccountAddress = AccountAddress::from_u128(0x7A11);

fn root() -> Signer {
    Signer::new(ROOT_ADDRESS)
}

fn vm() -> Signer {
    Signer::new(VM_RESERVED_ADDRESS)
}

/// Genesis with TST registered, capabilities held by `HOLDER`, clock at 1s
fn bootstrapped() -> Ledger {
    let mut ledger = Ledger::in_memory(Arc::new(StaticRoles::new().with_dealer(DEALER)));
    ledger
        .execute(|txn| {
            genesis::initialize(txn, &root())?;
            let (mint_cap, burn_cap) = currency::register_currency::<TST>(
                txn,
                &root(),
                CurrencyRegistration {
                    currency_code: b"TST".to_vec(),
                    exchange_rate: FixedPoint32::from_rational(1, 1)?,
                    is_synthetic: false,
                    scaling_factor: 100,
                    fractional_part: 1,
                },
            )?;
            let holder = Signer::new(HOLDER);
            currency::publish_mint_capability(txn, &holder, mint_cap)?;
            currency::publish_burn_capability(txn, &holder, burn_cap)?;
            reconfig::publish_new_config(txn, &root(), GasSchedule { fee: 1 })?;
            genesis::finish(txn, &root())
        })
        .unwrap();
    advance(&mut ledger, 1_000_000);
    ledger
}

fn advance(ledger: &mut Ledger, time: u64) {
    ledger
        .execute(|txn| timestamp::advance_time(txn, &vm(), PROPOSER, time))
        .unwrap();
}

fn mint(ledger: &mut Ledger, amount: u64) -> Coin<TST> {
    ledger
        .execute(|txn| currency::mint::<TST>(txn, &Signer::new(HOLDER), amount))
        .unwrap()
}

fn preburn(ledger: &mut Ledger, coin: &mut Coin<TST>) -> coin_ledger::Result<()> {
    ledger.execute(|txn| currency::preburn_to(txn, &Signer::new(DEALER), coin))
}

#[test]
fn mint_preburn_burn_lifecycle() {
    let mut ledger = bootstrapped();

    let mut coin = mint(&mut ledger, 1000);
    assert_eq!(ledger.view(|txn| currency::market_cap::<TST>(txn)).unwrap(), 1000);

    let mut part = coin.withdraw(400).unwrap();
    preburn(&mut ledger, &mut part).unwrap();
    assert_eq!(part.value(), 0);
    ledger
        .view(|txn| {
            assert_eq!(currency::preburn_queue_len::<TST>(txn, DEALER)?, 1);
            assert_eq!(currency::preburn_value::<TST>(txn)?, 400);
            Ok(())
        })
        .unwrap();

    ledger
        .execute(|txn| currency::burn::<TST>(txn, &Signer::new(HOLDER), DEALER, 400))
        .unwrap();
    ledger
        .view(|txn| {
            assert_eq!(currency::market_cap::<TST>(txn)?, 600);
            assert_eq!(currency::preburn_value::<TST>(txn)?, 0);
            assert_eq!(currency::preburn_queue_len::<TST>(txn, DEALER)?, 0);
            Ok(())
        })
        .unwrap();
    assert_eq!(coin.value(), 600);

    let log = ledger.event_log();
    assert_eq!(log.events_of::<MintEvent>().unwrap().len(), 1);
    assert_eq!(
        log.events_of::<PreburnEvent>().unwrap(),
        vec![PreburnEvent {
            amount: 400,
            currency_code: b"TST".to_vec(),
            preburn_address: DEALER,
        }]
    );
    assert_eq!(log.events_of::<BurnEvent>().unwrap()[0].amount, 400);

    // Retire the rest so nothing is left in circulation
    preburn(&mut ledger, &mut coin).unwrap();
    ledger
        .execute(|txn| currency::burn::<TST>(txn, &Signer::new(HOLDER), DEALER, 600))
        .unwrap();
    assert_eq!(ledger.view(|txn| currency::market_cap::<TST>(txn)).unwrap(), 0);
}

#[test]
fn advance_time_monotonic() {
    let mut ledger = bootstrapped();

    for stale in [1_000_000, 999_999] {
        let err = ledger
            .execute(|txn| timestamp::advance_time(txn, &vm(), PROPOSER, stale))
            .unwrap_err();
        assert!(matches!(err, Error::Timestamp(_)));
        assert_eq!(err.category(), ErrorCategory::Timestamp);
    }

    advance(&mut ledger, 2_000_000);
    assert_eq!(ledger.view(|txn| timestamp::now_microseconds(txn)).unwrap(), 2_000_000);
    assert_eq!(ledger.view(|txn| timestamp::now_seconds(txn)).unwrap(), 2);
}

#[test]
fn preburn_queue_is_bounded() {
    let mut ledger = bootstrapped();

    for _ in 0..MAX_OUTSTANDING_PREBURNS {
        let mut coin = mint(&mut ledger, 1);
        preburn(&mut ledger, &mut coin).unwrap();
    }

    let mut coin = mint(&mut ledger, 1);
    let err = preburn(&mut ledger, &mut coin).unwrap_err();
    assert!(matches!(err, Error::QueueFull { limit: 256, .. }));
    assert_eq!(coin.value(), 1);

    ledger
        .view(|txn| {
            assert_eq!(currency::preburn_queue_len::<TST>(txn, DEALER)?, MAX_OUTSTANDING_PREBURNS);
            assert_eq!(currency::preburn_value::<TST>(txn)?, MAX_OUTSTANDING_PREBURNS as u64);
            Ok(())
        })
        .unwrap();

    // Room frees up once a request is burned
    ledger
        .execute(|txn| currency::burn::<TST>(txn, &Signer::new(HOLDER), DEALER, 1))
        .unwrap();
    preburn(&mut ledger, &mut coin).unwrap();
    assert_eq!(coin.value(), 0);
    assert_eq!(
        ledger.view(|txn| currency::market_cap::<TST>(txn)).unwrap(),
        MAX_OUTSTANDING_PREBURNS as u128
    );
}

#[test]
fn failed_preburn_keeps_coin() {
    let mut ledger = bootstrapped();
    let mut coin = mint(&mut ledger, 500);

    let not_dealer = Signer::new(AccountAddress::from_u128(0xBAD));
    let err = ledger
        .execute(|txn| currency::preburn_to(txn, &not_dealer, &mut coin))
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Authorization);
    assert_eq!(coin.value(), 500);
    assert_eq!(ledger.view(|txn| currency::market_cap::<TST>(txn)).unwrap(), 500);

    // The returned coin can still be retired in full
    preburn(&mut ledger, &mut coin).unwrap();
    ledger
        .execute(|txn| currency::burn::<TST>(txn, &Signer::new(HOLDER), DEALER, 500))
        .unwrap();
    assert_eq!(ledger.view(|txn| currency::market_cap::<TST>(txn)).unwrap(), 0);
}

#[test]
fn burn_of_missing_amount_leaves_queue_untouched() {
    let mut ledger = bootstrapped();
    for amount in [30, 50] {
        let mut coin = mint(&mut ledger, amount);
        preburn(&mut ledger, &mut coin).unwrap();
    }
    let before = ledger
        .view(|txn| currency::preburn_requests::<TST>(txn, DEALER))
        .unwrap();

    let err = ledger
        .execute(|txn| currency::burn::<TST>(txn, &Signer::new(HOLDER), DEALER, 40))
        .unwrap_err();
    assert!(matches!(err, Error::PreburnNotFound { amount: 40, .. }));
    assert_eq!(err.category(), ErrorCategory::EntryNotFound);

    let after = ledger
        .view(|txn| currency::preburn_requests::<TST>(txn, DEALER))
        .unwrap();
    assert_eq!(before, after);
    assert_eq!(ledger.view(|txn| currency::market_cap::<TST>(txn)).unwrap(), 80);
}

#[test]
fn reconfiguration_collapses_within_a_timestamp() {
    let mut ledger = bootstrapped();
    let epoch = |ledger: &Ledger| ledger.view(|txn| reconfig::current_epoch(txn)).unwrap();
    let start = epoch(&ledger);

    ledger
        .execute(|txn| {
            reconfig::set(txn, &root(), GasSchedule { fee: 2 })?;
            reconfig::set(txn, &root(), GasSchedule { fee: 3 })
        })
        .unwrap();
    assert_eq!(epoch(&ledger), start + 1);

    // Same timestamp, separate transaction: still collapsed
    ledger
        .execute(|txn| reconfig::set(txn, &root(), GasSchedule { fee: 4 }))
        .unwrap();
    assert_eq!(epoch(&ledger), start + 1);

    advance(&mut ledger, 3_000_000);
    ledger
        .execute(|txn| reconfig::set(txn, &root(), GasSchedule { fee: 5 }))
        .unwrap();
    assert_eq!(epoch(&ledger), start + 2);
    assert_eq!(
        ledger.view(|txn| reconfig::get::<GasSchedule>(txn)).unwrap(),
        GasSchedule { fee: 5 }
    );

    let epochs: Vec<u64> = ledger
        .event_log()
        .events_of::<NewEpochEvent>()
        .unwrap()
        .into_iter()
        .map(|event| event.epoch)
        .collect();
    assert_eq!(epochs, vec![1, start + 1, start + 2]);
}

#[test]
fn failed_transaction_leaves_no_trace() {
    let mut ledger = bootstrapped();
    let version = ledger.version();
    let events = ledger.event_log().len();

    let result: coin_ledger::Result<()> = ledger.execute(|txn| {
        let mut coin = currency::mint::<TST>(txn, &Signer::new(HOLDER), 500)?;
        currency::preburn_to(txn, &Signer::new(DEALER), &mut coin)?;
        // Nothing queued at this amount
        currency::burn::<TST>(txn, &Signer::new(HOLDER), DEALER, 499)
    });
    assert!(result.is_err());

    assert_eq!(ledger.version(), version);
    assert_eq!(ledger.event_log().len(), events);
    ledger
        .view(|txn| {
            assert_eq!(currency::market_cap::<TST>(txn)?, 0);
            assert_eq!(currency::preburn_queue_len::<TST>(txn, DEALER)?, 0);
            Ok(())
        })
        .unwrap();
}

#[test]
fn mint_requires_registered_currency_and_capability() {
    struct XYZ;
    impl CurrencyType for XYZ {
        const TAG: &'static str = "0x1::XYZ::XYZ";
    }

    let mut ledger = bootstrapped();
    let err = ledger
        .execute(|txn| currency::mint::<TST>(txn, &Signer::new(DEALER), 1))
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Authorization);

    let err = ledger
        .view(|txn| currency::assert_is_currency::<XYZ>(txn))
        .unwrap_err();
    assert!(matches!(err, Error::CurrencyNotRegistered(_)));
}
