//! Property-based tests for ledger invariants
//!
//! - Conservation: without a platform account the system total drops by
//!   exactly the fees; with one it never changes
//! - Non-negativity: no balance or snapshot ever goes below zero
//! - Replayability: every balance equals the sum of its records

use proptest::prelude::*;
use rewards_ledger::{
    AccountId, Credits, Entry, FeeRate, HistoryFilter, Journal, Ledger, LedgerConfig, LedgerError,
    Page,
    TransferRequest, TxKind,
};
use rust_decimal::Decimal;

const ACCOUNTS: usize = 4;

/// Amounts with up to four decimal places, 0.0001 to 200.
fn amount_strategy() -> impl Strategy<Value = Credits> {
    (1i64..2_000_000i64).prop_map(|units| Credits::new(Decimal::new(units, 4)))
}

fn fee_strategy() -> impl Strategy<Value = FeeRate> {
    prop_oneof![
        Just(FeeRate::ZERO),
        Just(FeeRate::percent(2)),
        Just(FeeRate::percent(5)),
        (0u32..=100).prop_map(FeeRate::percent),
    ]
}

#[derive(Debug, Clone)]
enum Op {
    Earn(usize, Credits),
    Debit(usize, Credits),
    Transfer(usize, usize, Credits, FeeRate),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..ACCOUNTS, amount_strategy()).prop_map(|(a, amt)| Op::Earn(a, amt)),
        (0..ACCOUNTS, amount_strategy()).prop_map(|(a, amt)| Op::Debit(a, amt)),
        (0..ACCOUNTS, 0..ACCOUNTS, amount_strategy(), fee_strategy())
            .prop_map(|(a, b, amt, fee)| Op::Transfer(a, b, amt, fee)),
    ]
}

/// Applies `ops`, returning the total removed as fees.
fn apply(ledger: &Ledger, accounts: &[AccountId], ops: &[Op]) -> Credits {
    let mut fees = Credits::ZERO;
    for op in ops {
        let result = match op {
            Op::Earn(a, amount) => ledger
                .earn(Entry::new(accounts[*a], *amount, TxKind::Earning, "reward"))
                .map(|_| ()),
            Op::Debit(a, amount) => ledger
                .debit(Entry::new(accounts[*a], *amount, TxKind::Purchase, "purchase"))
                .map(|_| ()),
            Op::Transfer(a, b, amount, fee) => ledger
                .transfer(TransferRequest::new(accounts[*a], accounts[*b], *amount).fee_rate(*fee))
                .map(|receipt| fees += receipt.fee),
        };
        match result {
            Ok(())
            | Err(LedgerError::InsufficientFunds { .. })
            | Err(LedgerError::SelfReferenceNotAllowed) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    fees
}

/// Earnings always succeed, so the injected total is known up front.
fn earned_total(ops: &[Op]) -> Credits {
    ops.iter()
        .filter_map(|op| match op {
            Op::Earn(_, amount) => Some(*amount),
            _ => None,
        })
        .sum()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_balances_never_negative(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let ledger = Ledger::default();
        let accounts: Vec<AccountId> = (0..ACCOUNTS).map(|_| ledger.open_account()).collect();
        apply(&ledger, &accounts, &ops);

        for record in ledger.journal().records().unwrap() {
            prop_assert!(!record.balance_before.is_negative());
            prop_assert!(!record.balance_after.is_negative());
            prop_assert_eq!(record.balance_before + record.amount, record.balance_after);
        }
        for id in &accounts {
            prop_assert!(!ledger.balance(*id).unwrap().is_negative());
        }
    }

    #[test]
    fn prop_balance_equals_sum_of_records(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let ledger = Ledger::default();
        let accounts: Vec<AccountId> = (0..ACCOUNTS).map(|_| ledger.open_account()).collect();
        apply(&ledger, &accounts, &ops);

        for id in &accounts {
            let records = ledger.history(*id, &HistoryFilter::default(), Page::all()).unwrap();
            let sum: Credits = records.iter().map(|r| r.amount).sum();
            prop_assert_eq!(sum, ledger.balance(*id).unwrap());
        }
    }

    #[test]
    fn prop_fees_are_the_only_leak(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let ledger = Ledger::default();
        let accounts: Vec<AccountId> = (0..ACCOUNTS).map(|_| ledger.open_account()).collect();
        let fees = apply(&ledger, &accounts, &ops);

        let debited: Credits = ledger
            .journal()
            .records()
            .unwrap()
            .iter()
            .filter(|r| r.kind == TxKind::Purchase)
            .map(|r| r.amount.abs())
            .sum();
        let expected = earned_total(&ops) - debited - fees;
        prop_assert_eq!(ledger.store().total_balance().unwrap(), expected);
    }

    #[test]
    fn prop_platform_account_conserves(
        seed in amount_strategy(),
        transfers in prop::collection::vec((0..ACCOUNTS, 0..ACCOUNTS, amount_strategy(), fee_strategy()), 1..40),
    ) {
        let config = LedgerConfig { platform_account: true, ..LedgerConfig::default() };
        let ledger = Ledger::new(&config);
        let accounts: Vec<AccountId> = (0..ACCOUNTS).map(|_| ledger.open_account()).collect();
        for id in &accounts {
            ledger.earn(Entry::new(*id, seed, TxKind::Credit, "seed")).unwrap();
        }
        let total = ledger.store().total_balance().unwrap();

        let ops: Vec<Op> = transfers
            .into_iter()
            .map(|(a, b, amount, fee)| Op::Transfer(a, b, amount, fee))
            .collect();
        let fees = apply(&ledger, &accounts, &ops);

        let platform = ledger.platform_account().unwrap();
        prop_assert_eq!(ledger.balance(platform).unwrap(), fees);
        prop_assert_eq!(ledger.store().total_balance().unwrap(), total);
    }
}
