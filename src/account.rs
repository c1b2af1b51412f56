//! Account model.
//!
//! Maintains the invariant `balance >= 0` at all times.

use crate::decimal::Credits;
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque account identifier assigned by the account store.
///
/// Ids are totally ordered; the engine acquires account locks in ascending id
/// order so that overlapping operations cannot deadlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(u64);

impl AccountId {
    pub fn new(raw: u64) -> Self {
        AccountId(raw)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "acct-{}", self.0)
    }
}

/// Lifecycle flag. Accounts are never deleted, only suspended or banned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    #[default]
    Active,
    Suspended,
    Banned,
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Banned => "banned",
        };
        f.write_str(s)
    }
}

/// Which lifetime counter an adjustment feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Earned,
    Spent,
}

/// A user's credit account.
///
/// # Invariants
///
/// - `balance >= 0` after every adjustment
/// - `total_earned` and `total_spent` never decrease
#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub id: AccountId,

    /// Spendable credits.
    pub balance: Credits,

    /// Lifetime credits received. Informational only.
    pub total_earned: Credits,

    /// Lifetime credits paid out. Informational only.
    pub total_spent: Credits,

    pub status: AccountStatus,

    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Creates a zero-balance account.
    pub fn new(id: AccountId, status: AccountStatus) -> Self {
        Account {
            id,
            balance: Credits::ZERO,
            total_earned: Credits::ZERO,
            total_spent: Credits::ZERO,
            status,
            created_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Applies a signed `delta` to the balance and bumps `counter` by its
    /// magnitude. Returns the new balance.
    ///
    /// Fails with `InsufficientFunds` without touching the account if the
    /// balance would go negative, and with `InvalidAmount` if the balance or
    /// the counter would pass [`Credits::MAX`].
    pub(crate) fn adjust(&mut self, delta: Credits, counter: Counter) -> Result<Credits> {
        let overflow = || {
            LedgerError::InvalidAmount(format!(
                "{} on account {} would exceed the maximum of {}",
                delta,
                self.id,
                Credits::MAX
            ))
        };
        let next = self.balance.checked_add(delta).ok_or_else(overflow)?;
        if next.is_negative() {
            return Err(LedgerError::InsufficientFunds {
                account: self.id,
                balance: self.balance,
                requested: delta.abs(),
            });
        }

        let (earned, spent) = match counter {
            Counter::Earned => (self.total_earned.checked_add(delta.abs()), Some(self.total_spent)),
            Counter::Spent => (Some(self.total_earned), self.total_spent.checked_add(delta.abs())),
        };
        let (earned, spent) = earned.zip(spent).ok_or_else(overflow)?;

        self.balance = next;
        self.total_earned = earned;
        self.total_spent = spent;
        Ok(next)
    }

    /// Verifies the non-negativity invariants.
    #[cfg(debug_assertions)]
    pub fn check_invariant(&self) -> bool {
        !self.balance.is_negative()
            && !self.total_earned.is_negative()
            && !self.total_spent.is_negative()
    }
}
