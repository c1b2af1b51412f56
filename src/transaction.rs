//! Transaction records: the append-only evidence behind every balance.

use crate::account::AccountId;
use crate::decimal::Credits;
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a record documents.
///
/// Amounts are signed deltas: credit-like kinds carry non-negative amounts,
/// debit-like kinds carry non-positive amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    /// Manual or administrative credit.
    Credit,
    /// Manual or administrative debit.
    Debit,
    TransferIn,
    TransferOut,
    /// Buyer's side of a marketplace sale.
    Purchase,
    /// Rewards, bonuses and sale proceeds.
    Earning,
    /// Donor's side of a donation.
    Donation,
    Withdrawal,
}

impl TxKind {
    /// `true` for kinds that add to the owning account.
    pub fn is_credit(&self) -> bool {
        matches!(self, TxKind::Credit | TxKind::TransferIn | TxKind::Earning)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Credit => "credit",
            TxKind::Debit => "debit",
            TxKind::TransferIn => "transfer_in",
            TxKind::TransferOut => "transfer_out",
            TxKind::Purchase => "purchase",
            TxKind::Earning => "earning",
            TxKind::Donation => "donation",
            TxKind::Withdrawal => "withdrawal",
        }
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    #[default]
    Completed,
    Failed,
}

/// Catalogue entry a record relates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum ItemRef {
    Listing(u64),
    Book(u64),
    Movie(u64),
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemRef::Listing(id) => write!(f, "listing:{}", id),
            ItemRef::Book(id) => write!(f, "book:{}", id),
            ItemRef::Movie(id) => write!(f, "movie:{}", id),
        }
    }
}

/// Optional context attached to a record.
///
/// The two records of a transfer are linked by naming each other's account
/// as `counterparty`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub counterparty: Option<AccountId>,
    pub item: Option<ItemRef>,
    pub platform_fee: Option<Credits>,
}

impl Metadata {
    pub fn item(item: ItemRef) -> Self {
        Metadata {
            item: Some(item),
            ..Metadata::default()
        }
    }

    pub fn with_counterparty(mut self, account: AccountId) -> Self {
        self.counterparty = Some(account);
        self
    }
}

/// Generates a reference of the form `TXN-<unix millis>-<8 alphanumerics>`.
pub fn generate_reference() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect();
    format!("TXN-{}-{}", Utc::now().timestamp_millis(), suffix)
}

/// A record as submitted to the journal, before a reference and sequence
/// number are assigned.
#[derive(Debug, Clone)]
pub struct NewRecord {
    /// Caller-chosen reference. Generated when `None`.
    pub reference: Option<String>,
    pub account: AccountId,
    pub kind: TxKind,
    /// Signed delta applied to `account`.
    pub amount: Credits,
    pub balance_before: Credits,
    pub balance_after: Credits,
    pub description: String,
    pub metadata: Metadata,
}

impl NewRecord {
    /// Checks the sign convention and the snapshot arithmetic.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.kind.is_credit() && self.amount.is_negative() {
            return Err(format!("{} record with negative amount {}", self.kind, self.amount));
        }
        if !self.kind.is_credit() && self.amount.is_positive() {
            return Err(format!("{} record with positive amount {}", self.kind, self.amount));
        }
        if self.balance_before + self.amount != self.balance_after {
            return Err(format!(
                "balance snapshot {} + {} != {}",
                self.balance_before, self.amount, self.balance_after
            ));
        }
        if self.balance_after.is_negative() {
            return Err(format!("negative balance_after {}", self.balance_after));
        }
        Ok(())
    }
}

/// An immutable journal entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRecord {
    /// Position in the journal; strictly increasing.
    pub sequence: u64,
    pub reference: String,
    pub account: AccountId,
    pub kind: TxKind,
    pub amount: Credits,
    pub balance_before: Credits,
    pub balance_after: Credits,
    pub description: String,
    pub metadata: Metadata,
    pub status: TxStatus,
    pub created_at: DateTime<Utc>,
}

/// History query filter. Empty `kinds` matches every kind.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub kinds: Vec<TxKind>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl HistoryFilter {
    pub fn kinds(kinds: &[TxKind]) -> Self {
        HistoryFilter {
            kinds: kinds.to_vec(),
            ..HistoryFilter::default()
        }
    }

    pub fn matches(&self, record: &TransactionRecord) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&record.kind) {
            return false;
        }
        if self.since.is_some_and(|since| record.created_at < since) {
            return false;
        }
        if self.until.is_some_and(|until| record.created_at > until) {
            return false;
        }
        true
    }
}

/// Offset pagination over newest-first results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub const DEFAULT_LIMIT: usize = 20;

    pub fn new(offset: usize, limit: usize) -> Self {
        Page { offset, limit }
    }

    /// Everything, in one page.
    pub fn all() -> Self {
        Page {
            offset: 0,
            limit: usize::MAX,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Page::new(0, Self::DEFAULT_LIMIT)
    }
}
