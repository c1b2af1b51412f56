//! Ledger engine.
//!
//! Every balance change goes through one atomic section: the participating
//! accounts are locked in ascending id order, new states are staged on
//! copies, the matching records are appended to the journal in one batch,
//! and only then are the staged states written back. A failure at any step
//! leaves both the store and the journal exactly as they were.

use crate::account::{Account, AccountId, AccountStatus, Counter};
use crate::config::LedgerConfig;
use crate::decimal::{Credits, FeeRate};
use crate::error::{LedgerError, Result};
use crate::journal::{Journal, MemoryJournal};
use crate::store::AccountStore;
use crate::transaction::{
    HistoryFilter, ItemRef, Metadata, NewRecord, Page, TransactionRecord, TxKind,
};
use log::debug;

/// A single-account movement requested by a flow.
#[derive(Debug, Clone)]
pub struct Entry {
    pub account: AccountId,
    /// Magnitude; always positive. The direction comes from `kind`.
    pub amount: Credits,
    pub kind: TxKind,
    pub description: String,
    pub metadata: Metadata,
    pub reference: Option<String>,
}

impl Entry {
    pub fn new(
        account: AccountId,
        amount: Credits,
        kind: TxKind,
        description: impl Into<String>,
    ) -> Self {
        Entry {
            account,
            amount,
            kind,
            description: description.into(),
            metadata: Metadata::default(),
            reference: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// A debit of `source` and a net credit of `destination`, minus the fee.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub source: AccountId,
    pub destination: AccountId,
    pub gross: Credits,
    pub fee_rate: FeeRate,
    pub min: Option<Credits>,
    pub max: Option<Credits>,
    pub out_kind: TxKind,
    pub in_kind: TxKind,
    pub out_description: String,
    pub in_description: String,
    pub item: Option<ItemRef>,
    /// Reference for the source-side record.
    pub reference: Option<String>,
}

impl TransferRequest {
    /// A plain fee-less transfer between two accounts.
    pub fn new(source: AccountId, destination: AccountId, gross: Credits) -> Self {
        TransferRequest {
            source,
            destination,
            gross,
            fee_rate: FeeRate::ZERO,
            min: None,
            max: None,
            out_kind: TxKind::TransferOut,
            in_kind: TxKind::TransferIn,
            out_description: format!("Transfer to {}", destination),
            in_description: format!("Transfer from {}", source),
            item: None,
            reference: None,
        }
    }

    pub fn fee_rate(mut self, rate: FeeRate) -> Self {
        self.fee_rate = rate;
        self
    }

    pub fn bounds(mut self, min: Credits, max: Option<Credits>) -> Self {
        self.min = Some(min);
        self.max = max;
        self
    }

    pub fn kinds(mut self, out_kind: TxKind, in_kind: TxKind) -> Self {
        self.out_kind = out_kind;
        self.in_kind = in_kind;
        self
    }

    /// Uses the same description on both sides.
    pub fn description(self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.descriptions(description.clone(), description)
    }

    pub fn descriptions(mut self, outgoing: impl Into<String>, incoming: impl Into<String>) -> Self {
        self.out_description = outgoing.into();
        self.in_description = incoming.into();
        self
    }

    pub fn item(mut self, item: ItemRef) -> Self {
        self.item = Some(item);
        self
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// Outcome of a single-account operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Receipt {
    pub account: AccountId,
    pub balance: Credits,
    pub reference: String,
}

/// Outcome of a transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferReceipt {
    pub source: AccountId,
    pub destination: AccountId,
    pub source_balance: Credits,
    pub destination_balance: Credits,
    pub gross: Credits,
    pub fee: Credits,
    pub net: Credits,
    /// Source record first, then destination, then the platform record if any.
    pub references: Vec<String>,
}

/// An account and its history read under the account's lock.
#[derive(Debug, Clone)]
pub struct Statement {
    pub account: Account,
    pub records: Vec<TransactionRecord>,
}

/// One signed movement inside the atomic section.
struct Posting {
    account: AccountId,
    delta: Credits,
    counter: Counter,
    kind: TxKind,
    description: String,
    metadata: Metadata,
    reference: Option<String>,
}

impl Posting {
    fn credit(entry: Entry) -> Self {
        Posting {
            account: entry.account,
            delta: entry.amount,
            counter: Counter::Earned,
            kind: entry.kind,
            description: entry.description,
            metadata: entry.metadata,
            reference: entry.reference,
        }
    }

    fn debit(entry: Entry) -> Self {
        Posting {
            account: entry.account,
            delta: -entry.amount,
            counter: Counter::Spent,
            kind: entry.kind,
            description: entry.description,
            metadata: entry.metadata,
            reference: entry.reference,
        }
    }
}

/// The ledger: account store plus journal, mutated only as a unit.
///
/// Shared between request handlers through an `Arc`; every method takes
/// `&self`.
pub struct Ledger<J: Journal = MemoryJournal> {
    store: AccountStore,
    journal: J,
    platform: Option<AccountId>,
}

impl Ledger<MemoryJournal> {
    /// In-memory ledger configured by `config`.
    pub fn new(config: &LedgerConfig) -> Self {
        Self::with_journal(config, MemoryJournal::new(config.reference_attempts))
    }
}

impl Default for Ledger<MemoryJournal> {
    fn default() -> Self {
        Self::new(&LedgerConfig::default())
    }
}

impl<J: Journal> Ledger<J> {
    pub fn with_journal(config: &LedgerConfig, journal: J) -> Self {
        let store = AccountStore::new(config.lock_timeout());
        let platform = if config.platform_account {
            Some(store.open(AccountStatus::Active))
        } else {
            None
        };
        Ledger {
            store,
            journal,
            platform,
        }
    }

    /// Opens an active zero-balance account.
    pub fn open_account(&self) -> AccountId {
        self.store.open(AccountStatus::Active)
    }

    pub fn store(&self) -> &AccountStore {
        &self.store
    }

    pub fn journal(&self) -> &J {
        &self.journal
    }

    /// Account collecting platform fees, when configured.
    pub fn platform_account(&self) -> Option<AccountId> {
        self.platform
    }

    pub fn balance(&self, account: AccountId) -> Result<Credits> {
        self.store.balance(account)
    }

    pub fn set_status(&self, account: AccountId, status: AccountStatus) -> Result<()> {
        self.store.set_status(account, status)
    }

    /// Removes `entry.amount` from the account.
    ///
    /// `entry.kind` must be a debit-like kind (debit, purchase, donation,
    /// withdrawal, transfer-out).
    pub fn debit(&self, entry: Entry) -> Result<Receipt> {
        ensure_positive(entry.amount)?;
        if entry.kind.is_credit() {
            return Err(LedgerError::InvalidAmount(format!(
                "{} cannot be used to debit",
                entry.kind
            )));
        }

        let account = entry.account;
        let amount = entry.amount;
        let record = single(self.execute(vec![Posting::debit(entry)])?)?;
        debug!("Debited {} from {}, balance {}", amount, account, record.balance_after);
        Ok(receipt(record))
    }

    /// Adds `entry.amount` to the account. `entry.kind` must be credit-like.
    pub fn earn(&self, entry: Entry) -> Result<Receipt> {
        ensure_positive(entry.amount)?;
        ensure_credit_kind(entry.kind)?;

        let account = entry.account;
        let amount = entry.amount;
        let record = single(self.execute(vec![Posting::credit(entry)])?)?;
        debug!("Credited {} to {}, balance {}", amount, account, record.balance_after);
        Ok(receipt(record))
    }

    /// Credits several accounts as one unit: all land or none do.
    pub fn distribute(&self, entries: Vec<Entry>) -> Result<Vec<Receipt>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        for entry in &entries {
            ensure_positive(entry.amount)?;
            ensure_credit_kind(entry.kind)?;
        }

        let postings = entries.into_iter().map(Posting::credit).collect();
        let records = self.execute(postings)?;
        debug!("Distributed {} credits", records.len());
        Ok(records.into_iter().map(receipt).collect())
    }

    /// Moves `gross` out of the source; the destination receives `gross`
    /// less `gross * fee_rate`.
    ///
    /// The fee is credited to the platform account when one is configured,
    /// otherwise it leaves circulation.
    pub fn transfer(&self, request: TransferRequest) -> Result<TransferReceipt> {
        if request.source == request.destination {
            return Err(LedgerError::SelfReferenceNotAllowed);
        }
        ensure_positive(request.gross)?;
        if let Some(min) = request.min {
            if request.gross < min {
                return Err(LedgerError::InvalidAmount(format!(
                    "{} is below the minimum of {}",
                    request.gross, min
                )));
            }
        }
        if let Some(max) = request.max {
            if request.gross > max {
                return Err(LedgerError::InvalidAmount(format!(
                    "{} exceeds the maximum of {}",
                    request.gross, max
                )));
            }
        }
        if request.out_kind.is_credit() || !request.in_kind.is_credit() {
            return Err(LedgerError::InvalidAmount(format!(
                "{}/{} is not a debit/credit pair",
                request.out_kind, request.in_kind
            )));
        }

        let fee = request.gross.portion(request.fee_rate);
        let net = request.gross - fee;

        let mut postings = vec![
            Posting {
                account: request.source,
                delta: -request.gross,
                counter: Counter::Spent,
                kind: request.out_kind,
                description: request.out_description.clone(),
                metadata: Metadata {
                    counterparty: Some(request.destination),
                    item: request.item,
                    platform_fee: Some(fee),
                },
                reference: request.reference.clone(),
            },
            Posting {
                account: request.destination,
                delta: net,
                counter: Counter::Earned,
                kind: request.in_kind,
                description: request.in_description.clone(),
                metadata: Metadata {
                    counterparty: Some(request.source),
                    item: request.item,
                    platform_fee: None,
                },
                reference: None,
            },
        ];
        if let Some(platform) = self.platform.filter(|_| fee.is_positive()) {
            postings.push(Posting {
                account: platform,
                delta: fee,
                counter: Counter::Earned,
                kind: TxKind::Earning,
                description: format!("Platform fee: {}", request.out_description),
                metadata: Metadata {
                    counterparty: Some(request.source),
                    item: request.item,
                    platform_fee: Some(fee),
                },
                reference: None,
            });
        }

        let records = self.execute(postings)?;
        let (source_balance, destination_balance) = match records.as_slice() {
            [out, inc, ..] => (out.balance_after, inc.balance_after),
            _ => {
                return Err(LedgerError::StorageFailure(
                    "transfer produced fewer than two records".to_string(),
                ))
            }
        };

        debug!(
            "Transferred {} from {} to {} (fee {}, net {})",
            request.gross, request.source, request.destination, fee, net
        );

        Ok(TransferReceipt {
            source: request.source,
            destination: request.destination,
            source_balance,
            destination_balance,
            gross: request.gross,
            fee,
            net,
            references: records.into_iter().map(|r| r.reference).collect(),
        })
    }

    /// History without taking the account lock. Each returned record is
    /// complete, but a concurrent writer may append right after the read.
    pub fn history(
        &self,
        account: AccountId,
        filter: &HistoryFilter,
        page: Page,
    ) -> Result<Vec<TransactionRecord>> {
        if !self.store.contains(account) {
            return Err(LedgerError::AccountNotFound(account));
        }
        self.journal.query(account, filter, page)
    }

    /// Balance and history read together under the account's lock, so the
    /// newest record's `balance_after` always equals the reported balance.
    pub fn statement(
        &self,
        account: AccountId,
        filter: &HistoryFilter,
        page: Page,
    ) -> Result<Statement> {
        let participants = self.store.participants(&[account])?;
        let locked = participants.lock()?;
        let snapshot = locked.account(account)?.clone();
        let records = self.journal.query(account, filter, page)?;
        Ok(Statement {
            account: snapshot,
            records,
        })
    }

    /// The atomic section shared by every mutating operation.
    fn execute(&self, postings: Vec<Posting>) -> Result<Vec<TransactionRecord>> {
        let ids: Vec<AccountId> = postings.iter().map(|p| p.account).collect();
        let participants = self.store.participants(&ids)?;
        let mut locked = participants.lock()?;

        for id in &ids {
            if !locked.account(*id)?.is_active() {
                return Err(LedgerError::AccountInactive(*id));
            }
        }

        let mut staged = locked.stage();
        let mut records = Vec::with_capacity(postings.len());
        for posting in postings {
            let (before, after) = staged.adjust(posting.account, posting.delta, posting.counter)?;
            records.push(NewRecord {
                reference: posting.reference,
                account: posting.account,
                kind: posting.kind,
                amount: posting.delta,
                balance_before: before,
                balance_after: after,
                description: posting.description,
                metadata: posting.metadata,
            });
        }

        let appended = self.journal.append_all(records)?;
        locked.commit(staged);
        Ok(appended)
    }
}

fn single(mut records: Vec<TransactionRecord>) -> Result<TransactionRecord> {
    records
        .pop()
        .ok_or_else(|| LedgerError::StorageFailure("journal returned no record".to_string()))
}

fn ensure_positive(amount: Credits) -> Result<()> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(LedgerError::InvalidAmount(format!(
            "{} must be greater than zero",
            amount
        )))
    }
}

fn ensure_credit_kind(kind: TxKind) -> Result<()> {
    if kind.is_credit() {
        Ok(())
    } else {
        Err(LedgerError::InvalidAmount(format!("{} cannot be used to credit", kind)))
    }
}

fn receipt(record: TransactionRecord) -> Receipt {
    Receipt {
        account: record.account,
        balance: record.balance_after,
        reference: record.reference,
    }
}
