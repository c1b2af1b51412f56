//! CSV batch driver.
//!
//! Replays a file of operations through the flows in order and reports the
//! final account states. Rejected operations are logged at warn level and
//! skipped; they never abort the batch.
//!
//! Input columns: `op,user,target,amount,note`, plus an optional trailing
//! `reference` for `earn`, `debit` and `transfer` rows. A reference already
//! in the journal rejects the row.

use crate::config::Config;
use crate::decimal::Credits;
use crate::engine::Ledger;
use crate::error::{LedgerError, Result};
use crate::flows::{Adjustment, Flows};
use crate::journal::{Journal, MemoryJournal};
use crate::transaction::TransactionRecord;
use csv::{ReaderBuilder, Trim};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::str::FromStr;
use std::sync::Arc;

/// Raw operation row as read from CSV.
#[derive(Debug, Deserialize)]
pub struct OperationRecord {
    pub op: String,
    pub user: Option<String>,
    pub target: Option<String>,
    pub amount: Option<String>,
    pub note: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
}

/// A parsed operation ready to run.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Signup { user: String },
    Earn { user: String, amount: Credits, reference: Option<String> },
    Debit { user: String, amount: Credits, reference: Option<String> },
    Transfer {
        user: String,
        to: String,
        amount: Credits,
        note: Option<String>,
        reference: Option<String>,
    },
    Suspend { user: String },
    Activate { user: String },
    List { user: String, title: String, price: Credits },
    Buy { user: String, listing: u64 },
    Book { user: String, title: String },
    Read { user: String, book: u64, pages: u32 },
    Donate { user: String, book: u64, amount: Credits, note: Option<String> },
    Movie { title: String },
    Watch { user: String, movie: u64 },
    Vote { user: String, movie: u64 },
}

impl OperationRecord {
    /// Parses the raw row into a typed operation.
    pub fn parse(&self) -> std::result::Result<Operation, String> {
        let op = self.op.trim().to_lowercase();
        let parsed = match op.as_str() {
            "signup" => Operation::Signup { user: self.user()? },
            "earn" => Operation::Earn {
                user: self.user()?,
                amount: self.amount()?,
                reference: self.reference(),
            },
            "debit" => Operation::Debit {
                user: self.user()?,
                amount: self.amount()?,
                reference: self.reference(),
            },
            "transfer" => Operation::Transfer {
                user: self.user()?,
                to: self.target()?,
                amount: self.amount()?,
                note: self.note(),
                reference: self.reference(),
            },
            "suspend" => Operation::Suspend { user: self.user()? },
            "activate" => Operation::Activate { user: self.user()? },
            "list" => Operation::List {
                user: self.user()?,
                title: self.target()?,
                price: self.amount()?,
            },
            "buy" => Operation::Buy {
                user: self.user()?,
                listing: self.target_id()?,
            },
            "book" => Operation::Book {
                user: self.user()?,
                title: self.target()?,
            },
            "read" => Operation::Read {
                user: self.user()?,
                book: self.target_id()?,
                pages: self.pages()?,
            },
            "donate" => Operation::Donate {
                user: self.user()?,
                book: self.target_id()?,
                amount: self.amount()?,
                note: self.note(),
            },
            "movie" => Operation::Movie {
                title: self.target()?,
            },
            "watch" => Operation::Watch {
                user: self.user()?,
                movie: self.target_id()?,
            },
            "vote" => Operation::Vote {
                user: self.user()?,
                movie: self.target_id()?,
            },
            other => return Err(format!("unknown operation {:?}", other)),
        };
        Ok(parsed)
    }

    fn field(value: &Option<String>, name: &str) -> std::result::Result<String, String> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| format!("missing {}", name))
    }

    fn user(&self) -> std::result::Result<String, String> {
        Self::field(&self.user, "user")
    }

    fn target(&self) -> std::result::Result<String, String> {
        Self::field(&self.target, "target")
    }

    fn target_id(&self) -> std::result::Result<u64, String> {
        let raw = self.target()?;
        raw.parse().map_err(|_| format!("invalid id {:?}", raw))
    }

    fn amount(&self) -> std::result::Result<Credits, String> {
        let raw = Self::field(&self.amount, "amount")?;
        Credits::from_str(&raw).map_err(|e| format!("invalid amount {:?}: {}", raw, e))
    }

    fn pages(&self) -> std::result::Result<u32, String> {
        let raw = Self::field(&self.amount, "amount")?;
        raw.parse().map_err(|_| format!("invalid page count {:?}", raw))
    }

    fn note(&self) -> Option<String> {
        Self::field(&self.note, "note").ok()
    }

    fn reference(&self) -> Option<String> {
        Self::field(&self.reference, "reference").ok()
    }
}

/// Counts of applied and rejected rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub applied: usize,
    pub rejected: usize,
}

/// Flat journal row for CSV export.
#[derive(Debug, Serialize)]
struct JournalRow<'a> {
    sequence: u64,
    reference: &'a str,
    account: String,
    kind: &'static str,
    amount: String,
    balance_before: String,
    balance_after: String,
    description: &'a str,
    counterparty: String,
    item: String,
    platform_fee: String,
    status: String,
    created_at: String,
}

impl<'a> From<&'a TransactionRecord> for JournalRow<'a> {
    fn from(record: &'a TransactionRecord) -> Self {
        JournalRow {
            sequence: record.sequence,
            reference: &record.reference,
            account: record.account.to_string(),
            kind: record.kind.as_str(),
            amount: record.amount.to_string(),
            balance_before: record.balance_before.to_string(),
            balance_after: record.balance_after.to_string(),
            description: &record.description,
            counterparty: record
                .metadata
                .counterparty
                .map(|c| c.to_string())
                .unwrap_or_default(),
            item: record.metadata.item.map(|i| i.to_string()).unwrap_or_default(),
            platform_fee: record
                .metadata
                .platform_fee
                .map(|f| f.to_string())
                .unwrap_or_default(),
            status: format!("{:?}", record.status).to_lowercase(),
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

/// Runs CSV batches against one set of flows.
pub struct BatchProcessor<J: Journal = MemoryJournal> {
    flows: Flows<J>,
}

impl BatchProcessor<MemoryJournal> {
    pub fn new(config: &Config) -> Self {
        let ledger = Arc::new(Ledger::new(&config.ledger));
        BatchProcessor {
            flows: Flows::new(ledger, config.policy.clone()),
        }
    }
}

impl Default for BatchProcessor<MemoryJournal> {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl<J: Journal> BatchProcessor<J> {
    pub fn with_flows(flows: Flows<J>) -> Self {
        BatchProcessor { flows }
    }

    pub fn flows(&self) -> &Flows<J> {
        &self.flows
    }

    /// Processes operations from a CSV reader in streaming fashion.
    pub fn process_csv<R: Read>(&mut self, reader: R) -> Result<BatchSummary> {
        let mut csv_reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);

        let mut summary = BatchSummary::default();
        for (row_idx, result) in csv_reader.deserialize::<OperationRecord>().enumerate() {
            let row = row_idx + 2; // 1-indexed, accounting for header row

            let outcome = result
                .map_err(LedgerError::from)
                .and_then(|record| {
                    record
                        .parse()
                        .map_err(|message| LedgerError::InvalidRecord { row, message })
                })
                .and_then(|op| self.apply(op, row));

            match outcome {
                Ok(()) => summary.applied += 1,
                Err(e) => {
                    warn!("Row {}: {}", row, e);
                    summary.rejected += 1;
                }
            }
        }

        info!(
            "Batch complete: {} applied, {} rejected",
            summary.applied, summary.rejected
        );
        Ok(summary)
    }

    /// Runs one operation.
    pub fn apply(&self, op: Operation, row: usize) -> Result<()> {
        let flows = &self.flows;
        match op {
            Operation::Signup { user } => {
                let id = flows.signup(&user)?;
                debug!("Row {}: {} signed up as {}", row, user, id);
            }
            Operation::Earn {
                user,
                amount,
                reference,
            } => {
                let account = flows.resolve(&user)?;
                flows.admin_adjust(account, amount, Adjustment::Add, reference.as_deref())?;
            }
            Operation::Debit {
                user,
                amount,
                reference,
            } => {
                let account = flows.resolve(&user)?;
                flows.admin_adjust(account, amount, Adjustment::Subtract, reference.as_deref())?;
            }
            Operation::Transfer {
                user,
                to,
                amount,
                note,
                reference,
            } => {
                let receipt = flows.transfer(
                    flows.resolve(&user)?,
                    &to,
                    amount,
                    note.as_deref(),
                    reference.as_deref(),
                )?;
                debug!(
                    "Row {}: {} sent {} to {} (fee {})",
                    row, user, receipt.gross, to, receipt.fee
                );
            }
            Operation::Suspend { user } => flows.suspend(flows.resolve(&user)?)?,
            Operation::Activate { user } => flows.activate(flows.resolve(&user)?)?,
            Operation::List { user, title, price } => {
                let id = flows.create_listing(flows.resolve(&user)?, &title, price)?;
                info!("Row {}: {} listed {:?} as listing {}", row, user, title, id);
            }
            Operation::Buy { user, listing } => {
                flows.purchase(flows.resolve(&user)?, listing)?;
            }
            Operation::Book { user, title } => {
                let id = flows.upload_book(flows.resolve(&user)?, &title)?;
                info!("Row {}: {} uploaded {:?} as book {}", row, user, title, id);
            }
            Operation::Read { user, book, pages } => {
                flows.record_reading(flows.resolve(&user)?, book, pages)?;
            }
            Operation::Donate {
                user,
                book,
                amount,
                note,
            } => {
                flows.donate(flows.resolve(&user)?, book, amount, note.as_deref())?;
            }
            Operation::Movie { title } => {
                let id = flows.catalog().add_movie(&title);
                info!("Row {}: added movie {:?} as movie {}", row, title, id);
            }
            Operation::Watch { user, movie } => {
                flows.reward_watch(flows.resolve(&user)?, movie)?;
            }
            Operation::Vote { user, movie } => {
                flows.vote(flows.resolve(&user)?, movie)?;
            }
        }
        Ok(())
    }

    /// Writes final account states to CSV, sorted by username. The platform
    /// account, if any, comes last as `(platform)`.
    pub fn write_accounts<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record([
            "user",
            "account",
            "balance",
            "total_earned",
            "total_spent",
            "status",
        ])?;

        let store = self.flows.ledger().store();
        let mut rows: Vec<(String, _)> = self.flows.directory().entries();
        if let Some(platform) = self.flows.ledger().platform_account() {
            rows.push(("(platform)".to_string(), platform));
        }

        for (user, id) in rows {
            let account = store.get(id)?;
            csv_writer.write_record([
                user,
                account.id.to_string(),
                account.balance.to_string(),
                account.total_earned.to_string(),
                account.total_spent.to_string(),
                account.status.to_string(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(())
    }

    /// Writes every journal record to CSV in append order.
    pub fn write_journal<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for record in self.flows.ledger().journal().records()? {
            csv_writer.serialize(JournalRow::from(&record))?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}
