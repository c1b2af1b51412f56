//! # Rewards Ledger
//!
//! The credit ledger behind a rewards platform: users earn credits by
//! reading, watching, voting and selling, and spend them on purchases,
//! transfers and donations.
//!
//! ## Design Principles
//!
//! - **Fixed-point arithmetic**: 4 decimal places via `rust_decimal`
//! - **Atomic movements**: every balance change and its journal records
//!   land together or not at all
//! - **Strict invariants**: balances never go negative, and every record
//!   satisfies `balance_after == balance_before + amount`
//! - **Deadlock-free locking**: accounts are always locked in ascending id
//!   order, with a bounded wait
//!
//! ## Example
//!
//! ```no_run
//! use rewards_ledger::{BatchProcessor, Config};
//! use std::io::Cursor;
//!
//! let csv = "op,user,target,amount,note\nsignup,alice,,,\nsignup,bob,,,\ntransfer,alice,bob,20,lunch\n";
//! let mut processor = BatchProcessor::new(&Config::default());
//! processor.process_csv(Cursor::new(csv)).unwrap();
//! processor.write_accounts(std::io::stdout()).unwrap();
//! ```

pub mod account;
pub mod batch;
pub mod catalog;
pub mod config;
pub mod decimal;
pub mod directory;
pub mod engine;
pub mod error;
pub mod flows;
pub mod journal;
pub mod store;
pub mod transaction;

pub use account::{Account, AccountId, AccountStatus};
pub use batch::{BatchProcessor, BatchSummary, Operation};
pub use config::{Config, LedgerConfig, Policy};
pub use decimal::{Credits, FeeRate};
pub use engine::{Entry, Ledger, Receipt, Statement, TransferReceipt, TransferRequest};
pub use error::{LedgerError, Result};
pub use flows::{Adjustment, Flows, ReadingReward};
pub use journal::{Journal, MemoryJournal};
pub use transaction::{HistoryFilter, ItemRef, Metadata, Page, TransactionRecord, TxKind};
