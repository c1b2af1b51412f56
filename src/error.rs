//! Error types for the ledger, its flows and the batch CLI.

use crate::account::AccountId;
use crate::decimal::Credits;
use thiserror::Error;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur while moving credits.
///
/// Every ledger error is terminal for the single operation that raised it;
/// the engine never retries on its own and never leaves a half-applied
/// mutation behind.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The account id does not resolve in the store
    #[error("Account {0} not found")]
    AccountNotFound(AccountId),

    /// The account exists but is suspended or banned
    #[error("Account {0} is not active")]
    AccountInactive(AccountId),

    /// Debit would take the balance below zero
    #[error("Insufficient funds in account {account}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account: AccountId,
        balance: Credits,
        requested: Credits,
    },

    /// Amount is not positive or falls outside a flow's bounds
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Source and destination are the same account
    #[error("Operation may not target the acting account")]
    SelfReferenceNotAllowed,

    /// A transaction reference was replayed
    #[error("Duplicate transaction reference {0}")]
    DuplicateReference(String),

    /// Locks or the journal could not commit the operation; nothing was applied
    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("Unknown user {0}")]
    UnknownUser(String),

    #[error("Invalid username {0:?}: must be 3-20 letters, digits or underscores")]
    InvalidUsername(String),

    #[error("Username {0} is already taken")]
    UsernameTaken(String),

    #[error("Listing {0} not found")]
    ListingNotFound(u64),

    #[error("Listing {0} is not available")]
    ListingUnavailable(u64),

    #[error("Book {0} not found")]
    BookNotFound(u64),

    #[error("Movie {0} not found")]
    MovieNotFound(u64),

    /// One-time reward was already granted
    #[error("Reward already granted: {0}")]
    AlreadyRewarded(String),

    #[error("Daily reading cap reached for account {0}")]
    DailyCapReached(AccountId),

    /// Configuration is malformed or inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failed to open, read or write a file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    /// Invalid operation record in the batch input
    #[error("Invalid operation at row {row}: {message}")]
    InvalidRecord { row: usize, message: String },

    /// Missing input file argument
    #[error(
        "Missing input file argument. Usage: rewards-ledger <operations.csv> [--config <policy.toml>] [--journal <journal.csv>]"
    )]
    MissingArgument,

    #[error(
        "Unexpected argument {0:?}. Usage: rewards-ledger <operations.csv> [--config <policy.toml>] [--journal <journal.csv>]"
    )]
    UnexpectedArgument(String),
}

impl From<toml::de::Error> for LedgerError {
    fn from(err: toml::de::Error) -> Self {
        LedgerError::Config(err.to_string())
    }
}
