//! Append-only transaction log.
//!
//! The ledger engine talks to the log through the [`Journal`] trait so a
//! durable backend can replace [`MemoryJournal`] without touching the engine.
//! Whatever the backend, a batch is accepted whole or not at all, and
//! references are unique across the journal's lifetime.

use crate::account::AccountId;
use crate::error::{LedgerError, Result};
use crate::transaction::{
    generate_reference, HistoryFilter, NewRecord, Page, TransactionRecord, TxStatus,
};
use chrono::Utc;
use log::{debug, warn};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// Storage for transaction records. There is deliberately no update or
/// delete: corrections are new compensating records.
pub trait Journal: Send + Sync {
    /// Appends every record in `records`, or none of them.
    ///
    /// Missing references are generated; a supplied reference that already
    /// exists (in the journal or earlier in the same batch) fails the whole
    /// batch with `DuplicateReference`.
    fn append_all(&self, records: Vec<NewRecord>) -> Result<Vec<TransactionRecord>>;

    /// Records owned by `account`, newest first.
    fn query(
        &self,
        account: AccountId,
        filter: &HistoryFilter,
        page: Page,
    ) -> Result<Vec<TransactionRecord>>;

    /// Looks a record up by reference.
    fn find(&self, reference: &str) -> Result<Option<TransactionRecord>>;

    /// Every record in append order.
    fn records(&self) -> Result<Vec<TransactionRecord>>;

    fn append(&self, record: NewRecord) -> Result<TransactionRecord> {
        self.append_all(vec![record])?
            .pop()
            .ok_or_else(|| LedgerError::StorageFailure("journal returned no record".to_string()))
    }
}

type ReferenceSource = Box<dyn Fn() -> String + Send + Sync>;

#[derive(Default)]
struct JournalState {
    records: Vec<TransactionRecord>,
    by_reference: HashMap<String, usize>,
    by_account: HashMap<AccountId, Vec<usize>>,
}

/// In-process journal.
pub struct MemoryJournal {
    state: RwLock<JournalState>,
    reference_attempts: usize,
    next_reference: ReferenceSource,
}

impl MemoryJournal {
    /// `reference_attempts` bounds how many generated references are tried
    /// before a collision is reported as a storage failure.
    pub fn new(reference_attempts: usize) -> Self {
        Self::with_reference_source(reference_attempts, generate_reference)
    }

    /// Uses `source` instead of the default timestamp+random generator.
    pub fn with_reference_source<F>(reference_attempts: usize, source: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        MemoryJournal {
            state: RwLock::new(JournalState::default()),
            reference_attempts: reference_attempts.max(1),
            next_reference: Box::new(source),
        }
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn fresh_reference(&self, state: &JournalState, pending: &HashSet<String>) -> Result<String> {
        for _ in 0..self.reference_attempts {
            let candidate = (self.next_reference)();
            if !state.by_reference.contains_key(&candidate) && !pending.contains(&candidate) {
                return Ok(candidate);
            }
            debug!("Reference {} collided, retrying", candidate);
        }
        warn!(
            "Could not generate a unique reference in {} attempts",
            self.reference_attempts
        );
        Err(LedgerError::StorageFailure(format!(
            "no unique reference after {} attempts",
            self.reference_attempts
        )))
    }
}

impl Default for MemoryJournal {
    fn default() -> Self {
        Self::new(8)
    }
}

impl Journal for MemoryJournal {
    fn append_all(&self, records: Vec<NewRecord>) -> Result<Vec<TransactionRecord>> {
        let mut state = self.state.write();

        // Resolve and validate everything before the first push.
        let mut pending = HashSet::with_capacity(records.len());
        let mut references = Vec::with_capacity(records.len());
        for record in &records {
            record.validate().map_err(LedgerError::StorageFailure)?;

            let reference = match &record.reference {
                Some(r) => {
                    if state.by_reference.contains_key(r) || pending.contains(r) {
                        return Err(LedgerError::DuplicateReference(r.clone()));
                    }
                    r.clone()
                }
                None => self.fresh_reference(&state, &pending)?,
            };
            pending.insert(reference.clone());
            references.push(reference);
        }

        let now = Utc::now();
        let mut appended = Vec::with_capacity(records.len());
        for (record, reference) in records.into_iter().zip(references) {
            let index = state.records.len();
            let entry = TransactionRecord {
                sequence: index as u64 + 1,
                reference: reference.clone(),
                account: record.account,
                kind: record.kind,
                amount: record.amount,
                balance_before: record.balance_before,
                balance_after: record.balance_after,
                description: record.description,
                metadata: record.metadata,
                status: TxStatus::Completed,
                created_at: now,
            };
            state.by_reference.insert(reference, index);
            state.by_account.entry(entry.account).or_default().push(index);
            state.records.push(entry.clone());
            appended.push(entry);
        }

        Ok(appended)
    }

    fn query(
        &self,
        account: AccountId,
        filter: &HistoryFilter,
        page: Page,
    ) -> Result<Vec<TransactionRecord>> {
        let state = self.state.read();
        let Some(indices) = state.by_account.get(&account) else {
            return Ok(Vec::new());
        };

        Ok(indices
            .iter()
            .rev()
            .map(|&i| &state.records[i])
            .filter(|r| filter.matches(r))
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect())
    }

    fn find(&self, reference: &str) -> Result<Option<TransactionRecord>> {
        let state = self.state.read();
        Ok(state
            .by_reference
            .get(reference)
            .map(|&i| state.records[i].clone()))
    }

    fn records(&self) -> Result<Vec<TransactionRecord>> {
        Ok(self.state.read().records.clone())
    }
}
