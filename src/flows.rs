//! Business flows on top of the ledger engine.
//!
//! A flow resolves usernames and catalogue ids, applies its own rules
//! (bounds, daily caps, one-time rewards, "not your own listing"), picks the
//! fee rate and descriptions, and hands the movement to the [`Ledger`].
//! Flows never touch balances themselves.

use crate::account::{AccountId, AccountStatus};
use crate::catalog::{Catalog, ListingStatus};
use crate::config::Policy;
use crate::decimal::Credits;
use crate::directory::Directory;
use crate::engine::{Entry, Ledger, Receipt, TransferReceipt, TransferRequest};
use crate::error::{LedgerError, Result};
use crate::journal::{Journal, MemoryJournal};
use crate::transaction::{ItemRef, Metadata, TxKind};
use chrono::{NaiveDate, Utc};
use log::{debug, info};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Administrative balance correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    Add,
    Subtract,
}

/// Outcome of a reading session.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingReward {
    /// Credited to the reader.
    pub reader_amount: Credits,
    /// Credited to the book's author.
    pub author_amount: Credits,
    /// What the reader can still earn today.
    pub remaining_today: Credits,
}

/// Once-only rewards and per-day reading totals.
#[derive(Default)]
struct RewardTracker {
    reading: Mutex<HashMap<(AccountId, NaiveDate), Credits>>,
    watched: Mutex<HashSet<(AccountId, u64)>>,
    voted: Mutex<HashSet<(AccountId, u64)>>,
}

/// Entry point for every user-facing operation that moves credits.
pub struct Flows<J: Journal = MemoryJournal> {
    ledger: Arc<Ledger<J>>,
    policy: Policy,
    directory: Directory,
    catalog: Catalog,
    rewards: RewardTracker,
}

impl<J: Journal> Flows<J> {
    pub fn new(ledger: Arc<Ledger<J>>, policy: Policy) -> Self {
        Flows {
            ledger,
            policy,
            directory: Directory::new(),
            catalog: Catalog::new(),
            rewards: RewardTracker::default(),
        }
    }

    pub fn ledger(&self) -> &Arc<Ledger<J>> {
        &self.ledger
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn resolve(&self, username: &str) -> Result<AccountId> {
        self.directory.resolve(username)
    }

    /// Registers a user and credits the signup bonus. The username is
    /// published only once the bonus has landed.
    pub fn signup(&self, username: &str) -> Result<AccountId> {
        let id = self.directory.register(username, || {
            let id = self.ledger.open_account();
            if self.policy.signup_bonus.is_positive() {
                self.ledger.earn(Entry::new(
                    id,
                    self.policy.signup_bonus,
                    TxKind::Earning,
                    "Signup bonus",
                ))?;
            }
            Ok(id)
        })?;
        info!("Signed up {} as {}", username.trim(), id);
        Ok(id)
    }

    pub fn suspend(&self, account: AccountId) -> Result<()> {
        self.ledger.set_status(account, AccountStatus::Suspended)
    }

    pub fn activate(&self, account: AccountId) -> Result<()> {
        self.ledger.set_status(account, AccountStatus::Active)
    }

    /// Peer-to-peer transfer to `receiver`, subject to the transfer bounds
    /// and fee. A caller-supplied `reference` makes a replay fail with
    /// `DuplicateReference`.
    pub fn transfer(
        &self,
        sender: AccountId,
        receiver: &str,
        amount: Credits,
        note: Option<&str>,
        reference: Option<&str>,
    ) -> Result<TransferReceipt> {
        let receiver_id = self.directory.resolve(receiver)?;
        if receiver_id == sender {
            return Err(LedgerError::SelfReferenceNotAllowed);
        }

        let note = note
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or("No description");
        let limits = self.policy.transfer;
        let mut request = TransferRequest::new(sender, receiver_id, amount)
            .bounds(limits.min, limits.max)
            .fee_rate(limits.fee_rate)
            .descriptions(
                format!("Transfer to {}: {}", self.directory.display_name(receiver_id), note),
                format!("Received from {}: {}", self.directory.display_name(sender), note),
            );
        if let Some(reference) = reference {
            request = request.reference(reference);
        }
        self.ledger.transfer(request)
    }

    /// Puts an item up for sale.
    pub fn create_listing(&self, seller: AccountId, title: &str, price: Credits) -> Result<u64> {
        if price < self.policy.listing_min_price {
            return Err(LedgerError::InvalidAmount(format!(
                "price {} is below the minimum of {}",
                price, self.policy.listing_min_price
            )));
        }
        if !self.ledger.store().get(seller)?.is_active() {
            return Err(LedgerError::AccountInactive(seller));
        }
        let id = self.catalog.add_listing(seller, title, price);
        debug!("{} listed {} for {}", seller, id, price);
        Ok(id)
    }

    /// Buys a listing: the buyer pays the price, the seller receives it less
    /// the marketplace fee, and the listing is marked sold.
    pub fn purchase(&self, buyer: AccountId, listing_id: u64) -> Result<TransferReceipt> {
        let handle = self.catalog.listing_handle(listing_id)?;
        let mut listing = handle.lock();

        if listing.seller == buyer {
            return Err(LedgerError::SelfReferenceNotAllowed);
        }
        if listing.status != ListingStatus::Available {
            return Err(LedgerError::ListingUnavailable(listing_id));
        }

        let request = TransferRequest::new(buyer, listing.seller, listing.price)
            .kinds(TxKind::Purchase, TxKind::Earning)
            .fee_rate(self.policy.marketplace_fee_rate)
            .descriptions(
                format!("Purchased: {}", listing.title),
                format!("Sold: {}", listing.title),
            )
            .item(ItemRef::Listing(listing_id));
        let receipt = self.ledger.transfer(request)?;

        listing.mark_sold(buyer);
        debug!("Listing {} sold to {}", listing_id, buyer);
        Ok(receipt)
    }

    /// Registers a book and pays the author the upload bonus. The book is
    /// published only once the bonus has landed.
    pub fn upload_book(&self, author: AccountId, title: &str) -> Result<u64> {
        self.catalog.add_book(author, title, |id| {
            if self.policy.upload_bonus.is_positive() {
                self.ledger.earn(
                    Entry::new(author, self.policy.upload_bonus, TxKind::Earning, "Book upload bonus")
                        .with_metadata(Metadata::item(ItemRef::Book(id))),
                )?;
            } else if !self.ledger.store().get(author)?.is_active() {
                return Err(LedgerError::AccountInactive(author));
            }
            Ok(())
        })
    }

    /// Rewards `pages` of reading today (UTC).
    pub fn record_reading(&self, reader: AccountId, book_id: u64, pages: u32) -> Result<ReadingReward> {
        self.record_reading_on(reader, book_id, pages, Utc::now().date_naive())
    }

    /// Rewards `pages` of reading on `day`.
    ///
    /// The reward is capped per reader per day; the author's share is split
    /// off and credited to the author in the same atomic unit.
    pub fn record_reading_on(
        &self,
        reader: AccountId,
        book_id: u64,
        pages: u32,
        day: NaiveDate,
    ) -> Result<ReadingReward> {
        if pages == 0 {
            return Err(LedgerError::InvalidAmount("pages read must be positive".to_string()));
        }
        let book = self.catalog.book(book_id)?;
        let policy = self.policy.reading;

        // Held across the ledger call so concurrent sessions cannot both
        // spend the same remaining allowance.
        let mut reading = self.rewards.reading.lock();
        let used = reading.get(&(reader, day)).copied().unwrap_or(Credits::ZERO);
        let remaining = policy.daily_cap - used;
        if !remaining.is_positive() {
            return Err(LedgerError::DailyCapReached(reader));
        }

        let earned = policy.credits_per_page.times(pages).min(remaining);
        if !earned.is_positive() {
            return Err(LedgerError::InvalidAmount(format!("{} pages earn nothing", pages)));
        }

        let author_paid = book.author != reader && self.ledger.store().get(book.author)?.is_active();
        let author_amount = if author_paid {
            earned.portion(policy.author_share)
        } else {
            Credits::ZERO
        };
        let reader_amount = earned - author_amount;

        let metadata = Metadata::item(ItemRef::Book(book_id));
        let mut entries = Vec::with_capacity(2);
        if reader_amount.is_positive() {
            entries.push(
                Entry::new(
                    reader,
                    reader_amount,
                    TxKind::Earning,
                    format!("Reading reward from \"{}\"", book.title),
                )
                .with_metadata(metadata.clone()),
            );
        }
        if author_amount.is_positive() {
            entries.push(
                Entry::new(
                    book.author,
                    author_amount,
                    TxKind::Earning,
                    format!("Earnings from \"{}\" reads", book.title),
                )
                .with_metadata(metadata.with_counterparty(reader)),
            );
        }
        self.ledger.distribute(entries)?;

        reading.insert((reader, day), used + earned);
        drop(reading);
        self.catalog.record_read(book_id)?;

        debug!(
            "{} read {} pages of book {}: reader {}, author {}",
            reader, pages, book_id, reader_amount, author_amount
        );
        Ok(ReadingReward {
            reader_amount,
            author_amount,
            remaining_today: remaining - earned,
        })
    }

    /// Pays the watch reward once per viewer and movie.
    pub fn reward_watch(&self, viewer: AccountId, movie_id: u64) -> Result<Option<Receipt>> {
        let movie = self.catalog.movie(movie_id)?;
        let key = (viewer, movie_id);
        if !self.rewards.watched.lock().insert(key) {
            return Err(LedgerError::AlreadyRewarded(format!(
                "{} already watched movie {}",
                viewer, movie_id
            )));
        }

        let result = self.pay_reward(
            viewer,
            self.policy.watch_reward,
            format!("Watched \"{}\"", movie.title),
            ItemRef::Movie(movie_id),
        );
        if result.is_err() {
            self.rewards.watched.lock().remove(&key);
        }
        result
    }

    /// Records one vote per voter and movie and pays the vote reward.
    /// Returns the movie's new vote count and the reward receipt.
    pub fn vote(&self, voter: AccountId, movie_id: u64) -> Result<(u64, Option<Receipt>)> {
        let movie = self.catalog.movie(movie_id)?;
        let key = (voter, movie_id);
        if !self.rewards.voted.lock().insert(key) {
            return Err(LedgerError::AlreadyRewarded(format!(
                "{} already voted for movie {}",
                voter, movie_id
            )));
        }

        let receipt = match self.pay_reward(
            voter,
            self.policy.vote_reward,
            format!("Voted for \"{}\"", movie.title),
            ItemRef::Movie(movie_id),
        ) {
            Ok(receipt) => receipt,
            Err(e) => {
                self.rewards.voted.lock().remove(&key);
                return Err(e);
            }
        };
        let votes = self.catalog.record_vote(movie_id)?;
        Ok((votes, receipt))
    }

    /// Sends a donation to a book's author.
    pub fn donate(
        &self,
        donor: AccountId,
        book_id: u64,
        amount: Credits,
        message: Option<&str>,
    ) -> Result<TransferReceipt> {
        let book = self.catalog.book(book_id)?;
        if book.author == donor {
            return Err(LedgerError::SelfReferenceNotAllowed);
        }

        let limits = self.policy.donation;
        let suffix = message
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(|m| format!(": {}", m))
            .unwrap_or_default();
        let request = TransferRequest::new(donor, book.author, amount)
            .kinds(TxKind::Donation, TxKind::Earning)
            .bounds(limits.min, limits.max)
            .fee_rate(limits.fee_rate)
            .descriptions(
                format!("Donation to \"{}\"{}", book.title, suffix),
                format!(
                    "Donation from {} for \"{}\"{}",
                    self.directory.display_name(donor),
                    book.title,
                    suffix
                ),
            )
            .item(ItemRef::Book(book_id));
        let receipt = self.ledger.transfer(request)?;

        self.catalog.record_donation(book_id, receipt.net)?;
        Ok(receipt)
    }

    /// Administrative credit or debit.
    pub fn admin_adjust(
        &self,
        account: AccountId,
        amount: Credits,
        adjustment: Adjustment,
        reference: Option<&str>,
    ) -> Result<Receipt> {
        let entry = match adjustment {
            Adjustment::Add => Entry::new(account, amount, TxKind::Credit, "Admin added balance"),
            Adjustment::Subtract => {
                Entry::new(account, amount, TxKind::Debit, "Admin deducted balance")
            }
        };
        let entry = match reference {
            Some(reference) => entry.with_reference(reference),
            None => entry,
        };
        match adjustment {
            Adjustment::Add => self.ledger.earn(entry),
            Adjustment::Subtract => self.ledger.debit(entry),
        }
    }

    fn pay_reward(
        &self,
        account: AccountId,
        amount: Credits,
        description: String,
        item: ItemRef,
    ) -> Result<Option<Receipt>> {
        if !amount.is_positive() {
            return Ok(None);
        }
        let receipt = self.ledger.earn(
            Entry::new(account, amount, TxKind::Earning, description)
                .with_metadata(Metadata::item(item)),
        )?;
        Ok(Some(receipt))
    }
}
