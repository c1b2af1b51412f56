//! Marketplace listings, books and movies referenced by the flows.
//!
//! Only the fields the ledger flows read or update are kept here; titles and
//! owners for descriptions, availability for purchases, counters for
//! reads, votes and donations.

use crate::account::AccountId;
use crate::decimal::Credits;
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Available,
    Sold,
}

#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    pub id: u64,
    pub seller: AccountId,
    pub title: String,
    pub price: Credits,
    pub status: ListingStatus,
    pub buyer: Option<AccountId>,
    pub sold_at: Option<DateTime<Utc>>,
}

impl Listing {
    pub fn mark_sold(&mut self, buyer: AccountId) {
        self.status = ListingStatus::Sold;
        self.buyer = Some(buyer);
        self.sold_at = Some(Utc::now());
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Book {
    pub id: u64,
    pub author: AccountId,
    pub title: String,
    pub reads: u64,
    pub total_donations: Credits,
}

#[derive(Debug, Clone, Serialize)]
pub struct Movie {
    pub id: u64,
    pub title: String,
    pub votes: u64,
}

#[derive(Default)]
pub struct Catalog {
    listings: RwLock<HashMap<u64, Arc<Mutex<Listing>>>>,
    books: RwLock<HashMap<u64, Book>>,
    movies: RwLock<HashMap<u64, Movie>>,
    next_id: AtomicU64,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn add_listing(&self, seller: AccountId, title: &str, price: Credits) -> u64 {
        let id = self.allocate();
        let listing = Listing {
            id,
            seller,
            title: title.trim().to_string(),
            price,
            status: ListingStatus::Available,
            buyer: None,
            sold_at: None,
        };
        self.listings.write().insert(id, Arc::new(Mutex::new(listing)));
        id
    }

    pub fn listing(&self, id: u64) -> Result<Listing> {
        Ok(self.listing_handle(id)?.lock().clone())
    }

    /// Shared handle to a listing; callers lock it for the duration of a
    /// purchase so it cannot be sold twice.
    pub(crate) fn listing_handle(&self, id: u64) -> Result<Arc<Mutex<Listing>>> {
        self.listings
            .read()
            .get(&id)
            .cloned()
            .ok_or(LedgerError::ListingNotFound(id))
    }

    /// Registers a book. `before_publish` runs with the new id first; the
    /// book becomes visible only if it succeeds.
    pub fn add_book<F>(&self, author: AccountId, title: &str, before_publish: F) -> Result<u64>
    where
        F: FnOnce(u64) -> Result<()>,
    {
        let id = self.allocate();
        before_publish(id)?;
        self.books.write().insert(
            id,
            Book {
                id,
                author,
                title: title.trim().to_string(),
                reads: 0,
                total_donations: Credits::ZERO,
            },
        );
        Ok(id)
    }

    pub fn book(&self, id: u64) -> Result<Book> {
        self.books
            .read()
            .get(&id)
            .cloned()
            .ok_or(LedgerError::BookNotFound(id))
    }

    pub(crate) fn record_read(&self, id: u64) -> Result<()> {
        let mut books = self.books.write();
        let book = books.get_mut(&id).ok_or(LedgerError::BookNotFound(id))?;
        book.reads += 1;
        Ok(())
    }

    pub(crate) fn record_donation(&self, id: u64, amount: Credits) -> Result<()> {
        let mut books = self.books.write();
        let book = books.get_mut(&id).ok_or(LedgerError::BookNotFound(id))?;
        book.total_donations += amount;
        Ok(())
    }

    pub fn add_movie(&self, title: &str) -> u64 {
        let id = self.allocate();
        self.movies.write().insert(
            id,
            Movie {
                id,
                title: title.trim().to_string(),
                votes: 0,
            },
        );
        id
    }

    pub fn movie(&self, id: u64) -> Result<Movie> {
        self.movies
            .read()
            .get(&id)
            .cloned()
            .ok_or(LedgerError::MovieNotFound(id))
    }

    pub(crate) fn record_vote(&self, id: u64) -> Result<u64> {
        let mut movies = self.movies.write();
        let movie = movies.get_mut(&id).ok_or(LedgerError::MovieNotFound(id))?;
        movie.votes += 1;
        Ok(movie.votes)
    }
}
