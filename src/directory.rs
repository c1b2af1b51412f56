//! Username to account resolution for the flow layer.

use crate::account::AccountId;
use crate::error::{LedgerError, Result};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
struct Names {
    by_name: BTreeMap<String, AccountId>,
    by_id: HashMap<AccountId, String>,
}

/// Maps human-facing usernames to account ids. Usernames are unique.
#[derive(Default)]
pub struct Directory {
    names: RwLock<Names>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `username`, calling `open` for the account id only once the
    /// name is known to be free. The name is published only if `open`
    /// succeeds; it stays reserved while `open` runs.
    pub fn register<F>(&self, username: &str, open: F) -> Result<AccountId>
    where
        F: FnOnce() -> Result<AccountId>,
    {
        let username = username.trim();
        if !is_valid_username(username) {
            return Err(LedgerError::InvalidUsername(username.to_string()));
        }

        let mut names = self.names.write();
        if names.by_name.contains_key(username) {
            return Err(LedgerError::UsernameTaken(username.to_string()));
        }
        let id = open()?;
        names.by_name.insert(username.to_string(), id);
        names.by_id.insert(id, username.to_string());
        Ok(id)
    }

    pub fn resolve(&self, username: &str) -> Result<AccountId> {
        let username = username.trim();
        self.names
            .read()
            .by_name
            .get(username)
            .copied()
            .ok_or_else(|| LedgerError::UnknownUser(username.to_string()))
    }

    pub fn username(&self, id: AccountId) -> Option<String> {
        self.names.read().by_id.get(&id).cloned()
    }

    /// Username if registered, otherwise the account id.
    pub fn display_name(&self, id: AccountId) -> String {
        self.username(id).unwrap_or_else(|| id.to_string())
    }

    /// All registrations, sorted by username.
    pub fn entries(&self) -> Vec<(String, AccountId)> {
        self.names
            .read()
            .by_name
            .iter()
            .map(|(name, id)| (name.clone(), *id))
            .collect()
    }
}

fn is_valid_username(username: &str) -> bool {
    (3..=20).contains(&username.len())
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}
