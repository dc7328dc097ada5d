//! Accounts, world states and update sets.
//!
//! Every value here is owned: merging one world state into another copies
//! balances, code and slots, so an accumulator never aliases data held by a
//! store or by another batch.

use alloy_primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map;

/// Bytes charged per newly introduced storage slot (key + value)
const SLOT_SIZE: u64 = 64;
/// Fixed bytes charged per newly introduced account
const ACCOUNT_SIZE: u64 = 20 + 32 + 8 + 32;

/// A single account record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account balance
    pub balance: U256,
    /// Account nonce
    pub nonce: u64,
    /// Contract code (empty for externally owned accounts)
    pub code: Bytes,
    /// Storage slots
    pub storage: BTreeMap<B256, B256>,
}

impl Account {
    /// Create an account without storage
    #[must_use]
    pub fn new(balance: U256, nonce: u64, code: Bytes) -> Self {
        Self {
            balance,
            nonce,
            code,
            storage: BTreeMap::new(),
        }
    }

    /// Add a storage slot
    #[must_use]
    pub fn with_slot(mut self, key: B256, value: B256) -> Self {
        self.storage.insert(key, value);
        self
    }

    /// Estimated size in bytes when inserted as a new account
    #[must_use]
    pub fn estimated_size(&self) -> u64 {
        ACCOUNT_SIZE + self.code.len() as u64 + self.storage.len() as u64 * SLOT_SIZE
    }
}

/// Mapping of addresses to accounts, ordered by address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldState {
    accounts: BTreeMap<Address, Account>,
}

impl WorldState {
    /// Create an empty world state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an account
    pub fn insert(&mut self, address: Address, account: Account) {
        self.accounts.insert(address, account);
    }

    /// Get an account
    #[must_use]
    pub fn get(&self, address: &Address) -> Option<&Account> {
        self.accounts.get(address)
    }

    /// Get an account mutably
    pub fn get_mut(&mut self, address: &Address) -> Option<&mut Account> {
        self.accounts.get_mut(address)
    }

    /// Get an account mutably, inserting an empty one if absent
    pub fn get_or_default(&mut self, address: Address) -> &mut Account {
        self.accounts.entry(address).or_default()
    }

    /// Remove an account
    pub fn remove(&mut self, address: &Address) -> Option<Account> {
        self.accounts.remove(address)
    }

    /// Whether the address is present
    #[must_use]
    pub fn contains(&self, address: &Address) -> bool {
        self.accounts.contains_key(address)
    }

    /// Number of accounts
    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether there are no accounts
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Iterate accounts in address order
    pub fn iter(&self) -> btree_map::Iter<'_, Address, Account> {
        self.accounts.iter()
    }

    /// Addresses in ascending order
    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.accounts.keys()
    }

    /// Total number of storage slots over all accounts
    #[must_use]
    pub fn storage_slot_count(&self) -> usize {
        self.accounts.values().map(|a| a.storage.len()).sum()
    }

    /// Merge `other` into this world state.
    ///
    /// Balance, nonce and code of `other` win; storage is merged slot by slot.
    pub fn merge(&mut self, other: WorldState) {
        for (address, incoming) in other.accounts {
            match self.accounts.entry(address) {
                btree_map::Entry::Vacant(entry) => {
                    entry.insert(incoming);
                }
                btree_map::Entry::Occupied(mut entry) => {
                    let account = entry.get_mut();
                    account.balance = incoming.balance;
                    account.nonce = incoming.nonce;
                    account.code = incoming.code;
                    account.storage.extend(incoming.storage);
                }
            }
        }
    }

    /// Bytes that merging `other` would add to this world state
    #[must_use]
    pub fn estimate_incremental_size(&self, other: &WorldState) -> u64 {
        other
            .accounts
            .iter()
            .map(|(address, incoming)| match self.accounts.get(address) {
                None => incoming.estimated_size(),
                Some(existing) => {
                    let new_slots = incoming
                        .storage
                        .keys()
                        .filter(|key| !existing.storage.contains_key(*key))
                        .count() as u64;
                    let code_growth =
                        (incoming.code.len() as u64).saturating_sub(existing.code.len() as u64);
                    new_slots * SLOT_SIZE + code_growth
                }
            })
            .sum()
    }

    /// Drop the storage of the listed accounts that are present
    pub fn clear_storage(&mut self, addresses: &[Address]) {
        for address in addresses {
            if let Some(account) = self.accounts.get_mut(address) {
                account.storage.clear();
            }
        }
    }
}

impl FromIterator<(Address, Account)> for WorldState {
    fn from_iter<I: IntoIterator<Item = (Address, Account)>>(iter: I) -> Self {
        Self {
            accounts: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for WorldState {
    type Item = (Address, Account);
    type IntoIter = btree_map::IntoIter<Address, Account>;

    fn into_iter(self) -> Self::IntoIter {
        self.accounts.into_iter()
    }
}

impl<'a> IntoIterator for &'a WorldState {
    type Item = (&'a Address, &'a Account);
    type IntoIter = btree_map::Iter<'a, Address, Account>;

    fn into_iter(self) -> Self::IntoIter {
        self.accounts.iter()
    }
}

/// Precomputed state changes of one block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSet {
    /// Block the update set was taken at
    pub block: u64,
    /// Accounts written up to and including `block`
    pub world_state: WorldState,
    /// Accounts that self-destructed within the covered range
    pub deleted_accounts: Vec<Address>,
}

impl UpdateSet {
    /// Create an update set
    #[must_use]
    pub fn new(block: u64, world_state: WorldState) -> Self {
        Self {
            block,
            world_state,
            deleted_accounts: Vec::new(),
        }
    }

    /// Mark accounts as deleted within this update set's range
    #[must_use]
    pub fn with_deleted(mut self, deleted: Vec<Address>) -> Self {
        self.deleted_accounts = deleted;
        self
    }
}
