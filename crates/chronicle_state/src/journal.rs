//! Journaled world state.
//!
//! Every mutation pushes the value it overwrote onto an undo log. A snapshot
//! is a position in that log; reverting pops entries back to the position
//! and restores what they recorded.

use crate::store::SnapshotId;
use chronicle_core::{Account, Address, B256, Bytes, ReplayError, ReplayResult, U256, WorldState};
use std::collections::BTreeSet;

/// One undoable change
#[derive(Debug, Clone, PartialEq, Eq)]
enum Change {
    /// Account did not exist before
    Created { address: Address },
    /// Account was replaced by a fresh incarnation
    Recreated { address: Address, previous: Account },
    Balance { address: Address, previous: U256 },
    Nonce { address: Address, previous: u64 },
    Code { address: Address, previous: Bytes },
    Storage { address: Address, key: B256, previous: Option<B256> },
    Suicide { address: Address, previous_balance: U256, was_suicided: bool },
}

/// World state with an undo log
#[derive(Debug, Clone, Default)]
pub struct JournaledState {
    accounts: WorldState,
    suicided: BTreeSet<Address>,
    journal: Vec<Change>,
    snapshots: Vec<usize>,
}

impl JournaledState {
    /// Wrap an existing world state
    #[must_use]
    pub fn new(accounts: WorldState) -> Self {
        Self {
            accounts,
            ..Self::default()
        }
    }

    /// Current accounts
    #[must_use]
    pub fn accounts(&self) -> &WorldState {
        &self.accounts
    }

    /// Apply a write without journaling it
    pub fn accounts_mut(&mut self) -> &mut WorldState {
        &mut self.accounts
    }

    /// Number of pending undo entries
    #[must_use]
    pub fn journal_len(&self) -> usize {
        self.journal.len()
    }

    fn account_mut(&mut self, address: Address) -> &mut Account {
        if !self.accounts.contains(&address) {
            self.journal.push(Change::Created { address });
        }
        self.accounts.get_or_default(address)
    }

    /// Whether an account exists
    #[must_use]
    pub fn exist(&self, address: &Address) -> bool {
        self.accounts.contains(address)
    }

    /// Create an account, carrying over the previous balance
    pub fn create_account(&mut self, address: Address) {
        match self.accounts.remove(&address) {
            None => {
                self.journal.push(Change::Created { address });
                self.accounts.insert(address, Account::default());
            }
            Some(previous) => {
                let fresh = Account {
                    balance: previous.balance,
                    ..Account::default()
                };
                self.journal.push(Change::Recreated { address, previous });
                self.accounts.insert(address, fresh);
            }
        }
    }

    /// Account balance
    #[must_use]
    pub fn balance(&self, address: &Address) -> U256 {
        self.accounts.get(address).map_or(U256::ZERO, |a| a.balance)
    }

    /// Overwrite a balance
    pub fn set_balance(&mut self, address: Address, balance: U256) {
        let account = self.account_mut(address);
        let previous = std::mem::replace(&mut account.balance, balance);
        self.journal.push(Change::Balance { address, previous });
    }

    /// Account nonce
    #[must_use]
    pub fn nonce(&self, address: &Address) -> u64 {
        self.accounts.get(address).map_or(0, |a| a.nonce)
    }

    /// Overwrite a nonce
    pub fn set_nonce(&mut self, address: Address, nonce: u64) {
        let account = self.account_mut(address);
        let previous = std::mem::replace(&mut account.nonce, nonce);
        self.journal.push(Change::Nonce { address, previous });
    }

    /// Account code
    #[must_use]
    pub fn code(&self, address: &Address) -> Bytes {
        self.accounts
            .get(address)
            .map(|a| a.code.clone())
            .unwrap_or_default()
    }

    /// Overwrite code
    pub fn set_code(&mut self, address: Address, code: Bytes) {
        let account = self.account_mut(address);
        let previous = std::mem::replace(&mut account.code, code);
        self.journal.push(Change::Code { address, previous });
    }

    /// Storage slot value
    #[must_use]
    pub fn storage(&self, address: &Address, key: &B256) -> B256 {
        self.accounts
            .get(address)
            .and_then(|a| a.storage.get(key).copied())
            .unwrap_or(B256::ZERO)
    }

    /// Overwrite a storage slot
    pub fn set_storage(&mut self, address: Address, key: B256, value: B256) {
        let account = self.account_mut(address);
        let previous = account.storage.insert(key, value);
        self.journal.push(Change::Storage { address, key, previous });
    }

    /// Mark an existing account as self-destructed and zero its balance
    pub fn suicide(&mut self, address: Address) -> bool {
        let Some(account) = self.accounts.get_mut(&address) else {
            return false;
        };
        let previous_balance = std::mem::replace(&mut account.balance, U256::ZERO);
        let was_suicided = !self.suicided.insert(address);
        self.journal.push(Change::Suicide {
            address,
            previous_balance,
            was_suicided,
        });
        true
    }

    /// Whether the account self-destructed since the last finalisation
    #[must_use]
    pub fn has_suicided(&self, address: &Address) -> bool {
        self.suicided.contains(address)
    }

    /// Checkpoint the journal
    pub fn snapshot(&mut self) -> SnapshotId {
        self.snapshots.push(self.journal.len());
        SnapshotId(self.snapshots.len() - 1)
    }

    /// Undo everything recorded after `id`
    ///
    /// # Errors
    ///
    /// Returns error if `id` was never taken or was discarded by an earlier revert
    pub fn revert_to_snapshot(&mut self, id: SnapshotId) -> ReplayResult<()> {
        let Some(&mark) = self.snapshots.get(id.0) else {
            return Err(ReplayError::lifecycle(
                "revert to snapshot",
                format!("{id} is not valid"),
            ));
        };
        self.snapshots.truncate(id.0);
        while self.journal.len() > mark {
            if let Some(change) = self.journal.pop() {
                self.undo(change);
            }
        }
        Ok(())
    }

    /// Discard `id` and every later checkpoint.
    ///
    /// The undo log is emptied once no checkpoint is left to revert to.
    pub fn release_snapshot(&mut self, id: SnapshotId) {
        self.snapshots.truncate(id.0);
        if self.snapshots.is_empty() {
            self.journal.clear();
        }
    }

    fn undo(&mut self, change: Change) {
        match change {
            Change::Created { address } => {
                self.accounts.remove(&address);
            }
            Change::Recreated { address, previous } => {
                self.accounts.insert(address, previous);
            }
            Change::Balance { address, previous } => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    account.balance = previous;
                }
            }
            Change::Nonce { address, previous } => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    account.nonce = previous;
                }
            }
            Change::Code { address, previous } => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    account.code = previous;
                }
            }
            Change::Storage { address, key, previous } => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    match previous {
                        Some(value) => account.storage.insert(key, value),
                        None => account.storage.remove(&key),
                    };
                }
            }
            Change::Suicide {
                address,
                previous_balance,
                was_suicided,
            } => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    account.balance = previous_balance;
                }
                if !was_suicided {
                    self.suicided.remove(&address);
                }
            }
        }
    }

    /// Drop self-destructed accounts and discard the undo log
    pub fn finalise(&mut self) {
        for address in std::mem::take(&mut self.suicided) {
            self.accounts.remove(&address);
        }
        self.journal.clear();
        self.snapshots.clear();
    }
}
