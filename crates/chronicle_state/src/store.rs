//! State store capabilities consumed by the replay pipeline.
//!
//! [`VmState`] is what transaction execution needs; [`StateStore`] adds the
//! block lifecycle, bulk loading and the archive. Implementations decide how
//! state is persisted; the pipeline only talks to these traits.

use chronicle_core::{Address, B256, Bytes, ReplayResult, U256};
use std::fmt;

/// Identifier of a revertible checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotId(pub usize);

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "snapshot#{}", self.0)
    }
}

/// State access used while executing a single transaction
pub trait VmState: Send {
    /// Whether an account exists
    fn exist(&self, address: &Address) -> bool;

    /// Create an account, keeping the balance of a previous incarnation
    fn create_account(&mut self, address: Address);

    /// Account balance (zero for unknown accounts)
    fn get_balance(&self, address: &Address) -> U256;

    /// Increase a balance
    fn add_balance(&mut self, address: Address, amount: U256);

    /// Decrease a balance, saturating at zero
    fn sub_balance(&mut self, address: Address, amount: U256);

    /// Account nonce
    fn get_nonce(&self, address: &Address) -> u64;

    /// Set an account nonce
    fn set_nonce(&mut self, address: Address, nonce: u64);

    /// Account code
    fn get_code(&self, address: &Address) -> Bytes;

    /// Set account code
    fn set_code(&mut self, address: Address, code: Bytes);

    /// Storage slot value (zero when unset)
    fn get_state(&self, address: &Address, key: &B256) -> B256;

    /// Write a storage slot
    fn set_state(&mut self, address: Address, key: B256, value: B256);

    /// Mark an account as self-destructed.
    ///
    /// Returns false if the account does not exist.
    fn suicide(&mut self, address: Address) -> bool;

    /// Whether the account self-destructed in the current transaction
    fn has_suicided(&self, address: &Address) -> bool;

    /// Take a checkpoint of all changes so far
    fn snapshot(&mut self) -> SnapshotId;

    /// Undo every change made after `id` was taken
    ///
    /// # Errors
    ///
    /// Returns error if `id` is unknown or already reverted
    fn revert_to_snapshot(&mut self, id: SnapshotId) -> ReplayResult<()>;

    /// Keep every change made after `id` and drop the checkpoint
    fn release_snapshot(&mut self, _id: SnapshotId) {}
}

/// Access to any state capability as a plain [`VmState`]
pub trait AsVmState {
    /// View as the execution subset
    fn as_vm_state(&mut self) -> &mut dyn VmState;
}

impl<S: VmState> AsVmState for S {
    fn as_vm_state(&mut self) -> &mut dyn VmState {
        self
    }
}

/// Batched writer for initialising a store.
///
/// Writes become visible only after [`BulkLoad::close`] commits them.
pub trait BulkLoad: Send {
    /// Create an account
    fn create_account(&mut self, address: Address);
    /// Set a balance
    fn set_balance(&mut self, address: Address, balance: U256);
    /// Set a nonce
    fn set_nonce(&mut self, address: Address, nonce: u64);
    /// Set code
    fn set_code(&mut self, address: Address, code: Bytes);
    /// Set a storage slot
    fn set_state(&mut self, address: Address, key: B256, value: B256);

    /// Commit all buffered writes
    ///
    /// # Errors
    ///
    /// Returns error if the commit fails; the store is then in an undefined state
    fn close(self: Box<Self>) -> ReplayResult<()>;
}

/// Read-only historical view of a store at one block
pub trait ArchiveState: VmState + AsVmState {
    /// Root hash of the archived state
    fn get_hash(&self) -> B256;
    /// Release the view
    fn release(self: Box<Self>);
}

/// Full state store capability
pub trait StateStore: VmState + AsVmState {
    /// Open a sync period
    ///
    /// # Errors
    ///
    /// Returns error if a sync period is already open or the store is closed
    fn begin_sync_period(&mut self, number: u64) -> ReplayResult<()>;

    /// Close the current sync period
    ///
    /// # Errors
    ///
    /// Returns error if no sync period is open
    fn end_sync_period(&mut self) -> ReplayResult<()>;

    /// Open a block
    ///
    /// # Errors
    ///
    /// Returns error if a block is already open or the store is closed
    fn begin_block(&mut self, block: u64) -> ReplayResult<()>;

    /// Close the current block
    ///
    /// # Errors
    ///
    /// Returns error if no block is open
    fn end_block(&mut self) -> ReplayResult<()>;

    /// Open a transaction
    ///
    /// # Errors
    ///
    /// Returns error if a transaction is already open
    fn begin_transaction(&mut self, transaction: u32) -> ReplayResult<()>;

    /// Close the current transaction, finalising self-destructs
    ///
    /// # Errors
    ///
    /// Returns error if no transaction is open
    fn end_transaction(&mut self) -> ReplayResult<()>;

    /// Root hash of the live state
    fn get_hash(&self) -> B256;

    /// Start a bulk load that commits as `block`
    ///
    /// # Errors
    ///
    /// Returns error if the store is closed
    fn start_bulk_load(&mut self, block: u64) -> ReplayResult<Box<dyn BulkLoad>>;

    /// Highest archived block and whether the archive is empty
    ///
    /// # Errors
    ///
    /// Returns error if the archive cannot be queried
    fn get_archive_block_height(&self) -> ReplayResult<(u64, bool)>;

    /// Open a view of the state as of `block`
    ///
    /// # Errors
    ///
    /// Returns error if the archive holds no state at or before `block`
    fn get_archive_state(&self, block: u64) -> ReplayResult<Box<dyn ArchiveState>>;

    /// Flush and close the store
    ///
    /// # Errors
    ///
    /// Returns error if the store was already closed
    fn close(&mut self) -> ReplayResult<()>;
}
