//! In-memory reference state store.
//!
//! `MemoryStateDb` is cheap to clone; clones share the same state, which lets
//! a caller keep an inspection handle after handing the store to a run.

use crate::journal::JournaledState;
use crate::store::{ArchiveState, BulkLoad, SnapshotId, StateStore, VmState};
use chronicle_core::{
    Address, B256, Bytes, ReplayError, ReplayResult, U256, WorldState, state_root,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Store lifecycle position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Lifecycle {
    sync_period: Option<u64>,
    block: Option<u64>,
    transaction: Option<u32>,
    closed: bool,
}

#[derive(Debug, Default)]
struct Inner {
    live: JournaledState,
    archive: Option<BTreeMap<u64, WorldState>>,
    lifecycle: Lifecycle,
}

impl Inner {
    fn ensure_open(&self, operation: &str) -> ReplayResult<()> {
        if self.lifecycle.closed {
            return Err(ReplayError::lifecycle(operation, "store is closed"));
        }
        Ok(())
    }

    fn archive_block(&mut self, block: u64) {
        if let Some(archive) = self.archive.as_mut() {
            archive.insert(block, self.live.accounts().clone());
        }
    }
}

/// In-memory state store with an optional per-block archive
#[derive(Debug, Clone, Default)]
pub struct MemoryStateDb {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStateDb {
    /// Create an empty store without archive
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that archives every completed block
    #[must_use]
    pub fn with_archive() -> Self {
        let store = Self::default();
        store.inner.write().archive = Some(BTreeMap::new());
        store
    }

    /// Create a store holding `world_state`
    #[must_use]
    pub fn from_world_state(world_state: WorldState) -> Self {
        let store = Self::default();
        store.inner.write().live = JournaledState::new(world_state);
        store
    }

    /// Copy of the live accounts
    #[must_use]
    pub fn world_state(&self) -> WorldState {
        self.inner.read().live.accounts().clone()
    }

    /// Whether [`StateStore::close`] has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.read().lifecycle.closed
    }

    /// Number of pending undo entries in the live state
    #[must_use]
    pub fn journal_len(&self) -> usize {
        self.inner.read().live.journal_len()
    }

    /// Number of archived blocks
    #[must_use]
    pub fn archived_blocks(&self) -> usize {
        self.inner.read().archive.as_ref().map_or(0, BTreeMap::len)
    }
}

impl VmState for MemoryStateDb {
    fn exist(&self, address: &Address) -> bool {
        self.inner.read().live.exist(address)
    }

    fn create_account(&mut self, address: Address) {
        self.inner.write().live.create_account(address);
    }

    fn get_balance(&self, address: &Address) -> U256 {
        self.inner.read().live.balance(address)
    }

    fn add_balance(&mut self, address: Address, amount: U256) {
        let mut inner = self.inner.write();
        let balance = inner.live.balance(&address).saturating_add(amount);
        inner.live.set_balance(address, balance);
    }

    fn sub_balance(&mut self, address: Address, amount: U256) {
        let mut inner = self.inner.write();
        let balance = inner.live.balance(&address).saturating_sub(amount);
        inner.live.set_balance(address, balance);
    }

    fn get_nonce(&self, address: &Address) -> u64 {
        self.inner.read().live.nonce(address)
    }

    fn set_nonce(&mut self, address: Address, nonce: u64) {
        self.inner.write().live.set_nonce(address, nonce);
    }

    fn get_code(&self, address: &Address) -> Bytes {
        self.inner.read().live.code(address)
    }

    fn set_code(&mut self, address: Address, code: Bytes) {
        self.inner.write().live.set_code(address, code);
    }

    fn get_state(&self, address: &Address, key: &B256) -> B256 {
        self.inner.read().live.storage(address, key)
    }

    fn set_state(&mut self, address: Address, key: B256, value: B256) {
        self.inner.write().live.set_storage(address, key, value);
    }

    fn suicide(&mut self, address: Address) -> bool {
        self.inner.write().live.suicide(address)
    }

    fn has_suicided(&self, address: &Address) -> bool {
        self.inner.read().live.has_suicided(address)
    }

    fn snapshot(&mut self) -> SnapshotId {
        self.inner.write().live.snapshot()
    }

    fn revert_to_snapshot(&mut self, id: SnapshotId) -> ReplayResult<()> {
        self.inner.write().live.revert_to_snapshot(id)
    }

    fn release_snapshot(&mut self, id: SnapshotId) {
        self.inner.write().live.release_snapshot(id);
    }
}

impl StateStore for MemoryStateDb {
    fn begin_sync_period(&mut self, number: u64) -> ReplayResult<()> {
        let mut inner = self.inner.write();
        inner.ensure_open("begin sync period")?;
        if let Some(open) = inner.lifecycle.sync_period {
            return Err(ReplayError::lifecycle(
                "begin sync period",
                format!("sync period {open} is still open"),
            ));
        }
        inner.lifecycle.sync_period = Some(number);
        Ok(())
    }

    fn end_sync_period(&mut self) -> ReplayResult<()> {
        let mut inner = self.inner.write();
        if inner.lifecycle.sync_period.take().is_none() {
            return Err(ReplayError::lifecycle("end sync period", "no sync period is open"));
        }
        Ok(())
    }

    fn begin_block(&mut self, block: u64) -> ReplayResult<()> {
        let mut inner = self.inner.write();
        inner.ensure_open("begin block")?;
        if let Some(open) = inner.lifecycle.block {
            return Err(ReplayError::lifecycle(
                "begin block",
                format!("block {open} is still open"),
            ));
        }
        inner.lifecycle.block = Some(block);
        Ok(())
    }

    fn end_block(&mut self) -> ReplayResult<()> {
        let mut inner = self.inner.write();
        let Some(block) = inner.lifecycle.block.take() else {
            return Err(ReplayError::lifecycle("end block", "no block is open"));
        };
        inner.live.finalise();
        inner.archive_block(block);
        Ok(())
    }

    fn begin_transaction(&mut self, transaction: u32) -> ReplayResult<()> {
        let mut inner = self.inner.write();
        inner.ensure_open("begin transaction")?;
        if let Some(open) = inner.lifecycle.transaction {
            return Err(ReplayError::lifecycle(
                "begin transaction",
                format!("transaction {open} is still open"),
            ));
        }
        inner.lifecycle.transaction = Some(transaction);
        Ok(())
    }

    fn end_transaction(&mut self) -> ReplayResult<()> {
        let mut inner = self.inner.write();
        if inner.lifecycle.transaction.take().is_none() {
            return Err(ReplayError::lifecycle("end transaction", "no transaction is open"));
        }
        inner.live.finalise();
        Ok(())
    }

    fn get_hash(&self) -> B256 {
        state_root(self.inner.read().live.accounts())
    }

    fn start_bulk_load(&mut self, block: u64) -> ReplayResult<Box<dyn BulkLoad>> {
        self.inner.read().ensure_open("start bulk load")?;
        Ok(Box::new(MemoryBulkLoad {
            inner: Arc::clone(&self.inner),
            block,
            writes: Vec::new(),
        }))
    }

    fn get_archive_block_height(&self) -> ReplayResult<(u64, bool)> {
        let inner = self.inner.read();
        let Some(archive) = inner.archive.as_ref() else {
            return Err(ReplayError::lifecycle("archive block height", "archive is disabled"));
        };
        Ok(match archive.last_key_value() {
            Some((&height, _)) => (height, false),
            None => (0, true),
        })
    }

    fn get_archive_state(&self, block: u64) -> ReplayResult<Box<dyn ArchiveState>> {
        let inner = self.inner.read();
        let Some(archive) = inner.archive.as_ref() else {
            return Err(ReplayError::lifecycle("open archive state", "archive is disabled"));
        };
        let Some((_, world_state)) = archive.range(..=block).next_back() else {
            return Err(ReplayError::NotFound {
                what: "archive state".to_string(),
                location: format!("block {block}"),
            });
        };
        Ok(Box::new(MemoryArchiveState {
            block,
            state: JournaledState::new(world_state.clone()),
        }))
    }

    fn close(&mut self) -> ReplayResult<()> {
        let mut inner = self.inner.write();
        inner.ensure_open("close")?;
        inner.lifecycle.closed = true;
        debug!(accounts = inner.live.accounts().len(), "memory state db closed");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum BulkWrite {
    CreateAccount(Address),
    Balance(Address, U256),
    Nonce(Address, u64),
    Code(Address, Bytes),
    State(Address, B256, B256),
}

/// Bulk loader buffering writes until close
#[derive(Debug)]
pub struct MemoryBulkLoad {
    inner: Arc<RwLock<Inner>>,
    block: u64,
    writes: Vec<BulkWrite>,
}

impl BulkLoad for MemoryBulkLoad {
    fn create_account(&mut self, address: Address) {
        self.writes.push(BulkWrite::CreateAccount(address));
    }

    fn set_balance(&mut self, address: Address, balance: U256) {
        self.writes.push(BulkWrite::Balance(address, balance));
    }

    fn set_nonce(&mut self, address: Address, nonce: u64) {
        self.writes.push(BulkWrite::Nonce(address, nonce));
    }

    fn set_code(&mut self, address: Address, code: Bytes) {
        self.writes.push(BulkWrite::Code(address, code));
    }

    fn set_state(&mut self, address: Address, key: B256, value: B256) {
        self.writes.push(BulkWrite::State(address, key, value));
    }

    fn close(self: Box<Self>) -> ReplayResult<()> {
        let Self { inner, block, writes } = *self;
        let mut inner = inner.write();
        inner.ensure_open("bulk load close")?;

        let count = writes.len();
        let accounts = inner.live.accounts_mut();
        for write in writes {
            match write {
                BulkWrite::CreateAccount(address) => {
                    accounts.get_or_default(address);
                }
                BulkWrite::Balance(address, balance) => {
                    accounts.get_or_default(address).balance = balance;
                }
                BulkWrite::Nonce(address, nonce) => {
                    accounts.get_or_default(address).nonce = nonce;
                }
                BulkWrite::Code(address, code) => {
                    accounts.get_or_default(address).code = code;
                }
                BulkWrite::State(address, key, value) => {
                    accounts.get_or_default(address).storage.insert(key, value);
                }
            }
        }
        inner.archive_block(block);
        debug!(block, writes = count, "bulk load committed");
        Ok(())
    }
}

/// Detached copy of an archived block
#[derive(Debug)]
pub struct MemoryArchiveState {
    block: u64,
    state: JournaledState,
}

impl MemoryArchiveState {
    /// Block this view was opened at
    #[must_use]
    pub fn block(&self) -> u64 {
        self.block
    }
}

impl VmState for MemoryArchiveState {
    fn exist(&self, address: &Address) -> bool {
        self.state.exist(address)
    }

    fn create_account(&mut self, address: Address) {
        self.state.create_account(address);
    }

    fn get_balance(&self, address: &Address) -> U256 {
        self.state.balance(address)
    }

    fn add_balance(&mut self, address: Address, amount: U256) {
        let balance = self.state.balance(&address).saturating_add(amount);
        self.state.set_balance(address, balance);
    }

    fn sub_balance(&mut self, address: Address, amount: U256) {
        let balance = self.state.balance(&address).saturating_sub(amount);
        self.state.set_balance(address, balance);
    }

    fn get_nonce(&self, address: &Address) -> u64 {
        self.state.nonce(address)
    }

    fn set_nonce(&mut self, address: Address, nonce: u64) {
        self.state.set_nonce(address, nonce);
    }

    fn get_code(&self, address: &Address) -> Bytes {
        self.state.code(address)
    }

    fn set_code(&mut self, address: Address, code: Bytes) {
        self.state.set_code(address, code);
    }

    fn get_state(&self, address: &Address, key: &B256) -> B256 {
        self.state.storage(address, key)
    }

    fn set_state(&mut self, address: Address, key: B256, value: B256) {
        self.state.set_storage(address, key, value);
    }

    fn suicide(&mut self, address: Address) -> bool {
        self.state.suicide(address)
    }

    fn has_suicided(&self, address: &Address) -> bool {
        self.state.has_suicided(address)
    }

    fn snapshot(&mut self) -> SnapshotId {
        self.state.snapshot()
    }

    fn revert_to_snapshot(&mut self, id: SnapshotId) -> ReplayResult<()> {
        self.state.revert_to_snapshot(id)
    }

    fn release_snapshot(&mut self, id: SnapshotId) {
        self.state.release_snapshot(id);
    }
}

impl ArchiveState for MemoryArchiveState {
    fn get_hash(&self) -> B256 {
        state_root(self.state.accounts())
    }

    fn release(self: Box<Self>) {}
}
