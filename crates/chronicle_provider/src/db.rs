//! redb-backed replay database.
//!
//! One file holds three tables: transaction records keyed by
//! `(block, transaction)`, update sets keyed by block and reference state
//! hashes keyed by block. Records and update sets are stored as JSON.

use crate::provider::{Consumer, Provider, StateHashSource, UpdateSetSource, aborted};
use chronicle_core::{B256, ReplayError, ReplayResult, Substate, TxRecord, UpdateSet};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const RECORDS: TableDefinition<(u64, u32), &[u8]> = TableDefinition::new("records");
const UPDATE_SETS: TableDefinition<u64, &[u8]> = TableDefinition::new("update_sets");
const STATE_HASHES: TableDefinition<u64, [u8; 32]> = TableDefinition::new("state_hashes");

/// redb failure
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Opening or creating the database failed
    #[error("database: {0}")]
    Database(#[from] redb::DatabaseError),
    /// Starting a transaction failed
    #[error("transaction: {0}")]
    Transaction(#[from] redb::TransactionError),
    /// Opening a table failed
    #[error("table: {0}")]
    Table(#[from] redb::TableError),
    /// Reading or writing a table failed
    #[error("storage: {0}")]
    Storage(#[from] redb::StorageError),
    /// Committing a write transaction failed
    #[error("commit: {0}")]
    Commit(#[from] redb::CommitError),
}

impl From<DbError> for ReplayError {
    fn from(err: DbError) -> Self {
        ReplayError::io(err)
    }
}

trait DbResultExt<T> {
    fn db(self) -> ReplayResult<T>;
}

impl<T, E: Into<DbError>> DbResultExt<T> for Result<T, E> {
    fn db(self) -> ReplayResult<T> {
        self.map_err(|e| ReplayError::from(e.into()))
    }
}

/// Replay database
pub struct ReplayDb {
    database: Database,
    path: PathBuf,
}

impl std::fmt::Debug for ReplayDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayDb").field("path", &self.path).finish()
    }
}

impl ReplayDb {
    /// Create a database, or open an existing one keeping its contents
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created or initialised
    pub fn create(path: impl AsRef<Path>) -> ReplayResult<Self> {
        let path = path.as_ref().to_path_buf();
        let database = Database::create(&path).db()?;

        let write_txn = database.begin_write().db()?;
        {
            write_txn.open_table(RECORDS).db()?;
            write_txn.open_table(UPDATE_SETS).db()?;
            write_txn.open_table(STATE_HASHES).db()?;
        }
        write_txn.commit().db()?;

        info!(path = %path.display(), "replay db created");
        Ok(Self { database, path })
    }

    /// Open an existing database
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::NotFound`] if nothing exists at `path`
    pub fn open(path: impl AsRef<Path>) -> ReplayResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(ReplayError::NotFound {
                what: "replay db".to_string(),
                location: path.display().to_string(),
            });
        }
        let database = Database::open(&path).db()?;
        debug!(path = %path.display(), "replay db opened");
        Ok(Self { database, path })
    }

    /// Location of the database file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store a transaction record
    ///
    /// # Errors
    ///
    /// Returns error if encoding or the write fails
    pub fn put_record(&self, block: u64, transaction: u32, substate: &Substate) -> ReplayResult<()> {
        let encoded = serde_json::to_vec(substate)?;
        let write_txn = self.database.begin_write().db()?;
        {
            let mut table = write_txn.open_table(RECORDS).db()?;
            table.insert((block, transaction), encoded.as_slice()).db()?;
        }
        write_txn.commit().db()
    }

    /// Store an update set under its block
    ///
    /// # Errors
    ///
    /// Returns error if encoding or the write fails
    pub fn put_update_set(&self, set: &UpdateSet) -> ReplayResult<()> {
        let encoded = serde_json::to_vec(set)?;
        let write_txn = self.database.begin_write().db()?;
        {
            let mut table = write_txn.open_table(UPDATE_SETS).db()?;
            table.insert(set.block, encoded.as_slice()).db()?;
        }
        write_txn.commit().db()
    }

    /// Store a reference state hash
    ///
    /// # Errors
    ///
    /// Returns error if the write fails
    pub fn put_state_hash(&self, block: u64, hash: B256) -> ReplayResult<()> {
        let write_txn = self.database.begin_write().db()?;
        {
            let mut table = write_txn.open_table(STATE_HASHES).db()?;
            table.insert(block, hash.0).db()?;
        }
        write_txn.commit().db()
    }
}

impl Provider<Substate> for ReplayDb {
    fn run(&self, from: u64, to: u64, consumer: &mut Consumer<'_, Substate>) -> ReplayResult<()> {
        if from >= to {
            return Ok(());
        }
        let read_txn = self.database.begin_read().db()?;
        let table = read_txn.open_table(RECORDS).db()?;
        for entry in table.range((from, 0u32)..(to, 0u32)).db()? {
            let (key, value) = entry.db()?;
            let (block, transaction) = key.value();
            let substate: Substate = serde_json::from_slice(value.value())?;
            consumer(TxRecord::new(block, transaction, substate))
                .map_err(|err| aborted(block, transaction, err))?;
        }
        Ok(())
    }
}

impl UpdateSetSource for ReplayDb {
    fn for_each_update_set(
        &self,
        from: u64,
        to: u64,
        consumer: &mut dyn FnMut(UpdateSet) -> ReplayResult<()>,
    ) -> ReplayResult<()> {
        if from >= to {
            return Ok(());
        }
        let read_txn = self.database.begin_read().db()?;
        let table = read_txn.open_table(UPDATE_SETS).db()?;
        for entry in table.range(from..to).db()? {
            let (key, value) = entry.db()?;
            let set: UpdateSet = serde_json::from_slice(value.value())?;
            consumer(set).map_err(|err| aborted(key.value(), 0, err))?;
        }
        Ok(())
    }
}

impl StateHashSource for ReplayDb {
    fn get_state_hash(&self, block: u64) -> ReplayResult<B256> {
        let read_txn = self.database.begin_read().db()?;
        let table = read_txn.open_table(STATE_HASHES).db()?;
        let hash = table.get(block).db()?;
        hash.map(|h| B256::from(h.value()))
            .ok_or(ReplayError::ReferenceMissing { block })
    }
}
