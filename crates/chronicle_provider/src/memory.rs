//! In-memory sources.

use crate::provider::{Consumer, Provider, StateHashSource, UpdateSetSource, aborted};
use chronicle_core::{B256, ReplayError, ReplayResult, TxRecord, UpdateSet};
use std::collections::BTreeMap;

/// Records held in a sorted map
#[derive(Debug, Clone)]
pub struct MemoryProvider<T> {
    records: BTreeMap<(u64, u32), T>,
}

impl<T> Default for MemoryProvider<T> {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
        }
    }
}

impl<T> MemoryProvider<T> {
    /// Create an empty provider
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record
    #[must_use]
    pub fn with_record(mut self, block: u64, transaction: u32, data: T) -> Self {
        self.insert(block, transaction, data);
        self
    }

    /// Insert or replace a record
    pub fn insert(&mut self, block: u64, transaction: u32, data: T) {
        self.records.insert((block, transaction), data);
    }

    /// Number of stored records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no records are stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<T> FromIterator<TxRecord<T>> for MemoryProvider<T> {
    fn from_iter<I: IntoIterator<Item = TxRecord<T>>>(iter: I) -> Self {
        Self {
            records: iter
                .into_iter()
                .map(|r| ((r.block, r.transaction), r.data))
                .collect(),
        }
    }
}

impl<T: Clone + Send> Provider<T> for MemoryProvider<T> {
    fn run(&self, from: u64, to: u64, consumer: &mut Consumer<'_, T>) -> ReplayResult<()> {
        if from >= to {
            return Ok(());
        }
        for (&(block, transaction), data) in self.records.range((from, 0u32)..(to, 0u32)) {
            consumer(TxRecord::new(block, transaction, data.clone()))
                .map_err(|err| aborted(block, transaction, err))?;
        }
        Ok(())
    }
}

/// Update sets held in a sorted map
#[derive(Debug, Clone, Default)]
pub struct MemoryUpdateSets {
    sets: BTreeMap<u64, UpdateSet>,
}

impl MemoryUpdateSets {
    /// Create an empty source
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an update set
    #[must_use]
    pub fn with_update_set(mut self, set: UpdateSet) -> Self {
        self.insert(set);
        self
    }

    /// Insert or replace the update set of its block
    pub fn insert(&mut self, set: UpdateSet) {
        self.sets.insert(set.block, set);
    }
}

impl UpdateSetSource for MemoryUpdateSets {
    fn for_each_update_set(
        &self,
        from: u64,
        to: u64,
        consumer: &mut dyn FnMut(UpdateSet) -> ReplayResult<()>,
    ) -> ReplayResult<()> {
        if from >= to {
            return Ok(());
        }
        for set in self.sets.range(from..to).map(|(_, set)| set) {
            consumer(set.clone()).map_err(|err| aborted(set.block, 0, err))?;
        }
        Ok(())
    }
}

/// Reference hashes held in a map
#[derive(Debug, Clone, Default)]
pub struct MemoryStateHashes {
    hashes: BTreeMap<u64, B256>,
}

impl MemoryStateHashes {
    /// Create an empty source
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reference hash
    #[must_use]
    pub fn with_hash(mut self, block: u64, hash: B256) -> Self {
        self.insert(block, hash);
        self
    }

    /// Insert or replace the reference hash of a block
    pub fn insert(&mut self, block: u64, hash: B256) {
        self.hashes.insert(block, hash);
    }
}

impl StateHashSource for MemoryStateHashes {
    fn get_state_hash(&self, block: u64) -> ReplayResult<B256> {
        self.hashes
            .get(&block)
            .copied()
            .ok_or(ReplayError::ReferenceMissing { block })
    }
}
