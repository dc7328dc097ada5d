//! Data source capabilities.

use chronicle_core::{B256, ReplayError, ReplayResult, TxRecord, UpdateSet};

/// Callback receiving one record at a time
pub type Consumer<'a, T> = dyn FnMut(TxRecord<T>) -> ReplayResult<()> + 'a;

/// Streams transaction records over a half-open block range.
///
/// Records arrive in ascending (block, transaction) order, one consumer call
/// per stored pair with `from <= block < to`. An error from the consumer
/// stops the iteration and is returned wrapped in
/// [`ReplayError::IterationAborted`].
pub trait Provider<T>: Send {
    /// Feed every record in `[from, to)` to `consumer`
    ///
    /// # Errors
    ///
    /// Returns error if reading fails or the consumer aborts
    fn run(&self, from: u64, to: u64, consumer: &mut Consumer<'_, T>) -> ReplayResult<()>;

    /// Release the underlying source
    ///
    /// # Errors
    ///
    /// Returns error if the source cannot be closed cleanly
    fn close(&mut self) -> ReplayResult<()> {
        Ok(())
    }
}

/// Precomputed update sets, keyed by the block they were taken at
pub trait UpdateSetSource: Send + Sync {
    /// Feed every update set with `from <= block < to` to `consumer`, in block order
    ///
    /// # Errors
    ///
    /// Returns error if reading fails or the consumer aborts
    fn for_each_update_set(
        &self,
        from: u64,
        to: u64,
        consumer: &mut dyn FnMut(UpdateSet) -> ReplayResult<()>,
    ) -> ReplayResult<()>;
}

/// Reference state roots
pub trait StateHashSource: Send + Sync {
    /// Reference root after `block`
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::ReferenceMissing`] if no hash is stored for
    /// `block`, and a source error if the lookup itself fails
    fn get_state_hash(&self, block: u64) -> ReplayResult<B256>;
}

/// Wrap a consumer error with the coordinates of the record it rejected
pub(crate) fn aborted(block: u64, transaction: u32, err: ReplayError) -> ReplayError {
    ReplayError::IterationAborted {
        block,
        transaction,
        source: Box::new(err),
    }
}
