//! Validation of state roots against reference hashes.

use chronicle_core::{Config, ReplayError, ReplayResult, State, StateKind};
use chronicle_executor::{Context, Extension, NilExtension};
use chronicle_provider::StateHashSource;
use chronicle_state::{ArchiveState, StateStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Give up waiting for the archive after this long without reaching the last block
pub const ARCHIVE_DRAIN_TIMEOUT: Duration = Duration::from_secs(60);

/// Pause between two archive polls at the end of a run
pub const ARCHIVE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Create a validator, or a no-op when validation is disabled
#[must_use]
pub fn make_state_hash_validator<T: 'static>(
    config: &Config,
    hashes: Arc<dyn StateHashSource>,
) -> Box<dyn Extension<T>> {
    if !config.validate_state_hashes {
        return NilExtension::boxed();
    }
    Box::new(StateHashValidator::new(config, hashes))
}

/// Compares live and archive roots with reference hashes.
///
/// The live root is checked after every block. In archive mode, every
/// archived block from `first` up to the archive height is checked as it
/// becomes available, and PostRun waits for the archive to catch up with the
/// last processed block.
pub struct StateHashValidator {
    hashes: Arc<dyn StateHashSource>,
    archive_mode: bool,
    next_archive_block_to_check: u64,
    last_processed_block: Option<u64>,
    drain_timeout: Duration,
    poll_interval: Duration,
}

impl StateHashValidator {
    /// Create a validator
    #[must_use]
    pub fn new(config: &Config, hashes: Arc<dyn StateHashSource>) -> Self {
        Self {
            hashes,
            archive_mode: config.archive_mode,
            next_archive_block_to_check: config.first,
            last_processed_block: None,
            drain_timeout: ARCHIVE_DRAIN_TIMEOUT,
            poll_interval: ARCHIVE_POLL_INTERVAL,
        }
    }

    /// Wait at most `timeout` for the archive in PostRun
    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Next archive block that has not been verified
    #[must_use]
    pub fn next_archive_block_to_check(&self) -> u64 {
        self.next_archive_block_to_check
    }

    fn check_live_hash(&self, db: &dyn StateStore, block: u64) -> ReplayResult<()> {
        let expected = self.hashes.get_state_hash(block)?;
        let actual = db.get_hash();
        if expected != actual {
            return Err(ReplayError::HashMismatch {
                kind: StateKind::Live,
                block,
                expected,
                actual,
            });
        }
        Ok(())
    }

    fn check_archive_hashes(&mut self, db: &dyn StateStore) -> ReplayResult<()> {
        let (height, empty) = db.get_archive_block_height()?;
        if empty {
            return Ok(());
        }

        while self.next_archive_block_to_check <= height {
            let block = self.next_archive_block_to_check;
            let expected = self.hashes.get_state_hash(block)?;
            let archive = db.get_archive_state(block)?;
            let actual = archive.get_hash();
            archive.release();
            if expected != actual {
                return Err(ReplayError::HashMismatch {
                    kind: StateKind::Archive,
                    block,
                    expected,
                    actual,
                });
            }
            self.next_archive_block_to_check += 1;
        }
        Ok(())
    }

    fn drain_archive(&mut self, db: &dyn StateStore, last: u64) -> ReplayResult<()> {
        let deadline = Instant::now() + self.drain_timeout;
        let mut warned = false;
        loop {
            self.check_archive_hashes(db)?;
            if self.next_archive_block_to_check > last {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ReplayError::lifecycle(
                    "archive hash validation",
                    format!(
                        "archive did not reach block {last} within {:?}; next unchecked block is {}",
                        self.drain_timeout, self.next_archive_block_to_check
                    ),
                ));
            }
            if !warned {
                warn!(
                    "[StateHashValidator] Archive lagging at block {}, waiting for block {last}",
                    self.next_archive_block_to_check
                );
                warned = true;
            }
            std::thread::sleep(self.poll_interval);
        }
    }
}

impl std::fmt::Debug for StateHashValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateHashValidator")
            .field("archive_mode", &self.archive_mode)
            .field("next_archive_block_to_check", &self.next_archive_block_to_check)
            .field("last_processed_block", &self.last_processed_block)
            .finish_non_exhaustive()
    }
}

impl<T> Extension<T> for StateHashValidator {
    fn post_block(&mut self, state: State<'_, T>, ctx: &mut Context) -> ReplayResult<()> {
        let Some(db) = ctx.state.as_deref() else {
            return Ok(());
        };
        self.check_live_hash(db, state.block)?;
        debug!(block = state.block, "live state hash verified");

        if self.archive_mode {
            self.last_processed_block = Some(state.block);
            self.check_archive_hashes(db)?;
        }
        Ok(())
    }

    fn post_run(
        &mut self,
        _state: State<'_, T>,
        ctx: &mut Context,
        err: Option<&ReplayError>,
    ) -> ReplayResult<()> {
        if err.is_some() || !self.archive_mode {
            return Ok(());
        }
        let (Some(last), Some(db)) = (self.last_processed_block, ctx.state.as_deref()) else {
            return Ok(());
        };
        self.drain_archive(db, last)
    }
}
