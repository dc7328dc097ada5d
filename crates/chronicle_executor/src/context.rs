//! Run context shared by the processor and all extensions.

use crate::channel::{ErrorReporter, ErrorReports, error_channel};
use chronicle_core::{Config, ReplayError, ReplayResult, TxResult};
use chronicle_state::{ArchiveState, StateStore};
use std::path::PathBuf;
use std::sync::Arc;

/// Mutable state of one run.
///
/// Owned by the executor for the duration of the run and handed to every
/// hook by `&mut`. Only the error reporter may be used from other threads.
pub struct Context {
    /// Live state store
    pub state: Option<Box<dyn StateStore>>,
    /// Archive view used by archive processing
    pub archive: Option<Box<dyn ArchiveState>>,
    /// Result of the last executed transaction
    pub execution_result: Option<TxResult>,
    /// Recoverable failure sink
    pub reporter: ErrorReporter,
    /// Location of the state store, if it lives on disk
    pub state_db_path: Option<PathBuf>,
    /// Run configuration
    pub config: Arc<Config>,
}

impl Context {
    /// Create a context without a state store
    #[must_use]
    pub fn new(config: Arc<Config>, reporter: ErrorReporter) -> Self {
        Self {
            state: None,
            archive: None,
            execution_result: None,
            reporter,
            state_db_path: None,
            config,
        }
    }

    /// Create a context together with a fresh report channel sized from `config`
    #[must_use]
    pub fn with_channel(config: Arc<Config>) -> (Self, ErrorReports) {
        let (reporter, reports) = error_channel(config.error_channel_capacity);
        (Self::new(config, reporter), reports)
    }

    /// Install a state store
    #[must_use]
    pub fn with_state(mut self, state: Box<dyn StateStore>) -> Self {
        self.state = Some(state);
        self
    }

    /// Live state store
    ///
    /// # Errors
    ///
    /// Returns error if no store has been installed
    pub fn state_mut(&mut self) -> ReplayResult<&mut dyn StateStore> {
        match self.state.as_deref_mut() {
            Some(state) => Ok(state),
            None => Err(ReplayError::lifecycle("access state-db", "state-db is not set")),
        }
    }

    /// Release the archive view, if one is open
    pub fn release_archive(&mut self) {
        if let Some(archive) = self.archive.take() {
            archive.release();
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("has_state", &self.state.is_some())
            .field("has_archive", &self.archive.is_some())
            .field("execution_result", &self.execution_result)
            .field("state_db_path", &self.state_db_path)
            .field("config", &self.config)
            .finish()
    }
}
