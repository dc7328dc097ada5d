//! State store ownership for a run.

use crate::context::Context;
use crate::extension::Extension;
use chronicle_core::{Config, ReplayError, ReplayResult, State};
use chronicle_state::StateStore;
use tracing::{info, warn};

/// Builds the state store of a run
pub type StateDbFactory = Box<dyn FnMut(&Config) -> ReplayResult<Box<dyn StateStore>> + Send>;

/// Create a state store manager
#[must_use]
pub fn make_state_db_manager<T: 'static>(factory: StateDbFactory) -> Box<dyn Extension<T>> {
    Box::new(StateDbManager::new(factory))
}

/// Installs the store in PreRun and closes it in PostRun.
///
/// A store already present in the context is kept; the factory is only
/// consulted when the context has none.
pub struct StateDbManager {
    factory: StateDbFactory,
    last_processed: Option<u64>,
}

impl StateDbManager {
    /// Create a manager
    #[must_use]
    pub fn new(factory: StateDbFactory) -> Self {
        Self {
            factory,
            last_processed: None,
        }
    }

    /// Last block completed by the run, known after PostRun
    #[must_use]
    pub fn last_processed(&self) -> Option<u64> {
        self.last_processed
    }
}

impl std::fmt::Debug for StateDbManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateDbManager")
            .field("last_processed", &self.last_processed)
            .finish_non_exhaustive()
    }
}

impl<T> Extension<T> for StateDbManager {
    fn pre_run(&mut self, _state: State<'_, T>, ctx: &mut Context) -> ReplayResult<()> {
        if let Some(path) = ctx.config.state_db_path.clone() {
            std::fs::create_dir_all(&path)
                .map_err(|e| ReplayError::lifecycle("create state-db directory", e))?;
            ctx.state_db_path = Some(path);
        }
        if ctx.state.is_some() {
            return Ok(());
        }
        let store = (self.factory)(&ctx.config)?;
        info!("[StateDbManager] State-db created");
        ctx.state = Some(store);
        Ok(())
    }

    fn post_run(
        &mut self,
        state: State<'_, T>,
        ctx: &mut Context,
        _err: Option<&ReplayError>,
    ) -> ReplayResult<()> {
        let last = state.block.saturating_sub(1);
        self.last_processed = Some(last);

        let Some(store) = ctx.state.as_deref_mut() else {
            return Err(ReplayError::lifecycle("close state-db", "state-db is nil"));
        };
        info!("[StateDbManager] State root after block {last}: {}", store.get_hash());
        store.close()?;

        if !ctx.config.keep_db {
            if let Some(path) = ctx.state_db_path.take() {
                if let Err(e) = std::fs::remove_dir_all(&path) {
                    warn!("[StateDbManager] Failed to remove {}: {e}", path.display());
                }
            }
        }
        Ok(())
    }
}
