//! Priming as a run extension.

use crate::prime::load_world_state_and_prime;
use chronicle_core::{Config, ReplayResult, State, TxContext};
use chronicle_executor::{Context, Extension, NilExtension};
use chronicle_provider::{Provider, UpdateSetSource};
use std::sync::Arc;
use tracing::{info, warn};

/// Create a primer, or a no-op when priming is skipped
#[must_use]
pub fn make_state_db_primer<T>(
    config: &Config,
    update_sets: Arc<dyn UpdateSetSource>,
    provider: Arc<dyn Provider<T> + Sync>,
) -> Box<dyn Extension<T>>
where
    T: TxContext + 'static,
{
    if config.skip_priming {
        return NilExtension::boxed();
    }
    Box::new(PrimerExtension::new(update_sets, provider))
}

/// Primes the store to `first - 1` before the first block runs
pub struct PrimerExtension<T> {
    update_sets: Arc<dyn UpdateSetSource>,
    provider: Arc<dyn Provider<T> + Sync>,
}

impl<T> PrimerExtension<T> {
    /// Create a primer reading from `update_sets` and `provider`
    #[must_use]
    pub fn new(update_sets: Arc<dyn UpdateSetSource>, provider: Arc<dyn Provider<T> + Sync>) -> Self {
        Self {
            update_sets,
            provider,
        }
    }
}

impl<T> std::fmt::Debug for PrimerExtension<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimerExtension").finish_non_exhaustive()
    }
}

impl<T: TxContext> Extension<T> for PrimerExtension<T> {
    fn pre_run(&mut self, _state: State<'_, T>, ctx: &mut Context) -> ReplayResult<()> {
        let config = Arc::clone(&ctx.config);
        if config.is_existing_state_db {
            warn!("[Primer] Skipping priming due to usage of pre-existing StateDb");
            return Ok(());
        }
        if config.first == 0 {
            return Ok(());
        }

        let target = config.first - 1;
        info!("[Primer] Priming to block {target}");
        load_world_state_and_prime(
            ctx.state_mut()?,
            &config,
            self.update_sets.as_ref(),
            self.provider.as_ref(),
            target,
        )
    }
}
