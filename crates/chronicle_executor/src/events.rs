//! Extensions translating run events into store lifecycle calls.

use crate::context::Context;
use crate::extension::Extension;
use chronicle_core::{ReplayError, ReplayResult, State};
use tracing::debug;

/// Create a block event emitter
#[must_use]
pub fn make_block_event_emitter<T: 'static>() -> Box<dyn Extension<T>> {
    Box::new(BlockEventEmitter::default())
}

/// Opens and closes sync periods, blocks and transactions on the live store
#[derive(Debug, Default)]
pub struct BlockEventEmitter {
    sync_period_open: bool,
}

impl<T> Extension<T> for BlockEventEmitter {
    fn pre_run(&mut self, _state: State<'_, T>, ctx: &mut Context) -> ReplayResult<()> {
        if let Some(store) = ctx.state.as_deref_mut() {
            store.begin_sync_period(0)?;
            self.sync_period_open = true;
        }
        Ok(())
    }

    fn pre_block(&mut self, state: State<'_, T>, ctx: &mut Context) -> ReplayResult<()> {
        ctx.state_mut()?.begin_block(state.block)
    }

    fn pre_transaction(&mut self, state: State<'_, T>, ctx: &mut Context) -> ReplayResult<()> {
        ctx.state_mut()?.begin_transaction(state.transaction)
    }

    fn post_transaction(&mut self, _state: State<'_, T>, ctx: &mut Context) -> ReplayResult<()> {
        ctx.state_mut()?.end_transaction()
    }

    fn post_block(&mut self, _state: State<'_, T>, ctx: &mut Context) -> ReplayResult<()> {
        ctx.state_mut()?.end_block()
    }

    fn post_run(
        &mut self,
        _state: State<'_, T>,
        ctx: &mut Context,
        _err: Option<&ReplayError>,
    ) -> ReplayResult<()> {
        if !std::mem::take(&mut self.sync_period_open) {
            return Ok(());
        }
        match ctx.state.as_deref_mut() {
            Some(store) => store.end_sync_period(),
            None => Ok(()),
        }
    }
}

/// Create an archive prepper
#[must_use]
pub fn make_archive_prepper<T: 'static>() -> Box<dyn Extension<T>> {
    Box::new(ArchivePrepper)
}

/// Opens the archive state preceding each block into [`Context::archive`]
#[derive(Debug, Default, Clone, Copy)]
pub struct ArchivePrepper;

impl<T> Extension<T> for ArchivePrepper {
    fn pre_block(&mut self, state: State<'_, T>, ctx: &mut Context) -> ReplayResult<()> {
        ctx.release_archive();
        let parent = state.block.saturating_sub(1);
        let archive = ctx.state_mut()?.get_archive_state(parent)?;
        debug!(block = state.block, parent, "archive state opened");
        ctx.archive = Some(archive);
        Ok(())
    }

    fn post_block(&mut self, _state: State<'_, T>, ctx: &mut Context) -> ReplayResult<()> {
        ctx.release_archive();
        Ok(())
    }

    fn exit(&mut self, _state: State<'_, T>, ctx: &mut Context) -> ReplayResult<()> {
        ctx.release_archive();
        Ok(())
    }
}
