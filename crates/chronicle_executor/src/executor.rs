//! Run orchestration.

use crate::context::Context;
use crate::extension::ExtensionList;
use crate::processor::Processor;
use chronicle_core::{ReplayError, ReplayResult, State, TxRecord};
use chronicle_provider::Provider;
use tracing::{debug, info};

/// Drives one provider through the extension lifecycle
pub struct Executor<'p, T> {
    provider: &'p dyn Provider<T>,
}

impl<'p, T> Executor<'p, T> {
    /// Create an executor reading from `provider`
    #[must_use]
    pub fn new(provider: &'p dyn Provider<T>) -> Self {
        Self { provider }
    }

    /// Replay `[config.first, config.last]` and return the combined error.
    ///
    /// PostRun and Exit run even if PreRun or the main loop failed; their
    /// errors are joined with the earlier one. The context is dropped once
    /// Exit returns.
    ///
    /// # Errors
    ///
    /// Returns every failure of the run, combined
    pub fn run(
        &self,
        processor: &dyn Processor<T>,
        extensions: &mut ExtensionList<T>,
        mut ctx: Context,
    ) -> ReplayResult<()> {
        let first = ctx.config.first;
        let end = ctx.config.end();
        info!("[Executor] Replaying blocks {first}..{end}");

        let (block, err) = match self.pre_run(extensions, &mut ctx) {
            Ok(()) => match self.run_blocks(processor, extensions, &mut ctx, first, end) {
                Ok(()) => (end, None),
                Err((position, err)) => (position, Some(err)),
            },
            Err(err) => (first, Some(err)),
        };
        if let Some(err) = &err {
            debug!(block, %err, "[Executor] Run aborted");
        }

        let state = State::at_block(block);
        let post_run = extensions.post_run(state, &mut ctx, err.as_ref()).err();
        let err = ReplayError::join(err, post_run);

        let exit = extensions.exit(state, &mut ctx).err();
        ReplayError::join(err, exit).map_or(Ok(()), Err)
    }

    fn pre_run(&self, extensions: &mut ExtensionList<T>, ctx: &mut Context) -> ReplayResult<()> {
        let first = ctx.config.first;
        extensions
            .pre_run(State::at_block(first), ctx)
            .map_err(|err| err.in_scope("pre-run"))?;
        if ctx.state.is_none() {
            return Err(ReplayError::lifecycle(
                "pre-run",
                "no state-db was set up by the extensions",
            ));
        }
        Ok(())
    }

    fn run_blocks(
        &self,
        processor: &dyn Processor<T>,
        extensions: &mut ExtensionList<T>,
        ctx: &mut Context,
        from: u64,
        to: u64,
    ) -> Result<(), (u64, ReplayError)> {
        let mut current: Option<u64> = None;
        let mut position = from;

        let mut handler = |record: TxRecord<T>| -> ReplayResult<()> {
            position = record.block;
            if current != Some(record.block) {
                if let Some(previous) = current.take() {
                    extensions
                        .post_block(State::at_block(previous), ctx)
                        .map_err(|err| err.in_scope(format!("block {previous}")))?;
                }
                extensions
                    .pre_block(State::at_block(record.block), ctx)
                    .map_err(|err| err.in_scope(format!("block {}", record.block)))?;
                current = Some(record.block);
            }

            let state = record.state();
            extensions.pre_transaction(state, ctx)?;
            processor.process(state, ctx)?;
            extensions.post_transaction(state, ctx)
        };
        let result = self.provider.run(from, to, &mut handler);

        if let Err(err) = result {
            return Err((position, err));
        }
        if let Some(last) = current {
            extensions
                .post_block(State::at_block(last), ctx)
                .map_err(|err| (last, err.in_scope(format!("block {last}"))))?;
        }
        Ok(())
    }
}

impl<T> std::fmt::Debug for Executor<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor").finish_non_exhaustive()
    }
}
