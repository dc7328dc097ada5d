//! Transaction processors.
//!
//! [`TxProcessor`] applies one record to a [`VmState`]: pseudo transactions
//! overwrite state directly, everything else runs through the [`Evm`] inside
//! a snapshot that is reverted on failure. It also owns the failure policy:
//! whether an execution failure aborts the run or is only reported.
//! [`LiveTxProcessor`] and [`ArchiveTxProcessor`] pick the state to run
//! against from the [`Context`].

use crate::context::Context;
use crate::evm::Evm;
use chronicle_core::{
    Config, ErrorReport, ReplayError, ReplayResult, State, StateKind, TxContext, TxResult,
    PSEUDO_TX,
};
use chronicle_state::{AsVmState, VmState};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Processes one transaction of a run
pub trait Processor<T>: Send + Sync {
    /// Process the record at `state`
    ///
    /// # Errors
    ///
    /// Returns error if the failure is fatal under the configured policy
    fn process(&self, state: State<'_, T>, ctx: &mut Context) -> ReplayResult<()>;
}

/// Executes records and classifies failures
pub struct TxProcessor {
    config: Arc<Config>,
    evm: Arc<dyn Evm>,
    num_errors: AtomicUsize,
}

impl TxProcessor {
    /// Create a processor
    #[must_use]
    pub fn new(config: Arc<Config>, evm: Arc<dyn Evm>) -> Self {
        Self {
            config,
            evm,
            num_errors: AtomicUsize::new(0),
        }
    }

    /// Failures tolerated so far
    #[must_use]
    pub fn num_errors(&self) -> usize {
        self.num_errors.load(Ordering::Acquire)
    }

    /// Whether the next execution failure must abort the run.
    ///
    /// Each non-fatal verdict consumes one unit of the error budget.
    pub fn is_err_fatal(&self) -> bool {
        if !self.config.continue_on_failure {
            return true;
        }
        let max = self.config.max_num_errors;
        if max == 0 {
            return false;
        }
        self.num_errors
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .is_err()
    }

    /// Apply one record to `db`
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Processing`] if execution fails (the state is
    /// reverted first), or a lifecycle error if the revert itself fails
    pub fn process_transaction<D: TxContext>(
        &self,
        db: &mut dyn VmState,
        block: u64,
        transaction: u32,
        data: &D,
    ) -> ReplayResult<TxResult> {
        if transaction >= PSEUDO_TX {
            apply_pseudo_transaction(db, data);
            return Ok(TxResult::pseudo());
        }

        let snapshot = db.snapshot();
        match self
            .evm
            .execute(db, data.block_environment(), data.message(), self.config.chain_id)
        {
            Ok(result) => {
                db.release_snapshot(snapshot);
                Ok(result)
            }
            Err(source) => {
                db.revert_to_snapshot(snapshot)?;
                Err(ReplayError::Processing {
                    block,
                    transaction,
                    source,
                })
            }
        }
    }

    fn settle(
        &self,
        kind: StateKind,
        outcome: ReplayResult<TxResult>,
        ctx: &mut Context,
    ) -> ReplayResult<()> {
        match outcome {
            Ok(result) => {
                ctx.execution_result = Some(result);
                Ok(())
            }
            Err(ReplayError::Processing {
                block,
                transaction,
                source,
            }) if !self.is_err_fatal() => {
                debug!(block, transaction, %source, "{kind} transaction failed, continuing");
                ctx.execution_result = None;
                ctx.reporter.report(ErrorReport {
                    kind,
                    block,
                    transaction,
                    error: source,
                });
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

impl std::fmt::Debug for TxProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxProcessor")
            .field("num_errors", &self.num_errors())
            .finish_non_exhaustive()
    }
}

fn apply_pseudo_transaction<D: TxContext>(db: &mut dyn VmState, data: &D) {
    for (address, account) in data.output_state().iter() {
        let balance = db.get_balance(address);
        db.sub_balance(*address, balance);
        db.add_balance(*address, account.balance);
        db.set_nonce(*address, account.nonce);
        db.set_code(*address, account.code.clone());
        for (key, value) in &account.storage {
            db.set_state(*address, *key, *value);
        }
    }
}

fn payload<'a, T>(state: &State<'a, T>) -> ReplayResult<&'a T> {
    state.data.ok_or_else(|| {
        ReplayError::lifecycle(
            "process transaction",
            format!("block {} transaction {} has no payload", state.block, state.transaction),
        )
    })
}

/// Processor executing against the live state
#[derive(Debug)]
pub struct LiveTxProcessor {
    inner: TxProcessor,
}

impl LiveTxProcessor {
    /// Create a live processor
    #[must_use]
    pub fn new(config: Arc<Config>, evm: Arc<dyn Evm>) -> Self {
        Self {
            inner: TxProcessor::new(config, evm),
        }
    }

    /// Shared execution core
    #[must_use]
    pub fn inner(&self) -> &TxProcessor {
        &self.inner
    }
}

impl<T: TxContext + Sync> Processor<T> for LiveTxProcessor {
    fn process(&self, state: State<'_, T>, ctx: &mut Context) -> ReplayResult<()> {
        let data = payload(&state)?;
        let db = ctx.state_mut()?.as_vm_state();
        let outcome = self
            .inner
            .process_transaction(db, state.block, state.transaction, data);
        self.inner.settle(StateKind::Live, outcome, ctx)
    }
}

/// Processor executing against the archive view in [`Context::archive`]
#[derive(Debug)]
pub struct ArchiveTxProcessor {
    inner: TxProcessor,
}

impl ArchiveTxProcessor {
    /// Create an archive processor
    #[must_use]
    pub fn new(config: Arc<Config>, evm: Arc<dyn Evm>) -> Self {
        Self {
            inner: TxProcessor::new(config, evm),
        }
    }

    /// Shared execution core
    #[must_use]
    pub fn inner(&self) -> &TxProcessor {
        &self.inner
    }
}

impl<T: TxContext + Sync> Processor<T> for ArchiveTxProcessor {
    fn process(&self, state: State<'_, T>, ctx: &mut Context) -> ReplayResult<()> {
        let data = payload(&state)?;
        let Some(archive) = ctx.archive.as_deref_mut() else {
            return Err(ReplayError::lifecycle(
                "process transaction",
                "archive state is not set",
            ));
        };
        let outcome = self.inner.process_transaction(
            archive.as_vm_state(),
            state.block,
            state.transaction,
            data,
        );
        self.inner.settle(StateKind::Archive, outcome, ctx)
    }
}
