//! Throughput logging.

use crate::context::Context;
use crate::extension::{Extension, NilExtension};
use chronicle_core::{Config, ReplayError, ReplayResult, State};
use std::time::Instant;
use tracing::info;

/// Create a progress logger, or a no-op when the interval is zero
#[must_use]
pub fn make_progress_logger<T: 'static>(config: &Config) -> Box<dyn Extension<T>> {
    if config.progress_report_interval == 0 {
        return NilExtension::boxed();
    }
    Box::new(ProgressLogger::new(config.progress_report_interval))
}

/// Logs block and transaction throughput every `interval` blocks
#[derive(Debug)]
pub struct ProgressLogger {
    interval: u64,
    started: Instant,
    last_report: Instant,
    next_report_block: u64,
    blocks: u64,
    transactions: u64,
    blocks_since_report: u64,
    transactions_since_report: u64,
}

impl ProgressLogger {
    /// Create a logger
    #[must_use]
    pub fn new(interval: u64) -> Self {
        let now = Instant::now();
        Self {
            interval: interval.max(1),
            started: now,
            last_report: now,
            next_report_block: 0,
            blocks: 0,
            transactions: 0,
            blocks_since_report: 0,
            transactions_since_report: 0,
        }
    }

    /// Blocks completed so far
    #[must_use]
    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    /// Transactions completed so far
    #[must_use]
    pub fn transactions(&self) -> u64 {
        self.transactions
    }

    fn report(&mut self, block: u64) {
        let elapsed = self.last_report.elapsed().as_secs_f64().max(f64::EPSILON);
        info!(
            "[Progress] Reached block {block}, {:.2} blocks/s, {:.2} tx/s",
            self.blocks_since_report as f64 / elapsed,
            self.transactions_since_report as f64 / elapsed,
        );
        self.last_report = Instant::now();
        self.blocks_since_report = 0;
        self.transactions_since_report = 0;
    }
}

impl<T> Extension<T> for ProgressLogger {
    fn pre_run(&mut self, state: State<'_, T>, _ctx: &mut Context) -> ReplayResult<()> {
        let now = Instant::now();
        self.started = now;
        self.last_report = now;
        self.next_report_block = state.block.saturating_add(self.interval);
        Ok(())
    }

    fn post_transaction(&mut self, _state: State<'_, T>, _ctx: &mut Context) -> ReplayResult<()> {
        self.transactions += 1;
        self.transactions_since_report += 1;
        Ok(())
    }

    fn post_block(&mut self, state: State<'_, T>, _ctx: &mut Context) -> ReplayResult<()> {
        self.blocks += 1;
        self.blocks_since_report += 1;
        if state.block >= self.next_report_block {
            self.report(state.block);
            self.next_report_block = state.block.saturating_add(self.interval);
        }
        Ok(())
    }

    fn post_run(
        &mut self,
        state: State<'_, T>,
        _ctx: &mut Context,
        err: Option<&ReplayError>,
    ) -> ReplayResult<()> {
        let outcome = if err.is_some() { "aborted" } else { "finished" };
        info!(
            "[Progress] Run {outcome} at block {} after {:.1}s: {} blocks, {} transactions",
            state.block,
            self.started.elapsed().as_secs_f64(),
            self.blocks,
            self.transactions,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counts_blocks_and_transactions() {
        let mut logger = ProgressLogger::new(2);
        let (mut ctx, _reports) = Context::with_channel(Arc::new(Config::new(1, 5)));

        Extension::<()>::pre_run(&mut logger, State::at_block(1), &mut ctx).unwrap();
        for block in 1..=5 {
            for _ in 0..3 {
                Extension::<()>::post_transaction(&mut logger, State::at_block(block), &mut ctx)
                    .unwrap();
            }
            Extension::<()>::post_block(&mut logger, State::at_block(block), &mut ctx).unwrap();
        }
        assert_eq!(logger.blocks(), 5);
        assert_eq!(logger.transactions(), 15);
        assert_eq!(logger.next_report_block, 7);
    }

    #[test]
    fn test_zero_interval_disables_logger() {
        let config = Config {
            progress_report_interval: 0,
            ..Config::default()
        };
        let mut extension = make_progress_logger::<()>(&config);
        let (mut ctx, _reports) = Context::with_channel(Arc::new(config));
        assert!(extension.post_block(State::at_block(1), &mut ctx).is_ok());
    }
}
