//! Error-report channel.
//!
//! Processors hand recoverable failures to an [`ErrorReporter`] without ever
//! blocking. The channel is bounded; when it is full (or the receiving side
//! is gone) the newest report is dropped, logged and counted.

use chronicle_core::ErrorReport;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

/// Create a bounded report channel
#[must_use]
pub fn error_channel(capacity: usize) -> (ErrorReporter, ErrorReports) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        ErrorReporter {
            sender,
            dropped: Arc::clone(&dropped),
        },
        ErrorReports { receiver, dropped },
    )
}

/// Sending half, shared by every processor of a run
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    sender: mpsc::Sender<ErrorReport>,
    dropped: Arc<AtomicU64>,
}

impl ErrorReporter {
    /// Queue a report; returns false if it was dropped
    pub fn report(&self, report: ErrorReport) -> bool {
        match self.sender.try_send(report) {
            Ok(()) => true,
            Err(TrySendError::Full(report)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("[ErrorChannel] Channel full, dropping report: {report}");
                false
            }
            Err(TrySendError::Closed(report)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("[ErrorChannel] Receiver gone, dropping report: {report}");
                false
            }
        }
    }

    /// Reports dropped so far
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Receiving half, drained by whoever collects recoverable failures
#[derive(Debug)]
pub struct ErrorReports {
    receiver: mpsc::Receiver<ErrorReport>,
    dropped: Arc<AtomicU64>,
}

impl ErrorReports {
    /// Next queued report, if any
    pub fn try_next(&mut self) -> Option<ErrorReport> {
        self.receiver.try_recv().ok()
    }

    /// All queued reports
    pub fn drain(&mut self) -> Vec<ErrorReport> {
        std::iter::from_fn(|| self.try_next()).collect()
    }

    /// Reports dropped because the channel was full
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
