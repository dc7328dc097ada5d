//! CHRONICLE Executor
//!
//! Drives a provider's (block, transaction) records through the extension
//! lifecycle and a transaction processor. Extensions set up, observe and
//! tear down a run; the processor executes each record against the live
//! store or an archive view.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod context;
pub mod events;
pub mod evm;
pub mod executor;
pub mod extension;
pub mod manager;
pub mod processor;
pub mod progress;

pub use channel::{ErrorReporter, ErrorReports, error_channel};
pub use context::Context;
pub use events::{ArchivePrepper, BlockEventEmitter, make_archive_prepper, make_block_event_emitter};
pub use evm::{Evm, TRANSFER_GAS, TransferEvm};
pub use executor::Executor;
pub use extension::{Extension, ExtensionList, HookOrder, NilExtension};
pub use manager::{StateDbFactory, StateDbManager, make_state_db_manager};
pub use processor::{ArchiveTxProcessor, LiveTxProcessor, Processor, TxProcessor};
pub use progress::{ProgressLogger, make_progress_logger};
