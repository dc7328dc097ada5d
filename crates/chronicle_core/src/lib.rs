//! CHRONICLE Core Types
//!
//! Pure types shared by every stage of the replay pipeline: transaction
//! records, world state, configuration and the error taxonomy.
//! Nothing in this crate performs I/O.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod account;
pub mod config;
pub mod error;
pub mod hash;
pub mod record;

// Re-exports
pub use account::{Account, UpdateSet, WorldState};
pub use config::{ChainId, Config};
pub use error::{ErrorReport, ExecutionError, ReplayError, ReplayResult, StateKind};
pub use hash::{state_root, EMPTY_ROOT};
pub use record::{
    BlockEnvironment, Log, Message, State, Substate, TxContext, TxRecord, TxResult, TxStatus,
    PSEUDO_TX,
};

pub use alloy_primitives::{Address, B256, Bytes, U256};
