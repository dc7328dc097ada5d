//! CHRONICLE State
//!
//! State store capabilities used by the replay pipeline and an in-memory
//! reference implementation with journaled snapshots and an archive.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod journal;
pub mod memory;
pub mod store;

pub use journal::JournaledState;
pub use memory::{MemoryArchiveState, MemoryBulkLoad, MemoryStateDb};
pub use store::{ArchiveState, AsVmState, BulkLoad, SnapshotId, StateStore, VmState};
