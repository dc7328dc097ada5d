//! CHRONICLE Providers
//!
//! Ordered record streams, precomputed update sets and reference state
//! hashes, each behind a trait with in-memory and redb-backed sources.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod db;
pub mod memory;
pub mod provider;

pub use db::{DbError, ReplayDb};
pub use memory::{MemoryProvider, MemoryStateHashes, MemoryUpdateSets};
pub use provider::{Consumer, Provider, StateHashSource, UpdateSetSource};
