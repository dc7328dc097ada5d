//! CHRONICLE Primer
//!
//! Bootstraps a fresh state store to the block before a run starts, from
//! precomputed update sets and raw transaction records. Accounts can be
//! loaded in natural order or in a seeded random order.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod extension;
pub mod prime;
pub mod tracker;

pub use extension::{PrimerExtension, make_state_db_primer};
pub use prime::{PrimeContext, SEQUENTIAL_BATCH, generate_update_set, load_world_state_and_prime};
pub use tracker::{PRINT_FREQUENCY, ProgressTracker};
