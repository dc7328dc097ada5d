//! CHRONICLE Validator
//!
//! Checks the live state root after every block, and archived roots as the
//! archive catches up, against a source of reference hashes.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod validator;

pub use validator::{
    ARCHIVE_DRAIN_TIMEOUT, ARCHIVE_POLL_INTERVAL, StateHashValidator, make_state_hash_validator,
};
