//! Error taxonomy for the replay pipeline.
//!
//! Errors travel outwards scope by scope (transaction, block, run). Each
//! level may wrap the error with its coordinates, and hooks that always run
//! (PostRun, Exit) append their failures with [`ReplayError::join`] instead of
//! replacing an earlier error.

use alloy_primitives::B256;
use std::fmt;

/// Result alias used across all chronicle crates
pub type ReplayResult<T> = Result<T, ReplayError>;

/// Which view of a state store an operation targeted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    /// The live (head) state
    Live,
    /// A historical archive state
    Archive,
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Archive => write!(f, "archive"),
        }
    }
}

/// Failure reported by the execution capability for a single message
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// The message was rejected before or during execution
    #[error("message rejected: {reason}")]
    Rejected {
        /// Why execution refused the message
        reason: String,
    },

    /// A BLOCKHASH lookup referenced a block the environment does not know
    #[error("block hash for block {block} is not available")]
    MissingBlockHash {
        /// The requested block number
        block: u64,
    },

    /// No state store was available to execute against
    #[error("{kind} state is not available")]
    StateUnavailable {
        /// The missing state view
        kind: StateKind,
    },

    /// Several failures of one transaction
    #[error("{}", display_list(.0))]
    Multiple(Vec<ExecutionError>),
}

/// A non-fatal processing failure handed to the error-report channel
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}-db processor failed at block {block} transaction {transaction}; {error}")]
pub struct ErrorReport {
    /// Processor variant that observed the failure
    pub kind: StateKind,
    /// Block of the failing transaction
    pub block: u64,
    /// Index of the failing transaction
    pub transaction: u32,
    /// The underlying execution failure
    pub error: ExecutionError,
}

/// Replay pipeline error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    /// A data source or store location does not exist
    #[error("{what} not found: {location}")]
    NotFound {
        /// Kind of resource
        what: String,
        /// Where it was looked up
        location: String,
    },

    /// A consumer stopped provider iteration
    #[error("iteration aborted at block {block} transaction {transaction}; {source}")]
    IterationAborted {
        /// Block of the record being consumed
        block: u64,
        /// Transaction of the record being consumed
        transaction: u32,
        /// Error returned by the consumer
        source: Box<ReplayError>,
    },

    /// Policy-mandated abort after an execution failure
    #[error("block: {block} transaction: {transaction}; {source}")]
    Processing {
        /// Block of the failing transaction
        block: u64,
        /// Index of the failing transaction
        transaction: u32,
        /// The execution failure
        source: ExecutionError,
    },

    /// A state root differs from the reference
    #[error("unexpected hash for {kind} block {block}\nwanted {expected}\n   got {actual}")]
    HashMismatch {
        /// Live or archive check
        kind: StateKind,
        /// Block that was checked
        block: u64,
        /// Reference hash
        expected: B256,
        /// Hash reported by the store
        actual: B256,
    },

    /// The reference hash source has no entry for a block
    #[error("state hash for block {block} is not present in the db")]
    ReferenceMissing {
        /// Block without a reference hash
        block: u64,
    },

    /// Opening, closing or committing a resource failed
    #[error("{operation} failed: {reason}")]
    Lifecycle {
        /// The lifecycle operation
        operation: String,
        /// Failure detail
        reason: String,
    },

    /// Error annotated with the scope it passed through
    #[error("{scope}; {source}")]
    Scope {
        /// Scope description
        scope: String,
        /// Wrapped error
        source: Box<ReplayError>,
    },

    /// Data source I/O or decoding failure
    #[error("source error: {reason}")]
    Source {
        /// Failure detail
        reason: String,
    },

    /// Configuration rejected by validation
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Why the configuration is invalid
        reason: String,
    },

    /// Free-form failure raised by an extension
    #[error("{0}")]
    Message(String),

    /// Several independent failures
    #[error("{}", display_list(.0))]
    Multiple(Vec<ReplayError>),
}

impl ReplayError {
    /// Create a free-form error
    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Create a lifecycle error
    #[must_use]
    pub fn lifecycle(operation: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Lifecycle {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a data-source error
    #[must_use]
    pub fn io(reason: impl fmt::Display) -> Self {
        Self::Source {
            reason: reason.to_string(),
        }
    }

    /// Wrap this error with the scope it is leaving
    #[must_use]
    pub fn in_scope(self, scope: impl Into<String>) -> Self {
        Self::Scope {
            scope: scope.into(),
            source: Box::new(self),
        }
    }

    /// Combine two optional errors, keeping both when present.
    ///
    /// Nested `Multiple` values are flattened.
    #[must_use]
    pub fn join(first: Option<ReplayError>, second: Option<ReplayError>) -> Option<ReplayError> {
        match (first, second) {
            (None, None) => None,
            (Some(err), None) | (None, Some(err)) => Some(err),
            (Some(a), Some(b)) => {
                let mut all = Vec::new();
                for err in [a, b] {
                    match err {
                        Self::Multiple(inner) => all.extend(inner),
                        other => all.push(other),
                    }
                }
                Some(Self::Multiple(all))
            }
        }
    }

    /// Errors at the bottom of every wrapping chain
    #[must_use]
    pub fn root_causes(&self) -> Vec<&ReplayError> {
        match self {
            Self::IterationAborted { source, .. } | Self::Scope { source, .. } => {
                source.root_causes()
            }
            Self::Multiple(errors) => errors.iter().flat_map(Self::root_causes).collect(),
            other => vec![other],
        }
    }

    /// Whether `needle` is one of the root causes of this error
    #[must_use]
    pub fn caused_by(&self, needle: &ReplayError) -> bool {
        self.root_causes().into_iter().any(|cause| cause == needle)
    }
}

impl From<serde_json::Error> for ReplayError {
    fn from(err: serde_json::Error) -> Self {
        Self::io(format!("decoding failed: {err}"))
    }
}

fn display_list<E: fmt::Display>(errors: &[E]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ReplayError::ReferenceMissing { block: 7 };
        assert_eq!(err.to_string(), "state hash for block 7 is not present in the db");

        let err = ReplayError::NotFound {
            what: "record db".to_string(),
            location: "/tmp/x".to_string(),
        };
        assert_eq!(err.to_string(), "record db not found: /tmp/x");
    }

    #[test]
    fn test_hash_mismatch_names_block_and_hashes() {
        let expected = B256::repeat_byte(1);
        let actual = B256::repeat_byte(2);
        let err = ReplayError::HashMismatch {
            kind: StateKind::Live,
            block: 10,
            expected,
            actual,
        };
        let s = err.to_string();
        assert!(s.contains("live block 10"));
        assert!(s.contains(&expected.to_string()));
        assert!(s.contains(&actual.to_string()));
    }

    #[test]
    fn test_processing_carries_coordinates() {
        let err = ReplayError::Processing {
            block: 3,
            transaction: 4,
            source: ExecutionError::Rejected { reason: "nonce too low".to_string() },
        };
        assert_eq!(err.to_string(), "block: 3 transaction: 4; message rejected: nonce too low");
    }

    #[test]
    fn test_join_keeps_both() {
        assert_eq!(ReplayError::join(None, None), None);

        let a = ReplayError::msg("a");
        let b = ReplayError::msg("b");
        assert_eq!(ReplayError::join(Some(a.clone()), None), Some(a.clone()));
        assert_eq!(ReplayError::join(None, Some(b.clone())), Some(b.clone()));

        let joined = ReplayError::join(Some(a.clone()), Some(b.clone())).unwrap();
        assert_eq!(joined, ReplayError::Multiple(vec![a.clone(), b.clone()]));

        let c = ReplayError::msg("c");
        let all = ReplayError::join(Some(joined), Some(c.clone())).unwrap();
        assert_eq!(all, ReplayError::Multiple(vec![a, b, c]));
    }

    #[test]
    fn test_root_causes_unwrap_scopes() {
        let stop = ReplayError::msg("stop!");
        let wrapped = ReplayError::IterationAborted {
            block: 10,
            transaction: 9,
            source: Box::new(stop.clone().in_scope("block 10")),
        };
        assert!(wrapped.caused_by(&stop));
        assert_eq!(wrapped.root_causes(), vec![&stop]);

        let other = ReplayError::join(Some(wrapped), Some(ReplayError::msg("exit"))).unwrap();
        assert_eq!(other.root_causes().len(), 2);
        assert!(other.caused_by(&stop));
    }

    #[test]
    fn test_error_report_display() {
        let report = ErrorReport {
            kind: StateKind::Archive,
            block: 5,
            transaction: 1,
            error: ExecutionError::MissingBlockHash { block: 2 },
        };
        assert_eq!(
            report.to_string(),
            "archive-db processor failed at block 5 transaction 1; block hash for block 2 is not available"
        );
    }
}
