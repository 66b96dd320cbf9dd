//! Error types for sharded call coalescing.

use thiserror::Error;

/// Result type alias for shardflight operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for shardflight.
///
/// Errors returned by the coalesced functions themselves are never wrapped
/// in this type; they are handed back to every caller unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A shard count of zero was requested.
    #[error("invalid shard count: {0} (must be at least 1)")]
    InvalidShardCount(usize),

    /// A hash function name did not match any built-in strategy.
    #[error("unknown hash function: {0}")]
    UnknownHashFunc(String),
}
