//! Core types used throughout the crate.

use tokio::sync::oneshot;

/// Index of a shard within a sharded group.
pub type ShardIndex = usize;

/// Receiving half of an asynchronous coalesced call.
///
/// Await it from async code or call `blocking_recv()` from a plain thread.
/// Dropping it abandons the wait without cancelling the shared execution.
pub type OutcomeReceiver<V, E> = oneshot::Receiver<Outcome<V, E>>;

/// Result of a coalesced call as seen by one caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome<V, E> {
    /// Value or error produced by the single execution.
    pub result: Result<V, E>,

    /// Whether the execution was shared with at least one other caller.
    pub shared: bool,
}

impl<V, E> Outcome<V, E> {
    /// Create an outcome.
    pub fn new(result: Result<V, E>, shared: bool) -> Self {
        Self { result, shared }
    }

    /// Whether the result was shared.
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    /// Discard the shared flag.
    pub fn into_result(self) -> Result<V, E> {
        self.result
    }

    /// Split into `(result, shared)`.
    pub fn into_parts(self) -> (Result<V, E>, bool) {
        (self.result, self.shared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_accessors() {
        let outcome: Outcome<u32, String> = Outcome::new(Ok(7), true);
        assert!(outcome.is_shared());
        assert_eq!(outcome.clone().into_result(), Ok(7));
        assert_eq!(outcome.into_parts(), (Ok(7), true));

        let failed: Outcome<u32, String> = Outcome::new(Err("down".to_string()), false);
        assert!(!failed.is_shared());
        assert_eq!(failed.into_result(), Err("down".to_string()));
    }
}
