//! Call coalescing ("single-flight") over a sharded key space.
//!
//! Concurrent calls that share a key run the underlying function once and
//! all receive its result. A single coalescing unit serializes bookkeeping
//! for every key behind one lock, so [`ShardedGroup`] spreads keys over many
//! independent units picked by a hash of the key.
//!
//! # Architecture
//!
//! ```text
//!   call / call_chan / forget (key)
//!                 │
//!                 ▼
//! ┌─────────────────────────────────────┐
//! │            ShardedGroup             │
//! │  ShardRouter: hash(key) % shards    │
//! └─────────────────────────────────────┘
//!                 │
//!     ┌───────────┼───────────┐
//!     ▼           ▼           ▼
//! ┌────────┐  ┌────────┐  ┌────────┐
//! │ Group  │  │ Group  │  │ Group  │   one lock per shard
//! └────────┘  └────────┘  └────────┘
//! ```
//!
//! The shards only need to implement [`CoalescingGroup`]; [`Group`] is the
//! implementation shipped with this crate.

pub mod group;
pub mod sharded;

pub use group::{Group, GroupStats};
pub use sharded::ShardedGroup;

use crate::types::{Outcome, OutcomeReceiver};

/// A unit that coalesces concurrent calls sharing a key.
///
/// # Contract
///
/// - `call`: if no execution for `key` is in flight, run `f` once and return
///   its result with `shared` set when another caller joined. Otherwise block
///   until the in-flight execution finishes and return its result with
///   `shared = true`. `f` never runs concurrently with another execution for
///   the same key.
/// - `call_chan`: same coalescing, but never blocks. The receiver yields
///   exactly one outcome. Dropping it must not cancel the execution.
/// - `forget`: drop any in-flight registration for `key` so the next call
///   starts a fresh execution. A no-op for unknown keys.
///
/// Errors returned by `f` are handed to every caller unchanged.
pub trait CoalescingGroup: Send + Sync {
    /// Value produced by coalesced functions.
    type Value;

    /// Error produced by coalesced functions.
    type Error;

    /// Run `f` for `key`, or join the execution already in flight.
    fn call<F>(&self, key: &[u8], f: F) -> Outcome<Self::Value, Self::Error>
    where
        F: FnOnce() -> Result<Self::Value, Self::Error>;

    /// Like [`call`](Self::call), but returns immediately with a receiver
    /// for the outcome.
    fn call_chan<F>(&self, key: &[u8], f: F) -> OutcomeReceiver<Self::Value, Self::Error>
    where
        F: FnOnce() -> Result<Self::Value, Self::Error> + Send + 'static;

    /// Forget the in-flight registration for `key`.
    fn forget(&self, key: &[u8]);
}
