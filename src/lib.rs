//! Sharded call coalescing ("single-flight").
//!
//! Concurrent calls that share a key run the underlying function once, and
//! every caller receives the same result. A single coalescing unit guards all
//! keys with one lock; this crate spreads keys over many independent units
//! picked by a hash of the key so unrelated keys rarely contend.
//!
//! - **Prime-sized sharding**: the default shard count is the smallest prime
//!   at or above `7 × available parallelism`
//! - **Pluggable hashing**: FNV-1a (default), FNV-1, CRC-64 ISO/ECMA,
//!   xxHash64 and a per-process randomized digest
//! - **Deterministic routing**: a key's shard depends only on its bytes
//! - **Substitutable shards**: anything implementing [`CoalescingGroup`]
//!
//! # Example
//!
//! ```rust
//! use shardflight::{Group, ShardedGroup, ShardingConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let group: ShardedGroup<Group<String, String>> =
//!     ShardedGroup::new(ShardingConfig::default())?;
//!
//! // Blocking call: concurrent callers for "user:123" share one execution
//! let outcome = group.call(b"user:123", || Ok("Alice".to_string()));
//! assert_eq!(outcome.result, Ok("Alice".to_string()));
//! assert!(!outcome.shared);
//!
//! // Drop any in-flight registration so the next call starts fresh
//! group.forget(b"user:123");
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               ShardedGroup                  │
//! │  • call(key, f)      -> Outcome             │
//! │  • call_chan(key, f) -> OutcomeReceiver     │
//! │  • forget(key)                              │
//! └─────────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────────┐
//! │  ShardRouter: HashFunc(key) % shard_count   │
//! └─────────────────────────────────────────────┘
//!                     │
//!     ┌───────────────┼───────────────┐
//!     ▼               ▼               ▼
//! ┌─────────┐   ┌──────────┐   ┌─────────┐
//! │ Shard 0 │   │ Shard 1  │   │ Shard N │
//! │ (Group) │   │ (Group)  │   │ (Group) │
//! └─────────┘   └──────────┘   └─────────┘
//! ```

pub mod coalescing;
pub mod config;
pub mod error;
pub mod partitioning;
pub mod testing;
pub mod types;

// Re-export main types for convenience
pub use coalescing::{CoalescingGroup, Group, GroupStats, ShardedGroup};
pub use config::ShardingConfig;
pub use error::{Error, Result};
pub use types::{Outcome, OutcomeReceiver, ShardIndex};

// Re-export partitioning types
pub use partitioning::{default_shard_count, next_prime, HashFunc, ShardRouter};
