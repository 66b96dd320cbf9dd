//! Partitioning module for spreading keys across coalescing shards.
//!
//! This module decides which shard owns a key:
//! - Shard counts are rounded up to a prime to avoid modulo bias
//! - Hash strategies are pluggable and selected by [`HashFunc`]
//! - Routing is a pure function of the key bytes
//!
//! # Architecture
//!
//! ```text
//! key bytes ──▶ HashFunc::new_hasher() ──▶ u64 digest ──▶ digest % shard_count
//!                                                               │
//!                    ┌──────────┬──────────┬─────────┬──────────┘
//!                    ▼          ▼          ▼         ▼
//!                 shard 0    shard 1    shard 2 … shard N-1   (N prime)
//! ```
//!
//! # Example
//!
//! ```rust
//! use shardflight::partitioning::{next_prime, HashFunc, ShardRouter};
//!
//! let shard_count = next_prime(8 * 7).unwrap() as usize;
//! let router = ShardRouter::new(shard_count, HashFunc::FNV64A).unwrap();
//!
//! let shard = router.shard_for_key(b"user:123");
//! assert!(shard < shard_count);
//! assert_eq!(shard, router.shard_for_key(b"user:123"));
//! ```

pub mod hash;
pub mod prime;
pub mod router;

pub use hash::{HashFunc, NewHasher};
pub use prime::{
    available_parallelism, default_shard_count, is_prime, next_prime, DEFAULT_SHARDS_PER_CPU,
    LARGEST_U64_PRIME,
};
pub use router::ShardRouter;
