//! Testing utilities for sharded coalescing.
//!
//! Routing is verified against substitute shards rather than the
//! production [`Group`](crate::Group), so a routing bug cannot hide behind
//! coalescing behavior.
//!
//! # Example
//!
//! ```rust
//! use shardflight::testing::RecordingGroup;
//! use shardflight::{ShardedGroup, ShardingConfig};
//!
//! let group: ShardedGroup<RecordingGroup<u32, String>> =
//!     ShardedGroup::with_shards(ShardingConfig::new(7), RecordingGroup::new).unwrap();
//!
//! group.call(b"user:123", || Ok(1));
//!
//! let owner = group.shard_for_key(b"user:123");
//! assert_eq!(group.shards()[owner].seen_keys(), vec![b"user:123".to_vec()]);
//! ```

mod recording;

pub use recording::RecordingGroup;
