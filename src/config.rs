//! Configuration for sharded groups.

use crate::error::{Error, Result};
use crate::partitioning::{available_parallelism, default_shard_count, HashFunc};

/// Configuration for a [`ShardedGroup`](crate::ShardedGroup).
///
/// The default shard count is derived from the hardware parallelism when
/// the config is created, then stored here like any other field.
#[derive(Debug, Clone, Copy)]
pub struct ShardingConfig {
    /// Number of shards. Must be at least 1.
    pub shard_count: usize,

    /// Hash strategy used to route keys to shards.
    pub hash_func: HashFunc,
}

impl Default for ShardingConfig {
    fn default() -> Self {
        Self::for_parallelism(available_parallelism())
    }
}

impl ShardingConfig {
    /// Create a configuration with an explicit shard count.
    pub fn new(shard_count: usize) -> Self {
        Self {
            shard_count,
            hash_func: HashFunc::DEFAULT,
        }
    }

    /// Create a configuration sized for the given hardware parallelism.
    pub fn for_parallelism(parallelism: usize) -> Self {
        Self::new(default_shard_count(parallelism))
    }

    /// Set the shard count.
    pub fn with_shard_count(mut self, shard_count: usize) -> Self {
        self.shard_count = shard_count;
        self
    }

    /// Set the hash strategy.
    pub fn with_hash_func(mut self, hash_func: HashFunc) -> Self {
        self.hash_func = hash_func;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.shard_count == 0 {
            return Err(Error::InvalidShardCount(self.shard_count));
        }
        Ok(())
    }
}
