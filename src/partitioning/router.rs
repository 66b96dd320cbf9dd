//! Key-to-shard routing.
//!
//! Routes a key to a shard index by hashing its bytes and reducing the
//! digest modulo the shard count.

use super::hash::HashFunc;
use crate::error::{Error, Result};
use crate::types::ShardIndex;

/// Maps keys to shard indices.
///
/// # Locking
///
/// The router holds no mutable state. Every lookup builds a fresh hash
/// accumulator, so `shard_for_key()` can be called from any number of
/// threads at once without synchronization, and a given key always maps to
/// the same shard for the lifetime of the router.
#[derive(Debug, Clone, Copy)]
pub struct ShardRouter {
    /// Total number of shards. Never zero.
    shard_count: usize,

    /// Hash strategy used for routing.
    hash_func: HashFunc,
}

impl ShardRouter {
    /// Create a new shard router.
    ///
    /// Fails with [`Error::InvalidShardCount`] if `shard_count` is zero.
    pub fn new(shard_count: usize, hash_func: HashFunc) -> Result<Self> {
        if shard_count == 0 {
            return Err(Error::InvalidShardCount(shard_count));
        }
        Ok(Self {
            shard_count,
            hash_func,
        })
    }

    /// Get the number of shards.
    pub fn shard_count(&self) -> usize {
        self.shard_count
    }

    /// Get the hash strategy.
    pub fn hash_func(&self) -> HashFunc {
        self.hash_func
    }

    /// Hash a key with the configured strategy.
    pub fn hash_key(&self, key: &[u8]) -> u64 {
        self.hash_func.digest(key)
    }

    /// Get the shard index for a key.
    pub fn shard_for_key(&self, key: &[u8]) -> ShardIndex {
        (self.hash_key(key) % self.shard_count as u64) as ShardIndex
    }

    /// Count how many of the sample keys land on each shard.
    ///
    /// Useful for checking the spread of a hash strategy over a key set.
    pub fn distribution<I, K>(&self, keys: I) -> Vec<usize>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        let mut counts = vec![0; self.shard_count];
        for key in keys {
            counts[self.shard_for_key(key.as_ref())] += 1;
        }
        counts
    }
}
