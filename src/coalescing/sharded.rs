//! Sharded call coalescing.
//!
//! Routes every key to one of a fixed set of coalescing units so unrelated
//! keys rarely contend on the same lock.

use super::group::{Group, GroupStats};
use super::CoalescingGroup;
use crate::config::ShardingConfig;
use crate::error::Result;
use crate::partitioning::ShardRouter;
use crate::types::{Outcome, OutcomeReceiver, ShardIndex};

/// A set of coalescing units addressed by key hash.
///
/// The shard list is allocated once at construction and never resized or
/// reordered. Routing holds no lock, so all locking happens inside the
/// selected shard. Calls for byte-identical keys always reach the same shard
/// and are coalesced there; distinct keys that collide only share a lock.
#[derive(Debug)]
pub struct ShardedGroup<G> {
    router: ShardRouter,
    shards: Box<[G]>,
}

impl<G: CoalescingGroup> ShardedGroup<G> {
    /// Create a sharded group with default-constructed shards.
    pub fn new(config: ShardingConfig) -> Result<Self>
    where
        G: Default,
    {
        Self::with_shards(config, |_| G::default())
    }

    /// Create a sharded group, building each shard with `factory`.
    ///
    /// The factory is called once per shard index, in order.
    pub fn with_shards<F>(config: ShardingConfig, mut factory: F) -> Result<Self>
    where
        F: FnMut(ShardIndex) -> G,
    {
        let router = ShardRouter::new(config.shard_count, config.hash_func)?;
        let shards: Box<[G]> = (0..router.shard_count()).map(|i| factory(i)).collect();

        tracing::debug!(
            shard_count = router.shard_count(),
            hash = router.hash_func().name(),
            "Created sharded group"
        );

        Ok(Self { router, shards })
    }

    /// Get the number of shards.
    pub fn shard_count(&self) -> usize {
        self.router.shard_count()
    }

    /// Get the router.
    pub fn router(&self) -> &ShardRouter {
        &self.router
    }

    /// Get the shard index for a key.
    pub fn shard_for_key(&self, key: &[u8]) -> ShardIndex {
        self.router.shard_for_key(key)
    }

    /// Get the shard responsible for a key.
    pub fn shard(&self, key: &[u8]) -> &G {
        &self.shards[self.router.shard_for_key(key)]
    }

    /// Get all shards, in index order.
    pub fn shards(&self) -> &[G] {
        &self.shards
    }

    /// Run `f` for `key` on its shard, or join the execution in flight there.
    pub fn call<F>(&self, key: &[u8], f: F) -> Outcome<G::Value, G::Error>
    where
        F: FnOnce() -> std::result::Result<G::Value, G::Error>,
    {
        self.shard(key).call(key, f)
    }

    /// Like [`call`](Self::call), but returns a receiver without blocking.
    pub fn call_chan<F>(&self, key: &[u8], f: F) -> OutcomeReceiver<G::Value, G::Error>
    where
        F: FnOnce() -> std::result::Result<G::Value, G::Error> + Send + 'static,
    {
        self.shard(key).call_chan(key, f)
    }

    /// Forget the in-flight registration for `key` on its shard.
    pub fn forget(&self, key: &[u8]) {
        self.shard(key).forget(key)
    }
}

impl<V, E> ShardedGroup<Group<V, E>> {
    /// Counters summed over all shards.
    pub fn stats(&self) -> GroupStats {
        self.shards.iter().map(Group::stats).sum()
    }

    /// Counters for each shard, in index order.
    pub fn shard_stats(&self) -> Vec<GroupStats> {
        self.shards.iter().map(Group::stats).collect()
    }
}

impl<G: CoalescingGroup> CoalescingGroup for ShardedGroup<G> {
    type Value = G::Value;
    type Error = G::Error;

    fn call<F>(&self, key: &[u8], f: F) -> Outcome<G::Value, G::Error>
    where
        F: FnOnce() -> std::result::Result<G::Value, G::Error>,
    {
        ShardedGroup::call(self, key, f)
    }

    fn call_chan<F>(&self, key: &[u8], f: F) -> OutcomeReceiver<G::Value, G::Error>
    where
        F: FnOnce() -> std::result::Result<G::Value, G::Error> + Send + 'static,
    {
        ShardedGroup::call_chan(self, key, f)
    }

    fn forget(&self, key: &[u8]) {
        ShardedGroup::forget(self, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::partitioning::{is_prime, HashFunc};
    use crate::testing::RecordingGroup;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};
    use std::thread;
    use std::time::{Duration, Instant};

    type TestGroup = ShardedGroup<Group<String, String>>;

    fn wait_until(cond: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_default_config_is_prime_sized() {
        let group = TestGroup::new(ShardingConfig::default()).unwrap();

        assert!(is_prime(group.shard_count() as u64));
        assert_eq!(group.shards().len(), group.shard_count());
        assert_eq!(group.router().hash_func().name(), "fnv64a");
    }

    #[test]
    fn test_zero_shards_rejected() {
        let err = TestGroup::new(ShardingConfig::new(0)).unwrap_err();
        assert_eq!(err, Error::InvalidShardCount(0));
    }

    #[test]
    fn test_shard_for_key_is_stable() {
        let group = TestGroup::new(ShardingConfig::new(31)).unwrap();
        for i in 0..100 {
            let key = format!("key-{}", i);
            let first = group.shard_for_key(key.as_bytes());
            assert_eq!(group.shard_for_key(key.clone().as_bytes()), first);
            assert_eq!(first, group.router().shard_for_key(key.as_bytes()));
        }
    }

    #[test]
    fn test_calls_routed_to_owning_shard() {
        let config = ShardingConfig::new(7).with_hash_func(HashFunc::CRC64_ISO);
        let group: ShardedGroup<RecordingGroup<u32, String>> =
            ShardedGroup::with_shards(config, RecordingGroup::new).unwrap();

        let keys: Vec<String> = (0..50).map(|i| format!("user:{}", i)).collect();
        for key in &keys {
            group.call(key.as_bytes(), || Ok(1));
            group.forget(key.as_bytes());
        }

        for (index, shard) in group.shards().iter().enumerate() {
            assert_eq!(shard.index(), index);
            for key in shard.seen_keys() {
                assert_eq!(group.shard_for_key(&key), index);
            }
            assert_eq!(shard.seen_keys(), shard.forgotten_keys());
        }
        let total: usize = group.shards().iter().map(|s| s.seen_keys().len()).sum();
        assert_eq!(total, keys.len());
    }

    #[test]
    fn test_concurrent_identical_keys_coalesced() {
        let group = Arc::new(TestGroup::new(ShardingConfig::new(13)).unwrap());
        let executions = Arc::new(AtomicUsize::new(0));
        let (started_tx, started_rx) = mpsc::channel();

        let leader = {
            let group = Arc::clone(&group);
            let executions = Arc::clone(&executions);
            thread::spawn(move || {
                let observer = Arc::clone(&group);
                group.call(b"hot-key", move || {
                    executions.fetch_add(1, Ordering::SeqCst);
                    started_tx.send(()).unwrap();
                    wait_until(|| observer.stats().coalesced == 1);
                    Ok("result".to_string())
                })
            })
        };

        started_rx.recv().unwrap();
        let joined = {
            let executions = Arc::clone(&executions);
            group.call(b"hot-key", move || {
                executions.fetch_add(1, Ordering::SeqCst);
                Ok("duplicate".to_string())
            })
        };
        let led = leader.join().unwrap();

        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert_eq!(led.result, joined.result);
        assert!(led.shared || joined.shared);

        let stats = group.stats();
        assert_eq!(stats.executions, 1);
        assert_eq!(stats.coalesced, 1);
        assert_eq!(stats.in_flight, 0);

        let owner = group.shard_for_key(b"hot-key");
        assert_eq!(group.shard_stats()[owner].executions, 1);
    }

    #[test]
    fn test_forget_then_call_runs_new_function() {
        let group = Arc::new(TestGroup::new(ShardingConfig::new(5)).unwrap());
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let stale = {
            let group = Arc::clone(&group);
            thread::spawn(move || {
                group.call(b"key", move || {
                    started_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    Ok("stale".to_string())
                })
            })
        };
        started_rx.recv().unwrap();

        group.forget(b"key");
        let fresh = group.call(b"key", || Ok("fresh".to_string()));
        assert_eq!(fresh.result, Ok("fresh".to_string()));
        assert!(!fresh.shared);

        release_tx.send(()).unwrap();
        stale.join().unwrap();

        // No registration left: forgetting again is a no-op.
        group.forget(b"key");
        group.forget(b"never-seen");
        assert_eq!(group.stats().in_flight, 0);
    }

    #[test]
    fn test_single_shard_behaves_like_group() {
        let sharded = TestGroup::new(ShardingConfig::new(1)).unwrap();
        let plain: Group<String, String> = Group::new();

        for i in 0..20 {
            let key = format!("key-{}", i);
            assert_eq!(sharded.shard_for_key(key.as_bytes()), 0);

            let a = sharded.call(key.as_bytes(), || Ok(key.clone()));
            let b = plain.call(key.as_bytes(), || Ok(key.clone()));
            assert_eq!(a, b);
        }
        assert_eq!(sharded.stats(), plain.stats());
    }

    #[tokio::test]
    async fn test_call_chan_through_shards() {
        let group = TestGroup::new(ShardingConfig::new(11)).unwrap();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let first = group.call_chan(b"key", move || {
            release_rx.recv().unwrap();
            Ok("value".to_string())
        });
        let second = group.call_chan(b"key", || Ok("other".to_string()));
        let unrelated = group.call_chan(b"another-key", || Ok("another".to_string()));

        assert_eq!(
            unrelated.await.unwrap().result,
            Ok("another".to_string())
        );

        release_tx.send(()).unwrap();
        let first = first.await.unwrap();
        let second = second.await.unwrap();
        assert_eq!(first.result, Ok("value".to_string()));
        assert_eq!(second.result, first.result);
        assert!(second.shared);
    }

    #[test]
    fn test_sharded_group_is_a_coalescing_group() {
        fn run<G: CoalescingGroup<Value = u32, Error = String>>(group: &G) -> Outcome<u32, String> {
            group.call(b"key", || Ok(3))
        }

        let group: ShardedGroup<Group<u32, String>> =
            ShardedGroup::new(ShardingConfig::new(3)).unwrap();
        assert_eq!(run(&group).result, Ok(3));
    }
}
