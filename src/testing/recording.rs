//! A coalescing group that records the keys routed to it.

use crate::coalescing::{CoalescingGroup, Group};
use crate::types::{Outcome, OutcomeReceiver, ShardIndex};
use parking_lot::Mutex;

/// Substitute shard that records every key it receives and delegates the
/// actual coalescing to an inner [`Group`].
///
/// Build one per shard with
/// [`ShardedGroup::with_shards`](crate::ShardedGroup::with_shards) to check
/// routing independent of the production group.
#[derive(Debug)]
pub struct RecordingGroup<V, E> {
    index: ShardIndex,
    inner: Group<V, E>,
    seen: Mutex<Vec<Vec<u8>>>,
    forgotten: Mutex<Vec<Vec<u8>>>,
}

impl<V, E> RecordingGroup<V, E> {
    /// Create a recording group for the shard at `index`.
    pub fn new(index: ShardIndex) -> Self {
        Self {
            index,
            inner: Group::new(),
            seen: Mutex::new(Vec::new()),
            forgotten: Mutex::new(Vec::new()),
        }
    }

    /// Shard index this group was built for.
    pub fn index(&self) -> ShardIndex {
        self.index
    }

    /// Keys passed to `call` or `call_chan`, in arrival order.
    pub fn seen_keys(&self) -> Vec<Vec<u8>> {
        self.seen.lock().clone()
    }

    /// Keys passed to `forget`, in arrival order.
    pub fn forgotten_keys(&self) -> Vec<Vec<u8>> {
        self.forgotten.lock().clone()
    }

    /// The group doing the actual coalescing.
    pub fn inner(&self) -> &Group<V, E> {
        &self.inner
    }
}

impl<V, E> Default for RecordingGroup<V, E> {
    fn default() -> Self {
        Self::new(0)
    }
}

impl<V, E> CoalescingGroup for RecordingGroup<V, E>
where
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Value = V;
    type Error = E;

    fn call<F>(&self, key: &[u8], f: F) -> Outcome<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        self.seen.lock().push(key.to_vec());
        self.inner.call(key, f)
    }

    fn call_chan<F>(&self, key: &[u8], f: F) -> OutcomeReceiver<V, E>
    where
        F: FnOnce() -> Result<V, E> + Send + 'static,
    {
        self.seen.lock().push(key.to_vec());
        self.inner.call_chan(key, f)
    }

    fn forget(&self, key: &[u8]) {
        self.forgotten.lock().push(key.to_vec());
        self.inner.forget(key);
    }
}
