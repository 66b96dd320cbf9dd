//! Single-shard call coalescing.
//!
//! A [`Group`] tracks in-flight calls by key. The first caller for a key
//! becomes the leader and runs the function; later callers join and receive
//! a clone of the leader's result.

use super::CoalescingGroup;
use crate::types::{Outcome, OutcomeReceiver};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::fmt;
use std::iter::Sum;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Counters for a coalescing group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupStats {
    /// Functions actually executed.
    pub executions: u64,
    /// Calls that joined an execution already in flight.
    pub coalesced: u64,
    /// Keys with an execution currently in flight.
    pub in_flight: usize,
}

impl GroupStats {
    /// Total calls received.
    pub fn total_calls(&self) -> u64 {
        self.executions + self.coalesced
    }

    /// Fraction of calls that were served by another caller's execution.
    pub fn coalescing_ratio(&self) -> f64 {
        let total = self.total_calls();
        if total == 0 {
            0.0
        } else {
            self.coalesced as f64 / total as f64
        }
    }
}

impl Sum for GroupStats {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |acc, s| Self {
            executions: acc.executions + s.executions,
            coalesced: acc.coalesced + s.coalesced,
            in_flight: acc.in_flight + s.in_flight,
        })
    }
}

enum Progress<V, E> {
    Running,
    Finished(Result<V, E>),
    Panicked,
}

struct CallState<V, E> {
    progress: Progress<V, E>,
    /// Callers that joined after the leader.
    dups: usize,
    /// Receivers registered through `call_chan`.
    waiters: Vec<oneshot::Sender<Outcome<V, E>>>,
}

/// One in-flight execution.
struct Call<V, E> {
    state: Mutex<CallState<V, E>>,
    done: Condvar,
}

impl<V: Clone, E: Clone> Call<V, E> {
    fn new(waiters: Vec<oneshot::Sender<Outcome<V, E>>>) -> Self {
        Self {
            state: Mutex::new(CallState {
                progress: Progress::Running,
                dups: 0,
                waiters,
            }),
            done: Condvar::new(),
        }
    }

    /// Block until the leader finishes, then return a clone of its result.
    fn wait(&self) -> Outcome<V, E> {
        let mut state = self.state.lock();
        loop {
            if let Progress::Finished(result) = &state.progress {
                return Outcome::new(result.clone(), true);
            }
            if let Progress::Panicked = state.progress {
                panic!("coalesced call panicked in the leading caller");
            }
            self.done.wait(&mut state);
        }
    }
}

struct GroupInner<V, E> {
    /// In-flight calls keyed by the raw key bytes.
    calls: Mutex<HashMap<Vec<u8>, Arc<Call<V, E>>>>,
    executions: AtomicU64,
    coalesced: AtomicU64,
}

impl<V: Clone, E: Clone> GroupInner<V, E> {
    /// Record the end of an execution and wake everyone waiting on it.
    ///
    /// Returns whether the result was shared.
    fn complete(&self, key: &[u8], call: &Arc<Call<V, E>>, progress: Progress<V, E>) -> bool {
        {
            let mut calls = self.calls.lock();
            // A forgotten call may have been replaced by a fresh one.
            if calls.get(key).is_some_and(|c| Arc::ptr_eq(c, call)) {
                calls.remove(key);
            }
        }

        let (shared, waiters, result) = {
            let mut state = call.state.lock();
            state.progress = progress;
            let result = match &state.progress {
                Progress::Finished(result) => Some(result.clone()),
                _ => None,
            };
            (state.dups > 0, mem::take(&mut state.waiters), result)
        };
        call.done.notify_all();

        // On panic the senders are dropped and receivers see a closed channel.
        if let Some(result) = result {
            for tx in waiters {
                let _ = tx.send(Outcome::new(result.clone(), shared));
            }
        }
        shared
    }
}

/// A single coalescing unit.
///
/// Cloning a `Group` yields a handle to the same in-flight state.
pub struct Group<V, E> {
    inner: Arc<GroupInner<V, E>>,
}

impl<V, E> Group<V, E> {
    /// Create an empty group.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(GroupInner {
                calls: Mutex::new(HashMap::new()),
                executions: AtomicU64::new(0),
                coalesced: AtomicU64::new(0),
            }),
        }
    }

    /// Get the current counters.
    pub fn stats(&self) -> GroupStats {
        GroupStats {
            executions: self.inner.executions.load(Ordering::Relaxed),
            coalesced: self.inner.coalesced.load(Ordering::Relaxed),
            in_flight: self.inner.calls.lock().len(),
        }
    }

    /// Forget the in-flight call for `key`, if any.
    ///
    /// Callers already waiting on that call still receive its result; only
    /// calls made afterwards start a new execution.
    pub fn forget(&self, key: &[u8]) {
        if self.inner.calls.lock().remove(key).is_some() {
            tracing::trace!(key_len = key.len(), "Forgot in-flight call");
        }
    }
}

impl<V, E> Group<V, E>
where
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Run `f` for `key`, or wait for the execution already in flight.
    ///
    /// If `f` panics, the panic is resumed in this caller and every caller
    /// waiting on it panics as well.
    pub fn call<F>(&self, key: &[u8], f: F) -> Outcome<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let call = {
            let mut calls = self.inner.calls.lock();
            if let Some(existing) = calls.get(key).cloned() {
                existing.state.lock().dups += 1;
                drop(calls);
                self.inner.coalesced.fetch_add(1, Ordering::Relaxed);
                return existing.wait();
            }
            let call = Arc::new(Call::new(Vec::new()));
            calls.insert(key.to_vec(), Arc::clone(&call));
            call
        };

        self.inner.executions.fetch_add(1, Ordering::Relaxed);
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(result) => {
                let shared = self
                    .inner
                    .complete(key, &call, Progress::Finished(result.clone()));
                Outcome::new(result, shared)
            }
            Err(payload) => {
                self.inner.complete(key, &call, Progress::Panicked);
                panic::resume_unwind(payload)
            }
        }
    }

    /// Run `f` for `key` in the background, or join the execution already in
    /// flight, and return a receiver for the outcome.
    ///
    /// `f` runs on Tokio's blocking pool when called inside a runtime, and on
    /// a dedicated thread otherwise. If `f` panics, the receiver reports the
    /// channel as closed.
    pub fn call_chan<F>(&self, key: &[u8], f: F) -> OutcomeReceiver<V, E>
    where
        F: FnOnce() -> Result<V, E> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        let call = {
            let mut calls = self.inner.calls.lock();
            if let Some(existing) = calls.get(key) {
                let mut state = existing.state.lock();
                state.dups += 1;
                state.waiters.push(tx);
                self.inner.coalesced.fetch_add(1, Ordering::Relaxed);
                return rx;
            }
            let call = Arc::new(Call::new(vec![tx]));
            calls.insert(key.to_vec(), Arc::clone(&call));
            call
        };

        self.inner.executions.fetch_add(1, Ordering::Relaxed);
        let completion = Completion {
            inner: Arc::clone(&self.inner),
            key: key.to_vec(),
            call,
            finished: false,
        };
        spawn_detached(move || match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(result) => completion.finish(Progress::Finished(result)),
            Err(_) => {
                tracing::error!(
                    key = %String::from_utf8_lossy(&completion.key),
                    "Coalesced call panicked"
                );
                completion.finish(Progress::Panicked);
            }
        });

        rx
    }
}

/// Completes a detached call exactly once.
///
/// If the task is dropped without running (the runtime is shutting down or
/// the thread could not be created), the call is completed as panicked so
/// the key does not stay in flight.
struct Completion<V: Clone, E: Clone> {
    inner: Arc<GroupInner<V, E>>,
    key: Vec<u8>,
    call: Arc<Call<V, E>>,
    finished: bool,
}

impl<V: Clone, E: Clone> Completion<V, E> {
    fn finish(mut self, progress: Progress<V, E>) {
        self.finished = true;
        self.inner.complete(&self.key, &self.call, progress);
    }
}

impl<V: Clone, E: Clone> Drop for Completion<V, E> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(
                key = %String::from_utf8_lossy(&self.key),
                "Coalesced call dropped before running"
            );
            self.inner.complete(&self.key, &self.call, Progress::Panicked);
        }
    }
}

/// Run a task without blocking the caller.
fn spawn_detached<T>(task: T)
where
    T: FnOnce() + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(task);
        }
        Err(_) => {
            // On failure the task is dropped, which completes the call.
            if let Err(e) = std::thread::Builder::new()
                .name("shardflight-call".to_string())
                .spawn(task)
            {
                tracing::error!(error = %e, "Failed to spawn coalesced call thread");
            }
        }
    }
}

impl<V, E> CoalescingGroup for Group<V, E>
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
        Group::call(self, key, f)
    }

    fn call_chan<F>(&self, key: &[u8], f: F) -> OutcomeReceiver<V, E>
    where
        F: FnOnce() -> Result<V, E> + Send + 'static,
    {
        Group::call_chan(self, key, f)
    }

    fn forget(&self, key: &[u8]) {
        Group::forget(self, key)
    }
}

impl<V, E> Clone for Group<V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V, E> Default for Group<V, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, E> fmt::Debug for Group<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group").field("stats", &self.stats()).finish()
    }
}
