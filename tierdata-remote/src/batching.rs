//! Coalescing timer for by-id batching: `Idle -> Accumulating -> Flushing`.
//!
//! Grounded in the top-level `hitbox` crate's `BroadcastConcurrencyManager`
//! (a `DashMap` of in-flight requests, each resolved by fanning a single
//! upstream answer back out to every waiter) — the structural problem here is
//! the same ("many callers, one in-flight operation"), just triggered by a
//! timer instead of a cache-miss race.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tierdata_core::{SourceError, SourceResult};
use tokio::sync::oneshot;

type FetchFuture<T> = Pin<Box<dyn Future<Output = SourceResult<HashMap<String, T>>> + Send>>;

/// Fetches the wire entities for a batch of ids. Ids the backend's response
/// omits are simply absent from the returned map — that is not an error.
pub type FetchFn<T> = Arc<dyn Fn(Vec<String>) -> FetchFuture<T> + Send + Sync>;

struct BatchState<T> {
    ids: HashSet<String>,
    waiters: HashMap<String, Vec<oneshot::Sender<SourceResult<Option<T>>>>>,
    timer: Option<tokio::task::JoinHandle<()>>,
}

impl<T> Default for BatchState<T> {
    fn default() -> Self {
        BatchState {
            ids: HashSet::new(),
            waiters: HashMap::new(),
            timer: None,
        }
    }
}

/// Coalesces successive `get_by_id` calls arriving within `window` into one
/// `fetch` call parameterized over the union of their ids.
///
/// Every queued id resolves exactly once, even if queued twice before the
/// batch flushes: the second `queue_id` call for the same id adds another
/// waiter to the same pending entry rather than scheduling a second fetch.
/// A failed `fetch` resolves every coalesced caller with the same failure.
///
/// Registration (`enqueue`) is synchronous and lock-only — no `.await` point
/// sits between "this id is in `state`" and "the caller can act on that
/// fact" — so a caller that needs to register many ids before flushing (see
/// `enqueue`) never has to worry about a spawned task not having run yet.
pub struct IdBatcher<T> {
    window: Duration,
    fetch: FetchFn<T>,
    state: Mutex<BatchState<T>>,
}

impl<T> IdBatcher<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Builds a batcher with the given coalescing window and fetch function.
    pub fn new(window: Duration, fetch: FetchFn<T>) -> Arc<Self> {
        Arc::new(IdBatcher {
            window,
            fetch,
            state: Mutex::new(BatchState::default()),
        })
    }

    /// Registers `id` with the pending batch and (re)arms the coalescing
    /// timer, returning immediately with the receiver that will resolve once
    /// this id's batch completes. Synchronous on purpose: by the time this
    /// call returns, `id` is already in `state`, so a caller registering a
    /// whole slice of ids before flushing (`get_by_ids`) doesn't need to wait
    /// for any task to be scheduled first.
    pub fn enqueue(self: &Arc<Self>, id: String) -> oneshot::Receiver<SourceResult<Option<T>>> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock().unwrap();
        state.ids.insert(id.clone());
        state.waiters.entry(id).or_default().push(tx);

        if let Some(handle) = state.timer.take() {
            handle.abort();
        }
        let this = Arc::clone(self);
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(this.window).await;
            this.flush().await;
        }));
        rx
    }

    /// Queues `id`, (re)arming the coalescing timer, and resolves once this
    /// id's batch completes.
    pub async fn queue_id(self: &Arc<Self>, id: String) -> SourceResult<Option<T>> {
        self.enqueue(id)
            .await
            .unwrap_or_else(|_| Err(SourceError::server_error("id batch dropped before resolving")))
    }

    /// Flushes the pending batch immediately rather than waiting out the
    /// timer. `get_by_ids` uses this: it needs its answer now, not after the
    /// coalescing window elapses.
    pub async fn flush(self: &Arc<Self>) {
        let BatchState {
            ids,
            waiters,
            timer,
        } = {
            let mut state = self.state.lock().unwrap();
            if let Some(handle) = state.timer.take() {
                handle.abort();
            }
            std::mem::take(&mut *state)
        };
        debug_assert!(timer.is_none());

        if ids.is_empty() {
            return;
        }

        let id_list: Vec<String> = ids.into_iter().collect();
        match (self.fetch)(id_list).await {
            Ok(mut found) => {
                for (id, senders) in waiters {
                    let item = found.remove(&id);
                    for tx in senders {
                        let _ = tx.send(Ok(item.clone()));
                    }
                }
            }
            Err(err) => {
                for (_, senders) in waiters {
                    for tx in senders {
                        let _ = tx.send(Err(err.clone()));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    fn counting_fetch(
        calls: Arc<AtomicUsize>,
        reply: HashMap<String, &'static str>,
    ) -> FetchFn<&'static str> {
        Arc::new(move |ids: Vec<String>| {
            calls.fetch_add(1, Ordering::SeqCst);
            let reply = reply.clone();
            Box::pin(async move {
                Ok(ids
                    .into_iter()
                    .filter_map(|id| reply.get(id.as_str()).map(|v| (id, *v)))
                    .collect())
            })
        })
    }

    #[tokio::test]
    async fn coalesces_ids_arriving_within_window() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut reply = HashMap::new();
        reply.insert("a".to_string(), "A");
        reply.insert("b".to_string(), "B");
        let batcher = IdBatcher::new(StdDuration::from_millis(20), counting_fetch(calls.clone(), reply));

        let b1 = Arc::clone(&batcher);
        let b2 = Arc::clone(&batcher);
        let (ra, rb) = tokio::join!(b1.queue_id("a".to_string()), b2.queue_id("b".to_string()));

        assert_eq!(ra.unwrap(), Some("A"));
        assert_eq!(rb.unwrap(), Some("B"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn duplicate_queue_of_same_id_resolves_both_waiters() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut reply = HashMap::new();
        reply.insert("a".to_string(), "A");
        let batcher = IdBatcher::new(StdDuration::from_millis(20), counting_fetch(calls.clone(), reply));

        let b1 = Arc::clone(&batcher);
        let b2 = Arc::clone(&batcher);
        let (r1, r2) = tokio::join!(b1.queue_id("a".to_string()), b2.queue_id("a".to_string()));
        assert_eq!(r1.unwrap(), Some("A"));
        assert_eq!(r2.unwrap(), Some("A"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_id_resolves_to_none() {
        let calls = Arc::new(AtomicUsize::new(0));
        let reply = HashMap::new();
        let batcher = IdBatcher::new(StdDuration::from_millis(10), counting_fetch(calls, reply));
        let result = batcher.queue_id("missing".to_string()).await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn failed_fetch_resolves_every_waiter_with_same_error() {
        let fetch: FetchFn<&'static str> = Arc::new(|_ids| {
            Box::pin(async { Err(SourceError::server_error("boom")) })
        });
        let batcher = IdBatcher::new(StdDuration::from_millis(10), fetch);
        let b1 = Arc::clone(&batcher);
        let b2 = Arc::clone(&batcher);
        let (r1, r2) = tokio::join!(b1.queue_id("a".to_string()), b2.queue_id("b".to_string()));
        assert!(r1.is_err());
        assert!(r2.is_err());
    }

    #[tokio::test]
    async fn explicit_flush_does_not_wait_out_the_window() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut reply = HashMap::new();
        reply.insert("a".to_string(), "A");
        let batcher = IdBatcher::new(StdDuration::from_secs(60), counting_fetch(calls.clone(), reply));

        let b1 = Arc::clone(&batcher);
        let queued = tokio::spawn(async move { b1.queue_id("a".to_string()).await });
        tokio::task::yield_now().await;
        batcher.flush().await;

        let result = queued.await.unwrap().unwrap();
        assert_eq!(result, Some("A"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn enqueue_registers_synchronously_for_bulk_flush() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut reply = HashMap::new();
        reply.insert("a".to_string(), "A");
        reply.insert("b".to_string(), "B");
        reply.insert("c".to_string(), "C");
        let batcher = IdBatcher::new(StdDuration::from_secs(60), counting_fetch(calls.clone(), reply));

        // No task scheduling or yielding involved: every id is in `state` by
        // the time this ordinary loop returns.
        let waiters: Vec<_> = [("a", "A"), ("b", "B"), ("c", "C")]
            .iter()
            .map(|(id, expected)| (*expected, batcher.enqueue(id.to_string())))
            .collect();
        batcher.flush().await;

        for (expected, rx) in waiters {
            let value = rx.await.unwrap().unwrap();
            assert_eq!(value, Some(expected));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
