//! DataLoader.
//!
//! Provides per-request batching and caching to prevent N+1 fetches.
//!
//! Every `load` issued before the requesting task yields back to the
//! scheduler joins the same open batch. The first waiter to resume closes
//! the batch and spawns exactly one `fetch_many` call with the distinct
//! keys in first-seen order; every waiter of that batch shares the
//! outcome. The fetch runs on its own task, so a waiter that is dropped
//! mid-fetch neither aborts nor restarts it. Keys already resolved or
//! pending are answered from the cache and never fetched twice.
//!
//! A loader is meant to live inside one request's
//! [`Context`](crate::Context) and be dropped with it.

use crate::error::ResolverError;
use async_trait::async_trait;
use futures::future::{try_join_all, BoxFuture, Shared};
use futures::FutureExt;
use rustc_hash::FxHashMap;
use std::future::Future;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Bulk fetch function behind a [`DataLoader`].
#[async_trait]
pub trait BatchFn<K, V>: Send + Sync {
    /// Fetches values for `keys`.
    ///
    /// The result must be positionally aligned with `keys`; a key without a
    /// value is `None`. An `Err` fails every load of the batch.
    async fn fetch_many(&self, keys: &[K]) -> Result<Vec<Option<V>>, ResolverError>;
}

type BatchOutcome<V> = Result<Vec<Option<V>>, ResolverError>;
type SharedFetch<V> = Shared<BoxFuture<'static, BatchOutcome<V>>>;

struct Batch<K, V> {
    keys: Mutex<Vec<K>>,
    /// Set once when the batch closes.
    fetch: Mutex<Option<SharedFetch<V>>>,
}

impl<K, V> Batch<K, V> {
    fn new() -> Self {
        Self {
            keys: Mutex::new(Vec::new()),
            fetch: Mutex::new(None),
        }
    }

    fn len(&self) -> usize {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn is_closed(&self) -> bool {
        self.fetch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

enum Slot<K, V> {
    Ready(Option<V>),
    Pending(Arc<Batch<K, V>>, usize),
}

struct LoaderState<K, V> {
    cache: FxHashMap<K, Slot<K, V>>,
    open: Option<Arc<Batch<K, V>>>,
}

/// A DataLoader that batches and caches loads.
pub struct DataLoader<K, V> {
    batch_fn: Arc<dyn BatchFn<K, V>>,
    state: Mutex<LoaderState<K, V>>,
    max_batch_size: Option<usize>,
    dispatches: AtomicUsize,
}

impl<K, V> DataLoader<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a new DataLoader.
    pub fn new(batch_fn: impl BatchFn<K, V> + 'static) -> Self {
        Self {
            batch_fn: Arc::new(batch_fn),
            state: Mutex::new(LoaderState {
                cache: FxHashMap::default(),
                open: None,
            }),
            max_batch_size: None,
            dispatches: AtomicUsize::new(0),
        }
    }

    /// Sets the maximum number of keys per `fetch_many` call. Larger
    /// batches are split.
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = Some(size.max(1));
        self
    }

    /// Returns how many `fetch_many` calls this loader has made.
    pub fn dispatch_count(&self) -> usize {
        self.dispatches.load(Ordering::Relaxed)
    }

    /// Loads a value by key.
    pub async fn load(&self, key: K) -> Result<Option<V>, ResolverError> {
        let (batch, index) = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            match state.cache.get(&key) {
                Some(Slot::Ready(value)) => return Ok(value.clone()),
                Some(Slot::Pending(batch, index)) => (Arc::clone(batch), *index),
                None => {
                    let reusable = state
                        .open
                        .as_ref()
                        .filter(|open| self.max_batch_size.map_or(true, |max| open.len() < max))
                        .cloned();
                    let batch = match reusable {
                        Some(open) => open,
                        None => {
                            let fresh = Arc::new(Batch::new());
                            state.open = Some(Arc::clone(&fresh));
                            fresh
                        }
                    };
                    let index = {
                        let mut keys = batch.keys.lock().unwrap_or_else(PoisonError::into_inner);
                        keys.push(key.clone());
                        keys.len() - 1
                    };
                    state
                        .cache
                        .insert(key, Slot::Pending(Arc::clone(&batch), index));
                    (batch, index)
                }
            }
        };

        // Let every other load of this tick join the batch.
        if !batch.is_closed() {
            tokio::task::yield_now().await;
        }

        let values = self.dispatch(&batch).await?;
        Ok(values.get(index).cloned().flatten())
    }

    /// Loads several values through the same cache and batch.
    pub async fn load_many(&self, keys: Vec<K>) -> Result<Vec<Option<V>>, ResolverError> {
        try_join_all(keys.into_iter().map(|key| self.load(key))).await
    }

    /// Primes the cache with a value. An existing entry is left untouched.
    pub fn prime(&self, key: K, value: V) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.cache.entry(key).or_insert(Slot::Ready(Some(value)));
    }

    /// Clears the cache.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.cache.clear();
    }

    /// Clears a specific key from the cache.
    pub fn clear_key(&self, key: &K) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.cache.remove(key);
    }

    /// Closes `batch` and starts its fetch, or joins the fetch already
    /// started by another waiter.
    fn dispatch(&self, batch: &Arc<Batch<K, V>>) -> SharedFetch<V> {
        let mut fetch = batch.fetch.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(shared) = fetch.as_ref() {
            return shared.clone();
        }

        let keys = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state
                .open
                .as_ref()
                .is_some_and(|open| Arc::ptr_eq(open, batch))
            {
                state.open = None;
            }
            batch
                .keys
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        };

        self.dispatches.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(keys = keys.len(), "dispatching loader batch");

        let task = tokio::spawn(run_batch(Arc::clone(&self.batch_fn), keys));
        let shared = async move {
            task.await.unwrap_or_else(|e| {
                Err(ResolverError::Internal(format!("loader batch task failed: {e}")))
            })
        }
        .boxed()
        .shared();

        *fetch = Some(shared.clone());
        shared
    }
}

async fn run_batch<K, V>(batch_fn: Arc<dyn BatchFn<K, V>>, keys: Vec<K>) -> BatchOutcome<V> {
    let values = batch_fn.fetch_many(&keys).await.map_err(|e| {
        tracing::debug!(error = %e, keys = keys.len(), "loader batch failed");
        e
    })?;

    if values.len() != keys.len() {
        return Err(ResolverError::Internal(format!(
            "batch function returned {} values for {} keys",
            values.len(),
            keys.len()
        )));
    }
    Ok(values)
}

impl<K, V> std::fmt::Debug for DataLoader<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLoader")
            .field("max_batch_size", &self.max_batch_size)
            .field("dispatches", &self.dispatches.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Adapts an async closure into a [`BatchFn`].
pub struct FnBatch<F, K, V> {
    func: F,
    _marker: PhantomData<fn(Vec<K>) -> V>,
}

#[async_trait]
impl<F, Fut, K, V> BatchFn<K, V> for FnBatch<F, K, V>
where
    F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = BatchOutcome<V>> + Send + 'static,
    K: Clone + Send + Sync + 'static,
    V: Send + 'static,
{
    async fn fetch_many(&self, keys: &[K]) -> Result<Vec<Option<V>>, ResolverError> {
        (self.func)(keys.to_vec()).await
    }
}

/// Creates a DataLoader with a batch function.
pub fn create_loader<K, V, F, Fut>(batch_fn: F) -> DataLoader<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<Option<V>>, ResolverError>> + Send + 'static,
{
    DataLoader::new(FnBatch {
        func: batch_fn,
        _marker: PhantomData,
    })
}
