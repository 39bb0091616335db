//! Keyed query cache with request de-duplication and stale-while-revalidate.
//!
//! # Design
//! One `QueryCache` store is shared by every `Query` handle cloned from it.
//! Each cache key owns an entry `{value, error, fetched_at, in_flight}`:
//!
//! - At most one fetch per key is in flight. It is a `Shared` future, so a
//!   subscriber or revalidation arriving mid-flight awaits the same request.
//! - The in-flight future settles the entry itself, exactly once. Success
//!   replaces `value` and clears `error`; failure records `error` and keeps
//!   the last good `value`.
//! - Entries are never removed, so the `watch` channel that announces state
//!   changes outlives `clear()`.
//!
//! Writes (`Mutation`) are independent of the store. After a successful
//! write the caller refreshes whichever queries it affected.
//!
//! There is no cancellation and no timeout. A result that arrives after
//! every subscriber is gone is still written to the store.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::watch;

use crate::config::{ClientConfig, DEFAULT_DEDUPE_INTERVAL};
use crate::error::ApiError;
use crate::query::CacheKey;

type CachedValue = Arc<dyn Any + Send + Sync>;
type FetchOutcome = Result<CachedValue, Arc<ApiError>>;
type InFlight = Shared<BoxFuture<'static, FetchOutcome>>;

/// Produces one fetch of a query's value.
pub type Fetcher<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, ApiError>> + Send + Sync>;

/// Performs one write.
pub type Mutator<A, R> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<R, ApiError>> + Send + Sync>;

/// Wrap an async closure as a `Fetcher`.
pub fn fetcher<T, F, Fut>(f: F) -> Fetcher<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// Wrap an async closure as a `Mutator`.
pub fn mutator<A, R, F, Fut>(f: F) -> Mutator<A, R>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, ApiError>> + Send + 'static,
{
    Arc::new(move |arg| f(arg).boxed())
}

struct Entry {
    value: Option<CachedValue>,
    error: Option<Arc<ApiError>>,
    fetched_at: Option<Instant>,
    stale: bool,
    in_flight: Option<(u64, InFlight)>,
    changes: watch::Sender<u64>,
}

impl Entry {
    fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            value: None,
            error: None,
            fetched_at: None,
            stale: false,
            in_flight: None,
            changes,
        }
    }

    fn notify(&self) {
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
    }

    fn is_fresh(&self, dedupe_interval: Duration) -> bool {
        !self.stale
            && self
                .fetched_at
                .is_some_and(|at| at.elapsed() < dedupe_interval)
    }
}

struct Store {
    entries: Mutex<HashMap<CacheKey, Entry>>,
    dedupe_interval: Duration,
    next_fetch_id: AtomicU64,
}

impl Store {
    fn entries(&self) -> MutexGuard<'_, HashMap<CacheKey, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(&self, key: &CacheKey, fetch_id: u64, outcome: &FetchOutcome) {
        let mut entries = self.entries();
        let entry = entries.entry(key.clone()).or_insert_with(Entry::new);
        if entry.in_flight.as_ref().is_some_and(|(id, _)| *id == fetch_id) {
            entry.in_flight = None;
        }
        match outcome {
            Ok(value) => {
                tracing::debug!(key = %key, "query settled");
                entry.value = Some(value.clone());
                entry.error = None;
                entry.fetched_at = Some(Instant::now());
                entry.stale = false;
            }
            Err(error) => {
                if error.is_unauthorized() {
                    tracing::warn!(key = %key, "query unauthorized; session may have expired");
                } else {
                    tracing::warn!(
                        key = %key,
                        status = ?error.status(),
                        error = %error,
                        "query failed"
                    );
                }
                entry.error = Some(error.clone());
            }
        }
        entry.notify();
    }
}

/// Handle to a shared query store. Clones share the same entries.
#[derive(Clone)]
pub struct QueryCache {
    store: Arc<Store>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::with_dedupe_interval(DEFAULT_DEDUPE_INTERVAL)
    }
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.store.entries().len())
            .field("dedupe_interval", &self.store.dedupe_interval)
            .finish()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cached value younger than `dedupe_interval` is served to new
    /// subscribers without a refetch.
    pub fn with_dedupe_interval(dedupe_interval: Duration) -> Self {
        Self {
            store: Arc::new(Store {
                entries: Mutex::new(HashMap::new()),
                dedupe_interval,
                next_fetch_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::with_dedupe_interval(config.dedupe_interval)
    }

    /// Subscribe to `key`. A fetch starts unless one is already in flight or
    /// the cached value is still fresh.
    pub fn use_query<T>(&self, key: CacheKey, fetcher: Fetcher<T>) -> Query<T>
    where
        T: Send + Sync + 'static,
    {
        let changes = {
            let mut entries = self.store.entries();
            entries.entry(key.clone()).or_insert_with(Entry::new).changes.subscribe()
        };
        self.start_if_stale(&key, &fetcher);
        Query {
            cache: self.clone(),
            key,
            fetcher,
            changes,
            _marker: PhantomData,
        }
    }

    /// Mark `key` stale; the next subscriber refetches it.
    pub fn invalidate(&self, key: &CacheKey) {
        if let Some(entry) = self.store.entries().get_mut(key) {
            entry.stale = true;
        }
    }

    /// Forget every cached value and error. In-flight fetches still land.
    pub fn clear(&self) {
        for entry in self.store.entries().values_mut() {
            entry.value = None;
            entry.error = None;
            entry.fetched_at = None;
            entry.stale = false;
            entry.notify();
        }
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.store
            .entries()
            .get(key)
            .is_some_and(|entry| entry.value.is_some())
    }

    /// Begin a fetch for `key` unless one is in flight or the cached value
    /// is still fresh.
    fn start_if_stale<T>(&self, key: &CacheKey, fetcher: &Fetcher<T>)
    where
        T: Send + Sync + 'static,
    {
        let busy_or_fresh = self.store.entries().get(key).is_some_and(|entry| {
            entry.in_flight.is_some() || entry.is_fresh(self.store.dedupe_interval)
        });
        if !busy_or_fresh {
            let _ = self.revalidate(key, fetcher);
        }
    }

    /// Begin a fetch for `key`, or join the one in flight.
    fn revalidate<T>(&self, key: &CacheKey, fetcher: &Fetcher<T>) -> InFlight
    where
        T: Send + Sync + 'static,
    {
        let mut entries = self.store.entries();
        let entry = entries.entry(key.clone()).or_insert_with(Entry::new);
        if let Some((_, in_flight)) = &entry.in_flight {
            tracing::debug!(key = %key, "joining in-flight request");
            return in_flight.clone();
        }

        let fetch_id = self.store.next_fetch_id.fetch_add(1, Ordering::Relaxed);
        let request = fetcher();
        let store: Weak<Store> = Arc::downgrade(&self.store);
        let settle_key = key.clone();
        let in_flight = async move {
            let outcome: FetchOutcome = match request.await {
                Ok(value) => Ok(Arc::new(value) as CachedValue),
                Err(error) => Err(Arc::new(error)),
            };
            if let Some(store) = store.upgrade() {
                store.settle(&settle_key, fetch_id, &outcome);
            }
            outcome
        }
        .boxed()
        .shared();

        tracing::debug!(key = %key, fetch_id, "starting fetch");
        entry.in_flight = Some((fetch_id, in_flight.clone()));
        entry.notify();
        drop(entries);

        // Drive the fetch even if no subscriber awaits it. Without a runtime
        // it runs on the first await instead.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(in_flight.clone());
        }
        in_flight
    }

    fn snapshot<T: Send + Sync + 'static>(&self, key: &CacheKey) -> QueryState<T> {
        let entries = self.store.entries();
        let Some(entry) = entries.get(key) else {
            return QueryState::empty();
        };
        QueryState {
            data: entry.value.clone().and_then(|value| downcast(key, value)),
            error: entry.error.clone(),
            is_loading: entry.in_flight.is_some(),
            fetched_at: entry.fetched_at,
        }
    }

    fn in_flight(&self, key: &CacheKey) -> Option<InFlight> {
        self.store
            .entries()
            .get(key)
            .and_then(|entry| entry.in_flight.as_ref().map(|(_, f)| f.clone()))
    }

    fn set_value<T: Send + Sync + 'static>(&self, key: &CacheKey, value: T) {
        let mut entries = self.store.entries();
        let entry = entries.entry(key.clone()).or_insert_with(Entry::new);
        entry.value = Some(Arc::new(value));
        entry.fetched_at = Some(Instant::now());
        entry.stale = false;
        entry.notify();
    }
}

fn downcast<T: Send + Sync + 'static>(key: &CacheKey, value: CachedValue) -> Option<Arc<T>> {
    match value.downcast::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key = %key, "cached value has a different type than requested");
            None
        }
    }
}

/// Point-in-time view of a query.
///
/// `data` and `error` are independent: a failed refetch keeps the last good
/// `data` and sets `error`; a later success clears `error`. Consumers decide
/// whether to show stale data, the error, or both.
#[derive(Debug)]
pub struct QueryState<T> {
    pub data: Option<Arc<T>>,
    pub error: Option<Arc<ApiError>>,
    /// A fetch for this key is in flight.
    pub is_loading: bool,
    pub fetched_at: Option<Instant>,
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            error: self.error.clone(),
            is_loading: self.is_loading,
            fetched_at: self.fetched_at,
        }
    }
}

impl<T> QueryState<T> {
    fn empty() -> Self {
        Self {
            data: None,
            error: None,
            is_loading: false,
            fetched_at: None,
        }
    }

    /// Data is present but the latest fetch failed.
    pub fn is_stale_on_error(&self) -> bool {
        self.data.is_some() && self.error.is_some()
    }
}

/// Subscription to one cache key.
pub struct Query<T> {
    cache: QueryCache,
    key: CacheKey,
    fetcher: Fetcher<T>,
    changes: watch::Receiver<u64>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            key: self.key.clone(),
            fetcher: self.fetcher.clone(),
            changes: self.changes.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query").field("key", &self.key).finish_non_exhaustive()
    }
}

impl<T: Send + Sync + 'static> Query<T> {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn state(&self) -> QueryState<T> {
        self.cache.snapshot(&self.key)
    }

    pub fn data(&self) -> Option<Arc<T>> {
        self.state().data
    }

    pub fn error(&self) -> Option<Arc<ApiError>> {
        self.state().error
    }

    pub fn is_loading(&self) -> bool {
        self.state().is_loading
    }

    /// Revalidate now. The fetch starts before this returns; awaiting the
    /// future yields its result. Joins a fetch already in flight.
    pub fn mutate(&self) -> impl Future<Output = Result<Arc<T>, Arc<ApiError>>> + Send + 'static {
        let in_flight = self.cache.revalidate(&self.key, &self.fetcher);
        let key = self.key.clone();
        async move {
            let value = in_flight.await?;
            downcast(&key, value).ok_or_else(|| {
                Arc::new(ApiError::Deserialization(format!(
                    "cached value for `{key}` has an unexpected type"
                )))
            })
        }
    }

    /// Replace the cached value locally without fetching.
    pub fn set_data(&self, value: T) {
        self.cache.set_value(&self.key, value);
    }

    /// Wait for the in-flight fetch, if any, then return the state.
    pub async fn settled(&self) -> QueryState<T> {
        if let Some(in_flight) = self.cache.in_flight(&self.key) {
            // The outcome is already recorded in the store.
            let _ = in_flight.await;
        }
        self.state()
    }

    /// Wait until this key's state changes, then return it.
    pub async fn changed(&mut self) -> QueryState<T> {
        if self.changes.changed().await.is_err() {
            tracing::debug!(key = %self.key, "change feed closed");
        }
        self.state()
    }

    /// Raw change feed, for `select!` loops.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.clone()
    }
}

/// Explicitly triggered write. Never touches the query store; callers
/// refresh the affected queries after a success.
pub struct Mutation<A, R> {
    run: Mutator<A, R>,
    state: Arc<MutationState<R>>,
}

struct MutationState<R> {
    pending: AtomicUsize,
    last: Mutex<(Option<Arc<R>>, Option<Arc<ApiError>>)>,
}

impl<A, R> Clone for Mutation<A, R> {
    fn clone(&self) -> Self {
        Self {
            run: self.run.clone(),
            state: self.state.clone(),
        }
    }
}

struct PendingGuard<'a>(&'a AtomicUsize);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<A, R> Mutation<A, R> {
    pub fn new(run: Mutator<A, R>) -> Self {
        Self {
            run,
            state: Arc::new(MutationState {
                pending: AtomicUsize::new(0),
                last: Mutex::new((None, None)),
            }),
        }
    }

    pub async fn trigger(&self, arg: A) -> Result<Arc<R>, Arc<ApiError>> {
        self.state.pending.fetch_add(1, Ordering::SeqCst);
        let _guard = PendingGuard(&self.state.pending);

        let outcome = (self.run)(arg).await.map(Arc::new).map_err(Arc::new);
        let mut last = self.state.last.lock().unwrap_or_else(PoisonError::into_inner);
        match &outcome {
            Ok(data) => *last = (Some(data.clone()), None),
            Err(error) => {
                tracing::warn!(status = ?error.status(), error = %error, "mutation failed");
                last.1 = Some(error.clone());
            }
        }
        outcome
    }

    pub fn is_mutating(&self) -> bool {
        self.state.pending.load(Ordering::SeqCst) > 0
    }

    /// Result of the last successful trigger.
    pub fn data(&self) -> Option<Arc<R>> {
        self.state.last.lock().unwrap_or_else(PoisonError::into_inner).0.clone()
    }

    /// Error of the last trigger, cleared by the next success.
    pub fn error(&self) -> Option<Arc<ApiError>> {
        self.state.last.lock().unwrap_or_else(PoisonError::into_inner).1.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use tokio::sync::oneshot;

    use super::*;

    type Reply = Result<u32, ApiError>;

    /// Counts fetches; each fetch waits on the next queued gate, or resolves
    /// to the call number when no gate is queued.
    #[derive(Default)]
    struct Script {
        calls: AtomicUsize,
        gates: Mutex<VecDeque<oneshot::Receiver<Reply>>>,
    }

    impl Script {
        fn gate(&self) -> oneshot::Sender<Reply> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().unwrap().push_back(rx);
            tx
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn scripted() -> (Arc<Script>, Fetcher<u32>) {
        let script = Arc::new(Script::default());
        let s = script.clone();
        let f = fetcher(move || {
            let n = s.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let gate = s.gates.lock().unwrap().pop_front();
            async move {
                match gate {
                    Some(rx) => rx.await.unwrap_or(Err(ApiError::Network("gate dropped".into()))),
                    None => Ok(n as u32),
                }
            }
        });
        (script, f)
    }

    fn http_error() -> ApiError {
        ApiError::Http {
            status: 500,
            status_text: "Internal Server Error".to_string(),
            message: Some("boom".to_string()),
            code: None,
            details: None,
        }
    }

    fn key() -> CacheKey {
        CacheKey::from("/api/admin/doctors")
    }

    #[tokio::test]
    async fn same_tick_subscribers_share_one_request() {
        let cache = QueryCache::new();
        let (script, f) = scripted();

        let a = cache.use_query(key(), f.clone());
        let b = cache.use_query(key(), f);

        assert_eq!(script.calls(), 1);
        assert!(a.is_loading() && b.is_loading());
        assert_eq!(*a.settled().await.data.unwrap(), 1);
        assert_eq!(*b.settled().await.data.unwrap(), 1);
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test]
    async fn data_stays_visible_while_revalidating() {
        let cache = QueryCache::new();
        let (script, f) = scripted();
        let query = cache.use_query(key(), f);
        query.settled().await;

        let tx = script.gate();
        let pending = query.mutate();
        let during = query.state();
        assert!(during.is_loading);
        assert_eq!(*during.data.unwrap(), 1);

        tx.send(Ok(99)).unwrap();
        assert_eq!(*pending.await.unwrap(), 99);
        let after = query.state();
        assert!(!after.is_loading);
        assert_eq!(*after.data.unwrap(), 99);
    }

    #[tokio::test]
    async fn failed_revalidation_keeps_last_good_data() {
        let cache = QueryCache::new();
        let (script, f) = scripted();
        let query = cache.use_query(key(), f);
        query.settled().await;

        let tx = script.gate();
        let pending = query.mutate();
        tx.send(Err(http_error())).unwrap();
        let err = pending.await.unwrap_err();
        assert_eq!(err.status(), Some(500));

        let state = query.state();
        assert_eq!(*state.data.clone().unwrap(), 1);
        assert_eq!(state.error.clone().unwrap().to_string(), "boom");
        assert!(state.is_stale_on_error());

        query.mutate().await.unwrap();
        assert!(query.error().is_none());
    }

    #[tokio::test]
    async fn mutate_joins_the_request_in_flight() {
        let cache = QueryCache::new();
        let (script, f) = scripted();
        let tx = script.gate();
        let query = cache.use_query(key(), f);

        let joined = query.mutate();
        tx.send(Ok(7)).unwrap();

        assert_eq!(*joined.await.unwrap(), 7);
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test]
    async fn fresh_values_are_not_refetched_on_subscribe() {
        let cache = QueryCache::with_dedupe_interval(Duration::from_secs(60));
        let (script, f) = scripted();
        cache.use_query(key(), f.clone()).settled().await;

        let again = cache.use_query(key(), f);
        assert!(!again.is_loading());
        assert_eq!(script.calls(), 1);
        assert_eq!(*again.data().unwrap(), 1);
    }

    #[tokio::test]
    async fn mutate_refetches_a_fresh_value() {
        let cache = QueryCache::with_dedupe_interval(Duration::from_secs(60));
        let (script, f) = scripted();
        let query = cache.use_query(key(), f);
        query.settled().await;

        assert_eq!(*query.mutate().await.unwrap(), 2);
        assert_eq!(script.calls(), 2);
    }

    #[tokio::test]
    async fn zero_dedupe_interval_refetches_on_subscribe() {
        let cache = QueryCache::with_dedupe_interval(Duration::ZERO);
        let (script, f) = scripted();
        cache.use_query(key(), f.clone()).settled().await;
        cache.use_query(key(), f).settled().await;
        assert_eq!(script.calls(), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch_for_next_subscriber() {
        let cache = QueryCache::with_dedupe_interval(Duration::from_secs(60));
        let (script, f) = scripted();
        cache.use_query(key(), f.clone()).settled().await;

        cache.invalidate(&key());
        let query = cache.use_query(key(), f);
        assert_eq!(*query.settled().await.data.unwrap(), 2);
        assert_eq!(script.calls(), 2);
    }

    #[tokio::test]
    async fn revalidation_by_one_subscriber_is_seen_by_all() {
        let cache = QueryCache::new();
        let (script, f) = scripted();
        let a = cache.use_query(key(), f.clone());
        a.settled().await;
        let mut b = cache.use_query(key(), f);

        let tx = script.gate();
        let pending = a.mutate();
        tx.send(Ok(42)).unwrap();
        pending.await.unwrap();

        let mut state = b.state();
        while state.is_loading {
            state = b.changed().await;
        }
        assert_eq!(*state.data.unwrap(), 42);
    }

    #[tokio::test]
    async fn late_results_land_after_clear() {
        let cache = QueryCache::new();
        let (script, f) = scripted();
        let tx = script.gate();
        let query = cache.use_query(key(), f);

        cache.clear();
        tx.send(Ok(5)).unwrap();
        query.settled().await;

        assert!(cache.contains(&key()));
        assert_eq!(*query.data().unwrap(), 5);
    }

    #[tokio::test]
    async fn set_data_writes_without_fetching() {
        let cache = QueryCache::with_dedupe_interval(Duration::from_secs(60));
        let (script, f) = scripted();
        let query = cache.use_query(key(), f);
        query.settled().await;

        query.set_data(10);
        assert_eq!(*query.data().unwrap(), 10);
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test]
    async fn mismatched_types_read_as_empty() {
        let cache = QueryCache::new();
        let (_, f) = scripted();
        cache.use_query(key(), f).settled().await;

        let other: Query<String> =
            cache.use_query(key(), fetcher(|| async { Ok::<_, ApiError>("x".to_string()) }));
        // The cached u32 is still fresh, so no String fetch was started.
        assert!(other.data().is_none());
    }

    #[tokio::test]
    async fn mutation_tracks_progress_and_errors() {
        let (tx, rx) = oneshot::channel::<Reply>();
        let rx = Arc::new(Mutex::new(Some(rx)));
        let mutation: Mutation<u32, u32> = Mutation::new(mutator(move |arg: u32| {
            let rx = rx.lock().unwrap().take();
            async move {
                match rx {
                    Some(rx) => rx.await.unwrap_or(Err(ApiError::Network("dropped".into()))),
                    None => Ok(arg * 2),
                }
            }
        }));

        let m = mutation.clone();
        let running = tokio::spawn(async move { m.trigger(1).await });
        tokio::task::yield_now().await;
        assert!(mutation.is_mutating());

        tx.send(Err(http_error())).unwrap();
        assert!(running.await.unwrap().is_err());
        assert!(!mutation.is_mutating());
        assert_eq!(mutation.error().unwrap().status(), Some(500));

        assert_eq!(*mutation.trigger(21).await.unwrap(), 42);
        assert!(mutation.error().is_none());
        assert_eq!(*mutation.data().unwrap(), 42);
    }
}
