//! Keyed query cache shared by every consumer in the process.
//!
//! Each [`QueryKey`] owns one entry. An entry runs at most one fetch at a
//! time; concurrent readers of the same key join that fetch instead of
//! starting their own. Fetches run on spawned tasks, so a reader that goes
//! away does not cancel work other readers are waiting on.
//!
//! Every fetch and every local write takes the next epoch of its entry. A
//! result is applied only if its epoch is newer than the epoch of the data
//! currently held, which keeps a slow fetch from clobbering a later write.

mod key;
mod pages;

use std::{
    any::Any,
    collections::HashMap,
    future::Future,
    marker::PhantomData,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use tokio::{sync::watch, time::Instant};

use crate::error::ApiError;

pub use key::{
    DASHBOARD_STALE_TIME, DEFAULT_CACHE_TIME, QueryKey, QueryOptions, TRANSACTIONS_STALE_TIME,
};
pub use pages::{Page, PagedData};

const RETRY_DELAY: Duration = Duration::from_secs(1);

type AnyData = Arc<dyn Any + Send + Sync>;
type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

#[derive(Clone)]
struct Fetched {
    data: AnyData,
    pages: usize,
}

type FetchResult = Result<Fetched, ApiError>;
type Fetcher = Arc<dyn Fn(usize) -> BoxFuture<FetchResult> + Send + Sync>;
type NextPageFetcher =
    Arc<dyn Fn(AnyData) -> BoxFuture<Result<Option<Fetched>, ApiError>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Idle,
    Loading,
    Success,
    Error,
}

/// Point-in-time view of one entry.
#[derive(Debug)]
pub struct QueryState<T> {
    pub status: QueryStatus,
    pub data: Option<Arc<T>>,
    /// Last failure. Previously fetched data stays in `data`.
    pub error: Option<ApiError>,
    pub updated_at: Option<Instant>,
    pub is_fetching: bool,
    pub is_stale: bool,
    pub loading_next: bool,
}

impl<T> QueryState<T> {
    fn idle() -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            updated_at: None,
            is_fetching: false,
            is_stale: true,
            loading_next: false,
        }
    }
}

struct Inflight {
    epoch: u64,
    done: watch::Receiver<Option<FetchResult>>,
}

struct Entry {
    options: QueryOptions,
    status: QueryStatus,
    data: Option<AnyData>,
    pages: usize,
    error: Option<ApiError>,
    updated_at: Option<Instant>,
    invalidated: bool,
    /// Last epoch handed out.
    epoch: u64,
    /// Epoch of the data currently held.
    applied: u64,
    /// Epoch of the last fetch result that replaced the data.
    server_epoch: u64,
    inflight: Option<Inflight>,
    refetch_queued: bool,
    fetcher: Option<Fetcher>,
    next_page: Option<NextPageFetcher>,
    loading_next: bool,
    subscribers: usize,
    notify: watch::Sender<u64>,
}

impl Entry {
    fn new(options: QueryOptions) -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            options,
            status: QueryStatus::Idle,
            data: None,
            pages: 0,
            error: None,
            updated_at: None,
            invalidated: false,
            epoch: 0,
            applied: 0,
            server_epoch: 0,
            inflight: None,
            refetch_queued: false,
            fetcher: None,
            next_page: None,
            loading_next: false,
            subscribers: 0,
            notify,
        }
    }

    fn age(&self, now: Instant) -> Option<Duration> {
        self.updated_at.map(|at| now.saturating_duration_since(at))
    }

    fn is_fresh(&self, now: Instant) -> bool {
        self.data.is_some()
            && !self.invalidated
            && self
                .age(now)
                .is_some_and(|age| age < self.options.stale_time)
    }

    /// Data may be shown while a refetch runs.
    fn is_servable(&self, now: Instant) -> bool {
        self.data.is_some()
            && (self.subscribers > 0
                || self
                    .age(now)
                    .is_none_or(|age| age < self.options.cache_time))
    }

    fn next_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }

    fn bump(&self) {
        self.notify.send_modify(|version| *version = version.wrapping_add(1));
    }

    fn state<T: Send + Sync + 'static>(&self, now: Instant) -> QueryState<T> {
        QueryState {
            status: self.status,
            data: self.data.clone().and_then(|data| data.downcast::<T>().ok()),
            error: self.error.clone(),
            updated_at: self.updated_at,
            is_fetching: self.inflight.is_some(),
            is_stale: !self.is_fresh(now),
            loading_next: self.loading_next,
        }
    }
}

fn type_mismatch(key: &QueryKey) -> ApiError {
    ApiError::Malformed(format!("cached value for {key} has an unexpected type"))
}

fn downcast<T: Send + Sync + 'static>(key: &QueryKey, data: AnyData) -> Result<Arc<T>, ApiError> {
    data.downcast::<T>().map_err(|_| type_mismatch(key))
}

fn erase_fetcher<T, F, Fut>(fetcher: F) -> Fetcher
where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
{
    Arc::new(move |_pages: usize| -> BoxFuture<FetchResult> {
        let fut = fetcher();
        Box::pin(async move {
            let data = fut.await?;
            Ok(Fetched {
                data: Arc::new(data),
                pages: 0,
            })
        })
    })
}

fn erase_pages<T, F, Fut>(fetch_page: F) -> (Fetcher, NextPageFetcher)
where
    T: Clone + Send + Sync + 'static,
    F: Fn(u32) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Page<T>, ApiError>> + Send + 'static,
{
    let fetch_page = Arc::new(fetch_page);

    let first = fetch_page.clone();
    let fetcher: Fetcher = Arc::new(move |pages: usize| -> BoxFuture<FetchResult> {
        let fetch_page = first.clone();
        Box::pin(async move {
            // A refetch reloads as many pages as were loaded before.
            let wanted = u32::try_from(pages.max(1)).unwrap_or(u32::MAX);
            let mut data = PagedData::default();
            for number in 1..=wanted {
                let page = fetch_page(number).await?;
                let more = page.has_more;
                data.push(page);
                if !more {
                    break;
                }
            }
            let pages = data.pages().len();
            Ok(Fetched {
                data: Arc::new(data),
                pages,
            })
        })
    });

    let next: NextPageFetcher = Arc::new(
        move |current: AnyData| -> BoxFuture<Result<Option<Fetched>, ApiError>> {
            let fetch_page = fetch_page.clone();
            Box::pin(async move {
                let current = current.downcast::<PagedData<T>>().map_err(|_| {
                    ApiError::Malformed("cached pages have an unexpected type".to_string())
                })?;
                let Some(number) = current.next_page_number() else {
                    return Ok(None);
                };
                let page = fetch_page(number).await?;
                let mut data = PagedData::clone(&current);
                data.push(page);
                let pages = data.pages().len();
                Ok(Some(Fetched {
                    data: Arc::new(data),
                    pages,
                }))
            })
        },
    );

    (fetcher, next)
}

async fn with_retry<T, F, Fut>(key: &QueryKey, retry: u32, mut attempt: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut failures = 0;
    loop {
        match attempt().await {
            Err(err) if err.is_retryable() && failures < retry => {
                failures += 1;
                tracing::warn!("fetch of {key} failed ({err}), retrying");
                tokio::time::sleep(RETRY_DELAY).await;
            }
            result => return result,
        }
    }
}

async fn wait(key: &QueryKey, mut done: watch::Receiver<Option<FetchResult>>) -> FetchResult {
    let settled = {
        let value = done
            .wait_for(Option::is_some)
            .await
            .map_err(|_| ApiError::Transport(format!("fetch of {key} was abandoned")))?;
        value.clone()
    };
    settled.unwrap_or_else(|| Err(ApiError::Transport(format!("fetch of {key} was abandoned"))))
}

enum Lookup {
    Ready(AnyData),
    Wait(watch::Receiver<Option<FetchResult>>),
}

/// Cloning is cheap; all clones share the same entries.
#[derive(Clone, Default)]
pub struct QueryCache {
    entries: Arc<Mutex<HashMap<QueryKey, Entry>>>,
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.lock().len())
            .finish()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns cached data when fresh, stale data plus a background refetch
    /// when servable, and otherwise waits for the (shared) fetch.
    pub async fn query<T, F, Fut>(
        &self,
        key: &QueryKey,
        options: QueryOptions,
        fetcher: F,
    ) -> Result<Arc<T>, ApiError>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let data = self
            .lookup(key, options, erase_fetcher(fetcher), None)
            .await?;
        downcast(key, data)
    }

    /// Like [`query`](Self::query) for paged resources. The first load
    /// fetches page 1; later pages come from [`fetch_next_page`](Self::fetch_next_page).
    pub async fn infinite_query<T, F, Fut>(
        &self,
        key: &QueryKey,
        options: QueryOptions,
        fetch_page: F,
    ) -> Result<Arc<PagedData<T>>, ApiError>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(u32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Page<T>, ApiError>> + Send + 'static,
    {
        let (fetcher, next) = erase_pages(fetch_page);
        let data = self.lookup(key, options, fetcher, Some(next)).await?;
        downcast(key, data)
    }

    async fn lookup(
        &self,
        key: &QueryKey,
        options: QueryOptions,
        fetcher: Fetcher,
        next: Option<NextPageFetcher>,
    ) -> Result<AnyData, ApiError> {
        let lookup = {
            let mut entries = self.lock();
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| Entry::new(options));
            entry.options = options;
            entry.fetcher = Some(fetcher);
            if next.is_some() {
                entry.next_page = next;
            }

            let now = Instant::now();
            match entry.data.clone() {
                Some(data) if entry.is_fresh(now) => {
                    tracing::debug!("cache hit for {key}");
                    Lookup::Ready(data)
                }
                Some(data) if entry.is_servable(now) => {
                    tracing::debug!("serving stale {key} while refetching");
                    self.ensure_fetch(key, entry);
                    Lookup::Ready(data)
                }
                _ => Lookup::Wait(self.ensure_fetch(key, entry)),
            }
        };

        match lookup {
            Lookup::Ready(data) => Ok(data),
            Lookup::Wait(done) => wait(key, done).await.map(|fetched| fetched.data),
        }
    }

    fn ensure_fetch(
        &self,
        key: &QueryKey,
        entry: &mut Entry,
    ) -> watch::Receiver<Option<FetchResult>> {
        match &entry.inflight {
            Some(inflight) => inflight.done.clone(),
            None => self.start_fetch(key, entry),
        }
    }

    fn start_fetch(
        &self,
        key: &QueryKey,
        entry: &mut Entry,
    ) -> watch::Receiver<Option<FetchResult>> {
        let epoch = entry.next_epoch();
        let (tx, rx) = watch::channel(None);

        let Some(fetcher) = entry.fetcher.clone() else {
            let _ = tx.send(Some(Err(ApiError::Malformed(format!(
                "no fetcher registered for {key}"
            )))));
            return rx;
        };

        entry.inflight = Some(Inflight {
            epoch,
            done: rx.clone(),
        });
        entry.refetch_queued = false;
        if entry.data.is_none() {
            entry.status = QueryStatus::Loading;
        }
        entry.bump();

        let pages = entry.pages;
        let retry = entry.options.retry;
        let cache = self.clone();
        let key = key.clone();
        tracing::debug!("fetching {key} (epoch {epoch})");
        tokio::spawn(async move {
            let result = with_retry(&key, retry, || fetcher(pages)).await;
            cache.settle(&key, epoch, &result);
            let _ = tx.send(Some(result));
        });

        rx
    }

    fn settle(&self, key: &QueryKey, epoch: u64, result: &FetchResult) {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        if entry.inflight.as_ref().is_some_and(|i| i.epoch == epoch) {
            entry.inflight = None;
        }

        if epoch <= entry.applied {
            tracing::debug!(
                "discarding result for {key}: epoch {epoch} is older than {}",
                entry.applied
            );
        } else {
            match result {
                Ok(fetched) => {
                    entry.data = Some(fetched.data.clone());
                    entry.pages = fetched.pages;
                    entry.error = None;
                    entry.status = QueryStatus::Success;
                    entry.updated_at = Some(Instant::now());
                    entry.applied = epoch;
                    entry.server_epoch = epoch;
                    entry.invalidated = entry.refetch_queued;
                }
                Err(err) => {
                    tracing::warn!("fetch of {key} failed: {err}");
                    entry.error = Some(err.clone());
                    entry.status = QueryStatus::Error;
                }
            }
        }

        let requeue = entry.refetch_queued && entry.subscribers > 0;
        entry.bump();
        if requeue {
            self.start_fetch(key, entry);
        }
    }

    /// Loads the page after the last one held. Returns `false` when there
    /// was nothing to load or a load is already running.
    pub async fn fetch_next_page(&self, key: &QueryKey) -> Result<bool, ApiError> {
        let (next, current, base, retry) = {
            let mut entries = self.lock();
            let Some(entry) = entries.get_mut(key) else {
                return Ok(false);
            };
            if entry.loading_next {
                return Ok(false);
            }
            let (Some(next), Some(current)) = (entry.next_page.clone(), entry.data.clone())
            else {
                return Ok(false);
            };
            entry.loading_next = true;
            entry.bump();
            (next, current, entry.applied, entry.options.retry)
        };

        let cache = self.clone();
        let key = key.clone();
        let task = tokio::spawn(async move {
            let result = with_retry(&key, retry, || next(current.clone())).await;

            let mut entries = cache.lock();
            let Some(entry) = entries.get_mut(&key) else {
                return Ok(false);
            };
            entry.loading_next = false;
            let outcome = match result {
                Ok(Some(fetched)) if entry.applied == base => {
                    let epoch = entry.next_epoch();
                    entry.data = Some(fetched.data);
                    entry.pages = fetched.pages;
                    entry.applied = epoch;
                    entry.error = None;
                    Ok(true)
                }
                Ok(Some(_)) => {
                    tracing::debug!("discarding next page of {key}: data changed meanwhile");
                    Ok(false)
                }
                Ok(None) => Ok(false),
                Err(err) => {
                    tracing::warn!("loading next page of {key} failed: {err}");
                    entry.error = Some(err.clone());
                    Err(err)
                }
            };
            entry.bump();
            outcome
        });

        task.await
            .map_err(|err| ApiError::Transport(format!("next page task failed: {err}")))?
    }

    /// Registers an observer. While at least one is alive, invalidation
    /// refetches the entry immediately and its data is never evicted.
    pub fn subscribe<T, F, Fut>(
        &self,
        key: &QueryKey,
        options: QueryOptions,
        fetcher: F,
    ) -> Subscription<T>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        self.attach(key, options, erase_fetcher(fetcher), None)
    }

    pub fn subscribe_pages<T, F, Fut>(
        &self,
        key: &QueryKey,
        options: QueryOptions,
        fetch_page: F,
    ) -> Subscription<PagedData<T>>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(u32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Page<T>, ApiError>> + Send + 'static,
    {
        let (fetcher, next) = erase_pages(fetch_page);
        self.attach(key, options, fetcher, Some(next))
    }

    fn attach<T>(
        &self,
        key: &QueryKey,
        options: QueryOptions,
        fetcher: Fetcher,
        next: Option<NextPageFetcher>,
    ) -> Subscription<T> {
        let mut entries = self.lock();
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(options));
        entry.options = options;
        entry.fetcher = Some(fetcher);
        if next.is_some() {
            entry.next_page = next;
        }
        entry.subscribers += 1;
        let changes = entry.notify.subscribe();
        if !entry.is_fresh(Instant::now()) {
            self.ensure_fetch(key, entry);
        }
        Subscription {
            cache: self.clone(),
            key: key.clone(),
            changes,
            _data: PhantomData,
        }
    }

    fn detach(&self, key: &QueryKey) {
        if let Some(entry) = self.lock().get_mut(key) {
            entry.subscribers = entry.subscribers.saturating_sub(1);
        }
    }

    pub fn state<T: Send + Sync + 'static>(&self, key: &QueryKey) -> QueryState<T> {
        match self.lock().get(key) {
            Some(entry) => entry.state(Instant::now()),
            None => QueryState::idle(),
        }
    }

    pub fn data<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<Arc<T>> {
        self.lock()
            .get(key)
            .and_then(|entry| entry.data.clone())
            .and_then(|data| data.downcast::<T>().ok())
    }

    /// Epoch of the last fetch result applied to `key`. Changes whenever a
    /// server response replaces the data.
    pub fn server_epoch(&self, key: &QueryKey) -> Option<u64> {
        self.lock().get(key).map(|entry| entry.server_epoch)
    }

    /// Local write. Newer than any fetch already running for the key, so
    /// those results are dropped when they land.
    pub fn set_data<T: Send + Sync + 'static>(&self, key: &QueryKey, data: T) {
        let mut entries = self.lock();
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(QueryOptions::default()));
        let epoch = entry.next_epoch();
        entry.data = Some(Arc::new(data));
        entry.applied = epoch;
        entry.status = QueryStatus::Success;
        entry.bump();
    }

    /// Replaces held data with `f(current)`. Does nothing when the key has
    /// no data of type `T`. Returns whether a write happened.
    pub fn update_data<T, F>(&self, key: &QueryKey, f: F) -> bool
    where
        T: Send + Sync + 'static,
        F: FnOnce(&T) -> T,
    {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(key) else {
            return false;
        };
        let Some(current) = entry
            .data
            .clone()
            .and_then(|data| data.downcast::<T>().ok())
        else {
            return false;
        };
        let next = f(&current);
        let epoch = entry.next_epoch();
        entry.data = Some(Arc::new(next));
        entry.applied = epoch;
        entry.bump();
        true
    }

    /// Marks every entry under `prefix` stale and refetches the observed
    /// ones. Returns how many entries matched.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let mut entries = self.lock();
        let mut matched = 0;
        for (key, entry) in entries.iter_mut().filter(|(key, _)| key.starts_with(prefix)) {
            matched += 1;
            entry.invalidated = true;
            if entry.subscribers > 0 && entry.fetcher.is_some() {
                if entry.inflight.is_some() {
                    entry.refetch_queued = true;
                } else {
                    self.start_fetch(key, entry);
                }
            }
            entry.bump();
        }
        tracing::debug!("invalidated {matched} entries under {prefix}");
        matched
    }

    /// Refetches observed, stale entries that opted into focus refetching.
    pub fn focus_changed(&self) {
        let mut entries = self.lock();
        let now = Instant::now();
        for (key, entry) in entries.iter_mut() {
            if entry.options.refetch_on_window_focus
                && entry.subscribers > 0
                && entry.inflight.is_none()
                && !entry.is_fresh(now)
            {
                self.start_fetch(key, entry);
            }
        }
    }

    /// Drops unobserved entries older than their cache time.
    pub fn collect_garbage(&self) -> usize {
        let mut entries = self.lock();
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| {
            entry.subscribers > 0
                || entry.inflight.is_some()
                || entry
                    .age(now)
                    .is_none_or(|age| age < entry.options.cache_time)
        });
        before - entries.len()
    }

    pub fn remove(&self, key: &QueryKey) {
        self.lock().remove(key);
    }

    /// Drops everything, e.g. when the session ends.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

/// Keeps an entry observed until dropped.
pub struct Subscription<T> {
    cache: QueryCache,
    key: QueryKey,
    changes: watch::Receiver<u64>,
    _data: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Subscription<T> {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn state(&self) -> QueryState<T> {
        self.cache.state(&self.key)
    }

    pub fn data(&self) -> Option<Arc<T>> {
        self.cache.data(&self.key)
    }

    /// Resolves on the next change to the entry. Returns `false` once the
    /// entry has been removed from the cache.
    pub async fn changed(&mut self) -> bool {
        self.changes.changed().await.is_ok()
    }

    /// Waits until the entry holds data or an error and nothing is in flight.
    pub async fn settled(&mut self) -> QueryState<T> {
        loop {
            let state = self.state();
            if !state.is_fetching && (state.data.is_some() || state.error.is_some()) {
                return state;
            }
            if !self.changed().await {
                return self.state();
            }
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.cache.detach(&self.key);
    }
}
