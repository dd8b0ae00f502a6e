//! Snapgram query cache
//!
//! In-memory cache of backend reads for the client with:
//! - Semantic query keys (see [`CacheKey`])
//! - Pending / error / success status per key
//! - Single-flight fetches: concurrent reads of one key share a request
//! - Synchronous stale marking driven by the invalidation graph
//! - Cursor-paginated (infinite) entries
//! - Metrics integration

mod error;
mod keys;
mod metrics;

pub mod infinite;

pub use cache_invalidation::{KeyPattern, QueryKey, QueryScope};
pub use error::{CacheError, CacheResult};
pub use infinite::{next_page_param, Identified, InfinitePages};
pub use keys::CacheKey;
pub use metrics::CacheMetrics;

use cache_invalidation::{InvalidationMessage, InvalidationSubscriber};
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Observable status of one query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
    /// Query disabled (e.g. missing id) or never requested
    Idle,
    Pending,
    Error(String),
    Success(T),
}

impl<T> QueryState<T> {
    pub fn data(&self) -> Option<&T> {
        match self {
            QueryState::Success(data) => Some(data),
            _ => None,
        }
    }

    pub fn into_data(self) -> Option<T> {
        match self {
            QueryState::Success(data) => Some(data),
            _ => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, QueryState::Idle)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, QueryState::Pending)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, QueryState::Error(_))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, QueryState::Success(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> QueryState<U> {
        match self {
            QueryState::Idle => QueryState::Idle,
            QueryState::Pending => QueryState::Pending,
            QueryState::Error(e) => QueryState::Error(e),
            QueryState::Success(data) => QueryState::Success(f(data)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum EntryStatus {
    Pending,
    Error(String),
    Success,
}

#[derive(Debug, Clone)]
struct Entry {
    status: EntryStatus,
    /// Last successful payload, kept while refetching
    data: Option<Value>,
    stale: bool,
    updated_at: Instant,
    /// Bumped by every invalidation so in-flight fetches can tell
    generation: u64,
}

impl Entry {
    fn pending() -> Self {
        Self {
            status: EntryStatus::Pending,
            data: None,
            stale: true,
            updated_at: Instant::now(),
            generation: 0,
        }
    }
}

struct Inner {
    entries: DashMap<QueryKey, Entry>,
    inflight: DashMap<QueryKey, Arc<Mutex<()>>>,
    stale_time: Option<Duration>,
    metrics: CacheMetrics,
}

/// Shared query cache; clones refer to the same entries
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    /// Entries stay fresh until invalidated
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Entries additionally go stale `stale_time` after they were stored
    pub fn with_stale_time(stale_time: Duration) -> Self {
        Self::build(Some(stale_time))
    }

    fn build(stale_time: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                inflight: DashMap::new(),
                stale_time,
                metrics: CacheMetrics::new(),
            }),
        }
    }

    /// Cached data if present and fresh
    fn fresh<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
        let value = {
            let entry = self.inner.entries.get(key)?;
            if entry.status != EntryStatus::Success || entry.stale {
                return None;
            }
            if let Some(stale_time) = self.inner.stale_time {
                if entry.updated_at.elapsed() >= stale_time {
                    return None;
                }
            }
            entry.data.clone()?
        };
        self.decode(key, value)
    }

    fn decode<T: DeserializeOwned>(&self, key: &QueryKey, value: Value) -> Option<T> {
        match serde_json::from_value::<T>(value) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(key = %key, error = %e, "Cache deserialization failed");
                self.inner
                    .metrics
                    .record_error(CacheKey::label(key), "deserialize");
                // Drop the corrupted entry
                self.inner.entries.remove(key);
                None
            }
        }
    }

    async fn acquire_flight(&self, key: &QueryKey) -> OwnedMutexGuard<()> {
        let lock = self
            .inner
            .inflight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    fn release_flight(&self, key: &QueryKey, guard: OwnedMutexGuard<()>) {
        drop(guard);
        // Only the map holds the lock once nobody else is queued on it
        self.inner
            .inflight
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Mark the entry pending and return the generation the fetch started at
    fn begin(&self, key: &QueryKey) -> u64 {
        let mut entry = self
            .inner
            .entries
            .entry(key.clone())
            .or_insert_with(Entry::pending);
        entry.status = EntryStatus::Pending;
        entry.generation
    }

    fn store_success<T: Serialize>(&self, key: &QueryKey, generation: u64, data: &T) {
        let value = match serde_json::to_value(data) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache serialization failed");
                self.inner
                    .metrics
                    .record_error(CacheKey::label(key), "serialize");
                self.inner.entries.remove(key);
                return;
            }
        };

        let mut entry = self
            .inner
            .entries
            .entry(key.clone())
            .or_insert_with(Entry::pending);
        // Invalidated while in flight: keep the data but refetch on next read
        entry.stale = entry.generation != generation;
        entry.status = EntryStatus::Success;
        entry.data = Some(value);
        entry.updated_at = Instant::now();

        debug!(key = %key, stale = entry.stale, "Cache set");
        self.inner.metrics.record_write(CacheKey::label(key));
    }

    fn store_error(&self, key: &QueryKey, message: &str) {
        let mut entry = self
            .inner
            .entries
            .entry(key.clone())
            .or_insert_with(Entry::pending);
        entry.status = EntryStatus::Error(message.to_string());
        entry.updated_at = Instant::now();

        self.inner
            .metrics
            .record_error(CacheKey::label(key), "fetch");
    }

    /// Read through the cache
    ///
    /// Fresh data is returned without calling `fetcher`. Otherwise concurrent
    /// callers for the same key share one fetch. A fetcher yielding `None`
    /// (a failed backend call) produces [`QueryState::Error`].
    pub async fn fetch<T, F, Fut>(&self, key: QueryKey, fetcher: F) -> QueryState<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        let label = CacheKey::label(&key);

        if let Some(data) = self.fresh::<T>(&key) {
            debug!(key = %key, "Cache hit");
            self.inner.metrics.record_hit(label);
            return QueryState::Success(data);
        }

        let guard = self.acquire_flight(&key).await;

        // Another caller may have filled the entry while we waited
        if let Some(data) = self.fresh::<T>(&key) {
            debug!(key = %key, "Cache hit after in-flight fetch");
            self.inner.metrics.record_dedup_wait(label);
            self.release_flight(&key, guard);
            return QueryState::Success(data);
        }

        debug!(key = %key, "Cache miss");
        self.inner.metrics.record_miss(label);

        let generation = self.begin(&key);
        let state = match fetcher().await {
            Some(data) => {
                self.store_success(&key, generation, &data);
                QueryState::Success(data)
            }
            None => {
                let message = format!("{} failed", key);
                self.store_error(&key, &message);
                QueryState::Error(message)
            }
        };

        self.release_flight(&key, guard);
        state
    }

    /// Load a paginated query, refetching every loaded page when stale
    pub async fn fetch_infinite<T, F, Fut>(
        &self,
        key: QueryKey,
        fetch_page: F,
    ) -> QueryState<InfinitePages<T>>
    where
        T: Identified + Serialize + DeserializeOwned,
        F: Fn(Option<String>) -> Fut,
        Fut: Future<Output = Option<Vec<T>>>,
    {
        if let Some(pages) = self.fresh::<InfinitePages<T>>(&key) {
            self.inner.metrics.record_hit(CacheKey::label(&key));
            return QueryState::Success(pages);
        }

        let guard = self.acquire_flight(&key).await;
        let state = self.load_infinite(&key, &fetch_page).await;
        self.release_flight(&key, guard);
        state
    }

    async fn load_infinite<T, F, Fut>(
        &self,
        key: &QueryKey,
        fetch_page: &F,
    ) -> QueryState<InfinitePages<T>>
    where
        T: Identified + Serialize + DeserializeOwned,
        F: Fn(Option<String>) -> Fut,
        Fut: Future<Output = Option<Vec<T>>>,
    {
        if let Some(pages) = self.fresh::<InfinitePages<T>>(key) {
            self.inner.metrics.record_dedup_wait(CacheKey::label(key));
            return QueryState::Success(pages);
        }

        // Refetch as many pages as were loaded before the entry went stale
        let previous_pages = self
            .peek::<InfinitePages<T>>(key)
            .into_data()
            .map(|p| p.page_count())
            .unwrap_or(0)
            .max(1);

        self.inner.metrics.record_miss(CacheKey::label(key));
        let generation = self.begin(key);

        let mut pages = InfinitePages::default();
        let mut cursor = None;
        for _ in 0..previous_pages {
            let Some(page) = fetch_page(cursor.clone()).await else {
                let message = format!("{} failed", key);
                self.store_error(key, &message);
                return QueryState::Error(message);
            };
            pages.push_page(cursor, page);
            cursor = pages.next_cursor.clone();
            if cursor.is_none() {
                break;
            }
        }

        self.store_success(key, generation, &pages);
        QueryState::Success(pages)
    }

    /// Append the next page of a paginated query
    ///
    /// Does nothing (and fetches nothing) when the last page was empty.
    pub async fn fetch_next_page<T, F, Fut>(
        &self,
        key: QueryKey,
        fetch_page: F,
    ) -> QueryState<InfinitePages<T>>
    where
        T: Identified + Serialize + DeserializeOwned,
        F: Fn(Option<String>) -> Fut,
        Fut: Future<Output = Option<Vec<T>>>,
    {
        let guard = self.acquire_flight(&key).await;

        let mut pages = match self.load_infinite(&key, &fetch_page).await {
            QueryState::Success(pages) => pages,
            other => {
                self.release_flight(&key, guard);
                return other;
            }
        };

        let Some(cursor) = pages.next_cursor.clone() else {
            debug!(key = %key, "No next page");
            self.release_flight(&key, guard);
            return QueryState::Success(pages);
        };

        let generation = self.current_generation(&key);
        let state = match fetch_page(Some(cursor.clone())).await {
            Some(page) => {
                pages.push_page(Some(cursor), page);
                self.store_success(&key, generation, &pages);
                QueryState::Success(pages)
            }
            None => {
                // Loaded pages stay usable; only this request failed
                self.inner
                    .metrics
                    .record_error(CacheKey::label(&key), "fetch");
                QueryState::Error(format!("{} next page failed", key))
            }
        };

        self.release_flight(&key, guard);
        state
    }

    fn current_generation(&self, key: &QueryKey) -> u64 {
        self.inner
            .entries
            .get(key)
            .map(|e| e.generation)
            .unwrap_or(0)
    }

    /// Current status without fetching; pending entries report `Pending`
    pub fn peek<T: DeserializeOwned>(&self, key: &QueryKey) -> QueryState<T> {
        let (status, data) = match self.inner.entries.get(key) {
            Some(entry) => (entry.status.clone(), entry.data.clone()),
            None => return QueryState::Idle,
        };

        match status {
            EntryStatus::Pending => QueryState::Pending,
            EntryStatus::Error(message) => QueryState::Error(message),
            EntryStatus::Success => match data.and_then(|v| self.decode(key, v)) {
                Some(data) => QueryState::Success(data),
                None => QueryState::Idle,
            },
        }
    }

    /// Whether the next read of `key` goes to the backend
    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.fresh::<Value>(key).is_none()
    }

    /// Read data directly, ignoring freshness
    pub fn get_data<T: DeserializeOwned>(&self, key: &QueryKey) -> CacheResult<Option<T>> {
        let value = match self.inner.entries.get(key) {
            Some(entry) => entry.data.clone(),
            None => return Ok(None),
        };
        match value {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Store data directly as fresh success
    pub fn set_data<T: Serialize>(&self, key: QueryKey, data: &T) -> CacheResult<()> {
        let value = serde_json::to_value(data)?;
        let mut entry = self
            .inner
            .entries
            .entry(key.clone())
            .or_insert_with(Entry::pending);
        entry.status = EntryStatus::Success;
        entry.data = Some(value);
        entry.stale = false;
        entry.updated_at = Instant::now();
        self.inner.metrics.record_write(CacheKey::label(&key));
        Ok(())
    }

    /// Mark every entry matching `pattern` stale; returns how many matched
    pub fn invalidate(&self, pattern: &KeyPattern) -> usize {
        let mut count = 0;
        for mut entry in self.inner.entries.iter_mut() {
            if entry.key().matches(pattern) {
                let label = CacheKey::label(entry.key());
                let value = entry.value_mut();
                value.stale = true;
                value.generation += 1;
                self.inner.metrics.record_invalidation(label);
                count += 1;
            }
        }
        debug!(pattern = %pattern, invalidated = count, "Cache invalidate");
        count
    }

    pub fn invalidate_all(&self, patterns: &[KeyPattern]) -> usize {
        patterns.iter().map(|p| self.invalidate(p)).sum()
    }

    /// Apply a broadcast invalidation message
    pub fn apply(&self, msg: &InvalidationMessage) -> usize {
        self.invalidate_all(&msg.patterns)
    }

    /// Keep this cache coherent with messages published elsewhere
    pub fn listen(&self, subscriber: InvalidationSubscriber) -> JoinHandle<()> {
        let cache = self.clone();
        subscriber.subscribe(move |msg| {
            cache.apply(&msg);
            async { Ok::<(), cache_invalidation::InvalidationError>(()) }
        })
    }

    pub fn remove(&self, key: &QueryKey) -> bool {
        self.inner.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.inner.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }
}
