use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::api::ApiError;

pub type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, Result<Value, ApiError>> + Send + Sync>;

pub fn fetcher<F, Fut>(f: F) -> Fetcher
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ApiError>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// Namespace plus canonical params. `serde_json` object keys are sorted, so
/// two params objects with the same content produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub namespace: String,
    pub params: Option<String>,
}

impl QueryKey {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            params: None,
        }
    }

    pub fn with_params(namespace: &str, params: Option<&Value>) -> Self {
        let params = match params {
            None | Some(Value::Null) => None,
            Some(Value::Object(m)) if m.is_empty() => None,
            Some(v) => Some(v.to_string()),
        };
        Self {
            namespace: namespace.to_string(),
            params,
        }
    }

    pub fn with_id(namespace: &str, id: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            params: Some(id.to_string()),
        }
    }
}

struct Entry {
    value: Option<Value>,
    updated_at: Instant,
    last_read: Instant,
    invalidated: bool,
    in_flight: bool,
    /// Newest ticket issued for this key; older completions are dropped.
    ticket: u64,
    fetcher: Fetcher,
}

impl Entry {
    fn is_fresh(&self, now: Instant, stale_time: Duration) -> bool {
        !self.invalidated && now.duration_since(self.updated_at) < stale_time
    }
}

struct Inner {
    entries: RwLock<HashMap<QueryKey, Entry>>,
    next_ticket: AtomicU64,
    stale_time: Duration,
    gc_time: Duration,
}

/// Stale-while-revalidate cache of JSON query results, shared by clone.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("stale_time", &self.inner.stale_time)
            .field("gc_time", &self.inner.gc_time)
            .finish()
    }
}

impl QueryCache {
    pub fn new(stale_time: Duration, gc_time: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(HashMap::new()),
                next_ticket: AtomicU64::new(1),
                stale_time,
                gc_time,
            }),
        }
    }

    fn issue_ticket(&self) -> u64 {
        self.inner.next_ticket.fetch_add(1, Ordering::SeqCst)
    }

    /// Fresh hit returns the cached value. A stale hit returns the cached
    /// value and refreshes in the background. A miss awaits `fetcher`.
    pub async fn get_or_fetch(&self, key: QueryKey, fetcher: Fetcher) -> Result<Value, ApiError> {
        self.sweep().await;

        let now = Instant::now();
        let ticket = {
            let mut entries = self.inner.entries.write().await;
            let ticket = self.issue_ticket();
            match entries.get_mut(&key) {
                Some(entry) => {
                    entry.last_read = now;
                    entry.fetcher = fetcher.clone();
                    if let Some(value) = entry.value.clone() {
                        if entry.is_fresh(now, self.inner.stale_time) {
                            return Ok(value);
                        }
                        drop(entries);
                        self.refetch(&key).await;
                        return Ok(value);
                    }
                    entry.ticket = ticket;
                    entry.in_flight = true;
                }
                None => {
                    entries.insert(
                        key.clone(),
                        Entry {
                            value: None,
                            updated_at: now,
                            last_read: now,
                            invalidated: false,
                            in_flight: true,
                            ticket,
                            fetcher: fetcher.clone(),
                        },
                    );
                }
            }
            ticket
        };

        let result = fetcher().await;
        self.complete(&key, ticket, result.clone()).await;
        result
    }

    /// Starts a background refetch with the key's stored fetcher unless one
    /// is already running.
    async fn refetch(&self, key: &QueryKey) -> Option<JoinHandle<()>> {
        let (ticket, fetcher) = {
            let mut entries = self.inner.entries.write().await;
            let entry = entries.get_mut(key)?;
            if entry.in_flight {
                return None;
            }
            entry.ticket = self.issue_ticket();
            entry.in_flight = true;
            (entry.ticket, entry.fetcher.clone())
        };

        debug!("refetching {:?}", key);
        let cache = self.clone();
        let key = key.clone();
        Some(tokio::spawn(async move {
            let result = fetcher().await;
            cache.complete(&key, ticket, result).await;
        }))
    }

    /// Stores a finished fetch. Returns `false` when the result was dropped
    /// because a newer fetch for the key was issued (or the key is gone).
    async fn complete(&self, key: &QueryKey, ticket: u64, result: Result<Value, ApiError>) -> bool {
        let mut entries = self.inner.entries.write().await;
        let Some(entry) = entries.get_mut(key) else {
            return false;
        };
        if ticket < entry.ticket {
            debug!("discarding superseded response for {:?}", key);
            return false;
        }
        entry.in_flight = false;
        match result {
            Ok(value) => {
                entry.value = Some(value);
                entry.updated_at = Instant::now();
                entry.invalidated = false;
            }
            Err(e) => warn!("fetch for {:?} failed: {}", key, e),
        }
        true
    }

    /// Marks every entry in `namespace` stale and refetches each one. Cached
    /// values keep being served until the refetch lands.
    pub async fn invalidate(&self, namespace: &str) -> Vec<JoinHandle<()>> {
        let keys: Vec<QueryKey> = {
            let mut entries = self.inner.entries.write().await;
            entries
                .iter_mut()
                .filter(|(k, _)| k.namespace == namespace)
                .map(|(k, e)| {
                    e.invalidated = true;
                    e.in_flight = false;
                    k.clone()
                })
                .collect()
        };
        let mut handles = Vec::new();
        for key in keys {
            if let Some(h) = self.refetch(&key).await {
                handles.push(h);
            }
        }
        handles
    }

    pub async fn invalidate_key(&self, key: &QueryKey) -> Option<JoinHandle<()>> {
        {
            let mut entries = self.inner.entries.write().await;
            let entry = entries.get_mut(key)?;
            entry.invalidated = true;
            entry.in_flight = false;
        }
        self.refetch(key).await
    }

    pub async fn peek(&self, key: &QueryKey) -> Option<Value> {
        let entries = self.inner.entries.read().await;
        entries.get(key).and_then(|e| e.value.clone())
    }

    pub async fn is_stale(&self, key: &QueryKey) -> Option<bool> {
        let entries = self.inner.entries.read().await;
        let now = Instant::now();
        entries
            .get(key)
            .map(|e| !e.is_fresh(now, self.inner.stale_time))
    }

    pub async fn len(&self) -> usize {
        self.inner.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drops entries that have not been read for `gc_time`.
    pub async fn sweep(&self) -> usize {
        let mut entries = self.inner.entries.write().await;
        let now = Instant::now();
        let gc_time = self.inner.gc_time;
        let before = entries.len();
        entries.retain(|_, e| e.in_flight || now.duration_since(e.last_read) < gc_time);
        before - entries.len()
    }

    pub async fn clear(&self) {
        let mut entries = self.inner.entries.write().await;
        entries.clear();
        self.inner.next_ticket.fetch_add(1, Ordering::SeqCst);
    }
}
