//! Deduplicating fetch cache.
//!
//! This is the one piece of shared machinery every source handler leans
//! on. Handlers fan out to dozens of detail-page fetches per list page,
//! and several handlers (or several concurrent runs of one handler) can
//! ask for the same URL at the same time. [`FetchCache::get_or_compute`]
//! guarantees that for any key there is at most one producer run in
//! flight, and at most one completed result within its TTL:
//!
//! 1. A live (non-expired) entry is returned immediately.
//! 2. A pending computation for the key is joined: the caller awaits the
//!    same shared channel instead of starting a second fetch.
//! 3. Otherwise the key is marked pending and the producer is spawned as
//!    a detached task. Marking happens under the same lock acquisition as
//!    the miss check, so two callers can never both decide to compute.
//!
//! Because the producer runs in a spawned task, a computation abandoned
//! by all of its callers still runs to completion and populates the
//! cache.
//!
//! Failures other than [`CacheError::NotFound`] are never cached: the
//! waiters coalesced on the computation all observe the error, and the
//! next request for that key retries from scratch.
//!
//! The cache is an explicit instance, constructed once at startup and
//! handed to handlers through their context. There is no module-level
//! singleton.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::Shared;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::CacheError;

/// Result of a cache lookup or computation.
///
/// Values are shared behind `Arc` so a hit is a pointer clone, and
/// `NotFound` doubles as the cached negative result.
pub type CacheEntry<V> = Result<Arc<V>, CacheError>;

type ComputationChannel<V> = Shared<oneshot::Receiver<CacheEntry<V>>>;

/// Per-call knobs for [`FetchCache::get_or_compute`].
#[derive(Debug, Clone, Copy)]
pub struct ComputeOptions {
    /// Override the cache-wide default TTL for this entry.
    pub ttl: Option<Duration>,
    /// Whether a `NotFound` producer result is cached for the TTL
    /// ("nothing here, do not retry this run") or treated as no entry.
    pub cache_not_found: bool,
}

impl Default for ComputeOptions {
    fn default() -> Self {
        Self {
            ttl: None,
            cache_not_found: true,
        }
    }
}

struct StoredEntry<V> {
    value: CacheEntry<V>,
    stored_at: Instant,
    ttl: Duration,
}

impl<V> StoredEntry<V> {
    fn is_fresh(&self) -> bool {
        self.stored_at.elapsed() < self.ttl
    }
}

/// The completed-entry map and the pending-computation table live behind
/// a single lock: the miss check and the pending insert must be one
/// critical section.
struct Tables<V> {
    entries: HashMap<String, StoredEntry<V>>,
    pending: HashMap<String, ComputationChannel<V>>,
}

/// A process-wide, key-addressed cache that deduplicates concurrent and
/// repeated computations of the same key.
///
/// Generic over the cached value type; the pipeline instantiates it with
/// [`crate::models::FeedValue`].
pub struct FetchCache<V> {
    default_ttl: Duration,
    max_entries: usize,
    tables: Arc<Mutex<Tables<V>>>,
}

impl<V> Clone for FetchCache<V> {
    fn clone(&self) -> Self {
        Self {
            default_ttl: self.default_ttl,
            max_entries: self.max_entries,
            tables: Arc::clone(&self.tables),
        }
    }
}

impl<V> FetchCache<V> {
    /// Create a cache with a default entry TTL and a bound on the number
    /// of completed entries.
    pub fn new(default_ttl: Duration, max_entries: usize) -> Self {
        Self {
            default_ttl,
            max_entries: max_entries.max(1),
            tables: Arc::new(Mutex::new(Tables {
                entries: HashMap::new(),
                pending: HashMap::new(),
            })),
        }
    }

    /// Number of completed entries currently stored (fresh or not).
    pub fn len(&self) -> usize {
        self.tables.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every completed entry. In-flight computations are unaffected
    /// and will still store their results.
    pub fn clear(&self) {
        self.tables.lock().entries.clear();
    }
}

impl<V: Send + Sync + 'static> FetchCache<V> {
    /// Return the cached value for `key`, or run `producer` to compute it.
    ///
    /// If another caller already triggered the producer for this key and
    /// it has not resolved yet, this call attaches to that computation
    /// instead of starting a second one; all coalesced callers receive
    /// the same value or the same error.
    ///
    /// # Errors
    ///
    /// - [`CacheError::InvalidKey`] for an empty key, without touching the
    ///   cache.
    /// - Whatever the producer failed with, propagated to every coalesced
    ///   caller and not cached (except `NotFound` under the default
    ///   negative-result policy).
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &str,
        producer: F,
        options: ComputeOptions,
    ) -> CacheEntry<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, CacheError>> + Send + 'static,
    {
        if key.is_empty() {
            return Err(CacheError::InvalidKey);
        }
        let ttl = options.ttl.unwrap_or(self.default_ttl);

        let channel = {
            let mut tables = self.tables.lock();

            if let Some(entry) = tables.entries.get(key) {
                if entry.is_fresh() {
                    trace!(key, "cache hit");
                    return entry.value.clone();
                }
                // Expired entries are treated as absent.
                tables.entries.remove(key);
            }

            if let Some(channel) = tables.pending.get(key) {
                debug!(key, "joining in-flight computation");
                channel.clone()
            } else {
                debug!(key, "cache miss; starting computation");
                let channel =
                    self.spawn_computation(key.to_string(), producer(), ttl, options.cache_not_found);
                tables.pending.insert(key.to_string(), channel.clone());
                channel
            }
        };

        match channel.await {
            Ok(entry) => entry,
            Err(oneshot::Canceled) => Err(CacheError::Canceled),
        }
    }

    /// Run the computation as a detached task and hand back a shareable
    /// channel for its result.
    ///
    /// The task removes the pending marker and stores the entry under one
    /// lock acquisition before releasing waiters, so a caller arriving
    /// after the send either finds the stored entry or a fresh miss,
    /// never a dangling pending marker.
    fn spawn_computation<Fut>(
        &self,
        key: String,
        computation: Fut,
        ttl: Duration,
        cache_not_found: bool,
    ) -> ComputationChannel<V>
    where
        Fut: Future<Output = Result<V, CacheError>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let tables = Arc::clone(&self.tables);
        let max_entries = self.max_entries;

        tokio::spawn(async move {
            let value: CacheEntry<V> = computation.await.map(Arc::new);

            let cacheable = match &value {
                Ok(_) => true,
                Err(CacheError::NotFound) => cache_not_found,
                Err(_) => false,
            };

            {
                let mut tables = tables.lock();
                tables.pending.remove(&key);
                if cacheable {
                    if tables.entries.len() >= max_entries {
                        evict(&mut tables.entries, max_entries);
                    }
                    tables.entries.insert(
                        key,
                        StoredEntry {
                            value: value.clone(),
                            stored_at: Instant::now(),
                            ttl,
                        },
                    );
                }
            }

            // Every waiter may have gone away; the result is stored either way.
            sender.send(value).ok();
        });

        receiver.shared()
    }
}

/// Make room for one more entry: drop expired entries first, then the
/// oldest by store time until under the bound.
fn evict<V>(entries: &mut HashMap<String, StoredEntry<V>>, max_entries: usize) {
    entries.retain(|_, entry| entry.is_fresh());

    while entries.len() >= max_entries {
        let oldest = entries
            .iter()
            .min_by_key(|(_, entry)| entry.stored_at)
            .map(|(key, _)| key.clone());
        match oldest {
            Some(key) => {
                debug!(key = %key, "evicting oldest cache entry");
                entries.remove(&key);
            }
            None => break,
        }
    }
}
