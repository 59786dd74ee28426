// Performance Optimizer
//
// Response cache plus request batching in front of the provider layer.
// Identical in-flight requests collapse onto the cache; queued work is
// drained in small batches by a single background task.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{join_all, BoxFuture};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::{oneshot, Mutex};

use crate::services::ai::error::{AiError, AiResult};

/// Cached responses live this long
const CACHE_TTL: Duration = Duration::from_secs(300);

/// Cache entry ceiling; oldest insertions are evicted first
const CACHE_CAPACITY: usize = 100;

/// Requests drained per batch
const MAX_BATCH: usize = 3;

/// Pause between batches while the queue is non-empty
const REDRAIN_DELAY: Duration = Duration::from_millis(100);

/// Deferred provider call; built by the caller, run by the drain task
pub type RequestHandler = Box<dyn FnOnce() -> BoxFuture<'static, AiResult<Value>> + Send>;

struct QueuedRequest {
    cache_key: String,
    handler: RequestHandler,
    reply: oneshot::Sender<AiResult<Value>>,
}

struct CacheEntry {
    value: Value,
    inserted_at: Instant,
}

/// TTL-on-read cache with insertion-order eviction
struct CacheStore {
    ttl: Duration,
    capacity: usize,
    entries: HashMap<String, CacheEntry>,
    insertion_order: VecDeque<String>,
}

impl CacheStore {
    fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity,
            entries: HashMap::new(),
            insertion_order: VecDeque::new(),
        }
    }

    fn get_at(&mut self, key: &str, now: Instant) -> Option<Value> {
        match self.entries.get(key) {
            Some(entry) if now.duration_since(entry.inserted_at) < self.ttl => {
                Some(entry.value.clone())
            }
            Some(_) => {
                self.entries.remove(key);
                self.insertion_order.retain(|k| k != key);
                None
            }
            None => None,
        }
    }

    fn insert_at(&mut self, key: String, value: Value, now: Instant) {
        if self.entries.insert(key.clone(), CacheEntry { value, inserted_at: now }).is_none() {
            self.insertion_order.push_back(key);
        }
        while self.entries.len() > self.capacity {
            let Some(oldest) = self.insertion_order.pop_front() else { break };
            self.entries.remove(&oldest);
        }
    }
}

struct OptimizerInner {
    cache: Mutex<CacheStore>,
    queue: Mutex<VecDeque<QueuedRequest>>,
    is_processing: AtomicBool,
}

#[derive(Clone)]
pub struct PerformanceOptimizer {
    inner: Arc<OptimizerInner>,
}

impl Default for PerformanceOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceOptimizer {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(OptimizerInner {
                cache: Mutex::new(CacheStore::new(CACHE_TTL, CACHE_CAPACITY)),
                queue: Mutex::new(VecDeque::new()),
                is_processing: AtomicBool::new(false),
            }),
        }
    }

    /// Run a request through the cache and batch queue. On a cache hit the
    /// handler never runs; otherwise the request is queued and resolved by
    /// the drain task.
    pub async fn optimize_request(
        &self,
        request_type: &str,
        content: &str,
        provider: &str,
        handler: RequestHandler,
    ) -> AiResult<Value> {
        let key = cache_key(request_type, content, provider);

        {
            let mut cache = self.inner.cache.lock().await;
            if let Some(value) = cache.get_at(&key, Instant::now()) {
                log::debug!("Cache hit for {request_type} request");
                return Ok(value);
            }
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut queue = self.inner.queue.lock().await;
            queue.push_back(QueuedRequest {
                cache_key: key,
                handler,
                reply: tx,
            });
        }
        self.schedule_drain();

        rx.await
            .map_err(|_| AiError::Provider("request dropped before completion".to_string()))?
    }

    /// Spawn the drain task unless one is already running
    fn schedule_drain(&self) {
        if self
            .inner
            .is_processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let optimizer = self.clone();
            tokio::spawn(async move {
                optimizer.drain().await;
            });
        }
    }

    async fn drain(&self) {
        loop {
            let batch: Vec<QueuedRequest> = {
                let mut queue = self.inner.queue.lock().await;
                let take = queue.len().min(MAX_BATCH);
                queue.drain(..take).collect()
            };
            if batch.is_empty() {
                break;
            }

            join_all(batch.into_iter().map(|request| async move {
                let result = (request.handler)().await;
                if let Ok(ref value) = result {
                    let mut cache = self.inner.cache.lock().await;
                    cache.insert_at(request.cache_key.clone(), value.clone(), Instant::now());
                }
                // Receiver may have given up; nothing to do then
                let _ = request.reply.send(result);
            }))
            .await;

            let queue_empty = self.inner.queue.lock().await.is_empty();
            if queue_empty {
                break;
            }
            tokio::time::sleep(REDRAIN_DELAY).await;
        }

        self.inner.is_processing.store(false, Ordering::SeqCst);
        // A request enqueued after the final empty check would otherwise stall
        if !self.inner.queue.lock().await.is_empty() {
            self.schedule_drain();
        }
    }

    /// Current cache entry count; expired entries still count until read
    pub async fn cached_entries(&self) -> usize {
        self.inner.cache.lock().await.entries.len()
    }
}

/// Stable cache key over the request identity fields
pub fn cache_key(request_type: &str, content: &str, provider: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request_type.as_bytes());
    hasher.update(b"\n");
    hasher.update(content.as_bytes());
    hasher.update(b"\n");
    hasher.update(provider.as_bytes());
    format!("{:x}", hasher.finalize())
}
