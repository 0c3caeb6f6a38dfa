//! Per-key deduplicating, rate-limited work queue.
//!
//! Keys are `{kind, name}` pairs identifying a Node or ClusterCIDR that needs
//! a sync pass. Adding a key that is already queued or in-flight is a no-op;
//! adding a key that is currently being processed marks it dirty so it is
//! re-queued the moment processing finishes, rather than lost.

use ccalloc_core::WatchKind;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

const BASE_BACKOFF: Duration = Duration::from_secs(5);
const MAX_BACKOFF: Duration = Duration::from_secs(1000);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueKey {
    pub kind: WatchKind,
    pub name: String,
}

impl QueueKey {
    pub fn node(name: impl Into<String>) -> Self {
        Self {
            kind: WatchKind::Node,
            name: name.into(),
        }
    }

    pub fn cluster_cidr(name: impl Into<String>) -> Self {
        Self {
            kind: WatchKind::ClusterCidr,
            name: name.into(),
        }
    }
}

struct Inner {
    queue: VecDeque<QueueKey>,
    queued: HashSet<QueueKey>,
    processing: HashSet<QueueKey>,
    dirty: HashSet<QueueKey>,
    attempts: HashMap<QueueKey, u32>,
}

/// FIFO queue with per-key dedup and exponential-backoff requeue, shared
/// across worker tasks via `Arc`.
pub struct WorkQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                queued: HashSet::new(),
                processing: HashSet::new(),
                dirty: HashSet::new(),
                attempts: HashMap::new(),
            }),
            notify: Notify::new(),
        }
    }

    /// Enqueue `key` immediately unless it is already queued, or mark it
    /// dirty if a worker is currently processing it.
    pub async fn add(&self, key: QueueKey) {
        let mut inner = self.inner.lock().await;
        if inner.processing.contains(&key) {
            inner.dirty.insert(key);
            return;
        }
        if inner.queued.insert(key.clone()) {
            inner.queue.push_back(key);
            drop(inner);
            self.notify.notify_one();
        }
    }

    /// Block until a key is available or `cancel` fires; returns `None` on
    /// cancellation.
    pub async fn get(&self, cancel: &CancellationToken) -> Option<QueueKey> {
        loop {
            {
                let mut inner = self.inner.lock().await;
                if let Some(key) = inner.queue.pop_front() {
                    inner.queued.remove(&key);
                    inner.processing.insert(key.clone());
                    return Some(key);
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = self.notify.notified() => {}
            }
        }
    }

    /// Mark `key` finished. If it was marked dirty while processing,
    /// re-queue it immediately; the retry-count is left untouched so a
    /// dirty-requeue does not reset backoff state.
    pub async fn done(&self, key: &QueueKey) {
        let mut inner = self.inner.lock().await;
        inner.processing.remove(key);
        if inner.dirty.remove(key) && inner.queued.insert(key.clone()) {
            inner.queue.push_back(key.clone());
            drop(inner);
            self.notify.notify_one();
        }
    }

    /// Reset the retry counter for `key` after a successful sync.
    pub async fn forget(&self, key: &QueueKey) {
        self.inner.lock().await.attempts.remove(key);
    }

    /// Re-queue `key` after `backoff_for(key)`'s delay and bump its retry
    /// counter (5s base, 1000s cap).
    pub async fn requeue_rate_limited(self: &std::sync::Arc<Self>, key: QueueKey) {
        let delay = {
            let mut inner = self.inner.lock().await;
            let attempt = inner.attempts.entry(key.clone()).or_insert(0);
            *attempt += 1;
            backoff_for(*attempt)
        };
        let this = self.clone();
        tokio::spawn(async move {
            sleep(delay).await;
            this.add(key).await;
        });
    }
}

fn backoff_for(attempt: u32) -> Duration {
    let factor = 1u64 << attempt.min(32).saturating_sub(1).min(20);
    let scaled = BASE_BACKOFF.saturating_mul(factor as u32);
    scaled.min(MAX_BACKOFF)
}
