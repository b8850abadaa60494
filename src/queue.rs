//! Bounded event queues and the per-actor queue pool
//!
//! A [`Queue`] is a fixed-capacity FIFO of [`Envelope`]s with a non-blocking
//! `try_put`, an async `get`, monotone counters and a fall-through toggle.
//! Queues start with fall-through *enabled*: a queue nobody connected sheds
//! overflow instead of wedging its producer. Connecting a queue turns the
//! mode off so backpressure reaches the producer.
//!
//! A [`QueuePool`] is the per-actor name → queue registry. Wiring two actors
//! together replaces the destination's slot with the source's queue, so both
//! ends share one buffer ("queue adoption").

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Notify;

use crate::domain::QueueCapacity;
use crate::event::Envelope;

/// Queues every actor is guaranteed to have.
pub const DEFAULT_QUEUES: [&str; 4] = ["logs", "metrics", "failed", "success"];

/// Error returned by [`Queue::try_put`], handing the rejected envelope back
/// to the producer so it can retry.
#[derive(Debug)]
pub enum TrySendError {
    /// The queue is at capacity and fall-through is off.
    Full(Envelope),
}

/// Monotone counters plus the current fill level of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub size: usize,
    pub in_total: u64,
    pub out_total: u64,
    pub dropped_total: u64,
}

impl QueueStats {
    /// Stat fields in the order they are emitted as metrics.
    pub fn fields(&self) -> [(&'static str, f64); 4] {
        [
            ("size", self.size as f64),
            ("in", self.in_total as f64),
            ("out", self.out_total as f64),
            ("dropped", self.dropped_total as f64),
        ]
    }
}

struct QueueInner {
    items: Mutex<VecDeque<Envelope>>,
    available: Notify,
    capacity: usize,
    fall_through: AtomicBool,
    consumer: AtomicBool,
    in_total: AtomicU64,
    out_total: AtomicU64,
    dropped_total: AtomicU64,
}

/// A bounded FIFO of envelopes between two actors. Cloning yields another
/// handle onto the same buffer.
#[derive(Clone)]
pub struct Queue(Arc<QueueInner>);

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("capacity", &self.0.capacity)
            .field("size", &self.size())
            .field("fall_through", &self.0.fall_through.load(Ordering::Relaxed))
            .finish()
    }
}

impl Queue {
    pub fn new(capacity: QueueCapacity) -> Self {
        Self(Arc::new(QueueInner {
            items: Mutex::new(VecDeque::new()),
            available: Notify::new(),
            capacity: capacity.into_inner(),
            fall_through: AtomicBool::new(true),
            consumer: AtomicBool::new(false),
            in_total: AtomicU64::new(0),
            out_total: AtomicU64::new(0),
            dropped_total: AtomicU64::new(0),
        }))
    }

    /// Whether both handles refer to the same underlying buffer.
    pub fn same_queue(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Enqueues `envelope` without blocking.
    ///
    /// At capacity: with fall-through on, the envelope is dropped and
    /// counted; with fall-through off, it is handed back via
    /// [`TrySendError::Full`].
    pub fn try_put(&self, envelope: Envelope) -> Result<(), TrySendError> {
        let mut items = self.0.items.lock().expect("queue lock");
        if items.len() < self.0.capacity {
            items.push_back(envelope);
            drop(items);
            self.0.in_total.fetch_add(1, Ordering::Relaxed);
            self.0.available.notify_one();
            Ok(())
        } else if self.0.fall_through.load(Ordering::Relaxed) {
            drop(items);
            self.0.dropped_total.fetch_add(1, Ordering::Relaxed);
            Ok(())
        } else {
            drop(items);
            Err(TrySendError::Full(envelope))
        }
    }

    /// Dequeues the next envelope, waiting until one is available.
    pub async fn get(&self) -> Envelope {
        self.0.consumer.store(true, Ordering::Relaxed);
        loop {
            // Register interest before checking so a put racing with the
            // check leaves a stored permit instead of a lost wake-up.
            let notified = self.0.available.notified();
            if let Some(envelope) = self.pop_front() {
                return envelope;
            }
            notified.await;
        }
    }

    /// Dequeues the next envelope if one is immediately available.
    pub fn try_get(&self) -> Option<Envelope> {
        self.pop_front()
    }

    fn pop_front(&self) -> Option<Envelope> {
        let mut items = self.0.items.lock().expect("queue lock");
        let envelope = items.pop_front();
        drop(items);
        if envelope.is_some() {
            self.0.out_total.fetch_add(1, Ordering::Relaxed);
        }
        envelope
    }

    pub fn size(&self) -> usize {
        self.0.items.lock().expect("queue lock").len()
    }

    pub fn capacity(&self) -> usize {
        self.0.capacity
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            size: self.size(),
            in_total: self.0.in_total.load(Ordering::Relaxed),
            out_total: self.0.out_total.load(Ordering::Relaxed),
            dropped_total: self.0.dropped_total.load(Ordering::Relaxed),
        }
    }

    pub fn enable_fall_through(&self) {
        self.0.fall_through.store(true, Ordering::Relaxed);
    }

    pub fn disable_fall_through(&self) {
        self.0.fall_through.store(false, Ordering::Relaxed);
    }

    pub fn fall_through(&self) -> bool {
        self.0.fall_through.load(Ordering::Relaxed)
    }

    /// Whether some task ever started consuming this queue.
    pub fn has_consumer(&self) -> bool {
        self.0.consumer.load(Ordering::Relaxed)
    }
}

/// Per-actor named registry of queues.
pub struct QueuePool {
    queues: DashMap<String, Queue>,
    capacity: QueueCapacity,
}

impl QueuePool {
    /// Creates the pool with the standard queues already in place.
    pub fn new(capacity: QueueCapacity) -> Self {
        let pool = Self {
            queues: DashMap::new(),
            capacity,
        };
        for name in DEFAULT_QUEUES {
            pool.create_queue(name);
        }
        pool
    }

    /// Returns the queue named `name`, creating it when missing. Safe against
    /// concurrent creation of the same name.
    pub fn create_queue(&self, name: &str) -> Queue {
        self.queues
            .entry(name.to_string())
            .or_insert_with(|| Queue::new(self.capacity))
            .value()
            .clone()
    }

    pub fn has_queue(&self, name: &str) -> bool {
        self.queues.contains_key(name)
    }

    pub fn get_queue(&self, name: &str) -> Option<Queue> {
        self.queues.get(name).map(|q| q.value().clone())
    }

    /// Queue names, sorted for stable iteration.
    pub fn list_queues(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Queue names the module declared beyond the standard set.
    pub fn list_custom_queues(&self) -> Vec<String> {
        self.list_queues()
            .into_iter()
            .filter(|name| !DEFAULT_QUEUES.contains(&name.as_str()))
            .collect()
    }

    /// Replaces the slot `name` with `queue`. This is the adoption half of
    /// connecting two actors.
    pub fn adopt(&self, name: &str, queue: Queue) {
        self.queues.insert(name.to_string(), queue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use serde_json::json;

    fn capacity(n: usize) -> QueueCapacity {
        QueueCapacity::try_new(n).unwrap()
    }

    fn envelope(data: &str) -> Envelope {
        Event::new(json!(data)).into()
    }

    #[test]
    fn put_respects_capacity() {
        let queue = Queue::new(capacity(2));
        queue.disable_fall_through();
        queue.try_put(envelope("a")).unwrap();
        queue.try_put(envelope("b")).unwrap();
        assert!(matches!(
            queue.try_put(envelope("c")),
            Err(TrySendError::Full(_))
        ));
        assert_eq!(queue.size(), 2);
    }

    #[test]
    fn fall_through_drops_and_counts() {
        let queue = Queue::new(capacity(1));
        queue.try_put(envelope("a")).unwrap();
        queue.try_put(envelope("b")).unwrap();
        queue.try_put(envelope("c")).unwrap();
        let stats = queue.stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.in_total, 1);
        assert_eq!(stats.dropped_total, 2);
    }

    #[tokio::test]
    async fn get_preserves_fifo_order() {
        let queue = Queue::new(capacity(10));
        for label in ["one", "two", "three"] {
            queue.try_put(envelope(label)).unwrap();
        }
        for label in ["one", "two", "three"] {
            let envelope = queue.get().await;
            let event = envelope.as_event().unwrap();
            assert_eq!(event.get("data").unwrap(), json!(label));
        }
        assert_eq!(queue.stats().out_total, 3);
    }

    #[tokio::test]
    async fn get_wakes_on_put() {
        let queue = Queue::new(capacity(1));
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        };
        tokio::task::yield_now().await;
        queue.try_put(envelope("late")).unwrap();
        let envelope = waiter.await.unwrap();
        assert!(envelope.as_event().is_some());
        assert!(queue.has_consumer());
    }

    #[test]
    fn pool_creates_standard_queues() {
        let pool = QueuePool::new(capacity(5));
        for name in DEFAULT_QUEUES {
            assert!(pool.has_queue(name), "missing {name}");
        }
        assert!(pool.list_custom_queues().is_empty());
        pool.create_queue("inbox");
        assert_eq!(pool.list_custom_queues(), vec!["inbox".to_string()]);
    }

    #[test]
    fn adoption_shares_one_buffer() {
        let source = QueuePool::new(capacity(5));
        let destination = QueuePool::new(capacity(5));
        source.create_queue("outbox");
        destination.create_queue("inbox");

        let shared = source.get_queue("outbox").unwrap();
        destination.adopt("inbox", shared.clone());

        shared.try_put(envelope("x")).unwrap();
        assert_eq!(destination.get_queue("inbox").unwrap().size(), 1);
        assert!(destination
            .get_queue("inbox")
            .unwrap()
            .same_queue(&source.get_queue("outbox").unwrap()));
    }
}
