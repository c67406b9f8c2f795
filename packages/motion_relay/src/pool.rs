//! Publish/subscribe fan-out with bounded per-subscriber queues.
//!
//! Every subscriber owns a queue of `capacity` values. Publishing never
//! waits on a subscriber: pushing into a full queue evicts that queue's
//! oldest value and bumps its `dropped` counter. For live camera state a
//! stale value is worth less than the newest one.
//!
//! The subscriber set is locked for the whole of an [`BroadcastPool::update`]
//! pass, so publishes are totally ordered and a subscriber joining or leaving
//! mid-publish either gets the whole value or none of it.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::Notify;
use tracing::{debug, trace};
use uuid::Uuid;

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

struct Queue<T> {
    state: Mutex<QueueState<T>>,
    notify: Notify,
    dropped: AtomicU64,
}

impl<T> Queue<T> {
    fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, value: T, capacity: usize) {
        {
            let mut state = self.state();
            if state.closed {
                return;
            }
            if state.items.len() >= capacity {
                state.items.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            state.items.push_back(value);
        }
        // Stores a permit if the consumer is not waiting yet
        self.notify.notify_one();
    }

    fn close(&self) {
        {
            let mut state = self.state();
            state.closed = true;
            state.items.clear();
        }
        self.notify.notify_one();
    }

    fn try_pop(&self) -> Result<Option<T>, Closed> {
        let mut state = self.state();
        match state.items.pop_front() {
            Some(value) => Ok(Some(value)),
            None if state.closed => Err(Closed),
            None => Ok(None),
        }
    }

    async fn pop(&self) -> Option<T> {
        loop {
            match self.try_pop() {
                Ok(Some(value)) => return Some(value),
                Ok(None) => self.notify.notified().await,
                Err(Closed) => return None,
            }
        }
    }
}

struct Closed;

struct PoolInner<T> {
    capacity: usize,
    subscribers: Mutex<HashMap<String, Arc<Queue<T>>>>,
}

impl<T> PoolInner<T> {
    fn subscribers(&self) -> MutexGuard<'_, HashMap<String, Arc<Queue<T>>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remove(&self, id: &str) -> bool {
        match self.subscribers().remove(id) {
            Some(queue) => {
                queue.close();
                debug!(subscriber = %id, "Subscriber removed");
                true
            }
            None => false,
        }
    }
}

/// A fan-out hub delivering each published value to every current subscriber
pub struct BroadcastPool<T> {
    inner: Arc<PoolInner<T>>,
}

impl<T> Clone for BroadcastPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> BroadcastPool<T> {
    /// `capacity` is the per-subscriber queue length (at least 1)
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                capacity: capacity.max(1),
                subscribers: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of live subscribers
    pub fn len(&self) -> usize {
        self.inner.subscribers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a pull-style subscriber. Dropping it unsubscribes.
    pub fn subscribe(&self) -> Subscription<T> {
        let id = Uuid::new_v4().to_string();
        let queue = Arc::new(Queue::new(self.inner.capacity));
        self.inner.subscribers().insert(id.clone(), queue.clone());
        debug!(subscriber = %id, "Subscriber added");
        Subscription {
            id,
            queue,
            pool: Arc::downgrade(&self.inner),
        }
    }

    /// Register a push-style subscriber.
    ///
    /// A dispatcher task calls `handler` with every value, one at a time in
    /// publish order. Returning `ControlFlow::Break` deletes the subscription.
    pub fn create<F, Fut>(&self, mut handler: F) -> SubscriptionHandle<T>
    where
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let subscription = self.subscribe();
        let handle = subscription.handle();
        tokio::spawn(async move {
            while let Some(value) = subscription.recv().await {
                if handler(value).await.is_break() {
                    trace!(subscriber = %subscription.id(), "Handler asked to unsubscribe");
                    break;
                }
            }
            // subscription drops here and unregisters
        });
        handle
    }

    /// Publish `value` to every current subscriber; returns how many got it
    pub fn update(&self, value: T) -> usize {
        let subscribers = self.inner.subscribers();
        for queue in subscribers.values() {
            queue.push(value.clone(), self.inner.capacity);
        }
        subscribers.len()
    }

    /// Remove a subscriber by id; false if it was already gone
    pub fn delete(&self, id: &str) -> bool {
        self.inner.remove(id)
    }

    /// Values evicted from all current subscribers' queues
    pub fn dropped_total(&self) -> u64 {
        self.inner
            .subscribers()
            .values()
            .map(|q| q.dropped.load(Ordering::Relaxed))
            .sum()
    }
}

/// One subscriber's receiving end
pub struct Subscription<T> {
    id: String,
    queue: Arc<Queue<T>>,
    pool: Weak<PoolInner<T>>,
}

impl<T> Subscription<T> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the next value. `None` once deleted from the pool.
    pub async fn recv(&self) -> Option<T> {
        self.queue.pop().await
    }

    /// Next queued value without waiting
    pub fn try_recv(&self) -> Option<T> {
        self.queue.try_pop().ok().flatten()
    }

    /// Values evicted from this queue because it was full
    pub fn dropped(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }

    /// A detachable handle that can delete this subscription
    pub fn handle(&self) -> SubscriptionHandle<T> {
        SubscriptionHandle {
            id: self.id.clone(),
            queue: self.queue.clone(),
            pool: self.pool.clone(),
        }
    }

    /// Unregister now; later updates are not delivered
    pub fn delete(self) {
        // Drop does the work
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.upgrade() {
            pool.remove(&self.id);
        }
    }
}

/// Remote control for a subscription whose receiving end lives elsewhere
pub struct SubscriptionHandle<T> {
    id: String,
    queue: Arc<Queue<T>>,
    pool: Weak<PoolInner<T>>,
}

impl<T> Clone for SubscriptionHandle<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            queue: self.queue.clone(),
            pool: self.pool.clone(),
        }
    }
}

impl<T> SubscriptionHandle<T> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dropped(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }

    /// Still registered with the pool
    pub fn is_active(&self) -> bool {
        self.pool
            .upgrade()
            .is_some_and(|pool| pool.subscribers().contains_key(&self.id))
    }

    /// Unregister the subscription. Returns false if it was already gone.
    pub fn delete(&self) -> bool {
        match self.pool.upgrade() {
            Some(pool) => pool.remove(&self.id),
            None => false,
        }
    }
}
