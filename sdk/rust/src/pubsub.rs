//! Publish/Subscribe hub for subscriptions.
//!
//! Every subscription owns a bounded delivery queue, so a slow consumer
//! never blocks `publish` or other subscribers. When a queue is full the
//! configured [`OverflowPolicy`] applies. Within one topic a subscriber sees
//! events in publish order.
//!
//! ```
//! use arbor_sdk::pubsub::PubSubHub;
//! use serde_json::json;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let hub = PubSubHub::new();
//! let mut sub = hub.subscribe("COMMENT_ADDED", |event| {
//!     Ok(event["repoName"] == "arbor")
//! });
//!
//! hub.publish("COMMENT_ADDED", json!({"repoName": "other"}));
//! hub.publish("COMMENT_ADDED", json!({"repoName": "arbor"}));
//! assert_eq!(sub.next().await, Some(json!({"repoName": "arbor"})));
//! # });
//! ```

use futures::Stream;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use thiserror::Error;
use tokio::sync::Notify;

const DEFAULT_CAPACITY: usize = 256;

/// What happens when a subscriber's queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Discard the oldest queued event.
    #[default]
    DropOldest,
    /// Close the subscription; queued events stay readable.
    CloseSubscription,
}

/// Hub configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PubSubConfig {
    /// Per-subscriber queue capacity.
    pub queue_capacity: usize,
    /// Overflow handling.
    pub overflow: OverflowPolicy,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_CAPACITY,
            overflow: OverflowPolicy::default(),
        }
    }
}

impl PubSubConfig {
    /// Sets the queue capacity.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Sets the overflow policy.
    pub fn overflow(mut self, policy: OverflowPolicy) -> Self {
        self.overflow = policy;
        self
    }
}

/// A filter predicate failed on an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("subscription filter failed: {0}")]
pub struct FilterError(pub String);

impl FilterError {
    /// Creates a filter error.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A subscription filter.
pub type Filter = Arc<dyn Fn(&Value) -> Result<bool, FilterError> + Send + Sync>;

struct Queue {
    events: VecDeque<Value>,
    closed: bool,
}

struct Subscriber {
    id: u64,
    topic: String,
    filter: Option<Filter>,
    queue: Mutex<Queue>,
    notify: Notify,
    overflowed: AtomicU64,
}

impl Subscriber {
    fn accepts(&self, payload: &Value) -> bool {
        let Some(filter) = &self.filter else {
            return true;
        };
        match filter(payload) {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!(
                    topic = %self.topic,
                    subscriber = self.id,
                    error = %e,
                    "dropping event for subscriber"
                );
                false
            }
        }
    }

    /// Enqueues an event. Returns false if the subscription is closed,
    /// including when this delivery closed it.
    fn deliver(&self, payload: Value, config: &PubSubConfig) -> bool {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        if queue.closed {
            return false;
        }

        if queue.events.len() >= config.queue_capacity {
            let dropped = self.overflowed.fetch_add(1, Ordering::Relaxed) + 1;
            match config.overflow {
                OverflowPolicy::DropOldest => {
                    queue.events.pop_front();
                    tracing::warn!(
                        topic = %self.topic,
                        subscriber = self.id,
                        dropped,
                        "subscriber queue full, dropped oldest event"
                    );
                }
                OverflowPolicy::CloseSubscription => {
                    queue.closed = true;
                    drop(queue);
                    tracing::warn!(
                        topic = %self.topic,
                        subscriber = self.id,
                        "subscriber queue full, closing subscription"
                    );
                    self.notify.notify_one();
                    return false;
                }
            }
        }

        queue.events.push_back(payload);
        drop(queue);
        self.notify.notify_one();
        true
    }

    fn close(&self) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed = true;
        self.notify.notify_one();
    }
}

struct HubInner {
    config: PubSubConfig,
    topics: RwLock<FxHashMap<String, Vec<Arc<Subscriber>>>>,
    next_id: AtomicU64,
    shut_down: AtomicBool,
}

impl HubInner {
    fn deregister(&self, topic: &str, id: u64) {
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        let Some(subscribers) = topics.get_mut(topic) else {
            return;
        };
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        if subscribers.len() < before {
            tracing::debug!(topic, subscriber = id, "unsubscribed");
        }
        if subscribers.is_empty() {
            topics.remove(topic);
        }
    }
}

/// A topic-keyed event bus with per-subscriber filters.
///
/// Cloning yields another handle to the same hub.
#[derive(Clone)]
pub struct PubSubHub {
    inner: Arc<HubInner>,
}

impl Default for PubSubHub {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PubSubHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubSubHub")
            .field("config", &self.inner.config)
            .field("topics", &self.topic_count())
            .finish()
    }
}

impl PubSubHub {
    /// Creates a hub with the default configuration.
    pub fn new() -> Self {
        Self::with_config(PubSubConfig::default())
    }

    /// Creates a hub with the given per-subscriber queue capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_config(PubSubConfig::default().queue_capacity(capacity))
    }

    /// Creates a hub with configuration.
    pub fn with_config(config: PubSubConfig) -> Self {
        Self {
            inner: Arc::new(HubInner {
                config,
                topics: RwLock::new(FxHashMap::default()),
                next_id: AtomicU64::new(1),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &PubSubConfig {
        &self.inner.config
    }

    /// Publishes an event. Returns how many subscribers accepted it.
    ///
    /// Never waits on subscribers.
    pub fn publish(&self, topic: impl AsRef<str>, payload: Value) -> usize {
        let topic = topic.as_ref();
        let subscribers = {
            let topics = self.inner.topics.read().unwrap_or_else(PoisonError::into_inner);
            match topics.get(topic) {
                Some(subscribers) => subscribers.clone(),
                None => return 0,
            }
        };

        let mut accepted = 0;
        let mut closed = Vec::new();
        for subscriber in &subscribers {
            if !subscriber.accepts(&payload) {
                continue;
            }
            if subscriber.deliver(payload.clone(), &self.inner.config) {
                accepted += 1;
            } else {
                closed.push(subscriber.id);
            }
        }

        for id in closed {
            self.inner.deregister(topic, id);
        }

        tracing::trace!(topic, accepted, "published event");
        accepted
    }

    /// Subscribes to a topic with a filter.
    pub fn subscribe<F>(&self, topic: impl Into<String>, filter: F) -> Subscription
    where
        F: Fn(&Value) -> Result<bool, FilterError> + Send + Sync + 'static,
    {
        self.register(topic.into(), Some(Arc::new(filter)))
    }

    /// Subscribes to every event of a topic.
    pub fn subscribe_all(&self, topic: impl Into<String>) -> Subscription {
        self.register(topic.into(), None)
    }

    fn register(&self, topic: String, filter: Option<Filter>) -> Subscription {
        let subscriber = Arc::new(Subscriber {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            topic,
            filter,
            queue: Mutex::new(Queue {
                events: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
            overflowed: AtomicU64::new(0),
        });

        // Checked under the lock: `shutdown` sets the flag before draining.
        let mut topics = self.inner.topics.write().unwrap_or_else(PoisonError::into_inner);
        if self.inner.shut_down.load(Ordering::Acquire) {
            subscriber.close();
        } else {
            topics
                .entry(subscriber.topic.clone())
                .or_default()
                .push(Arc::clone(&subscriber));
            tracing::debug!(topic = %subscriber.topic, subscriber = subscriber.id, "subscribed");
        }
        drop(topics);

        Subscription {
            subscriber,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Returns the number of live subscriptions on a topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .map_or(0, Vec::len)
    }

    /// Returns the number of topics with live subscriptions.
    pub fn topic_count(&self) -> usize {
        self.inner
            .topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Closes every subscription and refuses new ones. Buffered events stay
    /// readable.
    pub fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::Release);
        let topics = std::mem::take(
            &mut *self.inner.topics.write().unwrap_or_else(PoisonError::into_inner),
        );

        let mut closed = 0;
        for subscriber in topics.into_values().flatten() {
            subscriber.close();
            closed += 1;
        }
        tracing::info!(subscriptions = closed, "pubsub hub shut down");
    }

    /// Returns true once [`PubSubHub::shutdown`] has been called.
    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }
}

/// A live subscription. Dropping it deregisters it from the hub.
pub struct Subscription {
    subscriber: Arc<Subscriber>,
    hub: Weak<HubInner>,
}

impl Subscription {
    /// Returns the topic.
    pub fn topic(&self) -> &str {
        &self.subscriber.topic
    }

    /// Waits for the next event. Returns `None` once the subscription is
    /// closed and drained.
    pub async fn next(&mut self) -> Option<Value> {
        loop {
            if let Some(event) = self.poll_queue() {
                return event;
            }
            self.subscriber.notify.notified().await;
        }
    }

    /// Returns a buffered event without waiting.
    pub fn try_next(&mut self) -> Option<Value> {
        self.poll_queue().flatten()
    }

    /// `Some(Some(event))` for a buffered event, `Some(None)` when closed
    /// and drained, `None` when nothing is available yet.
    fn poll_queue(&self) -> Option<Option<Value>> {
        let mut queue = self
            .subscriber
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match queue.events.pop_front() {
            Some(event) => Some(Some(event)),
            None if queue.closed => Some(None),
            None => None,
        }
    }

    /// Returns how many events overflowed this subscriber's queue.
    pub fn overflow_count(&self) -> u64 {
        self.subscriber.overflowed.load(Ordering::Relaxed)
    }

    /// Returns true if no further events will be delivered.
    pub fn is_closed(&self) -> bool {
        self.subscriber
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed
    }

    /// Closes the subscription and deregisters it.
    pub fn close(&mut self) {
        self.subscriber.close();
        if let Some(hub) = self.hub.upgrade() {
            hub.deregister(&self.subscriber.topic, self.subscriber.id);
        }
    }

    /// Converts into a stream of events.
    pub fn into_stream(self) -> impl Stream<Item = Value> + Send + 'static {
        futures::stream::unfold(self, |mut subscription| async move {
            let event = subscription.next().await?;
            Some((event, subscription))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.subscriber.topic)
            .field("id", &self.subscriber.id)
            .field("overflowed", &self.overflow_count())
            .finish()
    }
}

/// A typed view of one topic.
pub struct TypedTopic<T> {
    hub: PubSubHub,
    topic: String,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Clone for TypedTopic<T> {
    fn clone(&self) -> Self {
        Self {
            hub: self.hub.clone(),
            topic: self.topic.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned + Send + 'static> TypedTopic<T> {
    /// Creates a typed view of `topic`.
    pub fn new(hub: PubSubHub, topic: impl Into<String>) -> Self {
        Self {
            hub,
            topic: topic.into(),
            _phantom: PhantomData,
        }
    }

    /// Returns the topic name.
    pub fn name(&self) -> &str {
        &self.topic
    }

    /// Publishes an event. Events that fail to serialize are dropped.
    pub fn publish(&self, event: &T) -> usize {
        match serde_json::to_value(event) {
            Ok(value) => self.hub.publish(&self.topic, value),
            Err(e) => {
                tracing::warn!(topic = %self.topic, error = %e, "failed to serialize event");
                0
            }
        }
    }

    /// Subscribes with a typed filter. Events that do not deserialize into
    /// `T` fail the filter.
    pub fn subscribe<F>(&self, filter: F) -> Subscription
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.hub.subscribe(self.topic.clone(), move |value| {
            serde_json::from_value::<T>(value.clone())
                .map(|event| filter(&event))
                .map_err(|e| FilterError::new(e.to_string()))
        })
    }
}
