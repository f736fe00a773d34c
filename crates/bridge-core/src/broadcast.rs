//! Event fan-out to subscribed sessions.
//!
//! Every subscription owns a bounded [`EventQueue`]. Publishing never blocks:
//! the broadcaster snapshots matching subscriptions under a read lock,
//! releases it, then pushes into each queue. A full queue evicts its oldest
//! entry, so one slow consumer never stalls the others.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures::stream::{self, BoxStream, StreamExt};
use metrics::counter;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::event::Event;
use crate::ids::{SessionId, SubscriptionId};

/// Result of pushing into an [`EventQueue`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    /// Appended without eviction.
    Queued,
    /// Appended after evicting the oldest entry.
    DroppedOldest,
    /// Queue is closed; event discarded.
    Closed,
}

/// Bounded single-consumer queue with drop-oldest overflow.
pub struct EventQueue {
    items: Mutex<VecDeque<Arc<Event>>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl EventQueue {
    /// Create a queue holding at most `capacity` events (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Append an event, evicting the oldest one when full.
    pub fn push(&self, event: Arc<Event>) -> PushOutcome {
        if self.is_closed() {
            return PushOutcome::Closed;
        }
        let evicted = {
            let mut items = self.items.lock();
            let evicted = if items.len() >= self.capacity {
                let _ = items.pop_front();
                true
            } else {
                false
            };
            items.push_back(event);
            evicted
        };
        self.notify.notify_one();
        if evicted {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            PushOutcome::DroppedOldest
        } else {
            PushOutcome::Queued
        }
    }

    /// Pop the oldest event without waiting.
    pub fn try_recv(&self) -> Option<Arc<Event>> {
        if self.is_closed() {
            return None;
        }
        self.items.lock().pop_front()
    }

    /// Wait for the next event. Returns `None` once the queue is closed;
    /// anything still buffered at that point is discarded.
    pub async fn recv(&self) -> Option<Arc<Event>> {
        loop {
            if self.is_closed() {
                return None;
            }
            if let Some(event) = self.items.lock().pop_front() {
                return Some(event);
            }
            self.notify.notified().await;
        }
    }

    /// Close the queue and wake the consumer.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.items.lock().clear();
        self.notify.notify_one();
        self.notify.notify_waiters();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of buffered events.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of buffered events.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events evicted by overflow so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// One registered interest in a set of event types.
pub struct Subscription {
    id: SubscriptionId,
    session_id: SessionId,
    event_types: RwLock<BTreeSet<String>>,
    queue: EventQueue,
}

impl Subscription {
    fn new(session_id: SessionId, event_types: BTreeSet<String>, capacity: usize) -> Self {
        Self {
            id: SubscriptionId::new(),
            session_id,
            event_types: RwLock::new(event_types),
            queue: EventQueue::new(capacity),
        }
    }

    /// Subscription ID.
    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    /// Owning session.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Current event types, sorted.
    pub fn event_types(&self) -> Vec<String> {
        self.event_types.read().iter().cloned().collect()
    }

    /// Whether events of `event_type` are delivered here.
    pub fn matches(&self, event_type: &str) -> bool {
        self.event_types.read().contains(event_type)
    }

    /// Add event types. Already-present types are ignored.
    pub fn add_event_types<I, S>(&self, types: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = self.event_types.write();
        for t in types {
            let _ = set.insert(t.into());
        }
    }

    /// Remove event types. Unknown types are ignored.
    pub fn remove_event_types<I, S>(&self, types: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = self.event_types.write();
        for t in types {
            let _ = set.remove(t.as_ref());
        }
    }

    /// The delivery queue.
    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }
}

type SessionSubscriptions = HashMap<SubscriptionId, Arc<Subscription>>;

/// Fan-out of published events to subscriptions.
pub struct EventBroadcaster {
    subscribers: RwLock<HashMap<SessionId, SessionSubscriptions>>,
    queue_capacity: usize,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl EventBroadcaster {
    /// Create a broadcaster whose per-subscription queues hold
    /// `queue_capacity` events.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Register a new subscription for `session_id`.
    ///
    /// The caller owns the returned handle; it stays in the fan-out list until
    /// [`unregister`](Self::unregister) or [`deregister`](Self::deregister).
    pub fn register<I, S>(&self, session_id: &SessionId, event_types: I) -> Arc<Subscription>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let types: BTreeSet<String> = event_types.into_iter().map(Into::into).collect();
        let sub = Arc::new(Subscription::new(
            session_id.clone(),
            types,
            self.queue_capacity,
        ));
        let _ = self
            .subscribers
            .write()
            .entry(session_id.clone())
            .or_default()
            .insert(sub.id().clone(), Arc::clone(&sub));
        debug!(
            session_id = %session_id,
            subscription_id = %sub.id(),
            event_types = ?sub.event_types(),
            "subscription registered"
        );
        sub
    }

    /// Register a subscription wrapped in a guard that unregisters on drop.
    pub fn subscribe<I, S>(self: &Arc<Self>, session_id: &SessionId, event_types: I) -> SubscriptionGuard
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let subscription = self.register(session_id, event_types);
        SubscriptionGuard {
            broadcaster: Arc::clone(self),
            subscription,
            on_release: None,
        }
    }

    /// Remove one subscription and close its queue. Returns whether it existed.
    pub fn unregister(&self, session_id: &SessionId, subscription_id: &SubscriptionId) -> bool {
        let removed = {
            let mut map = self.subscribers.write();
            let removed = map
                .get_mut(session_id)
                .and_then(|subs| subs.remove(subscription_id));
            if map.get(session_id).is_some_and(HashMap::is_empty) {
                let _ = map.remove(session_id);
            }
            removed
        };
        match removed {
            Some(sub) => {
                sub.queue().close();
                debug!(session_id = %session_id, subscription_id = %subscription_id, "subscription removed");
                true
            }
            None => false,
        }
    }

    /// Remove every subscription of `session_id`, closing their queues.
    /// Returns how many were removed.
    pub fn deregister(&self, session_id: &SessionId) -> usize {
        let removed = self.subscribers.write().remove(session_id);
        let Some(subs) = removed else {
            return 0;
        };
        for sub in subs.values() {
            sub.queue().close();
        }
        debug!(session_id = %session_id, count = subs.len(), "session deregistered from broadcaster");
        subs.len()
    }

    /// Deliver `event` to every subscription matching its type.
    ///
    /// Returns the number of subscriptions it was queued on.
    pub fn publish(&self, event: Event) -> usize {
        let event = Arc::new(event);
        let targets: Vec<Arc<Subscription>> = {
            let map = self.subscribers.read();
            map.values()
                .flat_map(HashMap::values)
                .filter(|s| s.matches(event.event_type()))
                .cloned()
                .collect()
        };

        let _ = self.published.fetch_add(1, Ordering::Relaxed);
        counter!("bridge_events_published_total").increment(1);

        let mut delivered = 0;
        for sub in &targets {
            match sub.queue().push(Arc::clone(&event)) {
                PushOutcome::Queued => delivered += 1,
                PushOutcome::DroppedOldest => {
                    delivered += 1;
                    let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                    counter!("bridge_events_dropped_total").increment(1);
                    trace!(
                        session_id = %sub.session_id(),
                        subscription_id = %sub.id(),
                        dropped = sub.queue().dropped(),
                        "queue full, dropped oldest event"
                    );
                }
                PushOutcome::Closed => {}
            }
        }
        trace!(event_type = event.event_type(), delivered, "event published");
        delivered
    }

    /// Number of sessions with at least one subscription.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Total number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscribers.read().values().map(HashMap::len).sum()
    }

    /// Whether `session_id` has any subscription.
    pub fn is_registered(&self, session_id: &SessionId) -> bool {
        self.subscribers.read().contains_key(session_id)
    }

    /// Subscriptions held by `session_id`.
    pub fn session_subscriptions(&self, session_id: &SessionId) -> Vec<Arc<Subscription>> {
        self.subscribers
            .read()
            .get(session_id)
            .map(|subs| subs.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Per-subscription queue bound.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Events published since creation.
    pub fn published_total(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Events evicted by overflow across all subscriptions.
    pub fn dropped_total(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Callback run once a guarded subscription has been unregistered.
pub type ReleaseHook = Box<dyn FnOnce(&Subscription) + Send + Sync>;

/// Owns one subscription for the duration of a stream.
///
/// Dropping the guard unregisters the subscription, whatever ended the
/// stream (completion, client cancel or error), then runs the release hook.
pub struct SubscriptionGuard {
    broadcaster: Arc<EventBroadcaster>,
    subscription: Arc<Subscription>,
    on_release: Option<ReleaseHook>,
}

impl SubscriptionGuard {
    /// Run `hook` after the subscription is unregistered on drop.
    #[must_use]
    pub fn on_release(mut self, hook: impl FnOnce(&Subscription) + Send + Sync + 'static) -> Self {
        self.on_release = Some(Box::new(hook));
        self
    }

    /// The guarded subscription.
    pub fn subscription(&self) -> &Arc<Subscription> {
        &self.subscription
    }

    /// Wait for the next event; `None` once the subscription is closed.
    pub async fn next(&self) -> Option<Arc<Event>> {
        self.subscription.queue().recv().await
    }

    /// Turn the guard into a stream that ends when the subscription closes.
    pub fn into_stream(self) -> BoxStream<'static, Arc<Event>> {
        stream::unfold(self, |guard| async move {
            let event = guard.next().await?;
            Some((event, guard))
        })
        .boxed()
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        let _ = self
            .broadcaster
            .unregister(self.subscription.session_id(), self.subscription.id());
        if let Some(hook) = self.on_release.take() {
            hook(&self.subscription);
        }
    }
}
