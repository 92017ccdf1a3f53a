//! Publish-subscribe registry with reference-counted topics.
//!
//! Subscriber-count transitions (0→1, 1→0) are surfaced as explicit
//! lifecycle hooks; the sensor poller registers one on the sensor-changed
//! topic so polling runs only while somebody is listening.

use crate::error::Result;
use crate::hue::SensorReading;
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

/// Named event channel on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    SensorChanged,
    Motion,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::SensorChanged => write!(f, "sensorChanged"),
            Topic::Motion => write!(f, "motion"),
        }
    }
}

/// Event payload delivered to subscribers.
#[derive(Debug, Clone)]
pub enum HomeEvent {
    /// A tracked sensor's state changed since the last poll.
    SensorChanged(Arc<SensorReading>),
    /// A watched presence sensor reported motion while the alarm was armed.
    Motion(Arc<SensorReading>),
}

impl HomeEvent {
    pub fn topic(&self) -> Topic {
        match self {
            HomeEvent::SensorChanged(_) => Topic::SensorChanged,
            HomeEvent::Motion(_) => Topic::Motion,
        }
    }

    pub fn reading(&self) -> &Arc<SensorReading> {
        match self {
            HomeEvent::SensorChanged(reading) | HomeEvent::Motion(reading) => reading,
        }
    }
}

/// Subscriber callback. Runs synchronously during `publish`; failures are
/// logged and isolated from other subscribers.
pub type Handler = dyn Fn(&HomeEvent) -> Result<()> + Send + Sync;

/// Subscriber-count transition on a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicTransition {
    /// Count went 0→1.
    FirstSubscriber,
    /// Count went 1→0.
    Idle,
}

/// Hook invoked on count transitions, outside the registry lock.
pub type LifecycleHook = dyn Fn(TopicTransition) + Send + Sync;

/// Proof of subscription; pass back to [`EventBus::unsubscribe`].
#[derive(Debug)]
pub struct SubscriptionHandle {
    topic: Topic,
    id: u64,
}

impl SubscriptionHandle {
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

struct Subscriber {
    id: u64,
    handler: Arc<Handler>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: HashMap<Topic, Vec<Subscriber>>,
}

#[derive(Default)]
struct Dispatch {
    queue: VecDeque<HomeEvent>,
    active: bool,
}

/// Event bus shared by the poller, the motion detector and the gateways.
#[derive(Default)]
pub struct EventBus {
    registry: Mutex<Registry>,
    hooks: Mutex<HashMap<Topic, Arc<LifecycleHook>>>,
    dispatch: Mutex<Dispatch>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the lifecycle hook for a topic, replacing any previous one.
    pub fn set_lifecycle_hook<F>(&self, topic: Topic, hook: F)
    where
        F: Fn(TopicTransition) + Send + Sync + 'static,
    {
        self.hooks.lock().insert(topic, Arc::new(hook));
    }

    /// Register a handler on a topic. Handlers run in subscription order
    /// during `publish`.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionHandle
    where
        F: Fn(&HomeEvent) -> Result<()> + Send + Sync + 'static,
    {
        let (handle, first) = {
            let mut registry = self.registry.lock();
            registry.next_id += 1;
            let id = registry.next_id;
            let list = registry.subscribers.entry(topic).or_default();
            list.push(Subscriber {
                id,
                handler: Arc::new(handler),
            });
            (SubscriptionHandle { topic, id }, list.len() == 1)
        };

        debug!("Subscribed #{} to {}", handle.id, topic);
        if first {
            self.fire_hook(topic, TopicTransition::FirstSubscriber);
        }
        handle
    }

    /// Remove a subscription. The handle is consumed, so a subscription can
    /// only be released once.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        let now_idle = {
            let mut registry = self.registry.lock();
            match registry.subscribers.get_mut(&handle.topic) {
                Some(list) => {
                    let before = list.len();
                    list.retain(|sub| sub.id != handle.id);
                    before > list.len() && list.is_empty()
                }
                None => false,
            }
        };

        debug!("Unsubscribed #{} from {}", handle.id, handle.topic);
        if now_idle {
            self.fire_hook(handle.topic, TopicTransition::Idle);
        }
    }

    /// Active subscriber count on a topic.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.registry
            .lock()
            .subscribers
            .get(&topic)
            .map_or(0, Vec::len)
    }

    /// Deliver an event to every current subscriber of its topic, in
    /// subscription order. A failing handler is logged and skipped; delivery
    /// to the rest continues.
    ///
    /// A publish from inside a handler is queued and dispatched once the
    /// current event has been delivered to every subscriber, so no two
    /// dispatches interleave. The subscriber list is snapshotted per event;
    /// handlers may subscribe and unsubscribe re-entrantly.
    pub fn publish(&self, event: HomeEvent) {
        {
            let mut dispatch = self.dispatch.lock();
            dispatch.queue.push_back(event);
            if dispatch.active {
                // Someone further up the stack is already draining the queue.
                return;
            }
            dispatch.active = true;
        }

        loop {
            let next = {
                let mut dispatch = self.dispatch.lock();
                match dispatch.queue.pop_front() {
                    Some(event) => event,
                    None => {
                        dispatch.active = false;
                        return;
                    }
                }
            };
            self.deliver(&next);
        }
    }

    fn deliver(&self, event: &HomeEvent) {
        let topic = event.topic();
        let snapshot: Vec<(u64, Arc<Handler>)> = {
            let registry = self.registry.lock();
            registry
                .subscribers
                .get(&topic)
                .map(|list| {
                    list.iter()
                        .map(|sub| (sub.id, Arc::clone(&sub.handler)))
                        .collect()
                })
                .unwrap_or_default()
        };

        for (id, handler) in snapshot {
            if let Err(e) = handler(event) {
                warn!("Handler #{} on {} failed: {}", id, topic, e);
            }
        }
    }

    fn fire_hook(&self, topic: Topic, transition: TopicTransition) {
        let hook = self.hooks.lock().get(&topic).cloned();
        if let Some(hook) = hook {
            debug!("Topic {} transition: {:?}", topic, transition);
            hook(transition);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HomeBotError;
    use crate::hue::SensorKind;
    use parking_lot::Mutex as PlMutex;

    fn reading(id: u32) -> Arc<SensorReading> {
        Arc::new(SensorReading {
            id,
            name: format!("sensor-{}", id),
            kind: SensorKind::Presence,
            state: serde_json::Map::new(),
            last_updated: None,
        })
    }

    #[test]
    fn test_publish_in_subscription_order() {
        let bus = EventBus::new();
        let seen = Arc::new(PlMutex::new(Vec::new()));

        for label in ["a", "b", "c"] {
            let seen = Arc::clone(&seen);
            bus.subscribe(Topic::SensorChanged, move |_| {
                seen.lock().push(label);
                Ok(())
            });
        }

        bus.publish(HomeEvent::SensorChanged(reading(1)));
        assert_eq!(*seen.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_failing_handler_does_not_abort_delivery() {
        let bus = EventBus::new();
        let seen = Arc::new(PlMutex::new(Vec::new()));

        bus.subscribe(Topic::SensorChanged, |_| {
            Err(HomeBotError::Handler("boom".to_string()))
        });
        {
            let seen = Arc::clone(&seen);
            bus.subscribe(Topic::SensorChanged, move |_| {
                seen.lock().push("survivor");
                Ok(())
            });
        }

        bus.publish(HomeEvent::SensorChanged(reading(1)));
        assert_eq!(*seen.lock(), vec!["survivor"]);
    }

    #[test]
    fn test_lifecycle_transitions() {
        let bus = EventBus::new();
        let transitions = Arc::new(PlMutex::new(Vec::new()));
        {
            let transitions = Arc::clone(&transitions);
            bus.set_lifecycle_hook(Topic::SensorChanged, move |t| {
                transitions.lock().push(t);
            });
        }

        let first = bus.subscribe(Topic::SensorChanged, |_| Ok(()));
        let second = bus.subscribe(Topic::SensorChanged, |_| Ok(()));
        assert_eq!(bus.subscriber_count(Topic::SensorChanged), 2);
        // Only the 0→1 transition fires a hook.
        assert_eq!(*transitions.lock(), vec![TopicTransition::FirstSubscriber]);

        bus.unsubscribe(first);
        assert_eq!(transitions.lock().len(), 1);

        bus.unsubscribe(second);
        assert_eq!(
            *transitions.lock(),
            vec![TopicTransition::FirstSubscriber, TopicTransition::Idle]
        );
        assert_eq!(bus.subscriber_count(Topic::SensorChanged), 0);
    }

    #[test]
    fn test_topics_are_independent() {
        let bus = EventBus::new();
        let motion_seen = Arc::new(PlMutex::new(0usize));
        {
            let motion_seen = Arc::clone(&motion_seen);
            bus.subscribe(Topic::Motion, move |_| {
                *motion_seen.lock() += 1;
                Ok(())
            });
        }

        bus.publish(HomeEvent::SensorChanged(reading(1)));
        assert_eq!(*motion_seen.lock(), 0);

        bus.publish(HomeEvent::Motion(reading(1)));
        assert_eq!(*motion_seen.lock(), 1);
    }

    #[test]
    fn test_reentrant_publish_is_queued() {
        // The motion detector republishes from inside sensor-changed
        // dispatch; the nested event must be delivered only after the
        // current dispatch finishes.
        let bus = Arc::new(EventBus::new());
        let order = Arc::new(PlMutex::new(Vec::new()));

        {
            let bus2 = Arc::clone(&bus);
            let order = Arc::clone(&order);
            bus.subscribe(Topic::SensorChanged, move |event| {
                bus2.publish(HomeEvent::Motion(Arc::clone(event.reading())));
                order.lock().push("sensorChanged");
                Ok(())
            });
        }
        {
            let order = Arc::clone(&order);
            bus.subscribe(Topic::Motion, move |_| {
                order.lock().push("motion");
                Ok(())
            });
        }

        bus.publish(HomeEvent::SensorChanged(reading(4)));
        assert_eq!(*order.lock(), vec!["sensorChanged", "motion"]);
    }

    #[test]
    fn test_partial_unsubscribe_keeps_topic_live() {
        let bus = EventBus::new();
        let transitions = Arc::new(PlMutex::new(Vec::new()));
        {
            let transitions = Arc::clone(&transitions);
            bus.set_lifecycle_hook(Topic::SensorChanged, move |t| {
                transitions.lock().push(t);
            });
        }

        let handle = bus.subscribe(Topic::SensorChanged, |_| Ok(()));
        let keeper = bus.subscribe(Topic::SensorChanged, |_| Ok(()));
        bus.unsubscribe(handle);

        // Unsubscribing while a subscriber remains must not fire Idle.
        assert_eq!(*transitions.lock(), vec![TopicTransition::FirstSubscriber]);
        bus.unsubscribe(keeper);
        assert_eq!(transitions.lock().len(), 2);
    }
}
