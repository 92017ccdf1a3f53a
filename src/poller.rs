//! Periodic sensor polling with subscription-driven lifecycle.
//!
//! The poller queries the bridge for every tracked sensor, de-duplicates
//! unchanged readings against a last-seen cache and publishes change events.
//! It runs only while the sensor-changed topic has at least one subscriber;
//! the event bus drives `start_if_needed`/`stop_if_idle` through its
//! lifecycle hook.

use crate::bus::{EventBus, HomeEvent, Topic, TopicTransition};
use crate::config::PollerConfig;
use crate::error::HomeBotError;
use crate::hue::{BridgeClient, SensorId, SensorReading};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

struct PollTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct PollerState {
    tracked: BTreeSet<SensorId>,
    /// Last-seen reading per tracked id. An id appears here only after its
    /// first successful poll; this map is written by the poller alone.
    cache: HashMap<SensorId, Arc<SensorReading>>,
    task: Option<PollTask>,
}

pub struct SensorPoller {
    client: Arc<dyn BridgeClient>,
    bus: Arc<EventBus>,
    poll_interval: Duration,
    state: Mutex<PollerState>,
    /// Self-reference handed to the poll task and the bus hook.
    weak: Weak<SensorPoller>,
}

impl SensorPoller {
    pub fn new(
        client: Arc<dyn BridgeClient>,
        bus: Arc<EventBus>,
        config: &PollerConfig,
    ) -> Arc<Self> {
        let state = PollerState {
            tracked: config.tracked_sensors.iter().copied().collect(),
            ..PollerState::default()
        };

        Arc::new_cyclic(|weak| Self {
            client,
            bus,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            state: Mutex::new(state),
            weak: weak.clone(),
        })
    }

    /// Wire this poller to the bus so that the sensor-changed topic's
    /// subscriber count drives polling. The hook holds only a weak
    /// reference; a dropped poller leaves it inert.
    pub fn attach_to_bus(&self) {
        let weak = self.weak.clone();
        self.bus
            .set_lifecycle_hook(Topic::SensorChanged, move |transition| {
                if let Some(poller) = weak.upgrade() {
                    match transition {
                        TopicTransition::FirstSubscriber => poller.start_if_needed(),
                        TopicTransition::Idle => poller.stop_if_idle(),
                    }
                }
            });
    }

    /// Start tracking a sensor id. Idempotent; the cache entry appears only
    /// after the first successful poll.
    pub fn track(&self, id: SensorId) {
        if self.state.lock().tracked.insert(id) {
            debug!("Tracking sensor {}", id);
        }
    }

    pub fn tracked_ids(&self) -> Vec<SensorId> {
        self.state.lock().tracked.iter().copied().collect()
    }

    /// Last-seen reading for a sensor, for staleness inspection.
    pub fn cached(&self, id: SensorId) -> Option<Arc<SensorReading>> {
        self.state.lock().cache.get(&id).cloned()
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().task.is_some()
    }

    /// Begin polling. No-op while a poll task is already running.
    pub fn start_if_needed(&self) {
        let poller = match self.weak.upgrade() {
            Some(poller) => poller,
            None => return,
        };
        let mut state = self.state.lock();
        if state.task.is_some() {
            return;
        }

        info!(
            "Starting sensor polling every {}ms",
            self.poll_interval.as_millis()
        );
        let token = CancellationToken::new();
        let child = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(poller.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                // Runs to completion before the next tick can fire; a
                // cancellation mid-poll takes effect at the loop head.
                poller.poll_once().await;
            }
            debug!("Poll loop exited");
        });

        state.task = Some(PollTask { token, handle });
    }

    /// Stop polling, but only if the sensor-changed topic really has no
    /// subscribers left. The pending tick is cancelled; an in-flight poll
    /// pass finishes first.
    pub fn stop_if_idle(&self) {
        if self.bus.subscriber_count(Topic::SensorChanged) > 0 {
            return;
        }
        if let Some(task) = self.state.lock().task.take() {
            info!("No sensor subscribers left, stopping polling");
            task.token.cancel();
        }
    }

    /// Deterministic shutdown for process exit: cancel and wait for the poll
    /// task to finish its in-flight pass.
    pub async fn shutdown(&self) {
        let task = self.state.lock().task.take();
        if let Some(task) = task {
            task.token.cancel();
            if let Err(e) = task.handle.await {
                warn!("Poll task ended abnormally: {}", e);
            }
        }
    }

    /// One poll pass over every tracked sensor. Per-id failures never block
    /// the remaining ids in the same pass.
    async fn poll_once(&self) {
        let ids: Vec<SensorId> = self.state.lock().tracked.iter().copied().collect();

        for id in ids {
            match self.client.get_sensor(id).await {
                Ok(reading) => self.apply_reading(reading),
                Err(HomeBotError::SensorNotFound(_)) => {
                    warn!("Sensor {} no longer exists on the bridge, untracking", id);
                    let mut state = self.state.lock();
                    state.tracked.remove(&id);
                    state.cache.remove(&id);
                }
                Err(e) => {
                    // Transient or malformed response; retry next tick.
                    debug!("Polling sensor {} failed, retrying next tick: {}", id, e);
                }
            }
        }
    }

    /// Compare a fresh reading against the cache; publish only on change.
    fn apply_reading(&self, reading: SensorReading) {
        let reading = Arc::new(reading);
        let changed = {
            let mut state = self.state.lock();
            if !state.tracked.contains(&reading.id) {
                // Untracked while the fetch was in flight.
                return;
            }
            match state.cache.get(&reading.id) {
                Some(prev) if prev.last_updated == reading.last_updated => false,
                _ => {
                    state.cache.insert(reading.id, Arc::clone(&reading));
                    true
                }
            }
        };

        if changed {
            debug!(
                "Sensor {} ({}) changed at {:?}",
                reading.id, reading.name, reading.last_updated
            );
            self.bus.publish(HomeEvent::SensorChanged(reading));
        }
    }
}
