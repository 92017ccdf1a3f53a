//! Motion alarm derived from presence sensor changes.
//!
//! While enabled, the detector holds its own subscription on the
//! sensor-changed topic (which keeps the poller alive) and republishes
//! presence readings from watched sensors as motion events.

use crate::bus::{EventBus, HomeEvent, SubscriptionHandle, Topic};
use crate::config::MotionConfig;
use crate::hue::SensorId;
use log::info;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::{Arc, Weak};

#[derive(Default)]
struct DetectorState {
    subscription: Option<SubscriptionHandle>,
}

pub struct MotionDetector {
    bus: Arc<EventBus>,
    watched: HashSet<SensorId>,
    state: Mutex<DetectorState>,
    weak: Weak<MotionDetector>,
}

impl MotionDetector {
    pub fn new(bus: Arc<EventBus>, config: &MotionConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            bus,
            watched: config.watched_sensors.iter().copied().collect(),
            state: Mutex::new(DetectorState::default()),
            weak: weak.clone(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().subscription.is_some()
    }

    /// Enable or disable the motion alarm. Enabling subscribes to sensor
    /// changes (starting the poller if it was idle); disabling unsubscribes
    /// (stopping the poller if nothing else listens). Setting the current
    /// state again is a no-op, so the subscription can never double up.
    pub fn set_enabled(&self, enabled: bool) {
        let mut state = self.state.lock();
        match (enabled, state.subscription.is_some()) {
            (true, false) => {
                let weak = self.weak.clone();
                let handle = self.bus.subscribe(Topic::SensorChanged, move |event| {
                    if let Some(detector) = weak.upgrade() {
                        detector.on_sensor_changed(event);
                    }
                    Ok(())
                });
                state.subscription = Some(handle);
                info!("Motion alarm enabled ({} watched sensors)", self.watched.len());
            }
            (false, true) => {
                if let Some(handle) = state.subscription.take() {
                    self.bus.unsubscribe(handle);
                }
                info!("Motion alarm disabled");
            }
            _ => {}
        }
    }

    /// Flip the alarm and return the new state (chat `togglealarm` command).
    pub fn toggle(&self) -> bool {
        let target = !self.is_enabled();
        self.set_enabled(target);
        target
    }

    fn on_sensor_changed(&self, event: &HomeEvent) {
        // Disabled detectors should not be subscribed at all; treat a stray
        // delivery as a no-op.
        if !self.is_enabled() {
            return;
        }
        let reading = event.reading();
        if !self.watched.contains(&reading.id) {
            return;
        }
        if reading.presence() {
            info!("Motion detected by sensor {} ({})", reading.id, reading.name);
            self.bus.publish(HomeEvent::Motion(Arc::clone(reading)));
        }
    }
}
