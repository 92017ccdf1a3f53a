//! Message gateways and the notification relay.
//!
//! Gateways own user-facing transport: the console for interactive use and a
//! Discord webhook for push notifications. The relay bridges the synchronous
//! event bus to the async gateway sends through a channel, so bus dispatch
//! never blocks on network I/O.

pub mod console;
pub mod discord;

pub use console::ConsoleGateway;
pub use discord::DiscordGateway;

use crate::bus::{EventBus, HomeEvent, SubscriptionHandle, Topic};
use crate::error::{HomeBotError, Result};
use async_trait::async_trait;
use log::warn;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Outbound message transport.
#[async_trait]
pub trait MsgGateway: Send + Sync {
    async fn send_message(&self, text: &str) -> Result<()>;
}

/// Render a bus event as notification text.
fn format_event(event: &HomeEvent) -> String {
    match event {
        HomeEvent::SensorChanged(reading) => {
            let state = serde_json::to_string_pretty(&reading.state)
                .unwrap_or_else(|_| "<unserializable state>".to_string());
            format!("**Sensor update** {}: ```json\n{}\n```", reading.name, state)
        }
        HomeEvent::Motion(reading) => format!("Motion detected by {}!", reading.name),
    }
}

/// Subscribe the gateways to bus notifications and spawn the relay task.
///
/// Motion events are always relayed; sensor-change events only when
/// `notify_sensor_changes` is set. The returned handles keep the
/// subscriptions (and thereby the poller) alive; drop them through
/// [`EventBus::unsubscribe`] to stop notifications.
pub fn spawn_notification_relay(
    bus: &EventBus,
    gateways: Vec<Arc<dyn MsgGateway>>,
    notify_sensor_changes: bool,
) -> (Vec<SubscriptionHandle>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<HomeEvent>();

    let mut handles = Vec::new();
    {
        let tx = tx.clone();
        handles.push(bus.subscribe(Topic::Motion, move |event| {
            tx.send(event.clone())
                .map_err(|e| HomeBotError::Handler(e.to_string()))
        }));
    }
    if notify_sensor_changes {
        handles.push(bus.subscribe(Topic::SensorChanged, move |event| {
            tx.send(event.clone())
                .map_err(|e| HomeBotError::Handler(e.to_string()))
        }));
    }

    let task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = format_event(&event);
            for gateway in &gateways {
                if let Err(e) = gateway.send_message(&text).await {
                    warn!("Notification delivery failed: {}", e);
                }
            }
        }
    });

    (handles, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hue::{SensorKind, SensorReading};
    use serde_json::json;

    fn reading(presence: bool) -> Arc<SensorReading> {
        let state = match json!({ "presence": presence }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        Arc::new(SensorReading {
            id: 7,
            name: "Hallway".to_string(),
            kind: SensorKind::Presence,
            state,
            last_updated: None,
        })
    }

    #[test]
    fn test_format_motion() {
        let text = format_event(&HomeEvent::Motion(reading(true)));
        assert_eq!(text, "Motion detected by Hallway!");
    }

    #[test]
    fn test_format_sensor_change() {
        let text = format_event(&HomeEvent::SensorChanged(reading(false)));
        assert!(text.starts_with("**Sensor update** Hallway:"));
        assert!(text.contains("\"presence\": false"));
    }

    #[tokio::test]
    async fn test_relay_forwards_motion_events() {
        use parking_lot::Mutex as PlMutex;

        struct Capture(Arc<PlMutex<Vec<String>>>);

        #[async_trait]
        impl MsgGateway for Capture {
            async fn send_message(&self, text: &str) -> crate::error::Result<()> {
                self.0.lock().push(text.to_string());
                Ok(())
            }
        }

        let bus = EventBus::new();
        let sent = Arc::new(PlMutex::new(Vec::new()));
        let gateway: Arc<dyn MsgGateway> = Arc::new(Capture(Arc::clone(&sent)));
        let (_handles, task) = spawn_notification_relay(&bus, vec![gateway], false);

        // Sensor changes are not relayed without the flag.
        bus.publish(HomeEvent::SensorChanged(reading(true)));
        bus.publish(HomeEvent::Motion(reading(true)));

        // Let the relay task drain the channel.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(*sent.lock(), vec!["Motion detected by Hallway!".to_string()]);
        task.abort();
    }
}
