//! Hue bridge data model and client interface.
//!
//! The bridge client is a stateless pass-through over the bridge REST API.
//! Callers own resilience decisions; this layer does no caching or retries.

pub mod client;

pub use client::HueClient;

use crate::error::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::{Map, Value};

/// Numeric sensor id as used by the Hue v1 REST API.
pub type SensorId = u32;

/// Sensor category derived from the bridge's `type` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Temperature,
    Presence,
    Other,
}

impl SensorKind {
    /// Map a Hue sensor type string (e.g. `ZLLPresence`, `ZLLTemperature`)
    /// to a kind.
    pub fn from_type_str(raw: &str) -> Self {
        let lower = raw.to_ascii_lowercase();
        if lower.contains("presence") {
            SensorKind::Presence
        } else if lower.contains("temperature") {
            SensorKind::Temperature
        } else {
            SensorKind::Other
        }
    }
}

/// Immutable snapshot of a sensor's state as reported by the bridge.
///
/// A new reading replaces, never mutates, the previous one in the poller's
/// cache.
#[derive(Debug, Clone)]
pub struct SensorReading {
    pub id: SensorId,
    pub name: String,
    pub kind: SensorKind,
    /// Raw state fields (`presence`, `temperature`, `buttonevent`, ...).
    pub state: Map<String, Value>,
    /// Bridge-reported `lastupdated` timestamp; `None` when the bridge
    /// reports `"none"` (sensor never updated).
    pub last_updated: Option<NaiveDateTime>,
}

impl SensorReading {
    /// True when the presence state field reports motion.
    pub fn presence(&self) -> bool {
        self.state
            .get("presence")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Temperature in degrees Celsius, if this reading carries one.
    /// The bridge reports hundredths of a degree.
    pub fn temperature_celsius(&self) -> Option<f64> {
        self.state
            .get("temperature")
            .and_then(Value::as_f64)
            .map(|t| t / 100.0)
    }
}

/// Bridge name and address, for status reporting.
#[derive(Debug, Clone)]
pub struct BridgeIdentity {
    pub name: String,
    pub address: String,
}

/// Request/response facade over the bridge network API.
#[async_trait]
pub trait BridgeClient: Send + Sync {
    /// Fetch a single sensor. Fails with `SensorNotFound` when the bridge no
    /// longer knows the id and `Connection` on transport failure.
    async fn get_sensor(&self, id: SensorId) -> Result<SensorReading>;

    /// Enumerate all sensors. Used for ad-hoc queries, not the polling path.
    async fn list_sensors(&self) -> Result<Vec<SensorReading>>;

    /// Bridge name and address.
    async fn identity(&self) -> Result<BridgeIdentity>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reading_with_state(state: Value) -> SensorReading {
        let state = match state {
            Value::Object(map) => map,
            _ => panic!("state must be an object"),
        };
        SensorReading {
            id: 1,
            name: "test".to_string(),
            kind: SensorKind::Other,
            state,
            last_updated: None,
        }
    }

    #[test]
    fn test_kind_from_type_str() {
        assert_eq!(
            SensorKind::from_type_str("ZLLPresence"),
            SensorKind::Presence
        );
        assert_eq!(
            SensorKind::from_type_str("ZLLTemperature"),
            SensorKind::Temperature
        );
        assert_eq!(
            SensorKind::from_type_str("CLIPGenericStatus"),
            SensorKind::Other
        );
        assert_eq!(SensorKind::from_type_str("Daylight"), SensorKind::Other);
    }

    #[test]
    fn test_presence_predicate() {
        assert!(reading_with_state(json!({"presence": true})).presence());
        assert!(!reading_with_state(json!({"presence": false})).presence());
        assert!(!reading_with_state(json!({"temperature": 2100})).presence());
        assert!(!reading_with_state(json!({"presence": "yes"})).presence());
    }

    #[test]
    fn test_temperature_scaling() {
        let reading = reading_with_state(json!({"temperature": 2154}));
        assert_eq!(reading.temperature_celsius(), Some(21.54));

        let reading = reading_with_state(json!({"presence": true}));
        assert_eq!(reading.temperature_celsius(), None);
    }
}
