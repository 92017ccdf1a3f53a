//! HTTP client for the Hue bridge REST API.

use super::{BridgeIdentity, SensorId, SensorKind, SensorReading};
use crate::config::HueConfig;
use crate::error::{HomeBotError, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use log::debug;
use serde_json::Value;
use std::time::Duration;

/// Hue error type for "resource not available".
const HUE_ERROR_NOT_FOUND: u64 = 3;

const LAST_UPDATED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Bridge client backed by the Hue v1 REST API.
///
/// Authentication/pairing is not handled here; the application key in
/// [`HueConfig`] is assumed to be provisioned on the bridge already.
pub struct HueClient {
    http: reqwest::Client,
    base_url: String,
}

impl HueClient {
    pub fn new(config: &HueConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| HomeBotError::Connection(e.to_string()))?;

        Ok(Self {
            http,
            base_url: format!("http://{}/api/{}", config.host, config.username),
        })
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| HomeBotError::Connection(e.to_string()))?;

        response
            .json()
            .await
            .map_err(|e| HomeBotError::Connection(e.to_string()))
    }
}

#[async_trait]
impl super::BridgeClient for HueClient {
    async fn get_sensor(&self, id: SensorId) -> Result<SensorReading> {
        let body = self.get_json(&format!("/sensors/{}", id)).await?;
        if let Some(error_type) = error_type(&body) {
            if error_type == HUE_ERROR_NOT_FOUND {
                return Err(HomeBotError::SensorNotFound(id));
            }
            return Err(HomeBotError::UnexpectedResponse(format!(
                "bridge error type {} for sensor {}",
                error_type, id
            )));
        }
        parse_sensor(id, &body)
    }

    async fn list_sensors(&self) -> Result<Vec<SensorReading>> {
        let body = self.get_json("/sensors").await?;
        let map = body.as_object().ok_or_else(|| {
            HomeBotError::UnexpectedResponse("sensor listing is not an object".to_string())
        })?;

        let mut readings = Vec::with_capacity(map.len());
        for (raw_id, sensor) in map {
            let id: SensorId = match raw_id.parse() {
                Ok(id) => id,
                // The bridge should only hand out numeric ids; skip anything else.
                Err(_) => continue,
            };
            readings.push(parse_sensor(id, sensor)?);
        }
        readings.sort_by_key(|r| r.id);
        Ok(readings)
    }

    async fn identity(&self) -> Result<BridgeIdentity> {
        let body = self.get_json("/config").await?;
        let name = body
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                HomeBotError::UnexpectedResponse("bridge config missing name".to_string())
            })?
            .to_string();
        let address = body
            .get("ipaddress")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(BridgeIdentity { name, address })
    }
}

/// Extract the Hue error type from an error envelope
/// (`[{"error": {"type": 3, ...}}]`), if the body is one.
fn error_type(body: &Value) -> Option<u64> {
    body.as_array()?
        .first()?
        .get("error")?
        .get("type")?
        .as_u64()
}

/// Decode one sensor object from the bridge into a [`SensorReading`].
fn parse_sensor(id: SensorId, body: &Value) -> Result<SensorReading> {
    let obj = body.as_object().ok_or_else(|| {
        HomeBotError::UnexpectedResponse(format!("sensor {} payload is not an object", id))
    })?;

    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("unnamed")
        .to_string();
    let kind = obj
        .get("type")
        .and_then(Value::as_str)
        .map(SensorKind::from_type_str)
        .unwrap_or(SensorKind::Other);

    let mut state = obj
        .get("state")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    // `lastupdated` lives inside the state object; lift it out so the state
    // map holds only the physical fields.
    let last_updated = match state.remove("lastupdated") {
        Some(Value::String(raw)) if raw != "none" => {
            Some(NaiveDateTime::parse_from_str(&raw, LAST_UPDATED_FORMAT).map_err(|e| {
                HomeBotError::UnexpectedResponse(format!(
                    "sensor {} has malformed lastupdated {:?}: {}",
                    id, raw, e
                ))
            })?)
        }
        _ => None,
    };

    Ok(SensorReading {
        id,
        name,
        kind,
        state,
        last_updated,
    })
}
