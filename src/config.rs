use crate::error::{HomeBotError, Result};
use crate::hue::SensorId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Load environment variables from a .env file next to the binary.
/// Real environment variables take precedence over file entries.
pub fn load_dotenv() {
    let env_path = Path::new(".env");
    if !env_path.exists() {
        return;
    }

    let content = match fs::read_to_string(env_path) {
        Ok(c) => c,
        Err(_) => return,
    };

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some((key, raw)) = line.split_once('=') {
            let key = key.trim();
            let mut value = raw.trim();
            if (value.starts_with('"') && value.ends_with('"') && value.len() >= 2)
                || (value.starts_with('\'') && value.ends_with('\'') && value.len() >= 2)
            {
                value = &value[1..value.len() - 1];
            }
            if std::env::var(key).is_err() {
                std::env::set_var(key, value);
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub hue: HueConfig,
    pub poller: PollerConfig,
    pub motion: MotionConfig,
    pub gateway: GatewayConfig,
    pub speedtest: SpeedTestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HueConfig {
    /// Bridge host or IP. Pairing/discovery is out of scope, so "auto" from
    /// the old setups is rejected by `validate`.
    pub host: String,
    /// Application key provisioned on the bridge.
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    pub poll_interval_ms: u64,
    /// Sensor ids polled while at least one consumer is subscribed.
    pub tracked_sensors: Vec<SensorId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionConfig {
    /// Initial motion-alarm state; toggled at runtime via chat command.
    pub enabled: bool,
    pub watched_sensors: Vec<SensorId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub command_prefix: String,
    /// Outbound Discord webhook for notifications, if configured.
    pub discord_webhook_url: Option<String>,
    /// Relay every sensor change to the gateways, not just motion alarms.
    pub notify_sensor_changes: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeedTestConfig {
    /// fast.com API token; the speedtest command is disabled without one.
    pub token: Option<String>,
    pub url_count: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hue: HueConfig {
                host: String::new(),
                username: String::new(),
            },
            poller: PollerConfig {
                poll_interval_ms: 2000,
                tracked_sensors: vec![],
            },
            motion: MotionConfig {
                enabled: false,
                watched_sensors: vec![],
            },
            gateway: GatewayConfig {
                command_prefix: "!".to_string(),
                discord_webhook_url: None,
                notify_sensor_changes: false,
            },
            speedtest: SpeedTestConfig {
                token: None,
                url_count: 5,
            },
        }
    }
}

fn parse_id_list(raw: &str) -> Vec<SensorId> {
    raw.split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("HUE_HOST") {
            config.hue.host = host;
        }
        if let Ok(username) = std::env::var("HUE_USERNAME") {
            config.hue.username = username;
        }
        if let Ok(interval) = std::env::var("POLL_INTERVAL_MS") {
            if let Ok(ms) = interval.parse() {
                config.poller.poll_interval_ms = ms;
            }
        }
        if let Ok(ids) = std::env::var("TRACKED_SENSORS") {
            config.poller.tracked_sensors = parse_id_list(&ids);
        }
        if let Ok(enabled) = std::env::var("MOTION_ALARM_ENABLED") {
            config.motion.enabled = matches!(enabled.as_str(), "1" | "true" | "yes");
        }
        if let Ok(ids) = std::env::var("MOTION_SENSORS") {
            config.motion.watched_sensors = parse_id_list(&ids);
        }
        if let Ok(prefix) = std::env::var("COMMAND_PREFIX") {
            config.gateway.command_prefix = prefix;
        }
        if let Ok(url) = std::env::var("DISCORD_WEBHOOK_URL") {
            config.gateway.discord_webhook_url = Some(url);
        }
        if let Ok(notify) = std::env::var("NOTIFY_SENSOR_CHANGES") {
            config.gateway.notify_sensor_changes = matches!(notify.as_str(), "1" | "true" | "yes");
        }
        if let Ok(token) = std::env::var("FAST_TOKEN") {
            config.speedtest.token = Some(token);
        }
        if let Ok(count) = std::env::var("FAST_URL_COUNT") {
            if let Ok(n) = count.parse() {
                config.speedtest.url_count = n;
            }
        }

        config
    }

    /// Surface missing required fields at startup rather than at first use.
    pub fn validate(&self) -> Result<()> {
        if self.hue.host.is_empty() || self.hue.host == "auto" {
            return Err(HomeBotError::InvalidConfig(
                "HUE_HOST must be set to the bridge address".to_string(),
            ));
        }
        if self.hue.username.is_empty() {
            return Err(HomeBotError::InvalidConfig(
                "HUE_USERNAME must be set to a provisioned application key".to_string(),
            ));
        }
        if self.poller.poll_interval_ms == 0 {
            return Err(HomeBotError::InvalidConfig(
                "POLL_INTERVAL_MS must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.poller.poll_interval_ms, 2000);
        assert!(config.poller.tracked_sensors.is_empty());
        assert!(!config.motion.enabled);
        assert_eq!(config.gateway.command_prefix, "!");
    }

    #[test]
    fn test_parse_id_list() {
        assert_eq!(parse_id_list("1,2,3"), vec![1, 2, 3]);
        assert_eq!(parse_id_list(" 4 , 7 "), vec![4, 7]);
        assert_eq!(parse_id_list("4,bogus,9"), vec![4, 9]);
        assert!(parse_id_list("").is_empty());
    }

    #[test]
    fn test_validate_rejects_missing_host() {
        let config = Config::default();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.hue.host = "auto".to_string();
        config.hue.username = "key".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_complete_config() {
        let mut config = Config::default();
        config.hue.host = "192.168.1.2".to_string();
        config.hue.username = "key".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.hue.host = "192.168.1.2".to_string();
        config.hue.username = "key".to_string();
        config.poller.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }
}
