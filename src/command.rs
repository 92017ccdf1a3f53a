//! Chat command dispatch.
//!
//! Gateways hand incoming command lines to [`CommandHandler::handle`] and
//! send the returned reply back to the user. Command failures become reply
//! text, never process faults.

use crate::hue::{BridgeClient, SensorKind, SensorReading};
use crate::motion::MotionDetector;
use crate::poller::SensorPoller;
use crate::speedtest::SpeedTest;
use log::debug;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const GREETING: &str = "Hi, I'm HomeBot! Available commands: `stop`, `status`, `speedtest`, `hue`";

pub struct CommandHandler {
    bridge: Arc<dyn BridgeClient>,
    poller: Arc<SensorPoller>,
    motion: Arc<MotionDetector>,
    speedtest: Option<Arc<SpeedTest>>,
    prefix: String,
    shutdown: CancellationToken,
}

impl CommandHandler {
    pub fn new(
        bridge: Arc<dyn BridgeClient>,
        poller: Arc<SensorPoller>,
        motion: Arc<MotionDetector>,
        speedtest: Option<Arc<SpeedTest>>,
        prefix: String,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            bridge,
            poller,
            motion,
            speedtest,
            prefix,
            shutdown,
        }
    }

    /// Dispatch one command line and produce the reply text. The command
    /// prefix is optional, so `!status` and `status` behave the same.
    pub async fn handle(&self, input: &str) -> String {
        let input = input.strip_prefix(&self.prefix).unwrap_or(input);
        let args: Vec<&str> = input.split_whitespace().collect();
        debug!("Command: {:?}", args);

        match args.first() {
            None => GREETING.to_string(),
            Some(&"stop") => {
                self.shutdown.cancel();
                "Shutting down...".to_string()
            }
            Some(&"status") => self.status_msg().await,
            Some(&"speedtest") => self.run_speedtest().await,
            Some(&"hue") => self.handle_hue(&args[1..]).await,
            Some(_) => "Unknown command.".to_string(),
        }
    }

    async fn handle_hue(&self, args: &[&str]) -> String {
        match args.first() {
            None => format!(
                "{}\nAvailable commands: sensor, togglealarm, temperature",
                self.status_msg().await
            ),
            Some(&"sensor") => {
                let id = match args.get(1).and_then(|raw| raw.parse().ok()) {
                    Some(id) => id,
                    None => return "Usage: hue sensor <id>".to_string(),
                };
                match self.bridge.get_sensor(id).await {
                    Ok(reading) => format_reading(&reading),
                    Err(e) => format!("Error while getting sensor data: {}", e),
                }
            }
            Some(&"togglealarm") => {
                let enabled = self.motion.toggle();
                format!(
                    "{} motion alarm!",
                    if enabled { "Enabled" } else { "Disabled" }
                )
            }
            Some(&"temperature") => match self.bridge.list_sensors().await {
                Ok(readings) => format_temperatures(&readings),
                Err(e) => format!("Error while getting temperature readings: {}", e),
            },
            Some(_) => "Unknown hue command.".to_string(),
        }
    }

    async fn status_msg(&self) -> String {
        let identity = match self.bridge.identity().await {
            Ok(identity) => identity,
            Err(e) => return format!("Error while getting bridge status: {}", e),
        };
        format!(
            "Connected to Hue Bridge: {} :: {}\nMotion alarm: {}. Polling: {} ({} tracked sensors).",
            identity.name,
            identity.address,
            if self.motion.is_enabled() {
                "enabled"
            } else {
                "disabled"
            },
            if self.poller.is_running() {
                "running"
            } else {
                "idle"
            },
            self.poller.tracked_ids().len(),
        )
    }

    async fn run_speedtest(&self) -> String {
        match &self.speedtest {
            Some(speedtest) => match speedtest.run().await {
                Ok(report) => report,
                Err(e) => format!("Error while running speed test: {}", e),
            },
            None => "No fast.com token configured.".to_string(),
        }
    }
}

fn format_reading(reading: &SensorReading) -> String {
    let value = json!({
        "id": reading.id,
        "name": &reading.name,
        "state": &reading.state,
        "lastupdated": reading
            .last_updated
            .map(|ts| ts.format("%Y-%m-%dT%H:%M:%S").to_string()),
    });
    serde_json::to_string_pretty(&value)
        .unwrap_or_else(|_| "Error while serializing sensor data.".to_string())
}

fn format_temperatures(readings: &[SensorReading]) -> String {
    let mut lines: Vec<String> = readings
        .iter()
        .filter(|r| r.kind == SensorKind::Temperature)
        .filter_map(|r| {
            r.temperature_celsius()
                .map(|celsius| format!("{}: {:.1} °C", r.name, celsius))
        })
        .collect();

    if lines.is_empty() {
        return "No temperature sensors found.".to_string();
    }
    lines.sort();
    lines.join("\n")
}
