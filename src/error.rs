use crate::hue::SensorId;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum HomeBotError {
    #[error("Sensor {0} not found on the bridge")]
    SensorNotFound(SensorId),

    #[error("Bridge connection failed: {0}")]
    Connection(String),

    #[error("Unexpected bridge response: {0}")]
    UnexpectedResponse(String),

    #[error("Event handler failed: {0}")]
    Handler(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Gateway send failed: {0}")]
    GatewaySend(String),

    #[error("Speed test failed: {0}")]
    SpeedTest(String),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HomeBotError>;
