//! HomeBot library.
//!
//! Polls a Hue bridge for sensor state, derives motion events from presence
//! sensors and relays notifications and command replies to chat gateways.
//! Polling runs only while at least one consumer is subscribed to sensor
//! changes; the event bus drives that lifecycle.

pub mod bus;
pub mod command;
pub mod config;
pub mod error;
pub mod gateway;
pub mod hue;
pub mod motion;
pub mod poller;
pub mod speedtest;
