//! Outbound Discord notifications over a webhook.
//!
//! The webhook covers the notification channel without carrying a full
//! Discord client; interactive commands come in through the console gateway.

use super::MsgGateway;
use crate::error::{HomeBotError, Result};
use async_trait::async_trait;
use log::debug;
use serde_json::json;
use std::time::Duration;

pub struct DiscordGateway {
    http: reqwest::Client,
    webhook_url: String,
}

impl DiscordGateway {
    pub fn new(webhook_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| HomeBotError::GatewaySend(e.to_string()))?;

        Ok(Self {
            http,
            webhook_url: webhook_url.into(),
        })
    }
}

#[async_trait]
impl MsgGateway for DiscordGateway {
    async fn send_message(&self, text: &str) -> Result<()> {
        debug!("Posting {} chars to Discord webhook", text.len());
        let response = self
            .http
            .post(&self.webhook_url)
            .json(&json!({ "content": text }))
            .send()
            .await
            .map_err(|e| HomeBotError::GatewaySend(e.to_string()))?;

        if !response.status().is_success() {
            return Err(HomeBotError::GatewaySend(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
