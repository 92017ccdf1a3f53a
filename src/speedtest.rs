//! Download speed measurement against the fast.com API.
//!
//! Fetches target URLs with the configured token, downloads them and
//! reports the aggregate throughput in Mbit/s.

use crate::config::SpeedTestConfig;
use crate::error::{HomeBotError, Result};
use log::{debug, info};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

const API_URL: &str = "https://api.fast.com/netflix/speedtest/v2";

#[derive(Debug, Deserialize)]
struct TargetList {
    targets: Vec<Target>,
}

#[derive(Debug, Deserialize)]
struct Target {
    url: String,
}

pub struct SpeedTest {
    http: reqwest::Client,
    token: String,
    url_count: u8,
    running: AtomicBool,
}

impl SpeedTest {
    /// Returns `None` when no fast.com token is configured.
    pub fn from_config(config: &SpeedTestConfig) -> Result<Option<Self>> {
        let token = match &config.token {
            Some(token) => token.clone(),
            None => return Ok(None),
        };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| HomeBotError::Connection(e.to_string()))?;

        Ok(Some(Self {
            http,
            token,
            url_count: config.url_count,
            running: AtomicBool::new(false),
        }))
    }

    /// Run one measurement and format the result. Only one test runs at a
    /// time; a concurrent request is rejected with an error reply.
    pub async fn run(&self) -> Result<String> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(HomeBotError::SpeedTest(
                "a speed test is already running".to_string(),
            ));
        }
        let result = self.measure().await;
        self.running.store(false, Ordering::SeqCst);
        result.map(|mbps| format!("Download: {:.2} Mbps", mbps))
    }

    async fn measure(&self) -> Result<f64> {
        let targets = self.fetch_targets().await?;
        if targets.is_empty() {
            return Err(HomeBotError::SpeedTest(
                "fast.com returned no targets".to_string(),
            ));
        }

        info!("Running speed test against {} targets", targets.len());
        let start = Instant::now();
        let mut total_bytes = 0usize;
        for url in &targets {
            debug!("Downloading {}", url);
            let bytes = self
                .http
                .get(url)
                .send()
                .await
                .map_err(|e| HomeBotError::SpeedTest(e.to_string()))?
                .bytes()
                .await
                .map_err(|e| HomeBotError::SpeedTest(e.to_string()))?;
            total_bytes += bytes.len();
        }

        let elapsed = start.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return Err(HomeBotError::SpeedTest("measurement too short".to_string()));
        }
        Ok(mbps(total_bytes, elapsed))
    }

    async fn fetch_targets(&self) -> Result<Vec<String>> {
        let list: TargetList = self
            .http
            .get(API_URL)
            .query(&[
                ("https", "true".to_string()),
                ("token", self.token.clone()),
                ("urlCount", self.url_count.to_string()),
            ])
            .send()
            .await
            .map_err(|e| HomeBotError::SpeedTest(e.to_string()))?
            .json()
            .await
            .map_err(|e| HomeBotError::SpeedTest(e.to_string()))?;

        Ok(list.targets.into_iter().map(|t| t.url).collect())
    }
}

fn mbps(bytes: usize, seconds: f64) -> f64 {
    (bytes as f64 * 8.0) / (seconds * 1_000_000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mbps_conversion() {
        // 1 MB in 1 s is 8 Mbit/s.
        assert_eq!(mbps(1_000_000, 1.0), 8.0);
        assert_eq!(mbps(2_500_000, 2.0), 10.0);
    }

    #[test]
    fn test_target_list_decoding() {
        let body = r#"{"client":{"ip":"1.2.3.4"},"targets":[
            {"name":"a","url":"https://example.net/speedtest/a"},
            {"name":"b","url":"https://example.net/speedtest/b"}
        ]}"#;
        let list: TargetList = serde_json::from_str(body).unwrap();
        assert_eq!(list.targets.len(), 2);
        assert_eq!(list.targets[0].url, "https://example.net/speedtest/a");
    }
}
