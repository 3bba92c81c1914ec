//! Periodic pings that keep an external worker (and the tick endpoint behind
//! it) from going idle.

use reqwest::Client;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

use super::retry::RetryPolicy;
use crate::version::user_agent;

const PING_TIMEOUT: Duration = Duration::from_secs(10);

pub struct KeepAlive {
    client: Client,
    urls: Vec<String>,
    retry: RetryPolicy,
}

impl KeepAlive {
    pub fn new(urls: Vec<String>, retry: RetryPolicy) -> Self {
        let client = Client::builder()
            .user_agent(user_agent())
            .timeout(PING_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build keep-alive client, using defaults.");
                Client::new()
            });
        Self { client, urls, retry }
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    async fn ping(&self, url: &str) -> Result<u16, String> {
        let response = self.client.get(url).send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if status.is_success() {
            Ok(status.as_u16())
        } else {
            Err(format!("HTTP {status}"))
        }
    }

    /// Pings every URL once, retrying each within the policy's budget.
    /// Returns how many URLs answered.
    pub async fn ping_once(&self) -> usize {
        let mut reachable = 0;
        for url in &self.urls {
            let label = format!("keepalive:{url}");
            match self.retry.run(&label, move |_| self.ping(url)).await {
                Ok(status) => {
                    info!(url = %url, status, "Keep-alive ping succeeded.");
                    reachable += 1;
                }
                Err(e) => warn!(url = %url, attempts = e.attempts, error = %e.last_error, "Keep-alive ping failed."),
            }
        }
        reachable
    }

    /// Runs forever, pinging on every `period`.
    pub async fn run(self, period: Duration) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(urls = self.urls.len(), period_secs = period.as_secs(), "Keep-alive loop started.");
        loop {
            ticker.tick().await;
            self.ping_once().await;
        }
    }
}
