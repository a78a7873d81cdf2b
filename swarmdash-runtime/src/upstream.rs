//! Clients for the two upstream services the dashboard fronts: the load
//! engine's control/stats API and the metrics backend's query API.
//!
//! Both are stateless and retriable; callers decide whether a failure is
//! fatal (start command) or transient (poll tick).
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use swarmdash_core::StatsSnapshot;
use thiserror::Error;
use url::Url;

/// Upper bound on any single upstream call; a stuck engine must not wedge
/// a poll tick or a start command indefinitely.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("load engine request failed: {0}")]
    Engine(#[source] reqwest::Error),

    #[error("metrics backend request failed: {0}")]
    Metrics(#[source] reqwest::Error),
}

/// Command/query surface of the load engine, seen from the coordinator.
///
/// The production implementation is [`LocustClient`]; tests substitute
/// their own engine the same way the gossip stream is faked.
#[async_trait]
pub trait LoadEngine: Send + Sync {
    /// Start swarming `users` simulated users against `target`, ramping at
    /// `spawn_rate` users per second.
    async fn begin_load(
        &self,
        target: &str,
        users: u32,
        spawn_rate: f64,
    ) -> Result<(), UpstreamError>;

    /// Tell the engine to stop the current swarm. Callers tolerate failure.
    async fn stop_load(&self) -> Result<(), UpstreamError>;

    /// Current statistics payload. Failures are transient from the
    /// caller's point of view.
    async fn fetch_stats(&self) -> Result<StatsSnapshot, UpstreamError>;
}

/// HTTP client for the Locust web API.
#[derive(Clone, Debug)]
pub struct LocustClient {
    http: reqwest::Client,
    base: Url,
}

impl LocustClient {
    pub fn new(base: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base.as_str().trim_end_matches('/'))
    }
}

#[async_trait]
impl LoadEngine for LocustClient {
    async fn begin_load(
        &self,
        target: &str,
        users: u32,
        spawn_rate: f64,
    ) -> Result<(), UpstreamError> {
        // Locust's swarm endpoint takes form-encoded fields.
        self.http
            .post(self.endpoint("swarm"))
            .timeout(REQUEST_TIMEOUT)
            .form(&[
                ("user_count", users.to_string()),
                ("spawn_rate", spawn_rate.to_string()),
                ("host", target.to_string()),
            ])
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(UpstreamError::Engine)?;
        Ok(())
    }

    async fn stop_load(&self) -> Result<(), UpstreamError> {
        self.http
            .get(self.endpoint("stop"))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(UpstreamError::Engine)?;
        Ok(())
    }

    async fn fetch_stats(&self) -> Result<StatsSnapshot, UpstreamError> {
        let response = self
            .http
            .get(self.endpoint("stats/requests"))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(UpstreamError::Engine)?;
        response.json().await.map_err(UpstreamError::Engine)
    }
}

/// Read-only pass-through to the metrics backend (Prometheus HTTP API).
/// No interpretation happens here; the payload is relayed verbatim.
#[derive(Clone, Debug)]
pub struct MetricsProxy {
    http: reqwest::Client,
    base: Url,
}

impl MetricsProxy {
    pub fn new(base: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base,
        }
    }

    pub async fn query(&self, expression: &str) -> Result<Value, UpstreamError> {
        let url = format!("{}/api/v1/query", self.base.as_str().trim_end_matches('/'));
        let response = self
            .http
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .query(&[("query", expression)])
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(UpstreamError::Metrics)?;
        response.json().await.map_err(UpstreamError::Metrics)
    }
}
