//! HTTP endpoint probing.

use std::time::Duration;

use tracing::debug;

use super::ProbeOutcome;

/// Probes HTTP endpoints with a per-request timeout.
#[derive(Debug, Clone)]
pub struct EndpointProber {
    client: reqwest::Client,
}

impl EndpointProber {
    #[must_use]
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("cto-health/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// GET `url` and compare the response status with `expected_status`.
    pub async fn probe(&self, url: &str, expected_status: u16, timeout: Duration) -> ProbeOutcome {
        debug!(url = %url, timeout_secs = timeout.as_secs(), "Probing endpoint");

        match self.client.get(url).timeout(timeout).send().await {
            Ok(response) if response.status().as_u16() == expected_status => {
                ProbeOutcome::Reachable
            }
            Ok(response) => ProbeOutcome::UnexpectedStatus(response.status().as_u16()),
            Err(e) if e.is_timeout() => ProbeOutcome::TimedOut,
            Err(e) => ProbeOutcome::Unreachable(e.to_string()),
        }
    }
}

impl Default for EndpointProber {
    fn default() -> Self {
        Self::new()
    }
}
