//! Proxy rotation client.
//!
//! Before each batch the scheduler asks the external rotation endpoint for a
//! fresh proxy. The endpoint reports failure through a JSON `status` field
//! equal to `"err"` (case-insensitive); any transport or parse error counts
//! as a failure too. Failures are retried forever with a fixed delay —
//! rotation is a blocking precondition for the batch, never surfaced to the
//! job. A successful rotation is followed by a settle delay that rate-limits
//! rotation requests.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use saturator_shared::{Result, SaturatorError};

/// User-Agent string for rotation requests.
const USER_AGENT: &str = concat!("Saturator/", env!("CARGO_PKG_VERSION"));

/// Response body of the rotation endpoint. Only `status` matters.
#[derive(Debug, Deserialize)]
struct RotationResponse {
    #[serde(default)]
    status: Option<String>,
}

/// Client for the proxy rotation endpoint.
pub struct RotationClient {
    client: reqwest::Client,
    endpoint: Url,
    retry_delay: Duration,
    settle_delay: Duration,
}

impl RotationClient {
    /// Create a rotation client for `endpoint`.
    ///
    /// `retry_delay` is slept after a failed rotation request before the
    /// next attempt; `settle_delay` is slept after a successful one.
    pub fn new(endpoint: Url, retry_delay: Duration, settle_delay: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SaturatorError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            retry_delay,
            settle_delay,
        })
    }

    /// Request a proxy change, retrying until the endpoint confirms one.
    ///
    /// Blocks (cooperatively) until a rotation succeeds; the settle delay
    /// has already elapsed when this returns.
    pub async fn rotate(&self) {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.request_rotation().await {
                Ok(()) => {
                    info!(attempt, "proxy rotation confirmed");
                    tokio::time::sleep(self.settle_delay).await;
                    return;
                }
                Err(e) => {
                    warn!(
                        attempt,
                        error = %e,
                        delay_secs = self.retry_delay.as_secs(),
                        "proxy rotation failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }

    /// Issue one rotation request and interpret the JSON reply.
    async fn request_rotation(&self) -> Result<()> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("format", "json");
        debug!(%url, "requesting proxy rotation");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SaturatorError::Network(format!("rotation request: {e}")))?;

        let body: RotationResponse = response
            .json()
            .await
            .map_err(|e| SaturatorError::Network(format!("rotation response: {e}")))?;

        if body
            .status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("err"))
        {
            return Err(SaturatorError::Network(format!(
                "rotation endpoint {} reported an error status",
                self.endpoint
            )));
        }

        Ok(())
    }
}
