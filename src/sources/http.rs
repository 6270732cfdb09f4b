//! Shared HTTP client for the API feeds.
//!
//! Requests are strictly sequential with a fixed pause after each one. Only
//! HTTP 429 is retried (exponential backoff, bounded by `http.max_retries`);
//! every other failure is returned to the caller immediately.

use crate::config::HttpConfig;
use crate::error::{CvError, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

/// Seconds reported when the server gives no `Retry-After`.
const DEFAULT_RETRY_AFTER: u64 = 60;

pub struct ApiClient {
    client: Client,
    delay: Duration,
    max_retries: u32,
}

impl ApiClient {
    /// Build a client whose user agent carries the polite-pool contact.
    pub fn new(config: &HttpConfig, mailto: &str) -> Result<Self> {
        let agent = if mailto.is_empty() {
            format!("scholarcv/{}", env!("CARGO_PKG_VERSION"))
        } else {
            format!("scholarcv/{} (mailto:{})", env!("CARGO_PKG_VERSION"), mailto)
        };
        let client = Client::builder()
            .user_agent(agent)
            .timeout(config.timeout())
            .build()
            .map_err(|e| CvError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            delay: config.request_delay(),
            max_retries: config.max_retries,
        })
    }

    /// GET `url` and decode JSON. `Ok(None)` on 404.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>> {
        let mut retries = 0;

        loop {
            debug!(url = url, "GET");
            let response = self
                .client
                .get(url)
                .query(query)
                .header("Accept", "application/json")
                .send()
                .await?;
            let status = response.status();

            if status.is_success() {
                let body = response.json::<T>().await?;
                self.pause().await;
                return Ok(Some(body));
            }

            if status == StatusCode::NOT_FOUND {
                self.pause().await;
                return Ok(None);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .unwrap_or(DEFAULT_RETRY_AFTER);
                if retries < self.max_retries {
                    let backoff = Duration::from_secs(2u64.pow(retries));
                    warn!(
                        retries = retries,
                        backoff_secs = backoff.as_secs(),
                        "Rate limited, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    retries += 1;
                    continue;
                }
                return Err(CvError::RateLimited(retry_after));
            }

            return Err(CvError::Api {
                code: status.as_u16() as i32,
                message: format!("{} returned {}", url, status),
            });
        }
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}
