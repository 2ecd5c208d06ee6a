//! Resilient request execution
//!
//! One entry point, [`Transport::request`]: cache-first lookup, then a
//! retry loop that re-selects a proxy and re-acquires a rate-limit slot on
//! every attempt. Throttling (429) and transient network failures retry
//! without a ceiling; the caller bounds the loop with its own timeout.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, Method, Proxy, StatusCode};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::{NetConfig, ProxyPool, RateLimiter, ResponseCache};

/// Longest delay between network-error retries
const MAX_NETWORK_BACKOFF: Duration = Duration::from_secs(60);

/// Errors surfaced to the calling adapter
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("invalid proxy endpoint: {0}")]
    Proxy(String),

    #[error("request to {url} failed with status {status}")]
    Status { status: StatusCode, url: String },

    #[error("failed to decode response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// Executes outbound requests under rate limits, caching and proxying
pub struct Transport {
    config: NetConfig,
    limiter: Arc<RateLimiter>,
    cache: Arc<dyn ResponseCache>,
    proxies: ProxyPool,
}

impl Transport {
    pub fn new(config: NetConfig, limiter: Arc<RateLimiter>, cache: Arc<dyn ResponseCache>) -> Self {
        let proxies = ProxyPool::from_config(&config);
        Self {
            config,
            limiter,
            cache,
            proxies,
        }
    }

    /// The shared rate limiter, so adapters can register their quotas
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Execute a request and return the decoded JSON payload
    ///
    /// Identical requests within the cache TTL are answered from the cache
    /// without touching the network or the rate limiter. 429 responses and
    /// network errors retry indefinitely with backoff; any other non-2xx
    /// status is returned as an error without retrying.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        params: &[(String, String)],
        source: &str,
    ) -> Result<Value, TransportError> {
        let key = fingerprint(source, &method, url, params);
        if let Some(hit) = self.cache.get(&key) {
            debug!(source, url, "response cache hit");
            return Ok(hit);
        }

        let mut attempt: u32 = 0;
        loop {
            let proxy = self.proxies.choose();
            self.limiter.wait_for_slot(source).await;
            let client = self.build_client(proxy.as_deref())?;

            let outcome = client
                .request(method.clone(), url)
                .headers(headers.clone())
                .query(&params)
                .send()
                .await;

            match outcome {
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                    attempt += 1;
                    self.limiter.update_from_headers(source, response.headers()).await;
                    let delay = self.limiter.record_failure(source, attempt);
                    warn!(source, attempt, delay_secs = delay.as_secs_f64(), "throttled by upstream");
                    sleep(delay).await;
                }
                Ok(response) if !response.status().is_success() => {
                    return Err(TransportError::Status {
                        status: response.status(),
                        url: url.to_string(),
                    });
                }
                Ok(response) => {
                    self.limiter.update_from_headers(source, response.headers()).await;
                    let payload: Value =
                        response.json().await.map_err(|err| TransportError::Decode {
                            url: url.to_string(),
                            reason: err.to_string(),
                        })?;
                    self.cache.set(
                        &key,
                        payload.clone(),
                        Duration::from_secs(self.config.cache_ttl_secs),
                    );
                    return Ok(payload);
                }
                Err(err) => {
                    attempt += 1;
                    let delay = network_backoff(attempt);
                    error!(source, url, error = %err, attempt, "transport error, retrying");
                    sleep(delay).await;
                }
            }
        }
    }

    fn build_client(&self, proxy: Option<&str>) -> Result<Client, TransportError> {
        let mut builder = Client::builder().timeout(Duration::from_secs(self.config.timeout_secs));
        if let Some(endpoint) = proxy {
            let proxy = Proxy::all(endpoint)
                .map_err(|err| TransportError::Proxy(format!("{endpoint}: {err}")))?;
            builder = builder.proxy(proxy);
        }
        builder
            .build()
            .map_err(|err| TransportError::ClientBuild(err.to_string()))
    }
}

fn network_backoff(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt)).min(MAX_NETWORK_BACKOFF)
}

/// Deterministic cache key for a request
///
/// Parameter order does not matter; the same logical request always maps
/// to the same fingerprint.
pub fn fingerprint(source: &str, method: &Method, url: &str, params: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort();

    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(b"|");
    hasher.update(method.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(url.as_bytes());
    for (name, value) in sorted {
        hasher.update(b"|");
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
