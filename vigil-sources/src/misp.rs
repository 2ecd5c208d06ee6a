//! MISP adapter
//!
//! Talks to a MISP-compatible instance; the base URL is typically
//! deployment-specific, so it can be overridden at construction.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::Method;
use tracing::debug;

use vigil_core::{validators, Indicator, IndicatorKind};
use vigil_net::Transport;

use crate::{base_headers, insert_auth, AdapterError, SourceAdapter};

const DEFAULT_BASE_URL: &str = "https://misp.example.com/api";
const SOURCE: &str = "misp";
const SEARCH_CONFIDENCE: i64 = 70;

pub struct MispAdapter {
    transport: Arc<Transport>,
    api_key: Option<String>,
    base_url: String,
}

impl MispAdapter {
    pub fn new(transport: Arc<Transport>, api_key: Option<String>) -> Self {
        Self {
            transport,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = base_headers();
        if let Some(key) = &self.api_key {
            insert_auth(&mut headers, "authorization", key);
        }
        headers
    }
}

#[async_trait]
impl SourceAdapter for MispAdapter {
    fn identity(&self) -> &'static str {
        SOURCE
    }

    async fn collect(
        &self,
        _since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Indicator>, AdapterError> {
        debug!(source = SOURCE, "event sync not enabled, nothing to collect");
        Ok(Vec::new())
    }

    async fn search(&self, query: &str) -> Result<Vec<Indicator>, AdapterError> {
        if self.api_key.is_none() {
            return Err(AdapterError::MissingCredentials(SOURCE));
        }

        let params = vec![("value".to_string(), query.to_string())];
        let payload = self
            .transport
            .request(
                Method::GET,
                &format!("{}/attributes/restSearch", self.base_url),
                self.headers(),
                &params,
                SOURCE,
            )
            .await?;

        let kind = validators::identify(query).unwrap_or(IndicatorKind::Hash);
        let value = validators::normalize(&kind, query);
        Ok(vec![
            Indicator::new(kind, &value, SOURCE, SEARCH_CONFIDENCE).with_raw(payload),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_override_trims_slash() {
        let config = vigil_net::NetConfig::default();
        let limiter = Arc::new(vigil_net::RateLimiter::from_config(&config));
        let transport = Arc::new(Transport::new(
            config,
            limiter,
            Arc::new(vigil_net::MemoryCache::new()),
        ));
        let adapter = MispAdapter::new(transport, Some("key".to_string()))
            .with_base_url("https://misp.internal/api/");
        assert_eq!(adapter.base_url, "https://misp.internal/api");
    }
}
