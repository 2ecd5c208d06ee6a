//! Shodan adapter

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::Method;
use tracing::debug;

use vigil_core::{validators, Indicator, IndicatorKind};
use vigil_net::Transport;

use crate::{base_headers, insert_auth, AdapterError, SourceAdapter};

const BASE_URL: &str = "https://api.shodan.io";
const SOURCE: &str = "shodan";
const SEARCH_CONFIDENCE: i64 = 65;

pub struct ShodanAdapter {
    transport: Arc<Transport>,
    api_key: Option<String>,
}

impl ShodanAdapter {
    pub fn new(transport: Arc<Transport>, api_key: Option<String>) -> Self {
        Self { transport, api_key }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = base_headers();
        if let Some(key) = &self.api_key {
            insert_auth(&mut headers, "authorization", &format!("Token {key}"));
        }
        headers
    }
}

#[async_trait]
impl SourceAdapter for ShodanAdapter {
    fn identity(&self) -> &'static str {
        SOURCE
    }

    async fn collect(
        &self,
        _since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Indicator>, AdapterError> {
        debug!(source = SOURCE, "lookup-only provider, nothing to collect");
        Ok(Vec::new())
    }

    async fn search(&self, query: &str) -> Result<Vec<Indicator>, AdapterError> {
        let Some(key) = &self.api_key else {
            return Err(AdapterError::MissingCredentials(SOURCE));
        };

        let params = vec![("key".to_string(), key.clone())];
        let payload = self
            .transport
            .request(
                Method::GET,
                &format!("{BASE_URL}/shodan/host/{query}"),
                self.headers(),
                &params,
                SOURCE,
            )
            .await?;

        let value = validators::normalize(&IndicatorKind::Ip, query);
        Ok(vec![
            Indicator::new(IndicatorKind::Ip, &value, SOURCE, SEARCH_CONFIDENCE).with_raw(payload),
        ])
    }
}
