//! AbuseIPDB adapter

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::Method;
use tracing::debug;

use vigil_core::{validators, Indicator, IndicatorKind};
use vigil_net::Transport;

use crate::{base_headers, insert_auth, AdapterError, SourceAdapter};

const BASE_URL: &str = "https://api.abuseipdb.com/api/v2";
const SOURCE: &str = "abuseipdb";
const SEARCH_CONFIDENCE: i64 = 55;

pub struct AbuseIpdbAdapter {
    transport: Arc<Transport>,
    api_key: Option<String>,
}

impl AbuseIpdbAdapter {
    pub fn new(transport: Arc<Transport>, api_key: Option<String>) -> Self {
        Self { transport, api_key }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = base_headers();
        if let Some(key) = &self.api_key {
            insert_auth(&mut headers, "key", key);
        }
        headers
    }
}

#[async_trait]
impl SourceAdapter for AbuseIpdbAdapter {
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
        if self.api_key.is_none() {
            return Err(AdapterError::MissingCredentials(SOURCE));
        }

        let params = vec![
            ("ipAddress".to_string(), query.to_string()),
            ("maxAgeInDays".to_string(), "90".to_string()),
        ];
        let payload = self
            .transport
            .request(
                Method::GET,
                &format!("{BASE_URL}/check"),
                self.headers(),
                &params,
                SOURCE,
            )
            .await?;

        // Provider reports its own 0-100 abuse score; prefer it when present
        let confidence = payload
            .pointer("/data/abuseConfidenceScore")
            .and_then(serde_json::Value::as_i64)
            .unwrap_or(SEARCH_CONFIDENCE);

        let value = validators::normalize(&IndicatorKind::Ip, query);
        Ok(vec![
            Indicator::new(IndicatorKind::Ip, &value, SOURCE, confidence).with_raw(payload),
        ])
    }
}
