//! IBM X-Force Exchange adapter

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::Method;
use tracing::debug;

use vigil_core::{validators, Indicator, IndicatorKind};
use vigil_net::Transport;

use crate::{base_headers, insert_auth, AdapterError, SourceAdapter};

const BASE_URL: &str = "https://api.xforce.ibmcloud.com";
const SOURCE: &str = "xfe";
const SEARCH_CONFIDENCE: i64 = 60;

/// X-Force Exchange reputation lookups; no bulk feed on the public tier
pub struct XfeAdapter {
    transport: Arc<Transport>,
    api_key: Option<String>,
}

impl XfeAdapter {
    pub fn new(transport: Arc<Transport>, api_key: Option<String>) -> Self {
        Self { transport, api_key }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = base_headers();
        if let Some(key) = &self.api_key {
            insert_auth(&mut headers, "authorization", &format!("Basic {key}"));
        }
        headers
    }
}

#[async_trait]
impl SourceAdapter for XfeAdapter {
    fn identity(&self) -> &'static str {
        SOURCE
    }

    async fn collect(
        &self,
        _since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Indicator>, AdapterError> {
        debug!(source = SOURCE, "no bulk feed, nothing to collect");
        Ok(Vec::new())
    }

    async fn search(&self, query: &str) -> Result<Vec<Indicator>, AdapterError> {
        if self.api_key.is_none() {
            return Err(AdapterError::MissingCredentials(SOURCE));
        }

        let payload = self
            .transport
            .request(
                Method::GET,
                &format!("{BASE_URL}/url/{query}"),
                self.headers(),
                &[],
                SOURCE,
            )
            .await?;

        let kind = validators::identify(query).unwrap_or(IndicatorKind::Domain);
        let value = validators::normalize(&kind, query);
        Ok(vec![
            Indicator::new(kind, &value, SOURCE, SEARCH_CONFIDENCE).with_raw(payload),
        ])
    }
}
