//! VirusTotal adapter

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::Method;
use tracing::debug;

use vigil_core::{validators, Indicator, IndicatorKind};
use vigil_net::Transport;

use crate::{base_headers, insert_auth, AdapterError, SourceAdapter};

const BASE_URL: &str = "https://www.virustotal.com/api/v3";
const SOURCE: &str = "virustotal";
const SEARCH_CONFIDENCE: i64 = 80;

pub struct VirusTotalAdapter {
    transport: Arc<Transport>,
    api_key: Option<String>,
}

impl VirusTotalAdapter {
    pub fn new(transport: Arc<Transport>, api_key: Option<String>) -> Self {
        Self { transport, api_key }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = base_headers();
        if let Some(key) = &self.api_key {
            insert_auth(&mut headers, "x-apikey", key);
        }
        headers
    }

    /// Route a query to the matching v3 collection
    fn endpoint(kind: &IndicatorKind, query: &str) -> String {
        match kind {
            IndicatorKind::Ip => format!("{BASE_URL}/ip_addresses/{query}"),
            IndicatorKind::Domain => format!("{BASE_URL}/domains/{query}"),
            IndicatorKind::Hash => format!("{BASE_URL}/files/{query}"),
            _ => format!("{BASE_URL}/search?query={query}"),
        }
    }
}

#[async_trait]
impl SourceAdapter for VirusTotalAdapter {
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

        let kind = validators::identify(query).unwrap_or(IndicatorKind::Ip);
        let payload = self
            .transport
            .request(
                Method::GET,
                &Self::endpoint(&kind, query),
                self.headers(),
                &[],
                SOURCE,
            )
            .await?;

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
    fn test_endpoint_routing() {
        assert!(
            VirusTotalAdapter::endpoint(&IndicatorKind::Ip, "8.8.8.8").ends_with("/ip_addresses/8.8.8.8")
        );
        assert!(VirusTotalAdapter::endpoint(&IndicatorKind::Domain, "evil.example")
            .ends_with("/domains/evil.example"));
        assert!(VirusTotalAdapter::endpoint(
            &IndicatorKind::Hash,
            "d41d8cd98f00b204e9800998ecf8427e"
        )
        .contains("/files/"));
    }
}
