//! AlienVault OTX adapter
//!
//! The one provider with a real bulk feed: `collect` sweeps the
//! subscribed-pulses endpoint and flattens every pulse's indicator list.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};

use vigil_core::{validators, Indicator, IndicatorKind};
use vigil_net::Transport;

use crate::{base_headers, insert_auth, AdapterError, SourceAdapter};

const BASE_URL: &str = "https://otx.alienvault.com/api/v1";
const SOURCE: &str = "otx";
const SEARCH_CONFIDENCE: i64 = 75;
const PULSE_CONFIDENCE: i64 = 50;

pub struct OtxAdapter {
    transport: Arc<Transport>,
    api_key: Option<String>,
}

impl OtxAdapter {
    pub fn new(transport: Arc<Transport>, api_key: Option<String>) -> Self {
        Self { transport, api_key }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = base_headers();
        if let Some(key) = &self.api_key {
            insert_auth(&mut headers, "x-otx-api-key", key);
        }
        headers
    }
}

#[async_trait]
impl SourceAdapter for OtxAdapter {
    fn identity(&self) -> &'static str {
        SOURCE
    }

    async fn collect(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Indicator>, AdapterError> {
        if self.api_key.is_none() {
            warn!(source = SOURCE, "no api key configured, skipping collection");
            return Ok(Vec::new());
        }

        let mut params = Vec::new();
        if let Some(since) = since {
            params.push(("modified_since".to_string(), since.to_rfc3339()));
        }
        let payload = self
            .transport
            .request(
                Method::GET,
                &format!("{BASE_URL}/pulses/subscribed"),
                self.headers(),
                &params,
                SOURCE,
            )
            .await?;

        let indicators = map_pulses(&payload);
        debug!(source = SOURCE, count = indicators.len(), "collected pulse indicators");
        Ok(indicators)
    }

    async fn search(&self, query: &str) -> Result<Vec<Indicator>, AdapterError> {
        if self.api_key.is_none() {
            return Err(AdapterError::MissingCredentials(SOURCE));
        }

        let kind = validators::identify(query).unwrap_or(IndicatorKind::Domain);
        let section = match kind {
            IndicatorKind::Ip => "IPv4",
            IndicatorKind::Url => "url",
            IndicatorKind::Hash => "file",
            _ => "domain",
        };
        let payload = self
            .transport
            .request(
                Method::GET,
                &format!("{BASE_URL}/indicators/{section}/{query}/general"),
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

/// Flatten a subscribed-pulses response into indicators
fn map_pulses(payload: &Value) -> Vec<Indicator> {
    let mut out = Vec::new();
    let Some(pulses) = payload.get("results").and_then(Value::as_array) else {
        return out;
    };

    for pulse in pulses {
        let pulse_name = pulse.get("name").and_then(Value::as_str);
        let Some(entries) = pulse.get("indicators").and_then(Value::as_array) else {
            continue;
        };
        for entry in entries {
            let kind = entry
                .get("type")
                .and_then(Value::as_str)
                .map(kind_from_otx_type)
                .unwrap_or(IndicatorKind::Extension("unknown".to_string()));
            let Some(mut indicator) = Indicator::from_raw(
                entry,
                SOURCE,
                "indicator",
                kind,
                PULSE_CONFIDENCE,
                Some("created"),
                Some("modified"),
            ) else {
                continue;
            };
            if let Some(name) = pulse_name {
                indicator.tags.push(name.to_string());
            }
            out.push(indicator);
        }
    }
    out
}

/// Map OTX indicator type names onto the normalized kinds
fn kind_from_otx_type(otx_type: &str) -> IndicatorKind {
    match otx_type {
        "IPv4" | "IPv6" => IndicatorKind::Ip,
        "domain" | "hostname" => IndicatorKind::Domain,
        "URL" | "URI" => IndicatorKind::Url,
        "email" => IndicatorKind::Email,
        "FileHash-MD5" | "FileHash-SHA1" | "FileHash-SHA256" => IndicatorKind::Hash,
        "CVE" => IndicatorKind::Cve,
        other => IndicatorKind::Extension(other.to_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(kind_from_otx_type("IPv4"), IndicatorKind::Ip);
        assert_eq!(kind_from_otx_type("hostname"), IndicatorKind::Domain);
        assert_eq!(kind_from_otx_type("FileHash-SHA256"), IndicatorKind::Hash);
        assert_eq!(kind_from_otx_type("CVE"), IndicatorKind::Cve);
        assert_eq!(
            kind_from_otx_type("YARA"),
            IndicatorKind::Extension("yara".to_string())
        );
    }

    #[test]
    fn test_map_pulses() {
        let payload = json!({
            "results": [{
                "name": "Ransomware infra",
                "indicators": [
                    {"type": "IPv4", "indicator": "1.2.3.4", "created": "2024-01-02T03:04:05Z"},
                    {"type": "domain", "indicator": "evil.example"},
                    {"type": "IPv4"}
                ]
            }]
        });
        let indicators = map_pulses(&payload);
        assert_eq!(indicators.len(), 2);
        assert_eq!(indicators[0].kind, IndicatorKind::Ip);
        assert_eq!(indicators[0].value, "1.2.3.4");
        assert!(indicators[0].first_seen.is_some());
        assert_eq!(indicators[0].tags, vec!["Ransomware infra".to_string()]);
        assert_eq!(indicators[1].source, "otx");
    }

    #[test]
    fn test_map_pulses_empty_payload() {
        assert!(map_pulses(&json!({})).is_empty());
        assert!(map_pulses(&json!({"results": []})).is_empty());
    }

    #[tokio::test]
    async fn test_collect_without_key_is_empty() {
        let config = vigil_net::NetConfig::default();
        let limiter = Arc::new(vigil_net::RateLimiter::from_config(&config));
        let transport = Arc::new(Transport::new(
            config,
            limiter,
            Arc::new(vigil_net::MemoryCache::new()),
        ));
        let adapter = OtxAdapter::new(transport, None);
        let batch = adapter.collect(None).await.unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_auth_header_present_with_key() {
        let config = vigil_net::NetConfig::default();
        let limiter = Arc::new(vigil_net::RateLimiter::from_config(&config));
        let transport = Arc::new(Transport::new(
            config,
            limiter,
            Arc::new(vigil_net::MemoryCache::new()),
        ));
        let adapter = OtxAdapter::new(transport, Some("secret".to_string()));
        assert_eq!(adapter.headers().get("x-otx-api-key").unwrap(), "secret");
    }
}
