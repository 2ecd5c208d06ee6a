//! abuse.ch ThreatFox adapter
//!
//! ThreatFox is unauthenticated, so it always participates in sweeps.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use vigil_core::{validators, Indicator, IndicatorKind};
use vigil_net::Transport;

use crate::{base_headers, AdapterError, SourceAdapter};

const BASE_URL: &str = "https://threatfox-api.abuse.ch/api/v1";
const SOURCE: &str = "threatfox";
const SEARCH_CONFIDENCE: i64 = 65;

pub struct ThreatFoxAdapter {
    transport: Arc<Transport>,
}

impl ThreatFoxAdapter {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl SourceAdapter for ThreatFoxAdapter {
    fn identity(&self) -> &'static str {
        SOURCE
    }

    async fn collect(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Indicator>, AdapterError> {
        // The feed exposes a day-granular window, not arbitrary timestamps
        let days = since
            .map(|ts| ((Utc::now() - ts).num_days().clamp(1, 7)) as u64)
            .unwrap_or(1);
        let params = vec![
            ("query".to_string(), "get_iocs".to_string()),
            ("days".to_string(), days.to_string()),
        ];
        let payload = self
            .transport
            .request(Method::POST, BASE_URL, base_headers(), &params, SOURCE)
            .await?;

        let indicators = map_iocs(&payload);
        debug!(source = SOURCE, count = indicators.len(), "collected recent iocs");
        Ok(indicators)
    }

    async fn search(&self, query: &str) -> Result<Vec<Indicator>, AdapterError> {
        let params = vec![
            ("query".to_string(), "search_ioc".to_string()),
            ("search_term".to_string(), query.to_string()),
        ];
        let payload = self
            .transport
            .request(Method::POST, BASE_URL, base_headers(), &params, SOURCE)
            .await?;

        let kind = validators::identify(query).unwrap_or(IndicatorKind::Url);
        let value = validators::normalize(&kind, query);
        Ok(vec![
            Indicator::new(kind, &value, SOURCE, SEARCH_CONFIDENCE).with_raw(payload),
        ])
    }
}

fn map_iocs(payload: &Value) -> Vec<Indicator> {
    let Some(entries) = payload.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let kind = entry
                .get("ioc_type")
                .and_then(Value::as_str)
                .map(kind_from_ioc_type)
                .unwrap_or(IndicatorKind::Url);
            let confidence = entry
                .get("confidence_level")
                .and_then(Value::as_i64)
                .unwrap_or(SEARCH_CONFIDENCE);
            Indicator::from_raw(
                entry,
                SOURCE,
                "ioc",
                kind,
                confidence,
                Some("first_seen"),
                Some("last_seen"),
            )
        })
        .collect()
}

fn kind_from_ioc_type(ioc_type: &str) -> IndicatorKind {
    match ioc_type {
        "ip:port" | "ip" => IndicatorKind::Ip,
        "domain" => IndicatorKind::Domain,
        "url" => IndicatorKind::Url,
        "md5_hash" | "sha1_hash" | "sha256_hash" => IndicatorKind::Hash,
        other => IndicatorKind::Extension(other.to_string()),
    }
}
