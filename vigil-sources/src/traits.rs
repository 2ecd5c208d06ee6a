//! Common contract for provider adapters

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use thiserror::Error;
use tracing::warn;
use vigil_core::Indicator;
use vigil_net::{Transport, TransportError};

/// Errors from adapter operations
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("missing credentials for source {0}")]
    MissingCredentials(&'static str),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

/// Common interface for all provider adapters
///
/// `collect` is the background sweep: adapters degrade to an empty batch
/// on configuration problems and let the orchestrator log transport
/// failures. `search` is a deliberate point lookup, so its failures carry
/// detail back to the caller.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable provider identity used for registry lookup
    fn identity(&self) -> &'static str;

    /// Collect indicators modified since the given time
    async fn collect(&self, since: Option<DateTime<Utc>>)
        -> Result<Vec<Indicator>, AdapterError>;

    /// Look up a single indicator value upstream
    async fn search(&self, query: &str) -> Result<Vec<Indicator>, AdapterError>;
}

/// API keys for the standard providers, typically from the environment
#[derive(Debug, Clone, Default)]
pub struct SourceKeys {
    pub otx: Option<String>,
    pub xfe: Option<String>,
    pub virustotal: Option<String>,
    pub misp: Option<String>,
    pub abuseipdb: Option<String>,
    pub shodan: Option<String>,
}

impl SourceKeys {
    /// Read `VIGIL_<PROVIDER>_KEY` variables
    pub fn from_env() -> Self {
        Self {
            otx: std::env::var("VIGIL_OTX_KEY").ok(),
            xfe: std::env::var("VIGIL_XFE_KEY").ok(),
            virustotal: std::env::var("VIGIL_VIRUSTOTAL_KEY").ok(),
            misp: std::env::var("VIGIL_MISP_KEY").ok(),
            abuseipdb: std::env::var("VIGIL_ABUSEIPDB_KEY").ok(),
            shodan: std::env::var("VIGIL_SHODAN_KEY").ok(),
        }
    }
}

/// Instantiate every standard adapter over a shared transport
pub fn standard_adapters(
    transport: &Arc<Transport>,
    keys: &SourceKeys,
) -> Vec<Arc<dyn SourceAdapter>> {
    vec![
        Arc::new(crate::OtxAdapter::new(transport.clone(), keys.otx.clone())),
        Arc::new(crate::XfeAdapter::new(transport.clone(), keys.xfe.clone())),
        Arc::new(crate::VirusTotalAdapter::new(
            transport.clone(),
            keys.virustotal.clone(),
        )),
        Arc::new(crate::MispAdapter::new(transport.clone(), keys.misp.clone())),
        Arc::new(crate::ThreatFoxAdapter::new(transport.clone())),
        Arc::new(crate::AbuseIpdbAdapter::new(
            transport.clone(),
            keys.abuseipdb.clone(),
        )),
        Arc::new(crate::ShodanAdapter::new(
            transport.clone(),
            keys.shodan.clone(),
        )),
    ]
}

/// Headers shared by every adapter
pub(crate) fn base_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static("vigil-collector/0.1"));
    headers
}

/// Attach an auth header, skipping values that are not header-safe
pub(crate) fn insert_auth(headers: &mut HeaderMap, name: &'static str, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => warn!(header = name, "api key is not a valid header value, skipping"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_headers_carry_user_agent() {
        let headers = base_headers();
        assert_eq!(
            headers.get(USER_AGENT).unwrap().to_str().unwrap(),
            "vigil-collector/0.1"
        );
    }

    #[test]
    fn test_insert_auth_rejects_invalid_values() {
        let mut headers = base_headers();
        insert_auth(&mut headers, "x-apikey", "bad\nvalue");
        assert!(headers.get("x-apikey").is_none());

        insert_auth(&mut headers, "x-apikey", "good-value");
        assert_eq!(headers.get("x-apikey").unwrap(), "good-value");
    }

    #[test]
    fn test_standard_adapters_cover_all_sources() {
        let config = vigil_net::NetConfig::default();
        let limiter = Arc::new(vigil_net::RateLimiter::from_config(&config));
        let transport = Arc::new(Transport::new(
            config,
            limiter,
            Arc::new(vigil_net::MemoryCache::new()),
        ));
        let adapters = standard_adapters(&transport, &SourceKeys::default());
        let identities: Vec<&str> = adapters.iter().map(|a| a.identity()).collect();
        assert_eq!(
            identities,
            vec!["otx", "xfe", "virustotal", "misp", "threatfox", "abuseipdb", "shodan"]
        );
    }
}
