//! Normalized indicators of compromise
//!
//! Every upstream provider speaks its own response dialect; adapters boil
//! each observation down to an [`Indicator`] carrying the normalized kind,
//! the raw value, the provider identity and the untouched provider payload.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{MAX_CONFIDENCE, MIN_CONFIDENCE};

/// Categories of indicators
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    /// IPv4 or IPv6 address
    Ip,
    /// Domain name
    Domain,
    /// URL
    Url,
    /// Email address
    Email,
    /// File hash (md5, sha1, sha256)
    Hash,
    /// CVE identifier
    Cve,
    /// Adapter-defined extension kind
    Extension(String),
}

impl IndicatorKind {
    pub fn as_str(&self) -> &str {
        match self {
            IndicatorKind::Ip => "ip",
            IndicatorKind::Domain => "domain",
            IndicatorKind::Url => "url",
            IndicatorKind::Email => "email",
            IndicatorKind::Hash => "hash",
            IndicatorKind::Cve => "cve",
            IndicatorKind::Extension(name) => name,
        }
    }
}

impl std::fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized indicator of compromise
///
/// Immutable after construction. Identity for deduplication is
/// `(kind, value, source)`; records sharing that key describe the same
/// observation from the same provider and are reconciled latest-wins by
/// storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Indicator {
    /// Normalized indicator kind
    pub kind: IndicatorKind,
    /// Provider-specific raw value
    pub value: String,
    /// Identity of the provider that produced this record
    pub source: String,
    /// Confidence score, always within 0..=100
    pub confidence: u8,
    /// Earliest sighting, if the provider reported one
    pub first_seen: Option<DateTime<Utc>>,
    /// Latest sighting, if the provider reported one
    pub last_seen: Option<DateTime<Utc>>,
    /// Untouched raw provider payload
    pub raw: Value,
    /// Descriptive tags
    pub tags: Vec<String>,
}

impl Indicator {
    /// Create an indicator, clamping confidence into 0..=100
    pub fn new(kind: IndicatorKind, value: &str, source: &str, confidence: i64) -> Self {
        Self {
            kind,
            value: value.to_string(),
            source: source.to_string(),
            confidence: clamp_confidence(confidence),
            first_seen: None,
            last_seen: None,
            raw: Value::Null,
            tags: Vec::new(),
        }
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = raw;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_first_seen(mut self, ts: DateTime<Utc>) -> Self {
        self.first_seen = Some(ts);
        self
    }

    pub fn with_last_seen(mut self, ts: DateTime<Utc>) -> Self {
        self.last_seen = Some(ts);
        self
    }

    /// Deterministic key used for deduplication
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.kind, self.value, self.source)
    }

    /// Build an indicator from a raw provider object
    ///
    /// Pulls the value out of `data[value_key]`, optionally resolving
    /// first/last-seen timestamps from the named keys. Returns `None` when
    /// the value key is missing so adapters can skip malformed records.
    pub fn from_raw(
        data: &Value,
        source: &str,
        value_key: &str,
        kind: IndicatorKind,
        confidence: i64,
        first_seen_key: Option<&str>,
        last_seen_key: Option<&str>,
    ) -> Option<Self> {
        let value = match data.get(value_key)? {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        let mut indicator = Indicator::new(kind, &value, source, confidence).with_raw(data.clone());
        if let Some(ts) = first_seen_key.and_then(|k| data.get(k)).and_then(parse_datetime) {
            indicator.first_seen = Some(ts);
        }
        if let Some(ts) = last_seen_key.and_then(|k| data.get(k)).and_then(parse_datetime) {
            indicator.last_seen = Some(ts);
        }
        Some(indicator)
    }
}

fn clamp_confidence(confidence: i64) -> u8 {
    confidence.clamp(MIN_CONFIDENCE as i64, MAX_CONFIDENCE as i64) as u8
}

/// Parse the datetime representations seen across providers
///
/// Accepts epoch seconds, RFC 3339, and the handful of bare formats the
/// upstream feeds actually emit. Anything else resolves to `None`.
pub fn parse_datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            if let Some(secs) = n.as_i64() {
                return Utc.timestamp_opt(secs, 0).single();
            }
            n.as_f64()
                .and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single())
        }
        Value::String(s) => {
            if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                return Some(ts.with_timezone(&Utc));
            }
            for fmt in ["%Y-%m-%dT%H:%M:%SZ", "%Y-%m-%d %H:%M:%S"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                    return Some(Utc.from_utc_datetime(&naive));
                }
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_confidence_clamped_high() {
        let indicator = Indicator::new(IndicatorKind::Ip, "1.2.3.4", "otx", 150);
        assert_eq!(indicator.confidence, 100);
    }

    #[test]
    fn test_confidence_clamped_low() {
        let indicator = Indicator::new(IndicatorKind::Ip, "1.2.3.4", "otx", -5);
        assert_eq!(indicator.confidence, 0);
    }

    #[test]
    fn test_from_raw_clamps_confidence() {
        let data = json!({"indicator": "evil.example"});
        let high = Indicator::from_raw(
            &data,
            "otx",
            "indicator",
            IndicatorKind::Domain,
            150,
            None,
            None,
        )
        .unwrap();
        assert_eq!(high.confidence, 100);

        let low = Indicator::from_raw(
            &data,
            "otx",
            "indicator",
            IndicatorKind::Domain,
            -5,
            None,
            None,
        )
        .unwrap();
        assert_eq!(low.confidence, 0);
    }

    #[test]
    fn test_from_raw_missing_value_key() {
        let data = json!({"other": "x"});
        let result = Indicator::from_raw(
            &data,
            "otx",
            "indicator",
            IndicatorKind::Domain,
            50,
            None,
            None,
        );
        assert!(result.is_none());
    }

    #[test]
    fn test_from_raw_timestamps() {
        let data = json!({
            "indicator": "evil.example",
            "first_seen": "2024-01-02T03:04:05Z",
            "last_seen": 1704250000,
        });
        let indicator = Indicator::from_raw(
            &data,
            "threatfox",
            "indicator",
            IndicatorKind::Domain,
            65,
            Some("first_seen"),
            Some("last_seen"),
        )
        .unwrap();
        assert!(indicator.first_seen.is_some());
        assert!(indicator.last_seen.is_some());
        assert_eq!(indicator.raw, data);
    }

    #[test]
    fn test_key_format() {
        let indicator = Indicator::new(IndicatorKind::Domain, "evil.example", "otx", 75);
        assert_eq!(indicator.key(), "domain:evil.example:otx");
    }

    #[test]
    fn test_parse_datetime_date_only() {
        let ts = parse_datetime(&json!("2024-03-01")).unwrap();
        assert_eq!(ts.format("%Y-%m-%d %H:%M").to_string(), "2024-03-01 00:00");
    }

    #[test]
    fn test_parse_datetime_garbage() {
        assert!(parse_datetime(&json!("not a date")).is_none());
        assert!(parse_datetime(&json!(null)).is_none());
    }
}
