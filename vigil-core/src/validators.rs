//! Classification and normalization of raw indicator values
//!
//! Providers hand back bare strings; these helpers decide what kind of
//! indicator a string is and canonicalize it for deduplication.

use std::net::IpAddr;
use std::sync::LazyLock;

use regex::Regex;

use crate::IndicatorKind;

static DOMAIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,}$").unwrap()
});

static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^https?://[^\s<>"']+$"#).unwrap());

static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap());

static MD5_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-fA-F0-9]{32}$").unwrap());

static SHA1_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-fA-F0-9]{40}$").unwrap());

static SHA256_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-fA-F0-9]{64}$").unwrap());

static CVE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i)CVE-\d{4}-\d{4,}$").unwrap());

/// Classify a raw value into an indicator kind
///
/// Returns `None` for values that match none of the known shapes.
pub fn identify(value: &str) -> Option<IndicatorKind> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if value.parse::<IpAddr>().is_ok() {
        return Some(IndicatorKind::Ip);
    }
    if DOMAIN_REGEX.is_match(value) && value.len() <= 253 {
        return Some(IndicatorKind::Domain);
    }
    if URL_REGEX.is_match(value) {
        return Some(IndicatorKind::Url);
    }
    if EMAIL_REGEX.is_match(value) {
        return Some(IndicatorKind::Email);
    }
    if MD5_REGEX.is_match(value) || SHA1_REGEX.is_match(value) || SHA256_REGEX.is_match(value) {
        return Some(IndicatorKind::Hash);
    }
    if CVE_REGEX.is_match(value) {
        return Some(IndicatorKind::Cve);
    }
    None
}

/// Canonicalize a value for its kind
///
/// Domains lose case and trailing dots, hashes and CVEs lose case, IPs are
/// reprinted in canonical form. Other kinds are only trimmed.
pub fn normalize(kind: &IndicatorKind, value: &str) -> String {
    let value = value.trim();
    match kind {
        IndicatorKind::Domain => value.to_lowercase().trim_end_matches('.').to_string(),
        IndicatorKind::Hash => value.to_lowercase(),
        IndicatorKind::Cve => value.to_uppercase(),
        IndicatorKind::Ip => value
            .parse::<IpAddr>()
            .map(|ip| ip.to_string())
            .unwrap_or_else(|_| value.to_string()),
        _ => value.to_string(),
    }
}
