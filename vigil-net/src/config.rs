//! Network layer configuration

use std::env;
use std::path::PathBuf;

/// Settings shared by the rate limiter, cache and transport
#[derive(Debug, Clone)]
pub struct NetConfig {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// TTL for cached responses in seconds
    pub cache_ttl_secs: u64,
    /// Requests per minute for sources without an explicit registration
    pub default_per_minute: u32,
    /// Scale backoff delays by 1.5x
    pub dynamic_backoff: bool,
    /// Route requests through proxies
    pub proxy_enabled: bool,
    /// File containing one proxy endpoint per line
    pub proxy_list: Option<PathBuf>,
    /// Reshuffle the proxy list before each request
    pub proxy_rotate: bool,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            cache_ttl_secs: 300,
            default_per_minute: 60,
            dynamic_backoff: false,
            proxy_enabled: false,
            proxy_list: None,
            proxy_rotate: true,
        }
    }
}

impl NetConfig {
    /// Build a config from `VIGIL_*` environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            timeout_secs: env_u64("VIGIL_TIMEOUT_SECS").unwrap_or(defaults.timeout_secs),
            cache_ttl_secs: env_u64("VIGIL_CACHE_TTL_SECS").unwrap_or(defaults.cache_ttl_secs),
            default_per_minute: env_u64("VIGIL_DEFAULT_PER_MINUTE")
                .map(|n| n as u32)
                .unwrap_or(defaults.default_per_minute),
            dynamic_backoff: env_flag("VIGIL_DYNAMIC_BACKOFF").unwrap_or(defaults.dynamic_backoff),
            proxy_enabled: env_flag("VIGIL_PROXY_ENABLED").unwrap_or(defaults.proxy_enabled),
            proxy_list: env::var("VIGIL_PROXY_LIST").ok().map(PathBuf::from),
            proxy_rotate: env_flag("VIGIL_PROXY_ROTATE").unwrap_or(defaults.proxy_rotate),
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    env::var(name).ok()?.parse().ok()
}

fn env_flag(name: &str) -> Option<bool> {
    match env::var(name).ok()?.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
