//! Proxy endpoint pool
//!
//! The list is loaded once from configuration and only ever reordered.
//! Rotation reshuffles under a short lock; a request observing a stale
//! ordering is harmless.

use std::fs;
use std::path::Path;

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use crate::NetConfig;

/// Ordered set of proxy endpoints
pub struct ProxyPool {
    proxies: Mutex<Vec<String>>,
    rotate: bool,
}

impl ProxyPool {
    pub fn from_config(config: &NetConfig) -> Self {
        let proxies = if config.proxy_enabled {
            let loaded = config
                .proxy_list
                .as_deref()
                .map(load_proxies)
                .unwrap_or_default();
            if loaded.is_empty() {
                warn!("proxying enabled but no proxy endpoints loaded");
            } else {
                debug!(count = loaded.len(), "loaded proxy endpoints");
            }
            loaded
        } else {
            Vec::new()
        };
        Self::from_list(proxies, config.proxy_rotate)
    }

    pub fn from_list(proxies: Vec<String>, rotate: bool) -> Self {
        Self {
            proxies: Mutex::new(proxies),
            rotate,
        }
    }

    /// Pick the proxy for the next request
    ///
    /// `None` means direct connection. With rotation enabled the list is
    /// reshuffled first, so consecutive requests spread across endpoints.
    pub fn choose(&self) -> Option<String> {
        let mut proxies = self.proxies.lock();
        if proxies.is_empty() {
            return None;
        }
        if self.rotate {
            proxies.shuffle(&mut rand::thread_rng());
        }
        proxies.first().cloned()
    }

    pub fn len(&self) -> usize {
        self.proxies.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.lock().is_empty()
    }
}

fn load_proxies(path: &Path) -> Vec<String> {
    match fs::read_to_string(path) {
        Ok(contents) => contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to read proxy list");
            Vec::new()
        }
    }
}
