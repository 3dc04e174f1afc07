//! Resolver configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for [`MediaResolver`](crate::MediaResolver)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// How long to wait for a proxy that is still starting up (default: 5000)
    #[serde(default = "default_proxy_ready_timeout_ms")]
    pub proxy_ready_timeout_ms: u64,

    /// Session refreshes allowed after an authorization failure (default: 2)
    #[serde(default = "default_max_auth_retries")]
    pub max_auth_retries: u32,

    /// Lifetime of a memoized proxy locator (default: 3000)
    #[serde(default = "default_memo_ttl_ms")]
    pub memo_ttl_ms: u64,

    /// Number of memoized proxy locators kept (default: 32)
    #[serde(default = "default_memo_capacity")]
    pub memo_capacity: usize,
}

impl ResolverConfig {
    pub fn proxy_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.proxy_ready_timeout_ms)
    }

    pub fn memo_ttl(&self) -> Duration {
        Duration::from_millis(self.memo_ttl_ms)
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            proxy_ready_timeout_ms: default_proxy_ready_timeout_ms(),
            max_auth_retries: default_max_auth_retries(),
            memo_ttl_ms: default_memo_ttl_ms(),
            memo_capacity: default_memo_capacity(),
        }
    }
}

fn default_proxy_ready_timeout_ms() -> u64 {
    5000
}

fn default_max_auth_retries() -> u32 {
    2
}

fn default_memo_ttl_ms() -> u64 {
    3000
}

fn default_memo_capacity() -> usize {
    32
}
