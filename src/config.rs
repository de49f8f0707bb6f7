use anyhow::{anyhow, Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::browser::{BrowserSettings, DEFAULT_NAV_TIMEOUT, DEFAULT_SETTLE};
use crate::cache::DEFAULT_TTL;
use crate::types::Platform;

const DEFAULT_ADDR: &str = "127.0.0.1:8001";

/// Runtime settings, read from the environment once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub default_platform: Platform,
    pub cache_ttl: Duration,
    pub browser: BrowserSettings,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let bind_addr = var("PRODUCT_MCP_ADDR")
            .unwrap_or_else(|| DEFAULT_ADDR.to_string())
            .parse::<SocketAddr>()
            .context("PRODUCT_MCP_ADDR must be a socket address such as 127.0.0.1:8001")?;

        let default_platform = match var("PRODUCT_MCP_DEFAULT_PLATFORM") {
            Some(name) => name
                .parse::<Platform>()
                .map_err(|e| anyhow!("PRODUCT_MCP_DEFAULT_PLATFORM: {}", e))?,
            None => Platform::Amazon,
        };

        let cache_ttl = duration_var(var("PRODUCT_MCP_CACHE_TTL_SECS"), "PRODUCT_MCP_CACHE_TTL_SECS", Duration::from_secs)?
            .unwrap_or(DEFAULT_TTL);
        let navigation_timeout =
            duration_var(var("PRODUCT_MCP_NAV_TIMEOUT_MS"), "PRODUCT_MCP_NAV_TIMEOUT_MS", Duration::from_millis)?
                .unwrap_or(DEFAULT_NAV_TIMEOUT);
        let settle = duration_var(var("PRODUCT_MCP_SETTLE_MS"), "PRODUCT_MCP_SETTLE_MS", Duration::from_millis)?
            .unwrap_or(DEFAULT_SETTLE);

        Ok(Self {
            bind_addr,
            default_platform,
            cache_ttl,
            browser: BrowserSettings {
                executable: var("CHROME_PATH").map(PathBuf::from),
                navigation_timeout,
                settle,
            },
        })
    }
}

fn duration_var(
    value: Option<String>,
    key: &str,
    unit: fn(u64) -> Duration,
) -> Result<Option<Duration>> {
    value
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map(unit)
                .with_context(|| format!("{} must be a whole number, got '{}'", key, raw))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8001".parse().unwrap());
        assert_eq!(config.default_platform, Platform::Amazon);
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.browser.navigation_timeout, Duration::from_secs(15));
        assert_eq!(config.browser.settle, Duration::from_millis(2500));
        assert!(config.browser.executable.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PRODUCT_MCP_ADDR", "0.0.0.0:8002"),
            ("PRODUCT_MCP_DEFAULT_PLATFORM", "Flipkart"),
            ("PRODUCT_MCP_CACHE_TTL_SECS", "60"),
            ("PRODUCT_MCP_NAV_TIMEOUT_MS", "5000"),
            ("PRODUCT_MCP_SETTLE_MS", "0"),
            ("CHROME_PATH", "/usr/bin/chromium"),
        ])
        .unwrap();
        assert_eq!(config.bind_addr.port(), 8002);
        assert_eq!(config.default_platform, Platform::Flipkart);
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.browser.navigation_timeout, Duration::from_secs(5));
        assert_eq!(config.browser.settle, Duration::ZERO);
        assert_eq!(config.browser.executable, Some(PathBuf::from("/usr/bin/chromium")));
    }

    #[test]
    fn test_invalid_values_fail() {
        assert!(config_from(&[("PRODUCT_MCP_ADDR", "nowhere")]).is_err());
        assert!(config_from(&[("PRODUCT_MCP_DEFAULT_PLATFORM", "ebay")]).is_err());
        let err = config_from(&[("PRODUCT_MCP_CACHE_TTL_SECS", "five")]).unwrap_err();
        assert!(err.to_string().contains("PRODUCT_MCP_CACHE_TTL_SECS"));
    }
}
