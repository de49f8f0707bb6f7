pub mod browser;
pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod fallback;
pub mod mcp;
pub mod platform;
pub mod search;
pub mod stdio_service;
pub mod types;

use std::sync::Arc;

use browser::{ChromiumRenderer, PageRenderer};
use cache::{ProductCache, SystemClock};
use config::Config;
use search::ProductSearch;

pub struct AppState {
    pub default_platform: types::Platform,
    // One adapter per platform; both write to the same cache.
    amazon: ProductSearch,
    flipkart: ProductSearch,
}

pub use types::*;

impl AppState {
    pub fn new(config: &Config) -> Self {
        let renderer = Arc::new(ChromiumRenderer::new(config.browser.clone()));
        let cache = ProductCache::new(config.cache_ttl, Arc::new(SystemClock));
        Self::with_renderer(renderer, cache, config.default_platform)
    }

    pub fn with_renderer(
        renderer: Arc<dyn PageRenderer>,
        cache: ProductCache,
        default_platform: types::Platform,
    ) -> Self {
        Self {
            default_platform,
            amazon: ProductSearch::new(types::Platform::Amazon, renderer.clone(), cache.clone()),
            flipkart: ProductSearch::new(types::Platform::Flipkart, renderer, cache),
        }
    }

    pub fn adapter(&self, platform: types::Platform) -> &ProductSearch {
        match platform {
            types::Platform::Amazon => &self.amazon,
            types::Platform::Flipkart => &self.flipkart,
        }
    }
}
