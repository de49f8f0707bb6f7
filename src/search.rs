use scraper::{ElementRef, Html};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::browser::PageRenderer;
use crate::cache::{CacheKey, ProductCache};
use crate::error::ScrapeError;
use crate::fallback;
use crate::platform::PlatformProfile;
use crate::types::{Platform, ProductRecord, SearchResult, CANDIDATE_LIMIT, MAX_PRODUCTS};

/// How a search result was produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Cached(SearchResult),
    Scraped(SearchResult),
    Fallback { result: SearchResult, reason: String },
}

impl SearchOutcome {
    pub fn result(&self) -> &SearchResult {
        match self {
            SearchOutcome::Cached(result)
            | SearchOutcome::Scraped(result)
            | SearchOutcome::Fallback { result, .. } => result,
        }
    }

    pub fn into_result(self) -> SearchResult {
        match self {
            SearchOutcome::Cached(result)
            | SearchOutcome::Scraped(result)
            | SearchOutcome::Fallback { result, .. } => result,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SearchOutcome::Cached(_) => "cache",
            SearchOutcome::Scraped(_) => "scraped",
            SearchOutcome::Fallback { .. } => "fallback",
        }
    }
}

/// Searches one platform: cache first, then a fresh browser session, then synthesis.
pub struct ProductSearch {
    profile: PlatformProfile,
    renderer: Arc<dyn PageRenderer>,
    cache: ProductCache,
}

impl ProductSearch {
    pub fn new(platform: Platform, renderer: Arc<dyn PageRenderer>, cache: ProductCache) -> Self {
        Self {
            profile: PlatformProfile::for_platform(platform),
            renderer,
            cache,
        }
    }

    pub fn platform(&self) -> Platform {
        self.profile.platform()
    }

    pub async fn search(&self, query: &str, price_ceiling: f64) -> SearchResult {
        self.search_outcome(query, price_ceiling).await.into_result()
    }

    pub async fn search_outcome(&self, query: &str, price_ceiling: f64) -> SearchOutcome {
        let platform = self.platform();
        let key = CacheKey::new(platform, query, price_ceiling);

        if let Some(cached) = self.cache.lookup(&key).await {
            info!(%platform, query, price_ceiling, count = cached.count, "cache hit");
            return SearchOutcome::Cached(cached);
        }

        info!(%platform, query, price_ceiling, "scraping");
        let outcome = match self.scrape(query, price_ceiling).await {
            Ok(products) => SearchOutcome::Scraped(SearchResult::new(
                query,
                price_ceiling,
                products,
                self.cache.now(),
            )),
            Err(e) => {
                error!(%platform, query, price_ceiling, stage = "session", "scrape failed: {}", e);
                SearchOutcome::Fallback {
                    result: SearchResult::new(
                        query,
                        price_ceiling,
                        fallback::synthesize(&self.profile, query, price_ceiling),
                        self.cache.now(),
                    ),
                    reason: e.to_string(),
                }
            }
        };

        self.cache.store(key, outcome.result().clone()).await;
        info!(
            %platform,
            query,
            count = outcome.result().count,
            source = outcome.kind(),
            "returning products"
        );
        outcome
    }

    async fn scrape(&self, query: &str, price_ceiling: f64) -> Result<Vec<ProductRecord>, ScrapeError> {
        let url = self.profile.search_url(query);
        let html = self.renderer.render(&url).await?;
        extract_products(&self.profile, &html, &url, query, price_ceiling)
    }
}

/// Walks the first [`CANDIDATE_LIMIT`] items of a rendered result page and keeps
/// up to [`MAX_PRODUCTS`] that extract cleanly and fit under the ceiling.
pub fn extract_products(
    profile: &PlatformProfile,
    html: &str,
    page_url: &str,
    query: &str,
    price_ceiling: f64,
) -> Result<Vec<ProductRecord>, ScrapeError> {
    let document = Html::parse_document(html);
    let selector = profile.container_selector()?;

    let total = profile.candidates(&document, &selector).count();
    if total == 0 {
        return Err(ScrapeError::NoCandidates {
            selector: profile.container().to_string(),
            url: page_url.to_string(),
        });
    }
    info!("Inspecting top {} of {} result items", total.min(CANDIDATE_LIMIT), total);

    let mut products = Vec::with_capacity(MAX_PRODUCTS);
    for (index, item) in profile
        .candidates(&document, &selector)
        .take(CANDIDATE_LIMIT)
        .enumerate()
    {
        if let Some(product) = extract_item(profile, item, index, query, price_ceiling) {
            debug!("Accepted {}: {} - {}", products.len() + 1, product.name, product.price_display);
            products.push(product);
        }
        if products.len() >= MAX_PRODUCTS {
            break;
        }
    }
    Ok(products)
}

fn extract_item(
    profile: &PlatformProfile,
    item: ElementRef<'_>,
    index: usize,
    query: &str,
    price_ceiling: f64,
) -> Option<ProductRecord> {
    let Some(source_id) = profile.source_id(item) else {
        debug!("Item {} has no valid identifier, skipping", index + 1);
        return None;
    };

    let Some(name) = profile.name.run(item) else {
        warn!(query, source_id = %source_id, stage = "name", "no name found");
        return None;
    };

    let Some(price) = profile.price.run(item) else {
        warn!(query, source_id = %source_id, stage = "price", "no price found");
        return None;
    };

    if price as f64 > price_ceiling {
        debug!("{} - ₹{} exceeds ₹{}", name, price, price_ceiling);
        return None;
    }

    let url = profile.url.run(item).unwrap_or_else(|| {
        warn!(query, source_id = %source_id, stage = "url", "no listing link, using search link");
        profile.item_search_url(query, &source_id)
    });

    Some(ProductRecord::new(&name, price, url, Some(source_id), profile.platform()))
}
