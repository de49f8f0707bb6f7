use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::GatewayError;

/// Maximum number of products returned by one search.
pub const MAX_PRODUCTS: usize = 6;
/// Candidate items inspected per page (2x the target, to absorb extraction misses).
pub const CANDIDATE_LIMIT: usize = MAX_PRODUCTS * 2;
/// Price ceiling applied when the caller does not send one.
pub const DEFAULT_PRICE_MAX: f64 = 40_000.0;
/// Longest product name kept in a record, in characters.
pub const MAX_NAME_CHARS: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Amazon,
    Flipkart,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::Amazon, Platform::Flipkart];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Amazon => "amazon",
            Platform::Flipkart => "flipkart",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "amazon" => Ok(Platform::Amazon),
            "flipkart" => Ok(Platform::Flipkart),
            other => Err(GatewayError::InvalidArguments(format!(
                "unsupported platform: {}",
                other
            ))),
        }
    }
}

/// One product listing accepted under the caller's price ceiling.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProductRecord {
    pub name: String,
    #[serde(rename = "price")]
    pub price_display: String,
    #[serde(rename = "price_num")]
    pub price_numeric: u64,
    pub url: String,
    /// ASIN or listing id; absent on synthesized records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    pub platform: Platform,
}

impl ProductRecord {
    pub fn new(
        name: &str,
        price_numeric: u64,
        url: String,
        source_id: Option<String>,
        platform: Platform,
    ) -> Self {
        Self {
            name: name.chars().take(MAX_NAME_CHARS).collect(),
            price_display: format_price(price_numeric),
            price_numeric,
            url,
            source_id,
            platform,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SearchResult {
    pub query: String,
    #[serde(rename = "price_max")]
    pub price_ceiling: f64,
    pub count: usize,
    pub products: Vec<ProductRecord>,
    pub fetched_at: DateTime<Utc>,
}

impl SearchResult {
    /// Builds a result, truncating to [`MAX_PRODUCTS`] and keeping `count` in step.
    pub fn new(
        query: &str,
        price_ceiling: f64,
        mut products: Vec<ProductRecord>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        products.truncate(MAX_PRODUCTS);
        Self {
            query: query.to_string(),
            price_ceiling,
            count: products.len(),
            products,
            fetched_at,
        }
    }
}

/// Arguments of the `search_products` tool.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchProductsArgs {
    pub query: String,
    #[serde(default)]
    pub price_max: Option<f64>,
    #[serde(default)]
    pub platform: Option<String>,
}

/// Validated form of [`SearchProductsArgs`].
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub price_ceiling: f64,
    pub platform: Platform,
}

impl SearchProductsArgs {
    pub fn from_value(arguments: serde_json::Value) -> Result<Self, GatewayError> {
        serde_json::from_value(arguments)
            .map_err(|e| GatewayError::InvalidArguments(e.to_string()))
    }

    pub fn validate(self, default_platform: Platform) -> Result<SearchRequest, GatewayError> {
        let query = self.query.trim().to_string();
        if query.is_empty() {
            return Err(GatewayError::InvalidArguments(
                "query must not be empty".to_string(),
            ));
        }

        let price_ceiling = self.price_max.unwrap_or(DEFAULT_PRICE_MAX);
        if !price_ceiling.is_finite() || price_ceiling < 0.0 {
            return Err(GatewayError::InvalidArguments(format!(
                "price_max must be a non-negative number, got {}",
                price_ceiling
            )));
        }

        let platform = match self.platform.as_deref() {
            Some(name) if !name.trim().is_empty() => name.parse()?,
            _ => default_platform,
        };

        Ok(SearchRequest {
            query,
            price_ceiling,
            platform,
        })
    }
}

/// Renders a price as `₹` plus comma-grouped thousands, e.g. `₹12,999`.
pub fn format_price(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("₹{}", grouped)
}
