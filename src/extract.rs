//! Field extraction for result items.
//!
//! Each product field (name, price, URL) is pulled out of an item element by a
//! [`FieldChain`]: an ordered list of [`Strategy`] values tried one after the
//! other until one produces a value the chain accepts. Markup on listing pages
//! drifts between items on the same page, so every field carries several
//! independent selectors and, for prices, a last-resort text pattern.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Selector};
use tracing::{debug, warn};
use url::Url;

/// Minimum trimmed length of a usable product name (exclusive).
pub const MIN_NAME_CHARS: usize = 5;

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

/// Currency-prefixed amount anywhere in an item's text: `₹1,299`, `Rs. 999`, `INR 1,29,999`.
static CURRENCY_AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:₹|Rs\.?|INR)\s*(\d{1,3}(?:,\d{2,3})+|\d+)").unwrap()
});

type Extractor = Box<dyn for<'a> Fn(ElementRef<'a>) -> Vec<String> + Send + Sync>;
type Acceptor<T> = Box<dyn Fn(&str) -> Option<T> + Send + Sync>;

/// One way of pulling raw values out of an item element. A strategy may yield
/// several candidates; the chain takes the first one its acceptor keeps.
pub struct Strategy {
    label: String,
    extract: Extractor,
}

impl Strategy {
    pub fn new<F>(label: impl Into<String>, extract: F) -> Self
    where
        F: for<'a> Fn(ElementRef<'a>) -> Option<String> + Send + Sync + 'static,
    {
        Self::many(label, move |item| extract(item).into_iter().collect())
    }

    pub fn many<F>(label: impl Into<String>, extract: F) -> Self
    where
        F: for<'a> Fn(ElementRef<'a>) -> Vec<String> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            extract: Box::new(extract),
        }
    }

    /// Whitespace-collapsed text of the first element matching `css`.
    pub fn text(css: &str) -> Option<Self> {
        let selector = parse_selector(css)?;
        Some(Self::new(format!("{} text", css), move |item| {
            item.select(&selector)
                .next()
                .map(element_text)
                .filter(|text| !text.is_empty())
        }))
    }

    /// `attr` of the first element matching `css`.
    pub fn attr(css: &str, attr: &'static str) -> Option<Self> {
        let selector = parse_selector(css)?;
        Some(Self::new(format!("{} @{}", css, attr), move |item| {
            item.select(&selector)
                .next()
                .and_then(|el| el.value().attr(attr))
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        }))
    }

    /// `attr` of every element matching `css`, in document order.
    pub fn attr_all(css: &str, attr: &'static str) -> Option<Self> {
        let selector = parse_selector(css)?;
        Some(Self::many(format!("{} @{}*", css, attr), move |item| {
            item.select(&selector)
                .filter_map(|el| el.value().attr(attr))
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .collect()
        }))
    }

    /// Whole text of the item, matched against the currency pattern.
    pub fn currency_in_text() -> Self {
        Self::new("item text pattern", |item| {
            let text = element_text(item);
            CURRENCY_AMOUNT
                .captures(&text)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().replace(',', ""))
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn apply(&self, item: ElementRef<'_>) -> Vec<String> {
        (self.extract)(item)
    }
}

/// Ordered strategies for one field; the first value the acceptor takes wins.
pub struct FieldChain<T> {
    field: &'static str,
    strategies: Vec<Strategy>,
    accept: Acceptor<T>,
}

impl<T> FieldChain<T> {
    pub fn new<F>(field: &'static str, accept: F) -> Self
    where
        F: Fn(&str) -> Option<T> + Send + Sync + 'static,
    {
        Self {
            field,
            strategies: Vec::new(),
            accept: Box::new(accept),
        }
    }

    /// Appends a strategy. `None` (an unparseable selector) is dropped.
    pub fn then(mut self, strategy: Option<Strategy>) -> Self {
        if let Some(strategy) = strategy {
            self.strategies.push(strategy);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn run(&self, item: ElementRef<'_>) -> Option<T> {
        for strategy in &self.strategies {
            for raw in strategy.apply(item) {
                if let Some(value) = (self.accept)(&raw) {
                    debug!(field = self.field, strategy = strategy.label(), "field extracted");
                    return Some(value);
                }
                debug!(field = self.field, strategy = strategy.label(), raw = %raw, "value rejected");
            }
        }
        None
    }
}

/// Builds the name chain: for each selector, its text and then its `title` attribute.
pub fn name_chain(selectors: &[&str]) -> FieldChain<String> {
    selectors.iter().fold(FieldChain::new("name", accept_name), |chain, css| {
        chain.then(Strategy::text(css)).then(Strategy::attr(css, "title"))
    })
}

/// Builds the price chain: each selector's text, then the whole-item pattern.
pub fn price_chain(selectors: &[&str]) -> FieldChain<u64> {
    selectors
        .iter()
        .fold(FieldChain::new("price", parse_price), |chain, css| {
            chain.then(Strategy::text(css))
        })
        .then(Some(Strategy::currency_in_text()))
}

pub fn accept_name(raw: &str) -> Option<String> {
    let name = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    (name.chars().count() > MIN_NAME_CHARS).then_some(name)
}

/// Strips currency markers, separators and whitespace, then reads the first run of digits.
pub fn parse_price(raw: &str) -> Option<u64> {
    let cleaned: String = raw
        .replace("INR", "")
        .replace("Rs", "")
        .chars()
        .filter(|c| !matches!(c, '₹' | '$' | '€' | '£' | ',') && !c.is_whitespace())
        .collect();
    DIGIT_RUN
        .find(&cleaned)
        .and_then(|m| m.as_str().parse::<u64>().ok())
}

/// Decides whether an href points at a single listing and canonicalizes it.
#[derive(Debug, Clone)]
pub struct PermalinkRule {
    pub origin: &'static str,
    /// Path fragments that mark a product page, e.g. `/dp/`.
    pub path_markers: &'static [&'static str],
    /// Query parameter carrying the item id; the only one kept.
    pub id_param: Option<&'static str>,
}

impl PermalinkRule {
    pub fn accept(&self, href: &str) -> Option<String> {
        let base = Url::parse(self.origin).ok()?;
        let mut url = base.join(href.trim()).ok()?;
        if !matches!(url.scheme(), "http" | "https") || url.path().contains("/search") {
            return None;
        }

        let id = self.id_param.and_then(|param| {
            url.query_pairs()
                .find(|(key, value)| key == param && !value.is_empty())
                .map(|(_, value)| (param, value.into_owned()))
        });
        let marked = self
            .path_markers
            .iter()
            .any(|marker| url.path().contains(marker));
        if !marked && id.is_none() {
            return None;
        }

        url.set_fragment(None);
        url.set_query(None);
        if let Some((param, value)) = id {
            url.query_pairs_mut().append_pair(param, &value);
        }
        Some(url.to_string())
    }
}

/// Builds the URL chain from href selectors plus any extra strategies. Every
/// matching link of an item is offered to the rule, not only the first.
pub fn url_chain(
    rule: PermalinkRule,
    href_selectors: &[&str],
    extra: Vec<Strategy>,
) -> FieldChain<String> {
    let chain = href_selectors
        .iter()
        .fold(FieldChain::new("url", move |raw| rule.accept(raw)), |chain, css| {
            chain.then(Strategy::attr_all(css, "href"))
        });
    extra.into_iter().fold(chain, |chain, s| chain.then(Some(s)))
}

pub fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(selector) => Some(selector),
        Err(e) => {
            warn!("Dropping unparseable selector '{}': {:?}", css, e);
            None
        }
    }
}
