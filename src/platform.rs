use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use scraper::{ElementRef, Html, Selector};
use url::form_urlencoded;

use crate::error::ScrapeError;
use crate::extract::{self, FieldChain, PermalinkRule, Strategy};
use crate::types::Platform;

const AMAZON_ORIGIN: &str = "https://www.amazon.in";
const FLIPKART_ORIGIN: &str = "https://www.flipkart.com";

const AMAZON_NAME_SELECTORS: &[&str] = &["h2 span", ".a-size-base-plus", ".a-size-medium", ".a-text-normal"];
const AMAZON_PRICE_SELECTORS: &[&str] = &[".a-price-whole", ".a-offscreen"];

const FLIPKART_NAME_SELECTORS: &[&str] = &[
    "a.wjcEIp",   // title link
    ".wjcEIp",
    "a.rPDeLR",
    "a.VJA3rP",
    "div.KzDlHZ", // grid layout name
    "a[title]",
    ".s1Q9rs",    // older layouts
    ".IRpwTa",
    "._4rR01T",
];
const FLIPKART_PRICE_SELECTORS: &[&str] = &[
    "div.Nx9bqj",
    "._1_WHN1",
    "._30jeq3",
    ".Nx9bqj._4b5DiR",
    "div._25b18c",
    "._3I9_wc",
    "div.hl05eU",
    "div._16Jk6d",
];

/// Everything site-specific about searching one platform.
pub struct PlatformProfile {
    platform: Platform,
    origin: &'static str,
    container: &'static str,
    id_attr: &'static str,
    id_is_valid: fn(&str) -> bool,
    pub name: FieldChain<String>,
    pub price: FieldChain<u64>,
    pub url: FieldChain<String>,
}

impl PlatformProfile {
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Amazon => Self::amazon(),
            Platform::Flipkart => Self::flipkart(),
        }
    }

    pub fn amazon() -> Self {
        let permalink = PermalinkRule {
            origin: AMAZON_ORIGIN,
            path_markers: &["/dp/"],
            id_param: None,
        };
        Self {
            platform: Platform::Amazon,
            origin: AMAZON_ORIGIN,
            container: ".s-result-item",
            id_attr: "data-asin",
            id_is_valid: is_asin,
            name: extract::name_chain(AMAZON_NAME_SELECTORS),
            price: extract::price_chain(AMAZON_PRICE_SELECTORS),
            url: extract::url_chain(
                permalink,
                &[],
                own_asin_link()
                    .into_iter()
                    .chain(std::iter::once(Strategy::new("data-asin permalink", |item| {
                        item_asin(item).map(|asin| format!("/dp/{}", asin))
                    })))
                    .collect(),
            ),
        }
    }

    pub fn flipkart() -> Self {
        let permalink = PermalinkRule {
            origin: FLIPKART_ORIGIN,
            path_markers: &["/p/"],
            id_param: Some("pid"),
        };
        Self {
            platform: Platform::Flipkart,
            origin: FLIPKART_ORIGIN,
            container: "[data-id]",
            id_attr: "data-id",
            id_is_valid: |id| id.chars().count() > 3,
            name: extract::name_chain(FLIPKART_NAME_SELECTORS),
            price: extract::price_chain(FLIPKART_PRICE_SELECTORS),
            url: extract::url_chain(permalink, &["a[href*='/p/']", "a[href*='pid=']"], Vec::new()),
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn search_url(&self, query: &str) -> String {
        match self.platform {
            Platform::Amazon => {
                let encoded: String = form_urlencoded::byte_serialize(query.as_bytes()).collect();
                format!("{}/s?k={}", self.origin, encoded)
            }
            Platform::Flipkart => format!(
                "{}/search?q={}",
                self.origin,
                utf8_percent_encode(query, NON_ALPHANUMERIC)
            ),
        }
    }

    /// Search page biased to best sellers, used by synthesized results.
    pub fn bestseller_url(&self, query: &str) -> String {
        self.search_url(&format!("{} bestseller", query))
    }

    /// Degraded link for an item whose listing permalink could not be found.
    pub fn item_search_url(&self, query: &str, source_id: &str) -> String {
        match self.platform {
            Platform::Amazon => self.search_url(source_id),
            Platform::Flipkart => format!(
                "{}&pid={}",
                self.search_url(query),
                utf8_percent_encode(source_id, NON_ALPHANUMERIC)
            ),
        }
    }

    pub fn container_selector(&self) -> Result<Selector, ScrapeError> {
        Selector::parse(self.container).map_err(|e| ScrapeError::Selector {
            selector: self.container.to_string(),
            message: format!("{:?}", e),
        })
    }

    pub fn container(&self) -> &'static str {
        self.container
    }

    /// Item elements in document order.
    pub fn candidates<'a>(
        &self,
        document: &'a Html,
        selector: &'a Selector,
    ) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        document.select(selector)
    }

    /// The item's platform identifier, if present and well-formed.
    pub fn source_id(&self, item: ElementRef<'_>) -> Option<String> {
        item.value()
            .attr(self.id_attr)
            .map(str::trim)
            .filter(|id| (self.id_is_valid)(id))
            .map(str::to_string)
    }
}

fn is_asin(id: &str) -> bool {
    id.len() == 10 && id.chars().all(|c| c.is_ascii_alphanumeric())
}

fn item_asin(item: ElementRef<'_>) -> Option<&str> {
    item.value().attr("data-asin").map(str::trim).filter(|asin| is_asin(asin))
}

/// `/dp/` links of an item that point at the item's own ASIN. Sponsored
/// accessories and variants inside a result card link to other ASINs.
fn own_asin_link() -> Option<Strategy> {
    let links = Strategy::attr_all("a[href*='/dp/']", "href")?;
    Some(Strategy::many("own /dp/ link", move |item| {
        let Some(asin) = item_asin(item) else {
            return Vec::new();
        };
        let marker = format!("/dp/{}", asin);
        links
            .apply(item)
            .into_iter()
            .filter(|href| href.contains(&marker))
            .collect()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_urls() {
        let amazon = PlatformProfile::amazon();
        assert_eq!(amazon.search_url("cricket bat"), "https://www.amazon.in/s?k=cricket+bat");
        assert_eq!(
            amazon.bestseller_url("cricket bat"),
            "https://www.amazon.in/s?k=cricket+bat+bestseller"
        );
        assert_eq!(
            amazon.item_search_url("cricket bat", "B0AAAAAAA1"),
            "https://www.amazon.in/s?k=B0AAAAAAA1"
        );

        let flipkart = PlatformProfile::flipkart();
        assert_eq!(
            flipkart.search_url("laptop bag"),
            "https://www.flipkart.com/search?q=laptop%20bag"
        );
        assert_eq!(
            flipkart.item_search_url("laptop bag", "BAGFX7654321"),
            "https://www.flipkart.com/search?q=laptop%20bag&pid=BAGFX7654321"
        );
    }

    #[test]
    fn test_source_id_rules() {
        let html = Html::parse_document(
            r#"<div class="s-result-item" data-asin="B0AAAAAAA1"></div>
               <div class="s-result-item" data-asin=""></div>
               <div class="s-result-item" data-asin="SHORT"></div>
               <div class="s-result-item" data-asin="B0AAAA-AA1"></div>"#,
        );
        let amazon = PlatformProfile::amazon();
        let selector = amazon.container_selector().unwrap();
        let ids: Vec<_> = amazon
            .candidates(&html, &selector)
            .map(|item| amazon.source_id(item))
            .collect();
        assert_eq!(ids, vec![Some("B0AAAAAAA1".to_string()), None, None, None]);

        let html = Html::parse_document(r#"<div data-id="abc"></div><div data-id="BAGFX1"></div>"#);
        let flipkart = PlatformProfile::flipkart();
        let selector = flipkart.container_selector().unwrap();
        let ids: Vec<_> = flipkart
            .candidates(&html, &selector)
            .map(|item| flipkart.source_id(item))
            .collect();
        assert_eq!(ids, vec![None, Some("BAGFX1".to_string())]);
    }

    #[test]
    fn test_amazon_url_names_the_items_own_asin() {
        let html = Html::parse_document(
            r#"<div class="s-result-item" data-asin="B0AAAAAAA1">
                 <a href="/Accessory-Grip/dp/B0ZZZZZZZ9/ref=sr_1_1_sspa">Grip</a>
                 <h2><a href="/sg-bat/dp/B0AAAAAAA1/ref=sr_1_1?qid=1"><span>SG Bat</span></a></h2>
               </div>
               <div class="s-result-item" data-asin="B0AAAAAAA2">
                 <a href="/Other-Bat/dp/B0ZZZZZZZ8">Other</a>
               </div>"#,
        );
        let amazon = PlatformProfile::amazon();
        let selector = amazon.container_selector().unwrap();
        let urls: Vec<_> = amazon
            .candidates(&html, &selector)
            .map(|item| amazon.url.run(item))
            .collect();
        assert_eq!(
            urls,
            vec![
                Some("https://www.amazon.in/sg-bat/dp/B0AAAAAAA1/ref=sr_1_1".to_string()),
                Some("https://www.amazon.in/dp/B0AAAAAAA2".to_string()),
            ]
        );
    }

    #[test]
    fn test_profiles_parse_all_selectors() {
        let amazon = PlatformProfile::amazon();
        // Two strategies per name selector; price selectors plus the text pattern.
        assert_eq!(amazon.name.len(), AMAZON_NAME_SELECTORS.len() * 2);
        assert_eq!(amazon.price.len(), AMAZON_PRICE_SELECTORS.len() + 1);
        assert_eq!(amazon.url.len(), 2);

        let flipkart = PlatformProfile::flipkart();
        assert_eq!(flipkart.name.len(), FLIPKART_NAME_SELECTORS.len() * 2);
        assert_eq!(flipkart.price.len(), FLIPKART_PRICE_SELECTORS.len() + 1);
        assert_eq!(flipkart.url.len(), 2);
    }
}
