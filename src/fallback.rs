use crate::platform::PlatformProfile;
use crate::types::ProductRecord;

/// Upper bound on the synthesized base price.
const BASE_PRICE_CAP: u64 = 1500;

/// Placeholder products for when the live site could not be read at all.
///
/// Deterministic for a given input. Prices stay under `price_ceiling` and the
/// links point at the platform's search page rather than any listing.
pub fn synthesize(profile: &PlatformProfile, query: &str, price_ceiling: f64) -> Vec<ProductRecord> {
    let base = BASE_PRICE_CAP.min((price_ceiling * 0.6).floor() as u64);
    let top = base * 6 / 5;
    let title = title_case(query);

    vec![
        ProductRecord::new(
            &format!("{} - Best Value", title),
            base,
            profile.search_url(query),
            None,
            profile.platform(),
        ),
        ProductRecord::new(
            &format!("{} - Top Rated", title),
            top,
            profile.bestseller_url(query),
            None,
            profile.platform(),
        ),
    ]
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Platform;

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("cricket bat"), "Cricket Bat");
        assert_eq!(title_case("  LAPTOP   bag "), "Laptop Bag");
    }

    #[test]
    fn test_synthesize_cricket_bat() {
        let profile = PlatformProfile::amazon();
        let products = synthesize(&profile, "cricket bat", 2000.0);

        assert_eq!(products.len(), 2);
        assert_eq!(products[0].name, "Cricket Bat - Best Value");
        assert_eq!(products[0].price_numeric, 1200);
        assert_eq!(products[0].price_display, "₹1,200");
        assert_eq!(products[0].url, "https://www.amazon.in/s?k=cricket+bat");
        assert_eq!(products[1].name, "Cricket Bat - Top Rated");
        assert_eq!(products[1].price_numeric, 1440);
        assert_eq!(
            products[1].url,
            "https://www.amazon.in/s?k=cricket+bat+bestseller"
        );
        assert!(products.iter().all(|p| p.source_id.is_none()));
        assert!(products.iter().all(|p| p.platform == Platform::Amazon));
    }

    #[test]
    fn test_synthesized_prices_respect_ceiling() {
        let profile = PlatformProfile::flipkart();
        for ceiling in [0.0, 1.0, 99.0, 1000.0, 2500.0, 40_000.0] {
            let products = synthesize(&profile, "laptop bag", ceiling);
            assert_eq!(products.len(), 2);
            for product in products {
                assert!(product.price_numeric as f64 <= ceiling, "{} > {}", product.price_numeric, ceiling);
            }
        }
    }

    #[test]
    fn test_base_price_is_capped() {
        let profile = PlatformProfile::flipkart();
        let products = synthesize(&profile, "laptop bag", 40_000.0);
        assert_eq!(products[0].price_numeric, 1500);
        assert_eq!(products[1].price_numeric, 1800);
        assert_eq!(
            products[0].url,
            "https://www.flipkart.com/search?q=laptop%20bag"
        );
    }
}
