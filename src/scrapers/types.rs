use crate::models::{Filter, Listing};
use serde::{Deserialize, Serialize};

/// Search parameters for one marketplace query
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchFilters {
    /// Free-text query, sent as-is (URL-encoded) to the search endpoint
    pub query: String,
    /// Minimum price (UAH), 0 = unbounded
    pub min_price: i64,
    /// Maximum price (UAH), 0 = unbounded
    pub max_price: i64,
    /// Case-insensitive substring of the location line, empty = any
    pub city: String,
}

impl SearchFilters {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_price_range(mut self, min_price: i64, max_price: i64) -> Self {
        self.min_price = min_price;
        self.max_price = max_price;
        self
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = city.into();
        self
    }

    /// Whether a listing survives the price and city constraints.
    ///
    /// A listing with an unknown price (0) fails any nonzero minimum.
    /// Contradictory bounds (min > max) reject everything.
    pub fn matches(&self, listing: &Listing) -> bool {
        if self.min_price > 0 && listing.price_int < self.min_price {
            return false;
        }
        if self.max_price > 0 && listing.price_int > self.max_price {
            return false;
        }
        if !self.city.is_empty() {
            let city = self.city.to_lowercase();
            if !listing.location.to_lowercase().contains(&city) {
                return false;
            }
        }
        true
    }
}

impl From<&Filter> for SearchFilters {
    fn from(filter: &Filter) -> Self {
        Self {
            query: filter.query.clone(),
            min_price: filter.min_price,
            max_price: filter.max_price,
            city: filter.city.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(price_int: i64, location: &str) -> Listing {
        Listing {
            url: "https://www.olx.ua/d/uk/obyavlenie/x.html".to_string(),
            title: "x".to_string(),
            price: price_int.to_string(),
            price_int,
            location: location.to_string(),
        }
    }

    #[test]
    fn price_bounds() {
        let f = SearchFilters::new("iphone").with_price_range(100, 200);
        assert!(!f.matches(&listing(99, "")));
        assert!(f.matches(&listing(100, "")));
        assert!(f.matches(&listing(200, "")));
        assert!(!f.matches(&listing(201, "")));
    }

    #[test]
    fn unknown_price_kept_without_minimum() {
        let f = SearchFilters::new("iphone");
        assert!(f.matches(&listing(0, "Київ")));

        let f = SearchFilters::new("iphone").with_price_range(0, 500);
        assert!(f.matches(&listing(0, "Київ")));

        let f = SearchFilters::new("iphone").with_price_range(1, 0);
        assert!(!f.matches(&listing(0, "Київ")));
    }

    #[test]
    fn contradictory_bounds_match_nothing() {
        let f = SearchFilters::new("iphone").with_price_range(300, 100);
        for price in [0, 50, 100, 200, 300, 400] {
            assert!(!f.matches(&listing(price, "")));
        }
    }

    #[test]
    fn city_is_case_insensitive_substring() {
        let f = SearchFilters::new("iphone").with_city("одеса");
        assert!(f.matches(&listing(10, "Одеса, Приморський - Сьогодні о 12:00")));
        assert!(!f.matches(&listing(10, "Київ - Вчора о 10:00")));
        assert!(!f.matches(&listing(10, "")));
    }
}
