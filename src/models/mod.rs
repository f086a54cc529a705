use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's saved search, as stored durably and mirrored in the registry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Filter {
    pub id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub name: String,
    pub query: String,
    /// 0 means unbounded
    pub min_price: i64,
    /// 0 means unbounded
    pub max_price: i64,
    /// Substring matched against the listing location; empty means any city
    pub city: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Filter {
    /// Both bounds set and contradictory is the only invalid combination.
    pub fn has_valid_bounds(&self) -> bool {
        self.min_price >= 0
            && self.max_price >= 0
            && (self.min_price == 0 || self.max_price == 0 || self.min_price <= self.max_price)
    }
}

/// One marketplace ad as observed on a search results page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Listing {
    pub url: String,
    pub title: String,
    /// Price as displayed, e.g. "25 000 грн."
    pub price: String,
    /// Parsed price, 0 when the display string is not a plain number
    pub price_int: i64,
    /// Location and date line, e.g. "Одеса - Сьогодні о 12:30"
    pub location: String,
}

/// Listings found for one filter signature
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionResult {
    pub listings: Vec<Listing>,
    pub captured_at: DateTime<Utc>,
}

impl ExtractionResult {
    pub fn new(listings: Vec<Listing>) -> Self {
        Self {
            listings,
            captured_at: Utc::now(),
        }
    }
}
