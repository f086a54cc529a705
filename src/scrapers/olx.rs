use crate::error::{Result, ScoutError};
use crate::models::Listing;
use crate::scrapers::text::{clean_text, parse_price, shift_relative_time};
use crate::scrapers::traits::ListingScraper;
use crate::scrapers::types::SearchFilters;
use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://www.olx.ua";

const AD_LINK_PATTERN: &str = "/d/uk/obyavlenie/";
const CARD_ATTR: (&str, &str) = ("data-cy", "l-card");

struct CardSelectors {
    link: Selector,
    title: Selector,
    price: Selector,
    location: Selector,
}

fn selectors() -> &'static CardSelectors {
    static SELECTORS: OnceLock<CardSelectors> = OnceLock::new();
    SELECTORS.get_or_init(|| CardSelectors {
        link: Selector::parse("a[href*='/d/uk/obyavlenie/']").expect("valid selector"),
        title: Selector::parse("h4, h6").expect("valid selector"),
        price: Selector::parse("p[data-testid='ad-price']").expect("valid selector"),
        location: Selector::parse("p[data-testid='location-date']").expect("valid selector"),
    })
}

/// OLX search results scraper
pub struct OlxScraper {
    client: Client,
    base_url: String,
    location_hour_offset: i64,
}

impl OlxScraper {
    /// Create a scraper against the public OLX site
    pub fn new() -> Result<Self> {
        Self::with_options(DEFAULT_BASE_URL, 3)
    }

    /// Create a scraper with a custom base URL and the hour offset applied to
    /// "today/yesterday at HH:MM" location lines
    pub fn with_options(base_url: &str, location_hour_offset: i64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36")
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            location_hour_offset,
        })
    }

    /// Search results URL for a query
    pub fn search_url(&self, query: &str) -> String {
        format!("{}/uk/list/q-{}/", self.base_url, urlencoding::encode(query))
    }

    /// Parse a search results page into filtered, deduplicated listings
    pub fn parse_listings(&self, html: &str, filters: &SearchFilters) -> Vec<Listing> {
        let document = Html::parse_document(html);
        let sel = selectors();

        let mut seen = HashSet::new();
        let mut listings = Vec::new();

        for link in document.select(&sel.link) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            if !href.contains(AD_LINK_PATTERN) {
                continue;
            }

            let url = self.absolute_url(href);
            if !seen.insert(url.clone()) {
                continue;
            }

            let card = closest_card(link).unwrap_or(link);
            let price = clean_text(&first_text(card, &sel.price));
            let location = clean_text(&first_text(card, &sel.location));

            let listing = Listing {
                url,
                title: clean_text(&first_text(card, &sel.title)),
                price_int: parse_price(&price),
                price,
                location: shift_relative_time(&location, self.location_hour_offset),
            };

            if filters.matches(&listing) {
                listings.push(listing);
            } else {
                debug!(url = %listing.url, price = listing.price_int, "Listing filtered out");
            }
        }

        listings
    }

    fn absolute_url(&self, href: &str) -> String {
        if href.starts_with("http://") || href.starts_with("https://") {
            href.to_string()
        } else {
            format!("{}{}", self.base_url, href)
        }
    }
}

/// Nearest ancestor that is a result card
fn closest_card(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().attr(CARD_ATTR.0) == Some(CARD_ATTR.1))
}

fn first_text(scope: ElementRef<'_>, selector: &Selector) -> String {
    scope
        .select(selector)
        .next()
        .map(|el| el.text().collect::<String>())
        .unwrap_or_default()
}

#[async_trait]
impl ListingScraper for OlxScraper {
    async fn search(&self, filters: &SearchFilters) -> Result<Vec<Listing>> {
        let url = self.search_url(&filters.query);

        debug!("Fetching URL: {}", url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            warn!("OLX returned status: {}", response.status());
            return Err(ScoutError::Status {
                status: response.status().as_u16(),
                url,
            });
        }

        let html = response.text().await?;

        debug!("Downloaded {} bytes of HTML", html.len());

        let listings = self.parse_listings(&html, filters);

        info!(
            query = %filters.query,
            count = listings.len(),
            "Extracted listings from OLX"
        );

        Ok(listings)
    }

    fn source_name(&self) -> &'static str {
        "OLX"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(href: &str, title: &str, price: &str, location: &str) -> String {
        format!(
            r#"<div data-cy="l-card">
                 <a href="{href}"><div class="img"></div></a>
                 <a href="{href}"><h4>{title}</h4></a>
                 <p data-testid="ad-price">{price}<style>.css-uf3yz9{{color:red}}</style></p>
                 <p data-testid="location-date">{location}</p>
               </div>"#
        )
    }

    fn page(cards: &[String]) -> String {
        format!("<html><body><div class=\"listing-grid\">{}</div></body></html>", cards.join(""))
    }

    fn scraper() -> OlxScraper {
        OlxScraper::with_options(DEFAULT_BASE_URL, 0).unwrap()
    }

    #[test]
    fn duplicate_links_reported_once() {
        let html = page(&[
            card("/d/uk/obyavlenie/iphone-15-IDa1.html", "iPhone 15", "27 000 грн.", "Одеса - Сьогодні о 10:00"),
            card("/d/uk/obyavlenie/iphone-15-IDa1.html", "iPhone 15", "27 000 грн.", "Одеса - Сьогодні о 10:00"),
        ]);

        let listings = scraper().parse_listings(&html, &SearchFilters::new("iphone"));

        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].url, "https://www.olx.ua/d/uk/obyavlenie/iphone-15-IDa1.html");
        assert_eq!(listings[0].title, "iPhone 15");
        assert_eq!(listings[0].price, "27 000 грн.");
        assert_eq!(listings[0].price_int, 27000);
        assert_eq!(listings[0].location, "Одеса - Сьогодні о 10:00");
    }

    #[test]
    fn non_ad_links_ignored() {
        let html = r#"<html><body>
            <a href="/uk/list/">All</a>
            <a href="/d/uk/obyavlenie/ok-IDb2.html">ok</a>
        </body></html>"#;

        let listings = scraper().parse_listings(html, &SearchFilters::new("x"));

        assert_eq!(listings.len(), 1);
        // No surrounding card: fields that cannot be found stay empty
        assert_eq!(listings[0].title, "");
        assert_eq!(listings[0].price, "");
        assert_eq!(listings[0].price_int, 0);
    }

    #[test]
    fn inline_markup_does_not_split_words() {
        let html = page(&[card(
            "/d/uk/obyavlenie/a-ID1.html",
            "iPh<b>one</b> 15 <span>Pro</span>",
            "27 000 грн.",
            "Київ",
        )]);

        let listings = scraper().parse_listings(&html, &SearchFilters::new("iphone"));
        assert_eq!(listings[0].title, "iPhone 15 Pro");
    }

    #[test]
    fn absolute_links_kept() {
        let html = page(&[card(
            "https://www.olx.ua/d/uk/obyavlenie/abs-IDc3.html",
            "Abs",
            "100 грн.",
            "Київ",
        )]);

        let listings = scraper().parse_listings(&html, &SearchFilters::new("x"));
        assert_eq!(listings[0].url, "https://www.olx.ua/d/uk/obyavlenie/abs-IDc3.html");
    }

    #[test]
    fn filters_by_price_and_city() {
        let html = page(&[
            card("/d/uk/obyavlenie/a-ID1.html", "A", "26 500 грн.", "Одеса, Київський - Сьогодні о 09:00"),
            card("/d/uk/obyavlenie/b-ID2.html", "B", "35 000 грн.", "Одеса - Вчора о 18:00"),
            card("/d/uk/obyavlenie/c-ID3.html", "C", "28 000 грн.", "Київ - Сьогодні о 11:00"),
            card("/d/uk/obyavlenie/d-ID4.html", "D", "Договірна", "Одеса - Сьогодні о 12:00"),
        ]);
        let filters = SearchFilters::new("iphone-15")
            .with_price_range(25000, 30000)
            .with_city("одеса");

        let listings = scraper().parse_listings(&html, &filters);

        let titles: Vec<_> = listings.iter().map(|l| l.title.as_str()).collect();
        assert_eq!(titles, vec!["A"]);
    }

    #[test]
    fn contradictory_bounds_do_not_panic() {
        let html = page(&[card("/d/uk/obyavlenie/a-ID1.html", "A", "150 грн.", "Київ")]);
        let filters = SearchFilters::new("x").with_price_range(200, 100);

        assert!(scraper().parse_listings(&html, &filters).is_empty());
    }

    #[test]
    fn location_time_shifted() {
        let scraper = OlxScraper::with_options(DEFAULT_BASE_URL, 3).unwrap();
        let html = page(&[card("/d/uk/obyavlenie/a-ID1.html", "A", "150 грн.", "Київ - Сьогодні о 21:15")]);

        let listings = scraper.parse_listings(&html, &SearchFilters::new("x"));
        assert_eq!(listings[0].location, "Київ - Сьогодні о 00:15");
    }

    #[test]
    fn search_url_encodes_query() {
        let scraper = OlxScraper::with_options("http://localhost:8080/", 0).unwrap();
        assert_eq!(scraper.search_url("iphone-15"), "http://localhost:8080/uk/list/q-iphone-15/");
        assert_eq!(scraper.search_url("iphone 15"), "http://localhost:8080/uk/list/q-iphone%2015/");
    }
}
