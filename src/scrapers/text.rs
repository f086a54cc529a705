//! Text normalization for marketplace markup.
//!
//! Card text often carries inline `<style>` fragments and stray CSS
//! declarations next to the visible content, so everything extracted from a
//! card goes through [`clean_text`] before it is stored.

use regex::Regex;
use std::sync::OnceLock;

const CURRENCY_SUFFIX: &str = "грн.";

fn css_class_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.css-[^;]+;|\.css-[^}]+\}").expect("valid regex"))
}

fn css_property_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[a-zA-Z-]+:\s*[^;]+;").expect("valid regex"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

fn relative_time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(Сьогодні|Вчора) о (\d{1,2}):(\d{2})").expect("valid regex")
    })
}

/// Strip CSS artifacts, collapse whitespace runs and trim.
pub fn clean_text(text: &str) -> String {
    let text = css_class_re().replace_all(text, "");
    let text = css_property_re().replace_all(&text, "");
    let text = whitespace_re().replace_all(&text, " ");
    text.trim().to_string()
}

/// Parse a displayed price such as "25 000 грн." into an integer.
///
/// Anything that is not a plain number once spaces and the currency suffix
/// are gone ("Договірна", "Безкоштовно", "") yields 0.
pub fn parse_price(price: &str) -> i64 {
    let cleaned: String = price
        .replace(CURRENCY_SUFFIX, "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    cleaned.parse::<i64>().unwrap_or(0)
}

/// Shift "Сьогодні о HH:MM" / "Вчора о HH:MM" by `hours`, wrapping at 24.
///
/// Only the hour is adjusted; the day word is left alone.
pub fn shift_relative_time(location: &str, hours: i64) -> String {
    if hours == 0 {
        return location.to_string();
    }

    relative_time_re()
        .replace_all(location, |caps: &regex::Captures| {
            let day = &caps[1];
            let minute = &caps[3];
            match caps[2].parse::<i64>() {
                Ok(hour) => format!("{} о {:02}:{}", day, (hour + hours).rem_euclid(24), minute),
                Err(_) => caps[0].to_string(),
            }
        })
        .into_owned()
}
