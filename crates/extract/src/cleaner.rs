use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::schema::{Entity, Relationship, SpecialType};

static BRACKETS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[{}\[\]()]").expect("valid regex"));
static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s\-.]").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

static ORDINAL_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})(st|nd|rd|th)\b").expect("valid regex"));
static BARE_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}$").expect("valid regex"));
static YEAR_MONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})[-/.](\d{1,2})$").expect("valid regex"));
static RELATIVE_AGO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\d+\s+(second|minute|hour|day|week|month|year)s?\s+ago$").expect("valid regex")
});

static PRICE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)^
        (?:[$€£¥₹]\s?|(?:usd|eur|gbp|jpy|cny|inr|chf|cad|aud)\s?)?
        [-+]?
        (?:\d{1,3}(?:,\d{3})+|\d+)
        (?:\.\d+)?
        \s?
        (?:%|[$€£¥₹]|k|m|b|t|bn|mn|thousand|million|billion|trillion|usd|eur|gbp|jpy|cny|inr|chf|cad|aud)?
        $",
    )
    .expect("valid regex")
});

const NUMERIC_DATE_FORMATS: [&str; 7] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%d-%m-%Y",
];

const NAMED_DATE_FORMATS: [&str; 4] = ["%B %d %Y", "%d %B %Y", "%b %d %Y", "%d %b %Y"];

const MONTHS: [&str; 12] = [
    "january", "february", "march", "april", "may", "june",
    "july", "august", "september", "october", "november", "december",
];

const WEEKDAYS: [&str; 7] = [
    "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday",
];

const RELATIVE_WORDS: [&str; 4] = ["today", "yesterday", "tomorrow", "now"];

/// Shortest share of the original length a cleaned form may keep.
const MIN_RETAINED_RATIO: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanerConfig {
    pub remove_punctuation: bool,
    pub normalize_case: bool,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            remove_punctuation: true,
            normalize_case: true,
        }
    }
}

/// Textual normalization of entity and relation surface forms.
#[derive(Debug, Clone, Default)]
pub struct Cleaner {
    config: CleanerConfig,
}

impl Cleaner {
    pub fn new(config: CleanerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CleanerConfig {
        &self.config
    }

    /// Tag special literals, then normalize name and label in place.
    ///
    /// Dates and prices are only trimmed so their literal value survives.
    pub fn clean_entity(&self, entity: &mut Entity) {
        entity.special_type = detect_special_type(&entity.name);

        if entity.is_special() {
            entity.name = entity.name.trim().to_string();
            entity.label = entity.label.trim().to_string();
            return;
        }

        entity.name = self.clean_preserving(&entity.name);
        entity.label = self.clean_preserving(&entity.label);
    }

    pub fn clean_relation(&self, relation: &mut Relationship) {
        let cleaned = self.normalize(&relation.name);
        if !cleaned.is_empty() {
            relation.name = cleaned;
        }
    }

    /// Normalized text, falling back to the trimmed input when nothing is left.
    pub fn clean_text(&self, text: &str) -> String {
        let cleaned = self.normalize(text);
        if cleaned.is_empty() {
            text.trim().to_string()
        } else {
            cleaned
        }
    }

    fn clean_preserving(&self, original: &str) -> String {
        let cleaned = self.clean_text(original);
        let original_len = original.chars().count() as f64;
        let cleaned_len = cleaned.chars().count() as f64;

        if cleaned.is_empty() || cleaned_len < original_len * MIN_RETAINED_RATIO {
            original.trim().to_string()
        } else {
            cleaned
        }
    }

    fn normalize(&self, text: &str) -> String {
        let mut cleaned = BRACKETS.replace_all(text.trim(), "").into_owned();

        if self.config.remove_punctuation {
            cleaned = PUNCTUATION.replace_all(&cleaned, " ").into_owned();
        }

        if self.config.normalize_case {
            cleaned = cleaned.to_lowercase();
        }

        WHITESPACE.replace_all(&cleaned, " ").trim().to_string()
    }
}

pub fn detect_special_type(name: &str) -> Option<SpecialType> {
    if is_lenient_date(name) {
        Some(SpecialType::Date)
    } else if is_price(name) {
        Some(SpecialType::Price)
    } else {
        None
    }
}

pub fn is_price(text: &str) -> bool {
    let text = text.trim();
    !text.is_empty() && PRICE.is_match(text)
}

pub fn is_lenient_date(text: &str) -> bool {
    let lower = WHITESPACE.replace_all(text.trim(), " ").to_lowercase();
    if lower.is_empty() {
        return false;
    }

    if RELATIVE_WORDS.contains(&lower.as_str())
        || MONTHS.contains(&lower.as_str())
        || WEEKDAYS.contains(&lower.as_str())
        || RELATIVE_AGO.is_match(&lower)
    {
        return true;
    }

    if BARE_YEAR.is_match(&lower) {
        return lower
            .parse::<u32>()
            .map(|year| (1000..=2999).contains(&year))
            .unwrap_or(false);
    }

    if let Some(caps) = YEAR_MONTH.captures(&lower) {
        let month = caps[2].parse::<u32>().unwrap_or(0);
        return (1..=12).contains(&month) && caps[1].parse::<u32>().is_ok();
    }

    if NUMERIC_DATE_FORMATS
        .iter()
        .any(|fmt| NaiveDate::parse_from_str(&lower, fmt).is_ok())
    {
        return true;
    }

    if DateTime::parse_from_rfc3339(text.trim()).is_ok()
        || NaiveDateTime::parse_from_str(&lower, "%Y-%m-%dt%H:%M:%S").is_ok()
        || NaiveDateTime::parse_from_str(&lower, "%Y-%m-%d %H:%M:%S").is_ok()
    {
        return true;
    }

    is_named_month_date(&lower)
}

/// "March 3rd, 2021", "5 Jan 2020", "January 2023".
fn is_named_month_date(lower: &str) -> bool {
    let stripped = ORDINAL_SUFFIX.replace_all(lower, "$1").replace(',', " ");
    let normalized = WHITESPACE.replace_all(stripped.trim(), " ").into_owned();

    let parses = |candidate: &str| {
        NAMED_DATE_FORMATS
            .iter()
            .any(|fmt| NaiveDate::parse_from_str(candidate, fmt).is_ok())
    };

    parses(&normalized) || parses(&format!("1 {}", normalized))
}
