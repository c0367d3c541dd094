//! Cypher identifier normalization for labels, relationship types and property keys.

use once_cell::sync::Lazy;
use regex::Regex;

pub const MAX_IDENTIFIER_LENGTH: usize = 16383;
const TRUNCATE_SUFFIX: &str = "_trunc";

pub const DEFAULT_NODE_LABEL: &str = "Entity";
pub const DEFAULT_RELATIONSHIP_TYPE: &str = "RELATES";
pub const DEFAULT_PROPERTY_KEY: &str = "property";

static CAMEL_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-z])([A-Z])").expect("valid regex"));
static WORD_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-_\s]+").expect("valid regex"));
static KEY_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-\s]+").expect("valid regex"));

const LABEL_BREAKS: [char; 11] = [' ', '-', '_', '.', ',', '!', '?', ';', ':', '"', '\''];

fn keep_identifier_chars(text: &str) -> String {
    text.chars().filter(|c| c.is_alphanumeric() || *c == '_').collect()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn finalize(clean: String, default: &str) -> String {
    let mut clean = if clean.chars().next().is_some_and(char::is_alphabetic) {
        clean
    } else {
        format!("{}{}", default, clean)
    };

    if clean.chars().count() > MAX_IDENTIFIER_LENGTH {
        let keep = MAX_IDENTIFIER_LENGTH - TRUNCATE_SUFFIX.len();
        clean = clean.chars().take(keep).collect::<String>() + TRUNCATE_SUFFIX;
    }
    clean
}

/// `"software company"` -> `SoftwareCompany`. Single capitalized words are kept as is.
pub fn to_node_label(text: &str) -> String {
    if text.trim().is_empty() {
        return DEFAULT_NODE_LABEL.to_string();
    }

    let starts_upper = text.chars().next().is_some_and(char::is_uppercase);
    let clean = if starts_upper && !text.contains(LABEL_BREAKS) {
        keep_identifier_chars(text)
    } else {
        let joined: String = WORD_SEPARATORS
            .split(text.trim())
            .filter(|w| !w.is_empty())
            .map(capitalize)
            .collect();
        joined.chars().filter(|c| c.is_alphanumeric()).collect()
    };

    finalize(clean, DEFAULT_NODE_LABEL)
}

/// `"worksFor"` / `"works for"` -> `WORKS_FOR`.
pub fn to_relationship_type(text: &str) -> String {
    if text.trim().is_empty() {
        return DEFAULT_RELATIONSHIP_TYPE.to_string();
    }

    let spaced = CAMEL_BOUNDARY.replace_all(text, "${1}_${2}");
    let words: Vec<String> = WORD_SEPARATORS
        .split(spaced.trim())
        .filter(|w| !w.is_empty())
        .map(str::to_uppercase)
        .collect();

    let joined = if words.is_empty() {
        DEFAULT_RELATIONSHIP_TYPE.to_string()
    } else {
        words.join("_")
    };
    finalize(keep_identifier_chars(&joined), DEFAULT_RELATIONSHIP_TYPE)
}

/// `"startIndex"` / `"start index"` -> `start_index`.
pub fn to_property_key(text: &str) -> String {
    if text.trim().is_empty() {
        return DEFAULT_PROPERTY_KEY.to_string();
    }

    let spaced = CAMEL_BOUNDARY.replace_all(text, "${1}_${2}").to_lowercase();
    let words: Vec<&str> = KEY_SEPARATORS
        .split(spaced.trim())
        .filter(|w| !w.is_empty())
        .collect();

    let joined = if words.is_empty() {
        DEFAULT_PROPERTY_KEY.to_string()
    } else {
        words.join("_")
    };
    finalize(keep_identifier_chars(&joined), DEFAULT_PROPERTY_KEY)
}

/// Capitalize the first letter of every alphabetic run, lowercase the rest.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_alpha = false;
    for c in text.trim().chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}
