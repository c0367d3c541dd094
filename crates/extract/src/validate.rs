//! Plausibility checks applied to raw model output before it becomes domain data.

const NULL_WORDS: [&str; 3] = ["none", "null", "undefined"];

const GENERIC_LABELS: [&str; 12] = [
    "entity",
    "entity type",
    "entitytype",
    "generic",
    "unknown",
    "type",
    "label",
    "name",
    "object",
    "thing",
    "item",
    "text",
];

const MAX_RELATION_NAME_LEN: usize = 50;
const MAX_RELATION_UNDERSCORES: usize = 3;

fn is_null_word(value: &str) -> bool {
    let lower = value.to_lowercase();
    NULL_WORDS.contains(&lower.as_str())
}

pub fn is_valid_entity_name(name: &str) -> bool {
    let name = name.trim();
    !name.is_empty() && !is_null_word(name) && name.chars().any(char::is_alphanumeric)
}

pub fn is_valid_entity_label(label: &str) -> bool {
    let label = label.trim();
    if label.is_empty() || is_null_word(label) {
        return false;
    }
    let lower = label.to_lowercase();
    !GENERIC_LABELS.contains(&lower.as_str())
}

pub fn is_valid_relation_name(name: &str) -> bool {
    let name = name.trim();
    !name.is_empty()
        && name.chars().count() <= MAX_RELATION_NAME_LEN
        && name.matches('_').count() <= MAX_RELATION_UNDERSCORES
        && !name.chars().any(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_names() {
        assert!(is_valid_entity_name("Acme Corp"));
        assert!(is_valid_entity_name("  $1,200 "));
        assert!(!is_valid_entity_name("   "));
        assert!(!is_valid_entity_name("NULL"));
        assert!(!is_valid_entity_name("undefined"));
        assert!(!is_valid_entity_name("--!!"));
    }

    #[test]
    fn test_entity_labels() {
        assert!(is_valid_entity_label("Company"));
        assert!(!is_valid_entity_label("Entity Type"));
        assert!(!is_valid_entity_label(" thing "));
        assert!(!is_valid_entity_label("None"));
        assert!(!is_valid_entity_label(""));
    }

    #[test]
    fn test_relation_names() {
        assert!(is_valid_relation_name("founded_by"));
        assert!(is_valid_relation_name("is_located_in_city"));
        assert!(!is_valid_relation_name("is_located_in_the_city"));
        assert!(!is_valid_relation_name("grew_by_15_percent"));
        assert!(!is_valid_relation_name(&"a".repeat(51)));
        assert!(!is_valid_relation_name(" "));
    }
}
