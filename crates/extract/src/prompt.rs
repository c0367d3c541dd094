use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const ENTITY_SYSTEM_PROMPT: &str = r#"You are an expert in named entity recognition for knowledge graph construction.

Extract the key entities from the given text: people, organizations, locations, products, concepts, events, dates and amounts.

For each entity provide:
- name: the entity text in English (max 100 characters)
- label: one short, standard entity type in English (max 20 characters)
- summary: a brief description of what the entity is (max 150 characters)

RULES:
- Translate non-English entity names to English, keeping their meaning
- Do not repeat the entity type inside the name
- Do not use generic labels such as "Entity", "Thing" or "Unknown"
- Keep dates, prices and percentages exactly as written
- Never repeat the same entity

Return ONLY valid JSON in this exact format:
{
  "entities": [
    {"name": "Entity Name", "label": "Entity Type", "summary": "Brief description"}
  ]
}"#;

pub const RELATION_SYSTEM_PROMPT: &str = r#"You are an expert in knowledge graph construction. Extract directed (head, relation, tail) triplets between the listed entities.

PRINCIPLES:
- Only use entities from the provided entity list; never invent entities
- Only extract relationships the text states explicitly
- Each triplet is one atomic fact
- Avoid vague relations such as related_to, associated_with, connected_to or is_part_of

RELATION NAMES:
- snake_case verb phrases, active voice, pointing from head to tail
  ("was founded by" becomes founded_by; "The Mona Lisa was painted by Leonardo" becomes Leonardo -painted-> Mona Lisa)
- 1 to 3 words, under 25 characters
- No entity names, entity types, numbers or dates inside the relation name

EXAMPLE
Text: "Google, headquartered in Mountain View, was founded by Larry Page. Sundar Pichai is the current CEO."
Good: {"head": "Google", "relation": "located_in", "tail": "Mountain View"}
Good: {"head": "Google", "relation": "founded_by", "tail": "Larry Page"}
Good: {"head": "Sundar Pichai", "relation": "ceo_of", "tail": "Google"}
Bad:  {"head": "Google", "relation": "related_to", "tail": "Larry Page"}
Bad:  {"head": "Google", "relation": "has_founder_larry_page", "tail": "Larry Page"}

Return ONLY a single valid JSON object in this exact format:
{
  "relations": [
    {
      "head": {"name": "Entity Name", "label": "Entity Type", "summary": "Brief description"},
      "relation": {"name": "relation_name", "label": "Relation Type"},
      "tail": {"name": "Entity Name", "label": "Entity Type", "summary": "Brief description"}
    }
  ]
}"#;

pub fn build_entity_user_prompt(text: &str) -> String {
    format!("Extract entities from this text:\n\n{}", text)
}

/// `entity_list` is the rendered "name (label), ..." list of known entities.
pub fn build_relation_user_prompt(text: &str, entity_list: &str) -> String {
    format!(
        r#"Extract relations from this text:

Text: {}

Available entities: {}

INSTRUCTIONS:
1. Find relationships between entities present in the text
2. Give every head and tail a specific label (Person, Company, Location, Product, ...) and a short English summary
3. Prefer entities from the available list
4. Do not use generic labels like "Entity", "Generic" or "Unknown"
5. Return complete triplets in the requested format"#,
        text, entity_list
    )
}

/// A canned exchange shown to the model before the real request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FewShotExample {
    pub user_prompt: String,
    pub response: String,
}

pub fn entity_response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "entities": {
                "type": "array",
                "items": entity_item_schema()
            }
        },
        "required": ["entities"]
    })
}

pub fn relation_response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "relations": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "head": entity_item_schema(),
                        "relation": {
                            "type": "object",
                            "properties": {
                                "name": {"type": "string"},
                                "label": {"type": "string"}
                            },
                            "required": ["name"]
                        },
                        "tail": entity_item_schema()
                    },
                    "required": ["head", "relation", "tail"]
                }
            }
        },
        "required": ["relations"]
    })
}

fn entity_item_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": {"type": "string"},
            "label": {"type": "string"},
            "summary": {"type": "string"}
        },
        "required": ["name", "label"]
    })
}
