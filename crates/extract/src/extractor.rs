use futures::future::join_all;
use ingest::Chunk;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::llm::{extract_structured, CompletionRequest, LanguageModel, Message};
use crate::prompt::{self, FewShotExample};
use crate::retry::RetryPolicy;
use crate::schema::{Entity, EntityMetadata, ExtractedTriplet, Relationship, TripletMetadata};
use crate::validate::{is_valid_entity_label, is_valid_entity_name, is_valid_relation_name};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub temperature: f32,
    /// Provenance tag stored on every entity; the chunk's source when unset.
    pub source: Option<String>,
    pub examples: Vec<FewShotExample>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            source: None,
            examples: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct EntityOutput {
    name: String,
    label: String,
    #[serde(default)]
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EntitiesResponse {
    entities: Vec<EntityOutput>,
}

#[derive(Debug, Deserialize)]
struct RelationOutput {
    name: String,
    #[serde(default)]
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TripletOutput {
    head: EntityOutput,
    relation: RelationOutput,
    tail: EntityOutput,
}

#[derive(Debug, Deserialize)]
struct RelationsResponse {
    relations: Vec<TripletOutput>,
}

fn build_messages(system_prompt: &str, examples: &[FewShotExample], user_prompt: String) -> Vec<Message> {
    let mut messages = Vec::with_capacity(examples.len() * 2 + 2);
    messages.push(Message::system(system_prompt));
    for example in examples {
        messages.push(Message::user(example.user_prompt.clone()));
        messages.push(Message::assistant(example.response.clone()));
    }
    messages.push(Message::user(user_prompt));
    messages
}

fn entity_from_output(output: EntityOutput, chunk: &Chunk, source: &Option<String>) -> Entity {
    let start_index = find_position(&chunk.text, &output.name)
        .map(|(start, _)| start)
        .unwrap_or(0);

    Entity::new(output.name, output.label)
        .with_summary(output.summary.filter(|s| !s.trim().is_empty()))
        .with_metadata(EntityMetadata {
            context: chunk.text.clone(),
            start_index,
            chunk_id: Some(chunk.chunk_id.clone()),
            source: source.clone().or_else(|| Some(chunk.source.clone())),
        })
}

fn is_valid_entity(output: &EntityOutput) -> bool {
    is_valid_entity_name(&output.name) && is_valid_entity_label(&output.label)
}

/// Named-entity extraction over one chunk at a time.
pub struct EntityExtractor {
    llm: Arc<dyn LanguageModel>,
    policy: RetryPolicy,
    config: ExtractorConfig,
}

impl EntityExtractor {
    pub fn new(llm: Arc<dyn LanguageModel>, config: ExtractorConfig, policy: RetryPolicy) -> Self {
        Self {
            llm,
            policy,
            config,
        }
    }

    /// Validated entities found in `chunk`; empty when the model call is abandoned.
    pub async fn extract(&self, chunk: &Chunk) -> Vec<Entity> {
        let request = CompletionRequest {
            messages: build_messages(
                prompt::ENTITY_SYSTEM_PROMPT,
                &self.config.examples,
                prompt::build_entity_user_prompt(&chunk.text),
            ),
            temperature: self.config.temperature,
            schema: Some(prompt::entity_response_schema()),
        };

        let response: EntitiesResponse =
            match extract_structured(self.llm.as_ref(), &request, &self.policy, "entity_extraction").await {
                Ok(response) => response,
                Err(e) => {
                    warn!(chunk_id = %chunk.chunk_id, error = %e, "Entity extraction abandoned");
                    return Vec::new();
                }
            };

        let candidates = response.entities.len();
        let entities: Vec<Entity> = response
            .entities
            .into_iter()
            .filter(|output| {
                let valid = is_valid_entity(output);
                if !valid {
                    debug!(name = %output.name, label = %output.label, "Dropping invalid entity");
                }
                valid
            })
            .map(|output| entity_from_output(output, chunk, &self.config.source))
            .collect();

        info!(
            chunk_id = %chunk.chunk_id,
            candidates,
            entities = entities.len(),
            "Extracted entities"
        );
        entities
    }

    /// Per-chunk extraction issued concurrently; output order follows `chunks`.
    pub async fn extract_all(&self, chunks: &[Chunk]) -> Vec<Vec<Entity>> {
        join_all(chunks.iter().map(|chunk| self.extract(chunk))).await
    }
}

/// Triplet extraction prompted with already-known entities.
pub struct RelationExtractor {
    llm: Arc<dyn LanguageModel>,
    policy: RetryPolicy,
    config: ExtractorConfig,
}

impl RelationExtractor {
    pub fn new(llm: Arc<dyn LanguageModel>, config: ExtractorConfig, policy: RetryPolicy) -> Self {
        Self {
            llm,
            policy,
            config,
        }
    }

    pub async fn extract(&self, chunk: &Chunk, entities: &[Entity]) -> Vec<ExtractedTriplet> {
        let text = reduce_aliases(&chunk.text, entities);
        let request = CompletionRequest {
            messages: build_messages(
                prompt::RELATION_SYSTEM_PROMPT,
                &self.config.examples,
                prompt::build_relation_user_prompt(&text, &render_entity_list(entities)),
            ),
            temperature: self.config.temperature,
            schema: Some(prompt::relation_response_schema()),
        };

        let response: RelationsResponse =
            match extract_structured(self.llm.as_ref(), &request, &self.policy, "relation_extraction").await {
                Ok(response) => response,
                Err(e) => {
                    warn!(chunk_id = %chunk.chunk_id, error = %e, "Relation extraction abandoned");
                    return Vec::new();
                }
            };

        let candidates = response.relations.len();
        let triplets: Vec<ExtractedTriplet> = response
            .relations
            .into_iter()
            .filter_map(|output| self.to_triplet(output, chunk))
            .collect();

        info!(
            chunk_id = %chunk.chunk_id,
            candidates,
            triplets = triplets.len(),
            "Extracted triplets"
        );
        triplets
    }

    pub async fn extract_all(&self, chunks: &[Chunk], entities: &[Entity]) -> Vec<Vec<ExtractedTriplet>> {
        join_all(chunks.iter().map(|chunk| self.extract(chunk, entities))).await
    }

    fn to_triplet(&self, output: TripletOutput, chunk: &Chunk) -> Option<ExtractedTriplet> {
        if !is_valid_entity(&output.head)
            || !is_valid_entity(&output.tail)
            || !is_valid_relation_name(&output.relation.name)
        {
            debug!(
                head = %output.head.name,
                relation = %output.relation.name,
                tail = %output.tail.name,
                "Dropping invalid triplet"
            );
            return None;
        }

        let (start_position, end_position) = triplet_positions(
            &chunk.text,
            &[
                output.head.name.as_str(),
                output.tail.name.as_str(),
                output.relation.name.as_str(),
            ],
        );

        let relation = Relationship::new(
            output.relation.name,
            output.relation.label.filter(|l| !l.trim().is_empty()),
        );

        Some(ExtractedTriplet {
            head: entity_from_output(output.head, chunk, &self.config.source),
            relation,
            tail: entity_from_output(output.tail, chunk, &self.config.source),
            metadata: TripletMetadata {
                context: chunk.text.clone(),
                start_position,
                end_position,
                chunk_id: Some(chunk.chunk_id.clone()),
            },
        })
    }
}

/// "name (label), ..." as shown to the relation prompt.
pub fn render_entity_list(entities: &[Entity]) -> String {
    if entities.is_empty() {
        return "No entities provided".to_string();
    }

    entities
        .iter()
        .map(|e| {
            if e.label.trim().is_empty() {
                e.name.clone()
            } else {
                format!("{} ({})", e.name, e.label)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Character span of the first case-insensitive occurrence of `needle`.
pub fn find_position(content: &str, needle: &str) -> Option<(usize, usize)> {
    if needle.is_empty() {
        return None;
    }

    let content_lower = content.to_lowercase();
    let byte_pos = content_lower.find(&needle.to_lowercase())?;
    let start = content_lower[..byte_pos].chars().count();
    Some((start, start + needle.chars().count()))
}

/// Span covering every component that occurs in `content`, or the whole text.
pub fn triplet_positions(content: &str, components: &[&str]) -> (usize, usize) {
    let positions: Vec<(usize, usize)> = components
        .iter()
        .filter_map(|component| find_position(content, component))
        .collect();

    match (
        positions.iter().map(|p| p.0).min(),
        positions.iter().map(|p| p.1).max(),
    ) {
        (Some(start), Some(end)) => (start, end),
        _ => (0, content.chars().count()),
    }
}

/// Rewrite every alternative surface form of a merged entity to its canonical name.
///
/// Longer alternatives are replaced first; matches are case-insensitive and
/// must sit on word boundaries.
pub fn reduce_aliases(text: &str, entities: &[Entity]) -> String {
    let mut pairs: Vec<(&str, &str)> = entities
        .iter()
        .flat_map(|entity| {
            entity
                .alternatives
                .iter()
                .map(move |alt| (alt.name.as_str(), entity.name.as_str()))
        })
        .filter(|(alt, canonical)| !alt.trim().is_empty() && !alt.eq_ignore_ascii_case(canonical))
        .collect();

    if pairs.is_empty() {
        return text.to_string();
    }

    pairs.sort_by(|a, b| b.0.chars().count().cmp(&a.0.chars().count()));

    pairs
        .into_iter()
        .fold(text.to_string(), |acc, (alt, canonical)| replace_word(&acc, alt, canonical))
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn replace_word(text: &str, needle: &str, replacement: &str) -> String {
    let pattern = match Regex::new(&format!("(?i){}", regex::escape(needle))) {
        Ok(pattern) => pattern,
        Err(_) => return text.to_string(),
    };

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in pattern.find_iter(text) {
        let before = text[..m.start()].chars().next_back();
        let after = text[m.end()..].chars().next();
        if before.is_some_and(is_word_char) || after.is_some_and(is_word_char) {
            continue;
        }
        out.push_str(&text[last..m.start()]);
        out.push_str(replacement);
        last = m.end();
    }
    out.push_str(&text[last..]);
    out
}
