use extract::{Entity, NodeId, TripletStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::graph::{GraphStore, Statement};

const VECTOR_MATCH_QUERY: &str = "CALL db.index.vector.queryNodes($index_name, $top_k, $embedding) \
YIELD node, score \
WHERE score >= $threshold \
RETURN node.name AS name, node.label AS label, score \
ORDER BY score DESC \
LIMIT 1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub similarity_threshold: f64,
    pub vector_index_name: String,
    pub embedding_dimension: usize,
    pub top_k: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            vector_index_name: "embedded_entities_index".to_string(),
            embedding_dimension: 1536,
            top_k: 1,
        }
    }
}

/// Nearest persisted node for one query entity.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedMatch {
    pub name: String,
    pub label: String,
    pub score: f64,
}

/// Canonicalizes extracted entities against nodes written by earlier runs.
pub struct GraphMatcher {
    graph: Arc<dyn GraphStore>,
    config: MatcherConfig,
}

impl GraphMatcher {
    pub fn new(graph: Arc<dyn GraphStore>, config: MatcherConfig) -> Self {
        Self { graph, config }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    async fn find_similar(&self, entity: &Entity) -> Option<PersistedMatch> {
        let embedding = entity.embedding.as_ref()?;

        let statement = Statement::new(VECTOR_MATCH_QUERY)
            .param("index_name", self.config.vector_index_name.as_str())
            .param("top_k", self.config.top_k as u64)
            .param("embedding", embedding.iter().map(|&x| x as f64).collect::<Vec<f64>>())
            .param("threshold", self.config.similarity_threshold);

        let records = match self.graph.run_read(&statement).await {
            Ok(records) => records,
            Err(e) => {
                warn!(
                    entity = %entity.name,
                    index = %self.config.vector_index_name,
                    dimension = embedding.len(),
                    error = %e,
                    "Vector query failed"
                );
                return None;
            }
        };

        let record = records.first()?;
        let name = record.get("name").and_then(Value::as_str)?;
        let score = record.get("score").and_then(Value::as_f64)?;
        if score < self.config.similarity_threshold {
            return None;
        }

        Some(PersistedMatch {
            name: name.to_string(),
            label: record
                .get("label")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            score,
        })
    }

    /// Rewrite endpoints whose entity matches a differently named persisted node.
    ///
    /// Entities that match the same persisted name share one replacement node,
    /// which collects every original as an alternative. Returns the number of
    /// distinct entities replaced.
    pub async fn match_triplets(&self, store: &mut TripletStore) -> usize {
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<NodeId>> = HashMap::new();
        for id in store.referenced_nodes() {
            let key = store.node(id).name.to_lowercase();
            match groups.get_mut(&key) {
                Some(ids) => ids.push(id),
                None => {
                    order.push(key.clone());
                    groups.insert(key, vec![id]);
                }
            }
        }

        let mut replacements: HashMap<String, NodeId> = HashMap::new();
        let mut rewrites: HashMap<NodeId, NodeId> = HashMap::new();
        let mut matched = 0;

        for key in &order {
            let ids = &groups[key];
            let representative = store.node(ids[0]).clone();
            if representative.is_special() || !representative.is_embedded() {
                continue;
            }

            let Some(found) = self.find_similar(&representative).await else {
                continue;
            };
            if found.name.to_lowercase() == *key {
                continue;
            }

            debug!(
                entity = %representative.name,
                persisted = %found.name,
                score = found.score,
                "Persisted match found"
            );

            let persisted_key = found.name.to_lowercase();
            let target = match replacements.get(&persisted_key) {
                Some(&node) => {
                    store.node_mut(node).alternatives.push(representative);
                    node
                }
                None => {
                    let node = store.add_node(replacement_entity(&found, representative));
                    replacements.insert(persisted_key, node);
                    node
                }
            };

            for &id in ids {
                rewrites.insert(id, target);
            }
            matched += 1;
        }

        let mut endpoints = 0;
        for triplet in store.triplets_mut() {
            if let Some(&node) = rewrites.get(&triplet.head) {
                triplet.head = node;
                endpoints += 1;
            }
            if let Some(&node) = rewrites.get(&triplet.tail) {
                triplet.tail = node;
                endpoints += 1;
            }
        }

        info!(
            candidates = order.len(),
            matched,
            endpoints,
            "Graph matching completed"
        );
        matched
    }
}

fn replacement_entity(found: &PersistedMatch, original: Entity) -> Entity {
    let mut entity = Entity::new(found.name.clone(), found.label.clone());
    entity.embedding = original.embedding.clone();
    entity.metadata = original.metadata.clone();
    entity.alternatives.push(original);
    entity
}
