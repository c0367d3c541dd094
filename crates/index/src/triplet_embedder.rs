use extract::{EntityKey, NodeId, RelationId, RelationKey, TripletStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tracing::{info, warn};

use crate::embeddings::Embedder;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TripletEmbedderConfig {
    pub entity_name_weight: f32,
    pub entity_label_weight: f32,
}

impl Default for TripletEmbedderConfig {
    fn default() -> Self {
        Self {
            entity_name_weight: 0.6,
            entity_label_weight: 0.4,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmbeddingStats {
    /// Node occurrences that received a vector.
    pub entities: usize,
    pub relations: usize,
}

/// Value-equal items grouped so each distinct key is embedded once.
struct Groups<K, H> {
    keys: Vec<K>,
    members: HashMap<K, Vec<H>>,
}

impl<K: Clone + Eq + Hash, H> Groups<K, H> {
    fn new() -> Self {
        Self {
            keys: Vec::new(),
            members: HashMap::new(),
        }
    }

    fn add(&mut self, key: K, handle: H) {
        match self.members.get_mut(&key) {
            Some(handles) => handles.push(handle),
            None => {
                self.keys.push(key.clone());
                self.members.insert(key, vec![handle]);
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

fn weighted_sum(a: &[f32], wa: f32, b: &[f32], wb: f32) -> Vec<f32> {
    a.iter().zip(b).map(|(x, y)| wa * x + wb * y).collect()
}

pub struct TripletEmbedder {
    embedder: Arc<dyn Embedder>,
    config: TripletEmbedderConfig,
}

impl TripletEmbedder {
    pub fn new(embedder: Arc<dyn Embedder>, config: TripletEmbedderConfig) -> Self {
        Self { embedder, config }
    }

    async fn embed_texts(&self, texts: Vec<String>) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.embedder.embed(&texts).await
    }

    /// Attach vectors to every referenced node and relation that lacks one.
    pub async fn embed(&self, store: &mut TripletStore) -> EmbeddingStats {
        let mut entities: Groups<EntityKey, NodeId> = Groups::new();
        for id in store.referenced_nodes() {
            let node = store.node(id);
            if node.is_embedded() || node.name.trim().is_empty() || node.label.trim().is_empty() {
                continue;
            }
            entities.add(node.key(), id);
        }

        let mut relations: Groups<RelationKey, RelationId> = Groups::new();
        for id in store.referenced_relations() {
            let relation = store.relation(id);
            if relation.embedding.is_some() || relation.name.trim().is_empty() {
                continue;
            }
            relations.add(relation.key(), id);
        }

        if entities.is_empty() && relations.is_empty() {
            return EmbeddingStats::default();
        }

        let names: Vec<String> = entities.keys.iter().map(|k| k.name.to_lowercase()).collect();
        let labels: Vec<String> = entities.keys.iter().map(|k| k.label.to_lowercase()).collect();
        let relation_names: Vec<String> = relations.keys.iter().map(|k| k.name.to_lowercase()).collect();

        let (name_vectors, label_vectors, relation_vectors) = tokio::join!(
            self.embed_texts(names),
            self.embed_texts(labels),
            self.embed_texts(relation_names),
        );

        let mut stats = EmbeddingStats::default();

        match (name_vectors, label_vectors) {
            (Ok(name_vectors), Ok(label_vectors))
                if name_vectors.len() == entities.keys.len() && label_vectors.len() == entities.keys.len() =>
            {
                for (key, (name_vec, label_vec)) in entities.keys.iter().zip(name_vectors.into_iter().zip(label_vectors)) {
                    if name_vec.is_empty() || name_vec.len() != label_vec.len() {
                        warn!(entity = %key.name, "Skipping entity with mismatched embedding dimensions");
                        continue;
                    }

                    let combined = weighted_sum(
                        &name_vec,
                        self.config.entity_name_weight,
                        &label_vec,
                        self.config.entity_label_weight,
                    );
                    for &id in &entities.members[key] {
                        let node = store.node_mut(id);
                        node.embedding = Some(combined.clone());
                        node.name_embedding = Some(name_vec.clone());
                        node.label_embedding = Some(label_vec.clone());
                        stats.entities += 1;
                    }
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(entities = entities.keys.len(), error = %e, "Entity embedding failed");
            }
            _ => warn!(entities = entities.keys.len(), "Entity embedding returned wrong vector count"),
        }

        match relation_vectors {
            Ok(vectors) if vectors.len() == relations.keys.len() => {
                for (key, vector) in relations.keys.iter().zip(vectors) {
                    if vector.is_empty() {
                        continue;
                    }
                    for &id in &relations.members[key] {
                        store.relation_mut(id).embedding = Some(vector.clone());
                        stats.relations += 1;
                    }
                }
            }
            Ok(_) => warn!(relations = relations.keys.len(), "Relation embedding returned wrong vector count"),
            Err(e) => warn!(relations = relations.keys.len(), error = %e, "Relation embedding failed"),
        }

        info!(
            distinct_entities = entities.keys.len(),
            distinct_relations = relations.keys.len(),
            embedded_entities = stats.entities,
            embedded_relations = stats.relations,
            "Triplet embedding completed"
        );
        stats
    }
}
