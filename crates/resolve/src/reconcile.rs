use extract::{Entity, NodeId, TripletStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::similarity::best_match;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    pub similarity_threshold: f64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.9,
        }
    }
}

/// Points triplet endpoints at the batch's canonical entities.
pub struct TripletEntityReconciler {
    config: ReconcilerConfig,
}

impl TripletEntityReconciler {
    pub fn new(config: ReconcilerConfig) -> Self {
        Self { config }
    }

    /// Rewrite head/tail handles that fuzzily match a canonical entity.
    ///
    /// Special-typed endpoints are left alone and special-typed canonical
    /// entities are never candidates. Returns the number of endpoints rewritten.
    pub fn reconcile(&self, store: &mut TripletStore, canonical: &[Entity]) -> usize {
        if store.is_empty() || canonical.is_empty() {
            return 0;
        }

        let candidates: Vec<usize> = (0..canonical.len())
            .filter(|&idx| !canonical[idx].is_special())
            .collect();
        if candidates.is_empty() {
            return 0;
        }

        let mut interned: HashMap<usize, NodeId> = HashMap::new();
        let mut replaced = 0;

        for t in 0..store.len() {
            let (head, tail) = {
                let triplet = &store.triplets()[t];
                (triplet.head, triplet.tail)
            };

            if let Some(node) = self.resolve_endpoint(store, head, canonical, &candidates, &mut interned) {
                store.triplets_mut()[t].head = node;
                replaced += 1;
            }
            if let Some(node) = self.resolve_endpoint(store, tail, canonical, &candidates, &mut interned) {
                store.triplets_mut()[t].tail = node;
                replaced += 1;
            }
        }

        info!(
            triplets = store.len(),
            canonical = canonical.len(),
            replaced,
            "Triplet-entity reconciliation completed"
        );
        replaced
    }

    fn resolve_endpoint(
        &self,
        store: &mut TripletStore,
        endpoint: NodeId,
        canonical: &[Entity],
        candidates: &[usize],
        interned: &mut HashMap<usize, NodeId>,
    ) -> Option<NodeId> {
        let entity = store.node(endpoint);
        if entity.is_special() {
            return None;
        }

        let (pos, score) = best_match(
            &entity.name,
            candidates.iter().map(|&idx| canonical[idx].name.as_str()),
        )?;
        if score / 100.0 < self.config.similarity_threshold {
            return None;
        }

        let idx = candidates[pos];
        if let Some(&node) = interned.get(&idx) {
            if node == endpoint {
                return None;
            }
        }

        debug!(
            endpoint = %entity.name,
            canonical = %canonical[idx].name,
            similarity = score / 100.0,
            "Endpoint reconciled"
        );

        let node = *interned
            .entry(idx)
            .or_insert_with(|| store.add_node(canonical[idx].clone()));
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extract::{ExtractedTriplet, Relationship, SpecialType, TripletMetadata};

    fn triplet(head: Entity, tail: Entity) -> ExtractedTriplet {
        ExtractedTriplet {
            head,
            relation: Relationship::new("reported", None),
            tail,
            metadata: TripletMetadata {
                context: String::new(),
                start_position: 0,
                end_position: 0,
                chunk_id: None,
            },
        }
    }

    fn special(name: &str, special_type: SpecialType) -> Entity {
        let mut entity = Entity::new(name, "amount");
        entity.special_type = Some(special_type);
        entity
    }

    #[test]
    fn test_endpoints_share_canonical_node() {
        let mut store: TripletStore = vec![
            triplet(Entity::new("acme corp", "company"), Entity::new("jane", "person")),
            triplet(Entity::new("acme corp.", "company"), Entity::new("bob", "person")),
        ]
        .into_iter()
        .collect();

        let mut acme = Entity::new("acme corp", "company");
        acme.alternatives.push(Entity::new("acme corp.", "company"));

        let replaced = TripletEntityReconciler::new(ReconcilerConfig::default())
            .reconcile(&mut store, &[acme]);

        assert_eq!(replaced, 2);
        let triplets = store.triplets();
        assert_eq!(triplets[0].head, triplets[1].head);
        assert_eq!(store.node(triplets[0].head).alternatives.len(), 1);
        assert_eq!(store.node(triplets[1].tail).name, "bob");
    }

    #[test]
    fn test_percentage_is_never_reconciled() {
        let mut store: TripletStore = vec![triplet(
            Entity::new("acme", "company"),
            special("15%", SpecialType::Price),
        )]
        .into_iter()
        .collect();
        let original_tail = store.triplets()[0].tail;

        let canonical = vec![special("15%", SpecialType::Price), Entity::new("15 %", "metric")];
        let replaced = TripletEntityReconciler::new(ReconcilerConfig::default())
            .reconcile(&mut store, &canonical);

        assert_eq!(replaced, 0);
        assert_eq!(store.triplets()[0].tail, original_tail);
    }

    #[test]
    fn test_special_canonical_entities_are_not_candidates() {
        let mut store: TripletStore = vec![triplet(
            Entity::new("2021", "year"),
            Entity::new("jane", "person"),
        )]
        .into_iter()
        .collect();

        let replaced = TripletEntityReconciler::new(ReconcilerConfig::default())
            .reconcile(&mut store, &[special("2021", SpecialType::Date)]);

        assert_eq!(replaced, 0);
    }

    #[test]
    fn test_below_threshold_keeps_endpoint() {
        let mut store: TripletStore = vec![triplet(
            Entity::new("apple", "company"),
            Entity::new("jane", "person"),
        )]
        .into_iter()
        .collect();

        let replaced = TripletEntityReconciler::new(ReconcilerConfig::default())
            .reconcile(&mut store, &[Entity::new("apple inc.", "company")]);

        assert_eq!(replaced, 0);
        assert_eq!(store.node(store.triplets()[0].head).name, "apple");
    }
}
