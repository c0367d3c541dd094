use extract::{Entity, Relationship, TripletStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::similarity::best_match;

/// Outcome of greedy clustering over a list of names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clustering {
    /// Item index of each cluster's representative, in promotion order.
    pub representatives: Vec<usize>,
    /// Cluster index for every input item.
    pub assignment: Vec<usize>,
}

impl Clustering {
    pub fn len(&self) -> usize {
        self.representatives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.representatives.is_empty()
    }
}

/// Single-pass greedy clustering in input order.
///
/// Each name joins the most similar existing representative when the ratio
/// reaches `threshold` (a fraction in `[0, 1]`), otherwise it becomes a new
/// representative.
pub fn cluster_by_name(names: &[&str], threshold: f64) -> Clustering {
    let mut representatives: Vec<usize> = Vec::new();
    let mut assignment = Vec::with_capacity(names.len());

    for (idx, name) in names.iter().enumerate() {
        let best = best_match(name, representatives.iter().map(|&rep| names[rep]));

        match best {
            Some((cluster, score)) if score / 100.0 >= threshold => {
                debug!(
                    name = %name,
                    representative = %names[representatives[cluster]],
                    similarity = score / 100.0,
                    "Merged into cluster"
                );
                assignment.push(cluster);
            }
            _ => {
                assignment.push(representatives.len());
                representatives.push(idx);
            }
        }
    }

    Clustering {
        representatives,
        assignment,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityMergerConfig {
    pub name_similarity_threshold: f64,
    pub label_similarity_threshold: f64,
}

impl Default for EntityMergerConfig {
    fn default() -> Self {
        Self {
            name_similarity_threshold: 0.9,
            label_similarity_threshold: 0.8,
        }
    }
}

pub struct EntityMerger {
    config: EntityMergerConfig,
}

impl EntityMerger {
    pub fn new(config: EntityMergerConfig) -> Self {
        Self { config }
    }

    /// Fold near-duplicate names into canonical entities, then unify labels.
    pub fn merge(&self, entities: Vec<Entity>) -> Vec<Entity> {
        let input = entities.len();
        let names: Vec<&str> = entities.iter().map(|e| e.name.as_str()).collect();
        let clustering = cluster_by_name(&names, self.config.name_similarity_threshold);

        let mut slots: Vec<Option<Entity>> = entities.into_iter().map(Some).collect();
        let mut canonical: Vec<Entity> = clustering
            .representatives
            .iter()
            .filter_map(|&idx| slots[idx].take())
            .collect();

        for (idx, slot) in slots.into_iter().enumerate() {
            if let Some(entity) = slot {
                canonical[clustering.assignment[idx]].alternatives.push(entity);
            }
        }

        let relabeled = self.normalize_labels(&mut canonical);

        info!(
            input,
            canonical = canonical.len(),
            relabeled,
            "Entity merge completed"
        );
        canonical
    }

    /// Rewrite every label to the first-seen label of its cluster; returns the number changed.
    fn normalize_labels(&self, entities: &mut [Entity]) -> usize {
        let mut distinct: Vec<String> = Vec::new();
        for entity in entities.iter() {
            if !distinct.contains(&entity.label) {
                distinct.push(entity.label.clone());
            }
        }

        let labels: Vec<&str> = distinct.iter().map(String::as_str).collect();
        let clustering = cluster_by_name(&labels, self.config.label_similarity_threshold);
        let mapping: HashMap<&str, &str> = labels
            .iter()
            .zip(&clustering.assignment)
            .map(|(label, &cluster)| (*label, labels[clustering.representatives[cluster]]))
            .collect();

        let mut updated = 0;
        for entity in entities.iter_mut() {
            if let Some(&target) = mapping.get(entity.label.as_str()) {
                if target != entity.label {
                    debug!(from = %entity.label, to = %target, "Label normalized");
                    entity.label = target.to_string();
                    updated += 1;
                }
            }
        }
        updated
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationMergerConfig {
    pub name_similarity_threshold: f64,
}

impl Default for RelationMergerConfig {
    fn default() -> Self {
        Self {
            name_similarity_threshold: 0.9,
        }
    }
}

pub struct RelationMerger {
    config: RelationMergerConfig,
}

impl RelationMerger {
    pub fn new(config: RelationMergerConfig) -> Self {
        Self { config }
    }

    /// Collapse near-duplicate relation names and re-point every triplet.
    ///
    /// Returns the number of canonical relations.
    pub fn merge(&self, store: &mut TripletStore) -> usize {
        if store.is_empty() {
            return 0;
        }

        let per_triplet: Vec<Relationship> = store
            .triplets()
            .iter()
            .map(|t| store.relation(t.relation).clone())
            .collect();

        let names: Vec<&str> = per_triplet.iter().map(|r| r.name.as_str()).collect();
        let clustering = cluster_by_name(&names, self.config.name_similarity_threshold);

        // first cluster wins a lowercase name shared by several clusters
        let mut by_lower_name: HashMap<String, usize> = HashMap::new();
        for (idx, name) in names.iter().enumerate() {
            by_lower_name
                .entry(name.to_lowercase())
                .or_insert(clustering.assignment[idx]);
        }

        let remapped: Vec<usize> = names
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                by_lower_name
                    .get(&name.to_lowercase())
                    .copied()
                    .unwrap_or(clustering.assignment[idx])
            })
            .collect();

        // clusters emptied by the lowercase remap are dropped and the rest renumbered
        let mut renumbered: HashMap<usize, usize> = HashMap::new();
        let mut canonical: Vec<Relationship> = Vec::new();
        let assignment: Vec<usize> = remapped
            .iter()
            .map(|&cluster| {
                *renumbered.entry(cluster).or_insert_with(|| {
                    canonical.push(per_triplet[clustering.representatives[cluster]].clone());
                    canonical.len() - 1
                })
            })
            .collect();
        let count = canonical.len();

        store.reassign_relations(canonical, assignment);
        info!(triplets = store.len(), canonical = count, "Relation merge completed");
        count
    }
}
