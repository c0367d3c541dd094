use serde::{Deserialize, Serialize};
use std::fmt;

/// Lexical categories whose literal form must survive cleaning and merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpecialType {
    Date,
    /// Currency amounts, percentages and magnitudes ("2.5M").
    Price,
}

impl SpecialType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpecialType::Date => "DATE",
            SpecialType::Price => "PRICE",
        }
    }
}

impl fmt::Display for SpecialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub context: String,
    pub start_index: usize,
    pub chunk_id: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EntityMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub alternatives: Vec<Entity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_type: Option<SpecialType>,
}

/// Semantic identity of an entity: name and label, nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub name: String,
    pub label: String,
}

impl Entity {
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            summary: None,
            metadata: None,
            embedding: None,
            name_embedding: None,
            label_embedding: None,
            alternatives: Vec::new(),
            special_type: None,
        }
    }

    pub fn with_summary(mut self, summary: Option<String>) -> Self {
        self.summary = summary;
        self
    }

    pub fn with_metadata(mut self, metadata: EntityMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn key(&self) -> EntityKey {
        EntityKey {
            name: self.name.clone(),
            label: self.label.clone(),
        }
    }

    pub fn is_special(&self) -> bool {
        self.special_type.is_some()
    }

    pub fn is_embedded(&self) -> bool {
        self.embedding.is_some()
    }

    /// This entity plus every variant folded into it.
    pub fn surface_count(&self) -> usize {
        1 + self.alternatives.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationKey {
    pub name: String,
    pub label: Option<String>,
}

impl Relationship {
    pub fn new(name: impl Into<String>, label: Option<String>) -> Self {
        Self {
            name: name.into(),
            label,
            embedding: None,
        }
    }

    pub fn key(&self) -> RelationKey {
        RelationKey {
            name: self.name.clone(),
            label: self.label.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripletMetadata {
    pub context: String,
    pub start_position: usize,
    pub end_position: usize,
    pub chunk_id: Option<String>,
}

/// A triplet as produced by extraction, before it is interned into a store.
#[derive(Debug, Clone)]
pub struct ExtractedTriplet {
    pub head: Entity,
    pub relation: Relationship,
    pub tail: Entity,
    pub metadata: TripletMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationId(usize);

#[derive(Debug, Clone)]
pub struct Triplet {
    pub head: NodeId,
    pub relation: RelationId,
    pub tail: NodeId,
    pub metadata: TripletMetadata,
}

pub type TripletKey = (EntityKey, RelationKey, EntityKey);

/// Owned (head, relation, tail) view used in reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedTriplet {
    pub head: Entity,
    pub relation: Relationship,
    pub tail: Entity,
    pub metadata: TripletMetadata,
}

/// Arena holding the nodes and relations that triplets point at.
///
/// Several triplets may share one node handle; rewriting an endpoint is a
/// handle swap, never an in-place edit of a shared entity.
#[derive(Debug, Clone, Default)]
pub struct TripletStore {
    nodes: Vec<Entity>,
    relations: Vec<Relationship>,
    triplets: Vec<Triplet>,
}

impl TripletStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, extracted: ExtractedTriplet) {
        let head = self.add_node(extracted.head);
        let tail = self.add_node(extracted.tail);
        let relation = RelationId(self.relations.len());
        self.relations.push(extracted.relation);

        self.triplets.push(Triplet {
            head,
            relation,
            tail,
            metadata: extracted.metadata,
        });
    }

    pub fn add_node(&mut self, entity: Entity) -> NodeId {
        self.nodes.push(entity);
        NodeId(self.nodes.len() - 1)
    }

    pub fn node(&self, id: NodeId) -> &Entity {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Entity {
        &mut self.nodes[id.0]
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.nodes.iter_mut()
    }

    pub fn relation(&self, id: RelationId) -> &Relationship {
        &self.relations[id.0]
    }

    pub fn relation_mut(&mut self, id: RelationId) -> &mut Relationship {
        &mut self.relations[id.0]
    }

    pub fn relations(&self) -> &[Relationship] {
        &self.relations
    }

    pub fn relations_mut(&mut self) -> impl Iterator<Item = &mut Relationship> {
        self.relations.iter_mut()
    }

    /// Replace the relation arena; `assignment[i]` becomes triplet i's relation.
    pub fn reassign_relations(&mut self, relations: Vec<Relationship>, assignment: Vec<usize>) {
        assert_eq!(
            assignment.len(),
            self.triplets.len(),
            "one relation assignment per triplet"
        );
        assert!(assignment.iter().all(|&idx| idx < relations.len()));

        self.relations = relations;
        for (triplet, idx) in self.triplets.iter_mut().zip(assignment) {
            triplet.relation = RelationId(idx);
        }
    }

    pub fn triplets(&self) -> &[Triplet] {
        &self.triplets
    }

    pub fn triplets_mut(&mut self) -> &mut [Triplet] {
        &mut self.triplets
    }

    pub fn len(&self) -> usize {
        self.triplets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triplets.is_empty()
    }

    /// Node handles referenced by triplets, first occurrence order (head before tail).
    pub fn referenced_nodes(&self) -> Vec<NodeId> {
        let mut seen = std::collections::HashSet::new();
        self.triplets
            .iter()
            .flat_map(|t| [t.head, t.tail])
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// Relation handles referenced by triplets, first occurrence order.
    pub fn referenced_relations(&self) -> Vec<RelationId> {
        let mut seen = std::collections::HashSet::new();
        self.triplets
            .iter()
            .map(|t| t.relation)
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// Value identity of a triplet; embeddings and metadata are ignored.
    pub fn triplet_key(&self, triplet: &Triplet) -> TripletKey {
        (
            self.node(triplet.head).key(),
            self.relation(triplet.relation).key(),
            self.node(triplet.tail).key(),
        )
    }

    pub fn resolve(&self, triplet: &Triplet) -> ResolvedTriplet {
        ResolvedTriplet {
            head: self.node(triplet.head).clone(),
            relation: self.relation(triplet.relation).clone(),
            tail: self.node(triplet.tail).clone(),
            metadata: triplet.metadata.clone(),
        }
    }

    pub fn resolve_all(&self) -> Vec<ResolvedTriplet> {
        self.triplets.iter().map(|t| self.resolve(t)).collect()
    }
}

impl FromIterator<ExtractedTriplet> for TripletStore {
    fn from_iter<I: IntoIterator<Item = ExtractedTriplet>>(iter: I) -> Self {
        let mut store = TripletStore::new();
        for extracted in iter {
            store.push(extracted);
        }
        store
    }
}
