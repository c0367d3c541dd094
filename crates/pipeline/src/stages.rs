//! The fixed stage sequence a batch of chunks goes through.

use async_trait::async_trait;
use extract::{Cleaner, EntityExtractor, RelationExtractor, TripletStore};
use index::{GraphExporter, GraphMatcher, TripletEmbedder};
use resolve::{EntityMerger, RelationMerger, TripletEntityReconciler};
use tracing::{info, info_span, Instrument, Span};

use crate::state::BatchState;

/// One step of the build. Takes the batch by value and hands it back.
#[async_trait]
pub trait Stage: Send + Sync {
    async fn apply(&self, state: BatchState) -> BatchState;
}

/// Opened per call so it nests under the caller's build span.
fn stage_span(name: &'static str) -> Span {
    info_span!("stage", name)
}

pub struct EntityExtractionStage {
    extractor: EntityExtractor,
}

impl EntityExtractionStage {
    pub fn new(extractor: EntityExtractor) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl Stage for EntityExtractionStage {
    async fn apply(&self, mut state: BatchState) -> BatchState {
        async move {
            state.entities = self
                .extractor
                .extract_all(&state.chunks)
                .await
                .into_iter()
                .flatten()
                .collect();
            state.counts.extracted_entities = state.entities.len();
            info!(chunks = state.chunks.len(), entities = state.entities.len(), "Entities extracted");
            state
        }
        .instrument(stage_span("entity_extraction"))
        .await
    }
}

pub struct EntityCleaningStage {
    cleaner: Cleaner,
}

impl EntityCleaningStage {
    pub fn new(cleaner: Cleaner) -> Self {
        Self { cleaner }
    }
}

#[async_trait]
impl Stage for EntityCleaningStage {
    async fn apply(&self, mut state: BatchState) -> BatchState {
        stage_span("entity_cleaning").in_scope(|| {
            for entity in &mut state.entities {
                self.cleaner.clean_entity(entity);
            }
            let before = state.entities.len();
            state.entities.retain(|e| !e.name.is_empty());
            info!(entities = state.entities.len(), removed = before - state.entities.len(), "Entities cleaned");
        });
        state
    }
}

pub struct EntityMergeStage {
    merger: EntityMerger,
}

impl EntityMergeStage {
    pub fn new(merger: EntityMerger) -> Self {
        Self { merger }
    }
}

#[async_trait]
impl Stage for EntityMergeStage {
    async fn apply(&self, mut state: BatchState) -> BatchState {
        stage_span("entity_merge").in_scope(|| {
            let entities = std::mem::take(&mut state.entities);
            state.entities = self.merger.merge(entities);
            state.counts.canonical_entities = state.entities.len();
        });
        state
    }
}

pub struct RelationExtractionStage {
    extractor: RelationExtractor,
}

impl RelationExtractionStage {
    pub fn new(extractor: RelationExtractor) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl Stage for RelationExtractionStage {
    async fn apply(&self, mut state: BatchState) -> BatchState {
        async move {
            state.store = self
                .extractor
                .extract_all(&state.chunks, &state.entities)
                .await
                .into_iter()
                .flatten()
                .collect::<TripletStore>();
            state.counts.extracted_triplets = state.store.len();
            info!(triplets = state.store.len(), "Triplets extracted");
            state
        }
        .instrument(stage_span("relation_extraction"))
        .await
    }
}

pub struct TripletCleaningStage {
    cleaner: Cleaner,
}

impl TripletCleaningStage {
    pub fn new(cleaner: Cleaner) -> Self {
        Self { cleaner }
    }
}

#[async_trait]
impl Stage for TripletCleaningStage {
    async fn apply(&self, mut state: BatchState) -> BatchState {
        stage_span("triplet_cleaning").in_scope(|| {
            for node in state.store.nodes_mut() {
                self.cleaner.clean_entity(node);
            }
            for relation in state.store.relations_mut() {
                self.cleaner.clean_relation(relation);
            }
            info!(triplets = state.store.len(), "Triplets cleaned");
        });
        state
    }
}

pub struct RelationMergeStage {
    merger: RelationMerger,
}

impl RelationMergeStage {
    pub fn new(merger: RelationMerger) -> Self {
        Self { merger }
    }
}

#[async_trait]
impl Stage for RelationMergeStage {
    async fn apply(&self, mut state: BatchState) -> BatchState {
        stage_span("relation_merge").in_scope(|| {
            state.counts.canonical_relations = self.merger.merge(&mut state.store);
        });
        state
    }
}

pub struct ReconciliationStage {
    reconciler: TripletEntityReconciler,
}

impl ReconciliationStage {
    pub fn new(reconciler: TripletEntityReconciler) -> Self {
        Self { reconciler }
    }
}

#[async_trait]
impl Stage for ReconciliationStage {
    async fn apply(&self, mut state: BatchState) -> BatchState {
        stage_span("triplet_entity_reconciliation").in_scope(|| {
            state.counts.reconciled_endpoints = self.reconciler.reconcile(&mut state.store, &state.entities);
        });
        state
    }
}

pub struct EmbeddingStage {
    embedder: TripletEmbedder,
}

impl EmbeddingStage {
    pub fn new(embedder: TripletEmbedder) -> Self {
        Self { embedder }
    }
}

#[async_trait]
impl Stage for EmbeddingStage {
    async fn apply(&self, mut state: BatchState) -> BatchState {
        let stats = self.embedder.embed(&mut state.store).instrument(stage_span("embedding")).await;
        state.counts.embedded_entities = stats.entities;
        state.counts.embedded_relations = stats.relations;
        state
    }
}

pub struct MatchingStage {
    matcher: GraphMatcher,
}

impl MatchingStage {
    pub fn new(matcher: GraphMatcher) -> Self {
        Self { matcher }
    }
}

#[async_trait]
impl Stage for MatchingStage {
    async fn apply(&self, mut state: BatchState) -> BatchState {
        state.counts.matched_entities = self
            .matcher
            .match_triplets(&mut state.store)
            .instrument(stage_span("graph_matching"))
            .await;
        state
    }
}

pub struct ExportStage {
    exporter: GraphExporter,
}

impl ExportStage {
    pub fn new(exporter: GraphExporter) -> Self {
        Self { exporter }
    }
}

#[async_trait]
impl Stage for ExportStage {
    async fn apply(&self, mut state: BatchState) -> BatchState {
        let stats = self.exporter.export(&state.store).instrument(stage_span("export")).await;
        state.counts.exported_triplets = stats.exported;
        state.counts.dropped_triplets = stats.dropped;
        state.counts.failed_triplets = stats.failed;
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extract::{CleanerConfig, Entity, ExtractedTriplet, Relationship, TripletMetadata};
    use resolve::{EntityMergerConfig, ReconcilerConfig, RelationMergerConfig};

    fn triplet(head: &str, relation: &str, tail: &str) -> ExtractedTriplet {
        ExtractedTriplet {
            head: Entity::new(head, "company"),
            relation: Relationship::new(relation, None),
            tail: Entity::new(tail, "person"),
            metadata: TripletMetadata {
                context: String::new(),
                start_position: 0,
                end_position: 0,
                chunk_id: None,
            },
        }
    }

    #[tokio::test]
    async fn test_entity_cleaning_then_merge() {
        let mut state = BatchState::default();
        state.entities = vec![
            Entity::new("  Acme Corp ", "Company"),
            Entity::new("acme corp.", "company"),
            Entity::new("Jane Doe", "Person"),
        ];

        let state = EntityCleaningStage::new(Cleaner::new(CleanerConfig::default()))
            .apply(state)
            .await;
        let state = EntityMergeStage::new(EntityMerger::new(EntityMergerConfig::default()))
            .apply(state)
            .await;

        assert_eq!(state.counts.canonical_entities, 2);
        assert_eq!(state.entities[0].name, "acme corp");
        assert_eq!(state.entities[0].surface_count(), 2);
    }

    #[tokio::test]
    async fn test_triplet_cleaning_merge_and_reconcile() {
        let mut state = BatchState::default();
        state.entities = vec![Entity::new("acme corp", "company")];
        state.store = vec![
            triplet("Acme Corp.", "Hired", "Jane"),
            triplet("ACME corp", "hired", "Bob"),
        ]
        .into_iter()
        .collect();

        let state = TripletCleaningStage::new(Cleaner::default()).apply(state).await;
        let state = RelationMergeStage::new(RelationMerger::new(RelationMergerConfig::default()))
            .apply(state)
            .await;
        let state = ReconciliationStage::new(TripletEntityReconciler::new(ReconcilerConfig::default()))
            .apply(state)
            .await;

        assert_eq!(state.counts.canonical_relations, 1);
        assert_eq!(state.counts.reconciled_endpoints, 2);
        let resolved = state.store.resolve_all();
        assert_eq!(resolved[0].head.name, "acme corp");
        assert_eq!(resolved[1].relation.name, "hired");
        assert_eq!(state.store.triplets()[0].head, state.store.triplets()[1].head);
    }
}
