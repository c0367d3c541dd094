//! Knowledge-graph construction from chunked documents.
//!
//! A [`GraphBuilder`] runs each batch of chunks through extraction, cleaning,
//! fuzzy resolution, embedding, persisted-graph matching and export.

pub mod config;
pub mod stages;
pub mod state;

pub use config::{GraphBuilderConfig, StageConfigs};
pub use stages::Stage;
pub use state::{BatchState, StageCounts};

use anyhow::{Context, Result};
use extract::{Cleaner, Entity, EntityExtractor, LanguageModel, RelationExtractor, ResolvedTriplet, RetryPolicy};
use index::{Embedder, GraphExporter, GraphMatcher, GraphStore, TripletEmbedder};
use ingest::{Chunk, Document};
use resolve::{EntityMerger, RelationMerger, TripletEntityReconciler};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, info_span, Instrument};

use stages::{
    EmbeddingStage, EntityCleaningStage, EntityExtractionStage, EntityMergeStage, ExportStage, MatchingStage,
    ReconciliationStage, RelationExtractionStage, RelationMergeStage, TripletCleaningStage,
};

/// Outcome of building one document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphBuildReport {
    pub doc_id: String,
    pub batches: usize,
    /// Canonical entities of every batch, in batch order.
    pub entities: Vec<Entity>,
    pub triplets: Vec<ResolvedTriplet>,
    pub counts: StageCounts,
}

impl GraphBuildReport {
    fn absorb(&mut self, state: BatchState) {
        self.batches += 1;
        self.counts.absorb(&state.counts);
        self.entities.extend(state.entities);
        self.triplets.extend(state.store.resolve_all());
    }
}

pub struct GraphBuilder {
    config: GraphBuilderConfig,
    graph: Arc<dyn GraphStore>,
    entity_extraction: EntityExtractionStage,
    entity_cleaning: EntityCleaningStage,
    entity_merge: EntityMergeStage,
    relation_extraction: RelationExtractionStage,
    triplet_cleaning: TripletCleaningStage,
    relation_merge: RelationMergeStage,
    reconciliation: ReconciliationStage,
    embedding: EmbeddingStage,
    matching: MatchingStage,
    export: ExportStage,
}

impl GraphBuilder {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        embedder: Arc<dyn Embedder>,
        graph: Arc<dyn GraphStore>,
        config: GraphBuilderConfig,
    ) -> Self {
        let stage = &config.pipeline;
        let policy = RetryPolicy::from(&stage.retry);

        Self {
            entity_extraction: EntityExtractionStage::new(EntityExtractor::new(
                llm.clone(),
                stage.entity_extractor.clone(),
                policy.clone(),
            )),
            entity_cleaning: EntityCleaningStage::new(Cleaner::new(stage.entity_cleaner)),
            entity_merge: EntityMergeStage::new(EntityMerger::new(stage.entity_text_merger)),
            relation_extraction: RelationExtractionStage::new(RelationExtractor::new(
                llm,
                stage.relation_extractor.clone(),
                policy,
            )),
            triplet_cleaning: TripletCleaningStage::new(Cleaner::new(stage.triplet_cleaner)),
            relation_merge: RelationMergeStage::new(RelationMerger::new(stage.relation_text_merger)),
            reconciliation: ReconciliationStage::new(TripletEntityReconciler::new(stage.triplet_entity_merger)),
            embedding: EmbeddingStage::new(TripletEmbedder::new(embedder, stage.triplet_embedder)),
            matching: MatchingStage::new(GraphMatcher::new(graph.clone(), stage.neo4j_matcher.clone())),
            export: ExportStage::new(GraphExporter::new(graph.clone(), stage.neo4j_exporter.clone())),
            graph,
            config,
        }
    }

    pub fn config(&self) -> &GraphBuilderConfig {
        &self.config
    }

    /// Run one batch of chunks through every stage, in order.
    pub async fn run_batch(&self, chunks: Vec<Chunk>) -> BatchState {
        debug!(chunks = chunks.len(), "Running batch");
        let state = BatchState::new(chunks);
        let state = self.entity_extraction.apply(state).await;
        let state = self.entity_cleaning.apply(state).await;
        let state = self.entity_merge.apply(state).await;
        let state = self.relation_extraction.apply(state).await;
        let state = self.triplet_cleaning.apply(state).await;
        let state = self.relation_merge.apply(state).await;
        let state = self.reconciliation.apply(state).await;
        let state = self.embedding.apply(state).await;
        let state = self.matching.apply(state).await;
        self.export.apply(state).await
    }

    /// Build the graph for a document, `batch_size` chunks at a time.
    pub async fn build(&self, document: &Document) -> Result<GraphBuildReport> {
        let span = info_span!("build", doc_id = %document.doc_id, chunks = document.len());

        async {
            let matcher = &self.config.pipeline.neo4j_matcher;
            self.graph
                .ensure_vector_index(
                    &matcher.vector_index_name,
                    &self.config.pipeline.neo4j_exporter.node_label(),
                    matcher.embedding_dimension,
                )
                .await
                .context("Graph store is not ready for matching")?;

            let mut report = GraphBuildReport {
                doc_id: document.doc_id.clone(),
                ..GraphBuildReport::default()
            };

            let batch_size = self.config.batch_size.max(1);
            for batch in document.chunks.chunks(batch_size) {
                let state = self.run_batch(batch.to_vec()).await;
                debug!(batch = report.batches + 1, counts = ?state.counts, "Batch finished");
                report.absorb(state);
            }

            info!(
                batches = report.batches,
                entities = report.entities.len(),
                triplets = report.triplets.len(),
                exported = report.counts.exported_triplets,
                "Graph build completed"
            );
            Ok::<_, anyhow::Error>(report)
        }
        .instrument(span)
        .await
    }
}
