use extract::{Entity, TripletStore};
use ingest::Chunk;
use serde::Serialize;

/// Item counts recorded as a batch moves through the stages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageCounts {
    pub extracted_entities: usize,
    pub canonical_entities: usize,
    pub extracted_triplets: usize,
    pub canonical_relations: usize,
    pub reconciled_endpoints: usize,
    pub embedded_entities: usize,
    pub embedded_relations: usize,
    pub matched_entities: usize,
    pub exported_triplets: usize,
    pub dropped_triplets: usize,
    pub failed_triplets: usize,
}

impl StageCounts {
    pub fn absorb(&mut self, other: &StageCounts) {
        self.extracted_entities += other.extracted_entities;
        self.canonical_entities += other.canonical_entities;
        self.extracted_triplets += other.extracted_triplets;
        self.canonical_relations += other.canonical_relations;
        self.reconciled_endpoints += other.reconciled_endpoints;
        self.embedded_entities += other.embedded_entities;
        self.embedded_relations += other.embedded_relations;
        self.matched_entities += other.matched_entities;
        self.exported_triplets += other.exported_triplets;
        self.dropped_triplets += other.dropped_triplets;
        self.failed_triplets += other.failed_triplets;
    }
}

/// Everything one batch carries between stages. Each stage takes it by value.
#[derive(Debug, Clone, Default)]
pub struct BatchState {
    pub chunks: Vec<Chunk>,
    /// Entity extraction output, canonical after the merge stage.
    pub entities: Vec<Entity>,
    pub store: TripletStore,
    pub counts: StageCounts,
}

impl BatchState {
    pub fn new(chunks: Vec<Chunk>) -> Self {
        Self {
            chunks,
            ..Self::default()
        }
    }
}
