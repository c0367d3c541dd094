pub mod cleaner;
pub mod extractor;
pub mod llm;
pub mod prompt;
pub mod retry;
pub mod schema;
pub mod validate;

pub use cleaner::{detect_special_type, Cleaner, CleanerConfig};
pub use extractor::{reduce_aliases, EntityExtractor, ExtractorConfig, RelationExtractor};
pub use llm::{extract_structured, CompletionRequest, LanguageModel, Message, OllamaClient, Role};
pub use prompt::FewShotExample;
pub use retry::{AttemptError, RetryConfig, RetryError, RetryPolicy};
pub use schema::{
    Entity, EntityKey, EntityMetadata, ExtractedTriplet, NodeId, RelationId, RelationKey,
    Relationship, ResolvedTriplet, SpecialType, Triplet, TripletKey, TripletMetadata, TripletStore,
};
