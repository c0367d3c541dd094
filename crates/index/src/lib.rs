//! Embedding, persisted-graph matching and export of resolved triplets.

pub mod embeddings;
pub mod exporter;
pub mod graph;
pub mod identifier;
pub mod matcher;
pub mod triplet_embedder;

pub use embeddings::{Embedder, EmbeddingClient, EmbeddingConfig};
pub use exporter::{ExportStats, ExporterConfig, GraphExporter};
pub use graph::{graph_stats, GraphStats, GraphStore, Neo4jStore, Params, Record, Statement};
pub use matcher::{GraphMatcher, MatcherConfig, PersistedMatch};
pub use triplet_embedder::{EmbeddingStats, TripletEmbedder, TripletEmbedderConfig};
