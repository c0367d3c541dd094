use anyhow::{Context, Result};
use extract::{CleanerConfig, ExtractorConfig, RetryConfig};
use index::{ExporterConfig, MatcherConfig, TripletEmbedderConfig};
use resolve::{EntityMergerConfig, ReconcilerConfig, RelationMergerConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings for one graph build. Every key is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphBuilderConfig {
    /// Chunks per pass through the stage sequence.
    pub batch_size: usize,
    pub pipeline: StageConfigs,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfigs {
    pub entity_cleaner: CleanerConfig,
    pub triplet_cleaner: CleanerConfig,
    pub entity_text_merger: EntityMergerConfig,
    pub relation_text_merger: RelationMergerConfig,
    pub triplet_entity_merger: ReconcilerConfig,
    pub triplet_embedder: TripletEmbedderConfig,
    pub neo4j_matcher: MatcherConfig,
    pub neo4j_exporter: ExporterConfig,
    pub entity_extractor: ExtractorConfig,
    pub relation_extractor: ExtractorConfig,
    pub retry: RetryConfig,
}

impl Default for GraphBuilderConfig {
    fn default() -> Self {
        Self {
            batch_size: 6,
            pipeline: StageConfigs::default(),
        }
    }
}

impl GraphBuilderConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Invalid graph builder config")?;
        Ok(config.normalized())
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_json_str(&json)
    }

    fn normalized(mut self) -> Self {
        self.batch_size = self.batch_size.max(1);
        self.pipeline.neo4j_exporter.batch_size = self.pipeline.neo4j_exporter.batch_size.max(1);
        self
    }
}
