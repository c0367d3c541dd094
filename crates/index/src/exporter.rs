use extract::{Entity, Relationship, TripletMetadata, TripletStore};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::graph::{GraphStore, Statement};
use crate::identifier::{title_case, to_node_label, to_property_key, to_relationship_type};

const MERGE_BATCH_QUERY: &str = "UNWIND $batch AS item \
CALL apoc.merge.node(item.head_labels, {name: item.head_props.name}, item.head_props, item.head_props) YIELD node AS h \
WITH item, h \
CALL apoc.merge.node(item.tail_labels, {name: item.tail_props.name}, item.tail_props, item.tail_props) YIELD node AS t \
WITH item, h, t \
CALL apoc.merge.relationship(h, item.rel_type, {}, item.rel_props, t) YIELD rel AS r \
RETURN count(r) AS created";

const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    pub batch_size: usize,
    pub embedded_label: String,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            embedded_label: "Embedded".to_string(),
        }
    }
}

impl ExporterConfig {
    /// The marker label as written on nodes and indexed for matching.
    pub fn node_label(&self) -> String {
        to_node_label(&self.embedded_label)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExportStats {
    pub exported: usize,
    /// Triplets skipped because an endpoint had no embedding.
    pub dropped: usize,
    /// Triplets lost to failed write batches.
    pub failed: usize,
}

impl ExportStats {
    fn absorb(&mut self, other: ExportStats) {
        self.exported += other.exported;
        self.dropped += other.dropped;
        self.failed += other.failed;
    }
}

/// Upserts triplets into the property graph in batched write transactions.
pub struct GraphExporter {
    graph: Arc<dyn GraphStore>,
    config: ExporterConfig,
}

fn put(props: &mut Map<String, Value>, key: &str, value: impl Into<Value>) {
    props.insert(to_property_key(key), value.into());
}

fn put_vector(props: &mut Map<String, Value>, key: &str, vector: &Option<Vec<f32>>) {
    if let Some(vector) = vector {
        put(props, key, vector.iter().map(|&x| x as f64).collect::<Vec<f64>>());
    }
}

/// `[[name, source, chunk_id], ...]` as a JSON string.
fn alternatives_json(alternatives: &[Entity]) -> String {
    let tuples: Vec<[&str; 3]> = alternatives
        .iter()
        .map(|alt| {
            let metadata = alt.metadata.as_ref();
            [
                alt.name.as_str(),
                metadata.and_then(|m| m.source.as_deref()).unwrap_or(UNKNOWN),
                metadata.and_then(|m| m.chunk_id.as_deref()).unwrap_or(UNKNOWN),
            ]
        })
        .collect();
    serde_json::to_string(&tuples).unwrap_or_else(|_| "[]".to_string())
}

/// Scalar property map for a node. Metadata is inlined; absent values are omitted.
pub fn entity_properties(entity: &Entity) -> Map<String, Value> {
    let mut props = Map::new();

    let name = if entity.is_special() {
        entity.name.trim().to_string()
    } else {
        title_case(&entity.name)
    };
    put(&mut props, "name", name);
    put(&mut props, "label", entity.label.as_str());
    if let Some(summary) = &entity.summary {
        put(&mut props, "summary", summary.as_str());
    }
    if let Some(special) = entity.special_type {
        put(&mut props, "special_type", special.as_str());
    }

    if let Some(metadata) = &entity.metadata {
        put(&mut props, "context", metadata.context.as_str());
        put(&mut props, "start_index", metadata.start_index as u64);
        if let Some(chunk_id) = &metadata.chunk_id {
            put(&mut props, "chunk_id", chunk_id.as_str());
        }
        if let Some(source) = &metadata.source {
            put(&mut props, "source", source.as_str());
        }
    }

    put_vector(&mut props, "embedding", &entity.embedding);
    put_vector(&mut props, "name_embedding", &entity.name_embedding);
    put_vector(&mut props, "label_embedding", &entity.label_embedding);

    if !entity.alternatives.is_empty() {
        put(&mut props, "alternatives", alternatives_json(&entity.alternatives));
    }
    props
}

/// Relationship properties with the triplet provenance merged in.
pub fn relation_properties(relation: &Relationship, metadata: &TripletMetadata) -> Map<String, Value> {
    let mut props = Map::new();
    put(&mut props, "name", relation.name.as_str());
    if let Some(label) = &relation.label {
        put(&mut props, "label", label.as_str());
    }
    put_vector(&mut props, "embedding", &relation.embedding);

    put(&mut props, "context", metadata.context.as_str());
    put(&mut props, "start_position", metadata.start_position as u64);
    put(&mut props, "end_position", metadata.end_position as u64);
    if let Some(chunk_id) = &metadata.chunk_id {
        put(&mut props, "chunk_id", chunk_id.as_str());
    }
    props
}

impl GraphExporter {
    pub fn new(graph: Arc<dyn GraphStore>, mut config: ExporterConfig) -> Self {
        config.embedded_label = config.node_label();
        Self { graph, config }
    }

    pub fn config(&self) -> &ExporterConfig {
        &self.config
    }

    fn labels_for(&self, entity: &Entity) -> Vec<String> {
        vec![to_node_label(&entity.label), self.config.embedded_label.clone()]
    }

    /// One UNWIND item, or `None` when an endpoint has no embedding.
    fn batch_item(&self, head: &Entity, relation: &Relationship, tail: &Entity, metadata: &TripletMetadata) -> Option<Value> {
        if !head.is_embedded() || !tail.is_embedded() {
            return None;
        }

        Some(json!({
            "head_props": entity_properties(head),
            "tail_props": entity_properties(tail),
            "rel_props": relation_properties(relation, metadata),
            "head_labels": self.labels_for(head),
            "tail_labels": self.labels_for(tail),
            "rel_type": to_relationship_type(&relation.name),
        }))
    }

    async fn export_batch(&self, store: &TripletStore, range: std::ops::Range<usize>) -> ExportStats {
        let triplets = &store.triplets()[range];
        let mut stats = ExportStats::default();

        let items: Vec<Value> = triplets
            .iter()
            .filter_map(|triplet| {
                let head = store.node(triplet.head);
                let tail = store.node(triplet.tail);
                let item = self.batch_item(head, store.relation(triplet.relation), tail, &triplet.metadata);
                if item.is_none() {
                    debug!(head = %head.name, tail = %tail.name, "Dropping triplet with unembedded endpoint");
                    stats.dropped += 1;
                }
                item
            })
            .collect();

        if items.is_empty() {
            return stats;
        }

        let statement = Statement::new(MERGE_BATCH_QUERY).param("batch", Value::Array(items.clone()));
        match self.graph.run_write(&statement).await {
            Ok(()) => {
                debug!(size = items.len(), "Batch export successful");
                stats.exported = items.len();
            }
            Err(e) => {
                let mut identifiers: Vec<&str> = Vec::new();
                for item in &items {
                    for key in ["head_labels", "tail_labels"] {
                        if let Some(labels) = item.get(key).and_then(Value::as_array) {
                            identifiers.extend(labels.iter().filter_map(Value::as_str));
                        }
                    }
                    identifiers.extend(item.get("rel_type").and_then(Value::as_str));
                }
                identifiers.sort_unstable();
                identifiers.dedup();
                error!(
                    size = items.len(),
                    embedded_label = %self.config.embedded_label,
                    identifiers = ?identifiers,
                    error = %e,
                    "Graph batch export failed"
                );
                stats.failed = items.len();
            }
        }
        stats
    }

    /// Write every triplet whose endpoints are embedded.
    pub async fn export(&self, store: &TripletStore) -> ExportStats {
        let total = store.len();
        let mut stats = ExportStats::default();
        if total == 0 {
            info!("No triplets to export");
            return stats;
        }

        let batch_size = self.config.batch_size.max(1);
        let batches = total.div_ceil(batch_size);
        for (idx, start) in (0..total).step_by(batch_size).enumerate() {
            let end = (start + batch_size).min(total);
            debug!(batch = idx + 1, batches, size = end - start, "Processing export batch");
            stats.absorb(self.export_batch(store, start..end).await);
        }

        info!(
            triplets = total,
            exported = stats.exported,
            dropped = stats.dropped,
            failed = stats.failed,
            "Graph export completed"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::fakes::FakeGraphStore;
    use extract::{EntityMetadata, ExtractedTriplet, SpecialType};

    fn embedded(name: &str, label: &str) -> Entity {
        let mut entity = Entity::new(name, label);
        entity.embedding = Some(vec![0.5, 0.25]);
        entity
    }

    fn triplet(head: Entity, relation: &str, tail: Entity) -> ExtractedTriplet {
        ExtractedTriplet {
            head,
            relation: Relationship::new(relation, None),
            tail,
            metadata: TripletMetadata {
                context: "acme hired jane".to_string(),
                start_position: 0,
                end_position: 15,
                chunk_id: Some("doc-1-0".to_string()),
            },
        }
    }

    fn batch_of(statement: &Statement) -> &Vec<Value> {
        statement.params["batch"].as_array().unwrap()
    }

    #[tokio::test]
    async fn test_unembedded_tail_drops_only_that_triplet() {
        let store: TripletStore = vec![
            triplet(embedded("acme", "company"), "hired", embedded("jane", "person")),
            triplet(embedded("acme", "company"), "hired", Entity::new("bob", "person")),
            triplet(embedded("acme", "company"), "founded by", embedded("john", "person")),
        ]
        .into_iter()
        .collect();
        let graph = Arc::new(FakeGraphStore::default());

        let stats = GraphExporter::new(graph.clone(), ExporterConfig::default())
            .export(&store)
            .await;

        assert_eq!(stats, ExportStats { exported: 2, dropped: 1, failed: 0 });
        let writes = graph.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        let batch = batch_of(&writes[0]);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0]["head_props"]["name"], json!("Acme"));
        assert_eq!(batch[0]["head_labels"], json!(["Company", "Embedded"]));
        assert_eq!(batch[1]["rel_type"], json!("FOUNDED_BY"));
        assert_eq!(batch[1]["rel_props"]["chunk_id"], json!("doc-1-0"));
        assert_eq!(batch[1]["rel_props"]["end_position"], json!(15));
    }

    #[tokio::test]
    async fn test_failed_batch_does_not_abort_later_batches() {
        let store: TripletStore = (0..5)
            .map(|i| triplet(embedded(&format!("company {}", i), "company"), "hired", embedded("jane", "person")))
            .collect();
        let graph = Arc::new(FakeGraphStore {
            failing_writes: vec![0],
            ..FakeGraphStore::default()
        });
        let config = ExporterConfig {
            batch_size: 2,
            ..ExporterConfig::default()
        };

        let stats = GraphExporter::new(graph.clone(), config).export(&store).await;

        assert_eq!(stats, ExportStats { exported: 3, dropped: 0, failed: 2 });
        assert_eq!(graph.writes.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_reexport_sends_identical_statements() {
        let store: TripletStore = vec![triplet(embedded("acme", "company"), "hired", embedded("jane", "person"))]
            .into_iter()
            .collect();
        let graph = Arc::new(FakeGraphStore::default());
        let exporter = GraphExporter::new(graph.clone(), ExporterConfig::default());

        exporter.export(&store).await;
        exporter.export(&store).await;

        let writes = graph.writes.lock().unwrap();
        assert_eq!(writes[0], writes[1]);
        assert!(writes[0].text.contains("apoc.merge.node"));
        assert!(writes[0].text.contains("apoc.merge.relationship"));
    }

    #[tokio::test]
    async fn test_embedded_label_matches_vector_index_label() {
        let store: TripletStore = vec![triplet(embedded("acme", "company"), "hired", embedded("jane", "person"))]
            .into_iter()
            .collect();
        let graph = Arc::new(FakeGraphStore::default());
        let config = ExporterConfig {
            embedded_label: "embedded_node".to_string(),
            ..ExporterConfig::default()
        };

        graph.ensure_vector_index("idx", &config.node_label(), 2).await.unwrap();
        GraphExporter::new(graph.clone(), config).export(&store).await;

        let writes = graph.writes.lock().unwrap();
        assert!(writes[0].text.contains("FOR (n:`EmbeddedNode`)"));
        assert_eq!(batch_of(&writes[1])[0]["head_labels"], json!(["Company", "EmbeddedNode"]));
        assert_eq!(batch_of(&writes[1])[0]["tail_labels"], json!(["Person", "EmbeddedNode"]));
    }

    #[test]
    fn test_entity_properties_flatten_metadata_and_alternatives() {
        let mut entity = embedded("apple", "technology company").with_metadata(EntityMetadata {
            context: "apple makes phones".to_string(),
            start_index: 0,
            chunk_id: Some("doc-0".to_string()),
            source: Some("notes.md".to_string()),
        });
        entity.alternatives.push(Entity::new("apple inc", "technology company"));

        let props = entity_properties(&entity);

        assert_eq!(props["name"], json!("Apple"));
        assert_eq!(props["start_index"], json!(0));
        assert_eq!(props["source"], json!("notes.md"));
        assert_eq!(props["embedding"], json!([0.5, 0.25]));
        assert_eq!(props["alternatives"], json!(r#"[["apple inc","unknown","unknown"]]"#));
        assert!(!props.contains_key("summary"));
        assert!(!props.contains_key("name_embedding"));
    }

    #[test]
    fn test_special_names_are_not_title_cased() {
        let mut entity = embedded(" 15% ", "metric");
        entity.special_type = Some(SpecialType::Price);
        let props = entity_properties(&entity);
        assert_eq!(props["name"], json!("15%"));
        assert_eq!(props["special_type"], json!("PRICE"));
    }
}
