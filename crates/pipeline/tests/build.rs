use anyhow::Result;
use async_trait::async_trait;
use extract::{CompletionRequest, LanguageModel};
use index::{Embedder, GraphStore, Record, Statement};
use ingest::Document;
use pipeline::{GraphBuilder, GraphBuilderConfig};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::span::{Attributes, Id};
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Answers entity and relation prompts from the chunk text it is shown.
struct ScriptedModel;

const HIRED_ENTITIES: &str = r#"```json
{"entities": [
    {"name": "Acme Corp", "label": "Company", "summary": "A manufacturer"},
    {"name": "Jane Doe", "label": "Person"}
]}
```"#;

const ACQUIRED_ENTITIES: &str = r#"{"entities": [
    {"name": "ACME Corp.", "label": "company"},
    {"name": "Widget Inc", "label": "Company"},
    {"name": "null", "label": "Company"}
]}"#;

const HIRED_RELATIONS: &str = r#"{"relations": [
    {"head": {"name": "Acme Corp", "label": "Company"}, "relation": {"name": "hired"}, "tail": {"name": "Jane Doe", "label": "Person"}}
]}"#;

const ACQUIRED_RELATIONS: &str = r#"{"relations": [
    {"head": {"name": "acme corp", "label": "company"}, "relation": {"name": "Acquired"}, "tail": {"name": "Widget Inc", "label": "Company"}}
]}"#;

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let wants_entities = request
            .schema
            .as_ref()
            .and_then(|schema| schema.get("properties"))
            .is_some_and(|props| props.get("entities").is_some());
        let prompt = &request.messages.last().map(|m| m.content.clone()).unwrap_or_default();

        let response = match (wants_entities, prompt.contains("hired")) {
            (true, true) => HIRED_ENTITIES,
            (true, false) => ACQUIRED_ENTITIES,
            (false, true) => HIRED_RELATIONS,
            (false, false) => ACQUIRED_RELATIONS,
        };
        Ok(response.to_string())
    }
}

struct DownModel;

#[async_trait]
impl LanguageModel for DownModel {
    async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
        anyhow::bail!("connection refused")
    }
}

struct LengthEmbedder;

#[async_trait]
impl Embedder for LengthEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
    }
}

#[derive(Default)]
struct RecordingGraph {
    reads: Mutex<Vec<Statement>>,
    writes: Mutex<Vec<Statement>>,
    read_results: Mutex<VecDeque<Vec<Record>>>,
    fail_writes: bool,
}

#[async_trait]
impl GraphStore for RecordingGraph {
    async fn run_read(&self, statement: &Statement) -> Result<Vec<Record>> {
        self.reads.lock().unwrap().push(statement.clone());
        Ok(self.read_results.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn run_write(&self, statement: &Statement) -> Result<()> {
        self.writes.lock().unwrap().push(statement.clone());
        if self.fail_writes {
            anyhow::bail!("ServiceUnavailable");
        }
        Ok(())
    }
}

/// Records every new span with the name of its parent.
#[derive(Clone, Default)]
struct SpanParents(Arc<Mutex<Vec<(String, Option<String>)>>>);

impl<S> Layer<S> for SpanParents
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, _attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            let parent = span.parent().map(|p| p.name().to_string());
            self.0.lock().unwrap().push((span.name().to_string(), parent));
        }
    }
}

fn fast_config() -> GraphBuilderConfig {
    GraphBuilderConfig::from_json_str(
        r#"{"pipeline": {"retry": {"max_attempts": 1, "retry_delay_ms": 0}}}"#,
    )
    .unwrap()
}

fn document() -> Document {
    Document::from_texts(
        "doc-1",
        "news.md",
        [
            "Acme Corp hired Jane Doe as chief engineer.",
            "ACME Corp. acquired Widget Inc last spring.",
        ],
    )
}

fn persisted(name: &str, score: f64) -> Vec<Record> {
    let record = json!({"name": name, "label": "Company", "score": score});
    vec![record.as_object().unwrap().clone()]
}

#[tokio::test]
async fn test_build_resolves_and_exports_document() {
    let graph = Arc::new(RecordingGraph::default());
    graph
        .read_results
        .lock()
        .unwrap()
        .push_back(persisted("Acme Corporation", 0.97));

    let builder = GraphBuilder::new(Arc::new(ScriptedModel), Arc::new(LengthEmbedder), graph.clone(), fast_config());
    let report = builder.build(&document()).await.unwrap();

    assert_eq!(report.doc_id, "doc-1");
    assert_eq!(report.batches, 1);
    assert_eq!(report.counts.extracted_entities, 4);
    assert_eq!(report.counts.canonical_entities, 3);
    assert_eq!(report.counts.extracted_triplets, 2);
    assert_eq!(report.counts.canonical_relations, 2);
    assert_eq!(report.counts.reconciled_endpoints, 4);
    assert_eq!(report.counts.matched_entities, 1);
    assert_eq!(report.counts.exported_triplets, 2);
    assert_eq!(report.counts.dropped_triplets, 0);

    let acme = &report.entities[0];
    assert_eq!(acme.name, "acme corp");
    assert_eq!(acme.alternatives[0].name, "acme corp.");

    let heads: Vec<&str> = report.triplets.iter().map(|t| t.head.name.as_str()).collect();
    assert_eq!(heads, vec!["Acme Corporation", "Acme Corporation"]);
    assert_eq!(report.triplets[0].head.alternatives[0].name, "acme corp");
    assert_eq!(report.triplets[1].relation.name, "acquired");
    assert!(report.triplets.iter().all(|t| t.head.embedding.is_some() && t.tail.embedding.is_some()));

    // vector index first, then one export batch
    let writes = graph.writes.lock().unwrap();
    assert_eq!(writes.len(), 2);
    assert!(writes[0].text.contains("CREATE VECTOR INDEX `embedded_entities_index`"));
    let batch = writes[1].params["batch"].as_array().unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0]["head_props"]["name"], json!("Acme Corporation"));
    assert_eq!(batch[0]["tail_props"]["name"], json!("Jane Doe"));
    assert_eq!(batch[0]["rel_type"], json!("HIRED"));
    assert_eq!(batch[1]["tail_labels"], json!(["Company", "Embedded"]));
    assert_eq!(graph.reads.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_unreachable_model_yields_empty_report() {
    let graph = Arc::new(RecordingGraph::default());
    let builder = GraphBuilder::new(Arc::new(DownModel), Arc::new(LengthEmbedder), graph.clone(), fast_config());

    let report = builder.build(&document()).await.unwrap();

    assert!(report.entities.is_empty());
    assert!(report.triplets.is_empty());
    assert_eq!(report.counts.exported_triplets, 0);
    assert_eq!(graph.writes.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_batches_follow_batch_size() {
    let graph = Arc::new(RecordingGraph::default());
    let mut config = fast_config();
    config.batch_size = 1;
    let builder = GraphBuilder::new(Arc::new(ScriptedModel), Arc::new(LengthEmbedder), graph.clone(), config);

    let report = builder.build(&document()).await.unwrap();

    assert_eq!(report.batches, 2);
    assert_eq!(report.triplets.len(), 2);
    assert_eq!(report.counts.exported_triplets, 2);
    // index + one export per batch
    assert_eq!(graph.writes.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_unavailable_graph_fails_build() {
    let graph = Arc::new(RecordingGraph {
        fail_writes: true,
        ..RecordingGraph::default()
    });
    let builder = GraphBuilder::new(Arc::new(ScriptedModel), Arc::new(LengthEmbedder), graph, fast_config());

    let err = builder.build(&document()).await.unwrap_err();
    assert!(format!("{:#}", err).contains("ServiceUnavailable"));
}

#[tokio::test]
async fn test_stage_spans_nest_under_build_span() {
    let parents = SpanParents::default();
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(parents.clone()));

    let graph = Arc::new(RecordingGraph::default());
    let builder = GraphBuilder::new(Arc::new(ScriptedModel), Arc::new(LengthEmbedder), graph, fast_config());
    builder.build(&document()).await.unwrap();

    let spans = parents.0.lock().unwrap();
    let stages: Vec<&Option<String>> = spans
        .iter()
        .filter(|(name, _)| name == "stage")
        .map(|(_, parent)| parent)
        .collect();
    assert_eq!(stages.len(), 10);
    assert!(stages.iter().all(|parent| parent.as_deref() == Some("build")));
}

#[tokio::test]
async fn test_custom_embedded_label_is_indexed_as_exported() {
    let graph = Arc::new(RecordingGraph::default());
    let config = GraphBuilderConfig::from_json_str(
        r#"{"pipeline": {
            "retry": {"max_attempts": 1, "retry_delay_ms": 0},
            "neo4j_exporter": {"embedded_label": "embedded_node"}
        }}"#,
    )
    .unwrap();
    let builder = GraphBuilder::new(Arc::new(ScriptedModel), Arc::new(LengthEmbedder), graph.clone(), config);

    builder.build(&document()).await.unwrap();

    let writes = graph.writes.lock().unwrap();
    assert!(writes[0].text.contains("FOR (n:`EmbeddedNode`)"));
    let batch = writes[1].params["batch"].as_array().unwrap();
    assert!(batch.iter().all(|item| item["head_labels"][1] == json!("EmbeddedNode")));
    assert!(batch.iter().all(|item| item["tail_labels"][1] == json!("EmbeddedNode")));
}

#[test]
fn test_report_serializes_counts() {
    let report = pipeline::GraphBuildReport::default();
    let value: Value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["counts"]["exported_triplets"], json!(0));
}
